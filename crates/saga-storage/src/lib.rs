//! Storage for saga log streams.
//!
//! The coordinator only needs an append-only log per saga, keyed by log id,
//! with lookup, cleanup and last-entry retrieval. [`LogStorage`] is that
//! contract; [`MemoryStorage`] and [`FileStorage`] implement it.

mod error;
mod file;
mod memory;
mod retry;
mod storage;

pub use error::{Result, StorageError};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use retry::RetryPolicy;
pub use storage::LogStorage;
