//! Core data model for saga execution logs.
//!
//! Every state transition of a saga is recorded as a [`LogEntry`] in an
//! append-only stream keyed by the saga's log id. Entries carry the marshaled
//! call arguments of a sub-transaction so that compensations can be replayed
//! from the log after a restart.

mod error;
mod id;
mod log;

pub use error::{LogCodecError, Result, UnknownLogKind};
pub use id::{COUNTER_BITS, IdGenerator, IdParts, MEMBER_BITS, TIMESTAMP_BITS};
pub use log::{LogEntry, LogKind, ParamData};
