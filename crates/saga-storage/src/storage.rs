use std::sync::Arc;

use crate::Result;

/// Append-only log storage keyed by log id.
///
/// Implementations must accept concurrent appends to different log ids and
/// must preserve append order within one log id.
pub trait LogStorage: Send + Sync {
    /// Appends one encoded entry to the stream `log_id`, creating the stream
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn append_log(&self, log_id: &str, entry: &str) -> Result<()>;

    /// Returns all entries of `log_id` in append order. An unknown stream
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream exists but cannot be read.
    fn lookup(&self, log_id: &str) -> Result<Vec<String>>;

    /// Discards every entry of `log_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be removed.
    fn cleanup(&self, log_id: &str) -> Result<()>;

    /// Lists every known log id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn log_ids(&self) -> Result<Vec<String>>;

    /// Returns the most recent entry of `log_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) for an
    /// unknown stream and [`StorageError::Empty`](crate::StorageError::Empty)
    /// for a stream without entries.
    fn last_log(&self, log_id: &str) -> Result<String>;

    /// Releases backend resources. Later calls fail with
    /// [`StorageError::Closed`](crate::StorageError::Closed).
    ///
    /// # Errors
    ///
    /// Returns an error if resources cannot be released.
    fn close(&self) -> Result<()>;
}

impl<T: LogStorage + ?Sized> LogStorage for Arc<T> {
    fn append_log(&self, log_id: &str, entry: &str) -> Result<()> {
        (**self).append_log(log_id, entry)
    }

    fn lookup(&self, log_id: &str) -> Result<Vec<String>> {
        (**self).lookup(log_id)
    }

    fn cleanup(&self, log_id: &str) -> Result<()> {
        (**self).cleanup(log_id)
    }

    fn log_ids(&self) -> Result<Vec<String>> {
        (**self).log_ids()
    }

    fn last_log(&self, log_id: &str) -> Result<String> {
        (**self).last_log(log_id)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<T: LogStorage + ?Sized> LogStorage for Box<T> {
    fn append_log(&self, log_id: &str, entry: &str) -> Result<()> {
        (**self).append_log(log_id, entry)
    }

    fn lookup(&self, log_id: &str) -> Result<Vec<String>> {
        (**self).lookup(log_id)
    }

    fn cleanup(&self, log_id: &str) -> Result<()> {
        (**self).cleanup(log_id)
    }

    fn log_ids(&self) -> Result<Vec<String>> {
        (**self).log_ids()
    }

    fn last_log(&self, log_id: &str) -> Result<String> {
        (**self).last_log(log_id)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
