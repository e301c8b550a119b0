use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("log stream '{log_id}' not found")]
    NotFound { log_id: String },

    #[error("log stream '{log_id}' is empty")]
    Empty { log_id: String },

    #[error("storage is closed")]
    Closed,

    #[error("invalid log id '{log_id}': {reason}")]
    InvalidLogId { log_id: String, reason: &'static str },

    #[error("invalid entry for log stream '{log_id}': {reason}")]
    InvalidEntry { log_id: String, reason: &'static str },

    #[error("storage IO failed on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend unavailable for '{log_id}': {reason}")]
    Unavailable { log_id: String, reason: String },
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
