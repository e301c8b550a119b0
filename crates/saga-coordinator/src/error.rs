use std::path::PathBuf;

use saga_core::LogCodecError;
use saga_storage::StorageError;
use thiserror::Error;

use crate::saga::SagaState;

/// Configuration and integrity errors.
///
/// These point at a deployment or programming defect (a sub-transaction that
/// was never registered, an argument type without a tag, a corrupted log) and
/// are never retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("sub-transaction id must not be empty")]
    EmptySubTxId,

    #[error("sub-transaction '{sub_tx_id}' is not registered")]
    UnknownSubTx { sub_tx_id: String },

    #[error("parameter type '{rust_type}' is not registered")]
    UnregisteredParam { rust_type: &'static str },

    #[error("parameter type name '{param_type}' is not registered")]
    UnknownParamType { param_type: String },

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("argument {position} has type '{actual}', expected '{expected}'")]
    ArgumentMismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("log stream '{log_id}' is corrupted: {reason}")]
    CorruptLog { log_id: String, reason: String },

    #[error("log id '{log_id}' does not belong to this coordinator (prefix '{prefix}')")]
    ForeignLogId { log_id: String, prefix: String },

    #[error(transparent)]
    Codec(#[from] LogCodecError),
}

/// Errors that stop a saga operation.
///
/// Business failures reported by actions or compensations are not errors at
/// this level: they drive the abort path and surface through
/// [`SagaOutcome`](crate::SagaOutcome).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage failed for log stream '{log_id}'")]
    Storage {
        log_id: String,
        #[source]
        source: StorageError,
    },

    #[error("log stream '{log_id}' already exists")]
    DuplicateLogId { log_id: String },

    #[error("cannot {operation} saga '{log_id}' in state {state}")]
    InvalidState {
        log_id: String,
        state: SagaState,
        operation: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SagaError>;

/// Failure to load a [`CoordinatorConfig`](crate::CoordinatorConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigLoadError {
    #[error("failed to read coordinator config '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse coordinator config '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sub_tx_names_the_id() {
        let err = ConfigError::UnknownSubTx {
            sub_tx_id: "deposit".to_string(),
        };

        assert!(err.to_string().contains("'deposit'"));
    }

    #[test]
    fn config_error_converts_into_saga_error() {
        let err: SagaError = ConfigError::EmptySubTxId.into();

        assert!(matches!(err, SagaError::Config(ConfigError::EmptySubTxId)));
    }

    #[test]
    fn storage_error_keeps_source_chain() {
        let err = SagaError::Storage {
            log_id: "saga_1".to_string(),
            source: StorageError::Closed,
        };

        let source = std::error::Error::source(&err).expect("storage error has a source");

        assert!(err.to_string().contains("saga_1"));
        assert_eq!(source.to_string(), "storage is closed");
    }

    #[test]
    fn invalid_state_mentions_operation_and_state() {
        let err = SagaError::InvalidState {
            log_id: "saga_1".to_string(),
            state: SagaState::Ended,
            operation: "end",
        };

        let msg = err.to_string();

        assert!(msg.contains("end"));
        assert!(msg.contains("ended"));
    }
}
