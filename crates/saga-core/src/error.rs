use thiserror::Error;

/// Raised when an integer on the wire does not name a log entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown log entry kind {0} (expected 1..=7)")]
pub struct UnknownLogKind(pub u8);

/// Failure to encode or decode a log entry or one of its parameters.
///
/// A corrupted entry invalidates the replay guarantee of the whole stream,
/// so callers treat these as integrity failures rather than retrying.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogCodecError {
    #[error("failed to encode log entry")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode log entry '{data}'")]
    Decode {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode parameter of type '{param_type}'")]
    ParamEncode {
        param_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode parameter of type '{param_type}' from '{data}'")]
    ParamDecode {
        param_type: String,
        data: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, LogCodecError>;
