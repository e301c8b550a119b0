use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogCodecError, Result, UnknownLogKind};

/// Kind of a saga log entry.
///
/// Serialized as its integer discriminant so that streams written by other
/// coordinators stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LogKind {
    SagaStart = 1,
    SagaEnd = 2,
    SagaAbort = 3,
    ActionStart = 4,
    ActionEnd = 5,
    CompensateStart = 6,
    CompensateEnd = 7,
}

impl LogKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SagaStart => "saga-start",
            Self::SagaEnd => "saga-end",
            Self::SagaAbort => "saga-abort",
            Self::ActionStart => "action-start",
            Self::ActionEnd => "action-end",
            Self::CompensateStart => "compensate-start",
            Self::CompensateEnd => "compensate-end",
        }
    }

    /// Whether entries of this kind belong to a sub-transaction.
    #[must_use]
    pub fn is_sub_tx(self) -> bool {
        matches!(
            self,
            Self::ActionStart | Self::ActionEnd | Self::CompensateStart | Self::CompensateEnd
        )
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogKind> for u8 {
    fn from(kind: LogKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for LogKind {
    type Error = UnknownLogKind;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::SagaStart),
            2 => Ok(Self::SagaEnd),
            3 => Ok(Self::SagaAbort),
            4 => Ok(Self::ActionStart),
            5 => Ok(Self::ActionEnd),
            6 => Ok(Self::CompensateStart),
            7 => Ok(Self::CompensateEnd),
            other => Err(UnknownLogKind(other)),
        }
    }
}

/// One marshaled call argument.
///
/// `data` holds the JSON text of the value and `param_type` the stable tag the
/// value's type was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamData {
    #[serde(rename = "paramType")]
    pub param_type: String,
    pub data: String,
}

impl ParamData {
    #[must_use]
    pub fn new(param_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            data: data.into(),
        }
    }
}

/// An immutable record of one saga state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(rename = "subTxID", default, skip_serializing_if = "Option::is_none")]
    pub sub_tx_id: Option<String>,
    #[serde(default)]
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamData>,
}

impl LogEntry {
    fn now(kind: LogKind, sub_tx_id: Option<String>, params: Vec<ParamData>) -> Self {
        Self {
            kind,
            sub_tx_id,
            time: Utc::now(),
            params,
        }
    }

    #[must_use]
    pub fn saga_start() -> Self {
        Self::now(LogKind::SagaStart, None, Vec::new())
    }

    #[must_use]
    pub fn saga_end() -> Self {
        Self::now(LogKind::SagaEnd, None, Vec::new())
    }

    #[must_use]
    pub fn saga_abort() -> Self {
        Self::now(LogKind::SagaAbort, None, Vec::new())
    }

    /// Entry written before an action runs. Carries the marshaled arguments
    /// that the compensation is later replayed with.
    #[must_use]
    pub fn action_start(sub_tx_id: impl Into<String>, params: Vec<ParamData>) -> Self {
        Self::now(LogKind::ActionStart, Some(sub_tx_id.into()), params)
    }

    #[must_use]
    pub fn action_end(sub_tx_id: impl Into<String>) -> Self {
        Self::now(LogKind::ActionEnd, Some(sub_tx_id.into()), Vec::new())
    }

    #[must_use]
    pub fn compensate_start(sub_tx_id: impl Into<String>) -> Self {
        Self::now(LogKind::CompensateStart, Some(sub_tx_id.into()), Vec::new())
    }

    #[must_use]
    pub fn compensate_end(sub_tx_id: impl Into<String>) -> Self {
        Self::now(LogKind::CompensateEnd, Some(sub_tx_id.into()), Vec::new())
    }

    /// Sub-transaction id, or the empty string for saga-level entries.
    #[must_use]
    pub fn sub_tx(&self) -> &str {
        self.sub_tx_id.as_deref().unwrap_or_default()
    }

    /// Encodes the entry into its compact JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`LogCodecError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(LogCodecError::Encode)
    }

    /// Decodes an entry from its wire form. Unknown fields are ignored and
    /// missing optional fields take their default.
    ///
    /// # Errors
    ///
    /// Returns [`LogCodecError::Decode`] if `data` is not a valid entry.
    pub fn decode(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|source| LogCodecError::Decode {
            data: data.to_string(),
            source,
        })
    }
}
