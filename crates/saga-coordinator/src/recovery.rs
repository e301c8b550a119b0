//! Classification of persisted saga logs after a restart.

use saga_core::{LogEntry, LogKind};

use crate::error::ConfigError;

/// Where a persisted saga stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SagaStatus {
    /// The log ends with `SagaEnd`.
    Completed,
    /// The saga aborted and every started step was compensated.
    Aborted,
    /// Forward execution stopped before `SagaEnd` or `SagaAbort` was written.
    InFlight,
    /// The saga aborted but some compensations have not finished, either
    /// because the process stopped or because a compensation failed.
    Compensating,
}

impl SagaStatus {
    /// Whether the saga still has work left that [`resume`](crate::Coordinator::resume)
    /// would perform.
    #[must_use]
    pub fn needs_resume(self) -> bool {
        matches!(self, Self::InFlight | Self::Compensating)
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::InFlight => "in-flight",
            Self::Compensating => "compensating",
        })
    }
}

/// A log stream found by [`start_coordinator`](crate::Coordinator::start_coordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredSaga {
    pub log_id: String,
    pub saga_id: u64,
    pub last_entry: Option<LogEntry>,
    pub status: SagaStatus,
    /// `ActionStart` entries still to be compensated, in compensation order.
    pub pending_compensations: Vec<LogEntry>,
}

pub(crate) fn classify(log_id: &str, entries: &[LogEntry]) -> Result<SagaStatus, ConfigError> {
    if entries.last().is_some_and(|entry| entry.kind == LogKind::SagaEnd) {
        return Ok(SagaStatus::Completed);
    }
    if !entries.iter().any(|entry| entry.kind == LogKind::SagaAbort) {
        return Ok(SagaStatus::InFlight);
    }
    if pending_compensations(log_id, entries)?.is_empty() {
        Ok(SagaStatus::Aborted)
    } else {
        Ok(SagaStatus::Compensating)
    }
}

/// Returns the `ActionStart` entries that have no matching `CompensateEnd`,
/// latest first.
///
/// Compensations run in reverse start order, so each `CompensateEnd` closes
/// the most recent still-open `ActionStart`.
pub(crate) fn pending_compensations(
    log_id: &str,
    entries: &[LogEntry],
) -> Result<Vec<LogEntry>, ConfigError> {
    let mut open: Vec<&LogEntry> = entries
        .iter()
        .filter(|entry| entry.kind == LogKind::ActionStart)
        .collect();

    for finished in entries.iter().filter(|entry| entry.kind == LogKind::CompensateEnd) {
        let Some(started) = open.pop() else {
            return Err(corrupt(
                log_id,
                format!("compensation of '{}' has no matching action", finished.sub_tx()),
            ));
        };
        if started.sub_tx() != finished.sub_tx() {
            return Err(corrupt(
                log_id,
                format!(
                    "compensation of '{}' recorded where '{}' was expected",
                    finished.sub_tx(),
                    started.sub_tx()
                ),
            ));
        }
    }

    Ok(open.into_iter().rev().cloned().collect())
}

/// The last started step that never recorded `ActionEnd`.
pub(crate) fn interrupted_step(entries: &[LogEntry]) -> Option<String> {
    let last_start = entries
        .iter()
        .rposition(|entry| entry.kind == LogKind::ActionStart)?;
    let sub_tx_id = entries[last_start].sub_tx();
    let finished = entries[last_start..]
        .iter()
        .any(|entry| entry.kind == LogKind::ActionEnd && entry.sub_tx() == sub_tx_id);
    (!finished).then(|| sub_tx_id.to_string())
}

fn corrupt(log_id: &str, reason: String) -> ConfigError {
    ConfigError::CorruptLog {
        log_id: log_id.to_string(),
        reason,
    }
}
