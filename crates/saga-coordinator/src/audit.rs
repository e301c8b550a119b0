use chrono::{DateTime, Utc};
use saga_core::{LogEntry, LogKind};

/// Status of a sub-transaction as reconstructed from the saga log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Action started but neither finished nor compensated.
    Started,
    /// Action finished successfully.
    Executed,
    /// Action started, then the saga aborted before it finished.
    Failed,
    /// Compensation started but did not finish.
    Compensating,
    /// Compensation finished.
    Compensated,
}

/// One sub-transaction invocation in the saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub sub_tx_id: String,
    pub status: StepStatus,
    /// Time of the `ActionStart` entry.
    pub started_at: DateTime<Utc>,
    /// Time of the last entry that changed the status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-step view of a saga log.
#[derive(Debug, Default)]
pub struct SagaAuditLog {
    records: Vec<StepRecord>,
}

impl SagaAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `entries` into step records, in start order.
    #[must_use]
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let mut log = Self::new();
        // indices of records whose compensation has not been seen yet
        let mut open: Vec<usize> = Vec::new();

        for entry in entries {
            match entry.kind {
                LogKind::ActionStart => {
                    open.push(log.records.len());
                    log.records.push(StepRecord {
                        sub_tx_id: entry.sub_tx().to_string(),
                        status: StepStatus::Started,
                        started_at: entry.time,
                        completed_at: None,
                    });
                }
                LogKind::ActionEnd => {
                    if let Some(record) = log.last_open(&open, entry.sub_tx()) {
                        record.status = StepStatus::Executed;
                        record.completed_at = Some(entry.time);
                    }
                }
                LogKind::SagaAbort => {
                    for &index in &open {
                        let record = &mut log.records[index];
                        if record.status == StepStatus::Started {
                            record.status = StepStatus::Failed;
                            record.completed_at = Some(entry.time);
                        }
                    }
                }
                LogKind::CompensateStart => {
                    if let Some(&index) = open.last() {
                        log.records[index].status = StepStatus::Compensating;
                    }
                }
                LogKind::CompensateEnd => {
                    if let Some(index) = open.pop() {
                        let record = &mut log.records[index];
                        record.status = StepStatus::Compensated;
                        record.completed_at = Some(entry.time);
                    }
                }
                LogKind::SagaStart | LogKind::SagaEnd => {}
            }
        }
        log
    }

    fn last_open(&mut self, open: &[usize], sub_tx_id: &str) -> Option<&mut StepRecord> {
        let index = open
            .iter()
            .rev()
            .copied()
            .find(|&index| self.records[index].sub_tx_id == sub_tx_id)?;
        self.records.get_mut(index)
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// One line per step, for operator output.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Started => "…",
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensating => "⚠",
                StepStatus::Compensated => "↩",
            };
            lines.push(format!("{status} {}", record.sub_tx_id));
        }
        lines.join("\n")
    }
}
