//! Coordinator behavior when the log storage fails underneath a saga.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use saga_coordinator::{
    Coordinator, CoordinatorConfig, LogEntry, LogKind, LogStorage, MemoryStorage, SagaError,
    SagaOutcome, SagaState, StorageError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Append(LogKind),
    Lookup,
}

#[derive(Debug)]
struct Fault {
    target: Target,
    transient: bool,
    remaining: usize,
}

/// Memory storage that fails selected calls a fixed number of times.
#[derive(Debug, Default)]
struct FaultyStorage {
    inner: MemoryStorage,
    faults: Mutex<Vec<Fault>>,
    injected: AtomicUsize,
}

impl FaultyStorage {
    fn failing(faults: Vec<Fault>) -> Self {
        Self {
            faults: Mutex::new(faults),
            ..Self::default()
        }
    }

    fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn trip(&self, target: Target, log_id: &str) -> Result<(), StorageError> {
        let mut faults = self.faults.lock().expect("faults lock");
        let Some(fault) = faults
            .iter_mut()
            .find(|fault| fault.target == target && fault.remaining > 0)
        else {
            return Ok(());
        };
        fault.remaining -= 1;
        self.injected.fetch_add(1, Ordering::SeqCst);
        if fault.transient {
            Err(StorageError::Unavailable {
                log_id: log_id.to_string(),
                reason: "replica is catching up".to_string(),
            })
        } else {
            Err(StorageError::Closed)
        }
    }
}

impl LogStorage for FaultyStorage {
    fn append_log(&self, log_id: &str, entry: &str) -> Result<(), StorageError> {
        if let Ok(decoded) = LogEntry::decode(entry) {
            self.trip(Target::Append(decoded.kind), log_id)?;
        }
        self.inner.append_log(log_id, entry)
    }

    fn lookup(&self, log_id: &str) -> Result<Vec<String>, StorageError> {
        self.trip(Target::Lookup, log_id)?;
        self.inner.lookup(log_id)
    }

    fn cleanup(&self, log_id: &str) -> Result<(), StorageError> {
        self.inner.cleanup(log_id)
    }

    fn log_ids(&self) -> Result<Vec<String>, StorageError> {
        self.inner.log_ids()
    }

    fn last_log(&self, log_id: &str) -> Result<String, StorageError> {
        self.inner.last_log(log_id)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.inner.close()
    }
}

fn transient(target: Target, times: usize) -> Fault {
    Fault {
        target,
        transient: true,
        remaining: times,
    }
}

fn permanent(target: Target) -> Fault {
    Fault {
        target,
        transient: false,
        remaining: 1,
    }
}

#[derive(Debug, Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn record(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
enum ShipmentError {
    #[error("carrier rejected '{0}'")]
    Rejected(String),
}

type ShipmentCoordinator = Coordinator<Arc<Journal>, ShipmentError, FaultyStorage>;

fn book(journal: &Arc<Journal>, (parcel,): (String,)) -> Result<(), ShipmentError> {
    if parcel == "oversized" {
        return Err(ShipmentError::Rejected(parcel));
    }
    journal.record(format!("book {parcel}"));
    Ok(())
}

fn cancel(journal: &Arc<Journal>, (parcel,): (String,)) -> Result<(), ShipmentError> {
    journal.record(format!("cancel {parcel}"));
    Ok(())
}

fn coordinator(storage: FaultyStorage, retries: u32) -> anyhow::Result<ShipmentCoordinator> {
    let mut coordinator = Coordinator::with_config(
        storage,
        CoordinatorConfig::default().with_append_retries(retries, Duration::ZERO),
    );
    coordinator
        .add_sub_tx_def("pickup", book, cancel)?
        .add_sub_tx_def("delivery", book, cancel)?;
    Ok(coordinator)
}

fn kinds(coordinator: &ShipmentCoordinator, log_id: &str) -> anyhow::Result<Vec<LogKind>> {
    coordinator
        .storage()
        .inner
        .lookup(log_id)?
        .iter()
        .map(|line| -> anyhow::Result<LogKind> { Ok(LogEntry::decode(line)?.kind) })
        .collect()
}

#[test]
fn transient_failures_are_retried_until_the_saga_completes() -> anyhow::Result<()> {
    let storage = FaultyStorage::failing(vec![
        transient(Target::Lookup, 1),
        transient(Target::Append(LogKind::ActionStart), 2),
        transient(Target::Append(LogKind::SagaEnd), 1),
    ]);
    let coordinator = coordinator(storage, 2)?;
    let journal = Arc::new(Journal::default());

    let mut saga = coordinator.start_saga(Arc::clone(&journal), 1)?;
    saga.sub_tx("pickup", ("p-1".to_string(),))?
        .sub_tx("delivery", ("p-1".to_string(),))?;
    let outcome = saga.end_saga()?;

    assert_eq!(outcome, SagaOutcome::Completed);
    assert_eq!(coordinator.storage().injected(), 4);
    assert_eq!(
        kinds(&coordinator, "saga_1")?,
        vec![
            LogKind::SagaStart,
            LogKind::ActionStart,
            LogKind::ActionEnd,
            LogKind::ActionStart,
            LogKind::ActionEnd,
            LogKind::SagaEnd,
        ]
    );
    assert_eq!(journal.events(), vec!["book p-1", "book p-1"]);
    Ok(())
}

#[test]
fn transient_failures_beyond_the_retry_budget_surface() -> anyhow::Result<()> {
    let storage = FaultyStorage::failing(vec![transient(Target::Append(LogKind::ActionStart), 5)]);
    let coordinator = coordinator(storage, 2)?;
    let journal = Arc::new(Journal::default());
    let mut saga = coordinator.start_saga(Arc::clone(&journal), 1)?;

    let err = saga.sub_tx("pickup", ("p-1".to_string(),)).expect_err("retries exhausted");

    assert!(matches!(
        err,
        SagaError::Storage {
            source: StorageError::Unavailable { .. },
            ..
        }
    ));
    assert_eq!(coordinator.storage().injected(), 3);
    assert!(journal.events().is_empty());
    Ok(())
}

#[test]
fn permanent_failures_are_not_retried() -> anyhow::Result<()> {
    let storage = FaultyStorage::failing(vec![permanent(Target::Append(LogKind::ActionEnd))]);
    let coordinator = coordinator(storage, 3)?;
    let mut saga = coordinator.start_saga(Arc::new(Journal::default()), 1)?;

    let err = saga.sub_tx("pickup", ("p-1".to_string(),)).expect_err("storage closed");

    assert!(matches!(
        err,
        SagaError::Storage {
            source: StorageError::Closed,
            ref log_id,
        } if log_id == "saga_1"
    ));
    assert_eq!(coordinator.storage().injected(), 1);
    Ok(())
}

#[test]
fn storage_failure_during_abort_keeps_the_saga_compensating() -> anyhow::Result<()> {
    let storage = FaultyStorage::failing(vec![permanent(Target::Append(LogKind::CompensateStart))]);
    let coordinator = coordinator(storage, 0)?;
    let journal = Arc::new(Journal::default());
    let mut saga = coordinator.start_saga(Arc::clone(&journal), 1)?;
    saga.sub_tx("pickup", ("p-1".to_string(),))?;

    let err = saga
        .sub_tx("delivery", ("oversized".to_string(),))
        .expect_err("compensation could not be logged");

    assert!(matches!(
        err,
        SagaError::Storage {
            source: StorageError::Closed,
            ..
        }
    ));
    assert_eq!(saga.state(), SagaState::Compensating);
    assert!(saga.outcome().is_none());
    assert_eq!(journal.events(), vec!["book p-1"]);
    assert!(matches!(
        saga.end_saga(),
        Err(SagaError::InvalidState {
            state: SagaState::Compensating,
            ..
        })
    ));
    assert!(matches!(
        saga.sub_tx("pickup", ("p-2".to_string(),)),
        Err(SagaError::InvalidState { .. })
    ));

    saga.abort()?;

    assert_eq!(saga.state(), SagaState::Aborted);
    assert_eq!(journal.events(), vec!["book p-1", "cancel oversized", "cancel p-1"]);
    assert_eq!(
        kinds(&coordinator, "saga_1")?,
        vec![
            LogKind::SagaStart,
            LogKind::ActionStart,
            LogKind::ActionEnd,
            LogKind::ActionStart,
            LogKind::SagaAbort,
            LogKind::CompensateStart,
            LogKind::CompensateEnd,
            LogKind::CompensateStart,
            LogKind::CompensateEnd,
        ]
    );
    assert_eq!(
        saga.end_saga()?,
        SagaOutcome::Aborted {
            failed_step: Some("delivery".to_string()),
            cause: Some(ShipmentError::Rejected("oversized".to_string())),
        }
    );
    Ok(())
}

#[test]
fn interrupted_abort_can_be_finished_by_resume() -> anyhow::Result<()> {
    let storage = FaultyStorage::failing(vec![permanent(Target::Append(LogKind::CompensateStart))]);
    let coordinator = coordinator(storage, 0)?;
    let journal = Arc::new(Journal::default());
    let mut saga = coordinator.start_saga(Arc::clone(&journal), 1)?;
    saga.sub_tx("pickup", ("p-1".to_string(),))?;
    assert!(saga.sub_tx("delivery", ("oversized".to_string(),)).is_err());

    let outcome = coordinator.resume(&journal, "saga_1")?;

    assert_eq!(
        outcome,
        SagaOutcome::Aborted {
            failed_step: Some("delivery".to_string()),
            cause: None,
        }
    );
    assert_eq!(journal.events(), vec!["book p-1", "cancel oversized", "cancel p-1"]);
    let log = kinds(&coordinator, "saga_1")?;
    assert_eq!(log.iter().filter(|kind| **kind == LogKind::SagaAbort).count(), 1);
    assert_eq!(log.last(), Some(&LogKind::CompensateEnd));
    Ok(())
}
