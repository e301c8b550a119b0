use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use saga_core::{IdGenerator, LogEntry, LogKind};
use saga_storage::{LogStorage, RetryPolicy, StorageError};
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::definition::{DefinitionStore, FnSubTx, SubTransaction, SubTxDefinition};
use crate::erased::{ErasedSubTx, SubTxWrapper};
use crate::error::{ConfigError, Result, SagaError};
use crate::param::{ParamRegistry, SubTxArgs};
use crate::recovery::{self, RecoveredSaga, SagaStatus};
use crate::saga::{Saga, SagaOutcome, SagaState};

/// Owns the registered sub-transactions and the log storage, and starts
/// sagas against them.
///
/// Register every sub-transaction before the first saga starts; sagas borrow
/// the coordinator, so registration and execution cannot overlap. A
/// coordinator is `Sync` when its storage is, and sagas on different threads
/// may share one.
///
/// # Type Parameters
///
/// - `Ctx`: Coordination context handed to every handler
/// - `Err`: Business error type of the handlers
/// - `S`: Log storage backend
pub struct Coordinator<Ctx, Err, S> {
    definitions: DefinitionStore<Ctx, Err>,
    params: ParamRegistry,
    storage: S,
    config: CoordinatorConfig,
    retry: RetryPolicy,
    ids: IdGenerator,
    start_lock: Mutex<()>,
}

impl<Ctx, Err, S> Coordinator<Ctx, Err, S>
where
    Ctx: 'static,
    Err: std::fmt::Display + 'static,
    S: LogStorage,
{
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, CoordinatorConfig::default())
    }

    #[must_use]
    pub fn with_config(storage: S, config: CoordinatorConfig) -> Self {
        Self {
            definitions: DefinitionStore::new(),
            params: ParamRegistry::new(),
            storage,
            retry: config.retry_policy(),
            ids: IdGenerator::new(config.member_id(), Utc::now()),
            start_lock: Mutex::new(()),
            config,
        }
    }

    /// Registers a sub-transaction and its argument types.
    ///
    /// Registering an id again replaces the earlier definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySubTxId`] if the id is empty.
    pub fn add_sub_tx<T>(&mut self, sub_tx: T) -> std::result::Result<&mut Self, ConfigError>
    where
        T: SubTransaction<Context = Ctx, Error = Err>,
    {
        let definition = self.definitions.add(Box::new(SubTxWrapper::new(sub_tx)))?;
        definition.register_params(&mut self.params);
        debug!(
            sub_tx = definition.id(),
            params = ?definition.describe(),
            "registered sub-transaction"
        );
        Ok(self)
    }

    /// Registers a sub-transaction from an action and a compensation that
    /// both take the context first and the same argument tuple second.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySubTxId`] if `id` is empty.
    pub fn add_sub_tx_def<A, F, G>(
        &mut self,
        id: impl Into<String>,
        action: F,
        compensate: G,
    ) -> std::result::Result<&mut Self, ConfigError>
    where
        A: SubTxArgs,
        F: Fn(&Ctx, A) -> std::result::Result<(), Err> + Send + Sync + 'static,
        G: Fn(&Ctx, A) -> std::result::Result<(), Err> + Send + Sync + 'static,
    {
        self.add_sub_tx(FnSubTx::new(id, action, compensate))
    }

    #[must_use]
    pub fn find_definition(&self, sub_tx_id: &str) -> Option<SubTxDefinition> {
        self.definitions.find(sub_tx_id).map(|definition| SubTxDefinition {
            id: definition.id().to_string(),
            params: definition.describe(),
            compensation_description: definition.compensation_description(),
        })
    }

    /// Registered sub-transaction ids in registration order.
    pub fn sub_tx_ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.ids()
    }

    #[must_use]
    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub fn log_id_for(&self, saga_id: u64) -> String {
        format!("{}{saga_id}", self.config.log_prefix())
    }

    /// A fresh saga id from this coordinator's generator.
    pub fn next_saga_id(&self) -> u64 {
        self.ids.next()
    }

    /// Starts a saga logged under `log-prefix + saga_id`.
    ///
    /// `SagaStart` is durable before this returns. The duplicate check and the
    /// `SagaStart` append happen under one lock, so concurrent starts through
    /// this coordinator cannot share a stream. Other processes writing to the
    /// same storage are not covered.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::DuplicateLogId`] if the stream already has
    /// entries, or a storage error if the start could not be logged.
    pub fn start_saga(&self, context: Ctx, saga_id: u64) -> Result<Saga<'_, Ctx, Err, S>> {
        let log_id = self.log_id_for(saga_id);
        let guard = self.start_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = self
            .retry
            .run(&log_id, || self.storage.lookup(&log_id))
            .map_err(|source| storage_error(&log_id, source))?;
        if !existing.is_empty() {
            return Err(SagaError::DuplicateLogId { log_id });
        }

        self.append(&log_id, &LogEntry::saga_start())?;
        drop(guard);
        info!(log_id = %log_id, saga_id, "saga started");
        Ok(Saga::new(self, saga_id, log_id, context))
    }

    /// Lists every saga log stream owned by this coordinator and classifies
    /// where each one stopped. Nothing is executed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or a log is corrupted.
    pub fn start_coordinator(&self) -> Result<Vec<RecoveredSaga>> {
        let prefix = self.config.log_prefix();
        let log_ids = self
            .retry
            .run(prefix, || self.storage.log_ids())
            .map_err(|source| storage_error(prefix, source))?;

        let mut recovered = Vec::new();
        for log_id in log_ids {
            let Some(suffix) = log_id.strip_prefix(prefix) else {
                continue;
            };
            let Ok(saga_id) = suffix.parse::<u64>() else {
                warn!(log_id = %log_id, "skipping log stream without a numeric saga id");
                continue;
            };

            let last_entry = match self.retry.run(&log_id, || self.storage.last_log(&log_id)) {
                Ok(line) => Some(LogEntry::decode(&line).map_err(ConfigError::from)?),
                Err(StorageError::NotFound { .. } | StorageError::Empty { .. }) => None,
                Err(source) => return Err(storage_error(&log_id, source)),
            };
            let entries = self.read_log(&log_id)?;
            let status = recovery::classify(&log_id, &entries)?;
            let pending_compensations = if status.needs_resume() {
                recovery::pending_compensations(&log_id, &entries)?
            } else {
                Vec::new()
            };

            info!(
                log_id = %log_id,
                %status,
                pending = pending_compensations.len(),
                "found saga log"
            );
            recovered.push(RecoveredSaga {
                log_id,
                saga_id,
                last_entry,
                status,
                pending_compensations,
            });
        }
        Ok(recovered)
    }

    /// Finishes an interrupted saga by aborting it.
    ///
    /// Appends `SagaAbort` if the log has none yet, then compensates, latest
    /// first, every started step that has no `CompensateEnd`. Aborted logs
    /// with nothing pending are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::InvalidState`] for a completed saga,
    /// [`ConfigError::ForeignLogId`] for a stream outside this coordinator's
    /// prefix, or an error if storage fails or the log is corrupted.
    pub fn resume(&self, context: &Ctx, log_id: &str) -> Result<SagaOutcome<Err>> {
        let prefix = self.config.log_prefix();
        if log_id
            .strip_prefix(prefix)
            .is_none_or(|suffix| suffix.parse::<u64>().is_err())
        {
            return Err(ConfigError::ForeignLogId {
                log_id: log_id.to_string(),
                prefix: prefix.to_string(),
            }
            .into());
        }

        let entries = self.read_log(log_id)?;
        if entries.is_empty() {
            return Err(storage_error(
                log_id,
                StorageError::NotFound {
                    log_id: log_id.to_string(),
                },
            ));
        }
        if recovery::classify(log_id, &entries)? == SagaStatus::Completed {
            return Err(SagaError::InvalidState {
                log_id: log_id.to_string(),
                state: SagaState::Ended,
                operation: "resume",
            });
        }

        info!(log_id, "resuming saga compensation");
        if let Some((sub_tx_id, error)) = self.roll_back(context, log_id, &entries)? {
            return Ok(SagaOutcome::CompensationFailed { sub_tx_id, error });
        }

        Ok(SagaOutcome::Aborted {
            failed_step: recovery::interrupted_step(&entries),
            cause: None,
        })
    }

    /// Resumes every saga that [`start_coordinator`](Self::start_coordinator)
    /// reports as unfinished, building each context with `make_context`.
    ///
    /// # Errors
    ///
    /// Stops at the first saga that cannot be resumed.
    pub fn recover<F>(&self, mut make_context: F) -> Result<Vec<(String, SagaOutcome<Err>)>>
    where
        F: FnMut(&RecoveredSaga) -> Ctx,
    {
        let mut resumed = Vec::new();
        for saga in self.start_coordinator()? {
            if !saga.status.needs_resume() {
                continue;
            }
            let context = make_context(&saga);
            let outcome = self.resume(&context, &saga.log_id)?;
            resumed.push((saga.log_id, outcome));
        }
        Ok(resumed)
    }

    /// Appends `SagaAbort` if `entries` have none yet, then compensates,
    /// latest first, every started step without a `CompensateEnd`.
    ///
    /// Returns the first step whose compensation failed; the steps before it
    /// in start order are left for a later attempt. Every pending step must
    /// still be registered before anything is written.
    pub(crate) fn roll_back(
        &self,
        context: &Ctx,
        log_id: &str,
        entries: &[LogEntry],
    ) -> Result<Option<(String, Err)>> {
        let pending = recovery::pending_compensations(log_id, entries)?;
        for entry in &pending {
            self.definition(entry.sub_tx())?;
        }
        if !entries.iter().any(|entry| entry.kind == LogKind::SagaAbort) {
            self.append(log_id, &LogEntry::saga_abort())?;
        }
        debug!(log_id, pending = pending.len(), "compensating started steps");

        for entry in &pending {
            if let Err(error) = self.compensate(context, log_id, entry)? {
                error!(
                    log_id,
                    sub_tx = entry.sub_tx(),
                    error = %error,
                    "compensation failed, saga needs manual intervention"
                );
                return Ok(Some((entry.sub_tx().to_string(), error)));
            }
        }
        Ok(None)
    }

    pub(crate) fn definition(
        &self,
        sub_tx_id: &str,
    ) -> std::result::Result<&dyn ErasedSubTx<Ctx, Err>, ConfigError> {
        self.definitions
            .find(sub_tx_id)
            .ok_or_else(|| ConfigError::UnknownSubTx {
                sub_tx_id: sub_tx_id.to_string(),
            })
    }

    pub(crate) fn append(&self, log_id: &str, entry: &LogEntry) -> Result<()> {
        let line = entry.encode().map_err(ConfigError::from)?;
        self.retry
            .run(log_id, || self.storage.append_log(log_id, &line))
            .map_err(|source| storage_error(log_id, source))?;
        debug!(log_id, kind = %entry.kind, sub_tx = entry.sub_tx(), "appended saga log entry");
        Ok(())
    }

    pub(crate) fn read_log(&self, log_id: &str) -> Result<Vec<LogEntry>> {
        let lines = self
            .retry
            .run(log_id, || self.storage.lookup(log_id))
            .map_err(|source| storage_error(log_id, source))?;
        let entries = lines
            .iter()
            .map(|line| LogEntry::decode(line))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ConfigError::from)?;
        Ok(entries)
    }

    pub(crate) fn cleanup(&self, log_id: &str) -> Result<()> {
        self.retry
            .run(log_id, || self.storage.cleanup(log_id))
            .map_err(|source| storage_error(log_id, source))?;
        debug!(log_id, "removed saga log");
        Ok(())
    }

    /// Compensates the step logged as `entry`. `CompensateEnd` is only
    /// written when the compensation succeeds.
    pub(crate) fn compensate(
        &self,
        context: &Ctx,
        log_id: &str,
        entry: &LogEntry,
    ) -> Result<std::result::Result<(), Err>> {
        let sub_tx_id = entry.sub_tx();
        let definition = self.definition(sub_tx_id)?;
        self.append(log_id, &LogEntry::compensate_start(sub_tx_id))?;
        debug!(
            log_id,
            sub_tx = sub_tx_id,
            description = %definition.compensation_description(),
            "compensating"
        );

        let outcome = definition.invoke_compensation(context, &entry.params, &self.params)?;
        if outcome.is_ok() {
            self.append(log_id, &LogEntry::compensate_end(sub_tx_id))?;
        }
        Ok(outcome)
    }
}

impl<Ctx, Err, S: std::fmt::Debug> std::fmt::Debug for Coordinator<Ctx, Err, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sub_txs", &self.definitions.ids().collect::<Vec<_>>())
            .field("storage", &self.storage)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn storage_error(log_id: &str, source: StorageError) -> SagaError {
    SagaError::Storage {
        log_id: log_id.to_string(),
        source,
    }
}
