use saga_core::LogEntry;
use saga_storage::LogStorage;
use tracing::{debug, info, warn};

use crate::audit::SagaAuditLog;
use crate::coordinator::Coordinator;
use crate::error::{Result, SagaError};
use crate::param::SubTxArgs;

/// Lifecycle state of a [`Saga`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SagaState {
    /// Accepting sub-transactions.
    Running,
    /// An abort was started but storage failed before every started step
    /// was compensated. Call [`Saga::abort`] again or
    /// [`Coordinator::resume`] to finish it.
    Compensating,
    /// Every started step was compensated.
    Aborted,
    /// A compensation failed; the saga needs operator attention.
    CompensationFailed,
    /// `end_saga` was called.
    Ended,
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Compensating => "compensating",
            Self::Aborted => "aborted",
            Self::CompensationFailed => "compensation-failed",
            Self::Ended => "ended",
        })
    }
}

/// How a saga finished.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SagaOutcome<E> {
    /// All sub-transactions ran and `SagaEnd` was written.
    Completed,
    /// The saga aborted and all started steps were compensated.
    Aborted {
        /// The step whose action failed, or `None` for an explicit abort.
        failed_step: Option<String>,
        /// Business error reported by the failed step.
        cause: Option<E>,
    },
    /// A compensation failed and the remaining ones were not attempted.
    CompensationFailed { sub_tx_id: String, error: E },
}

impl<E> SagaOutcome<E> {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One running business transaction.
///
/// Every state change is appended to the saga's log stream before the saga
/// moves on. A business failure in a sub-transaction aborts the saga: every
/// step started so far, including the failed one, is compensated in reverse
/// start order. Later `sub_tx` calls are then skipped.
pub struct Saga<'c, Ctx, Err, S> {
    id: u64,
    log_id: String,
    context: Ctx,
    coordinator: &'c Coordinator<Ctx, Err, S>,
    state: SagaState,
    outcome: Option<SagaOutcome<Err>>,
    failed_step: Option<String>,
    cause: Option<Err>,
}

impl<'c, Ctx, Err, S> Saga<'c, Ctx, Err, S>
where
    Ctx: 'static,
    Err: std::fmt::Display + 'static,
    S: LogStorage,
{
    pub(crate) fn new(
        coordinator: &'c Coordinator<Ctx, Err, S>,
        id: u64,
        log_id: String,
        context: Ctx,
    ) -> Self {
        Self {
            id,
            log_id,
            context,
            coordinator,
            state: SagaState::Running,
            outcome: None,
            failed_step: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    #[must_use]
    pub fn context(&self) -> &Ctx {
        &self.context
    }

    #[must_use]
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Outcome of an abort, once the saga stopped running.
    #[must_use]
    pub fn outcome(&self) -> Option<&SagaOutcome<Err>> {
        self.outcome.as_ref()
    }

    /// Reads this saga's log back from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or an entry cannot be decoded.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        self.coordinator.read_log(&self.log_id)
    }

    /// Per-step view of the log.
    ///
    /// # Errors
    ///
    /// Same as [`entries`](Self::entries).
    pub fn audit(&self) -> Result<SagaAuditLog> {
        Ok(SagaAuditLog::from_entries(&self.entries()?))
    }

    /// Runs the sub-transaction registered as `sub_tx_id` with `args`.
    ///
    /// `ActionStart` with the marshaled arguments is logged before the action
    /// runs. On success `ActionEnd` follows; on a business failure the saga
    /// aborts. Once aborted, further calls are skipped.
    ///
    /// Arguments are matched by their Rust type, so type numeric literals
    /// (`100_i64`, not `100`) when the handler does not take `i32`.
    ///
    /// # Errors
    ///
    /// Returns an error if `sub_tx_id` is unknown, `args` do not match the
    /// registered signature or do not survive serialization (such as a
    /// non-finite float), storage fails, the saga has ended, or an abort is
    /// still unfinished.
    pub fn sub_tx<A: SubTxArgs>(&mut self, sub_tx_id: &str, args: A) -> Result<&mut Self> {
        match self.state {
            SagaState::Running => {}
            SagaState::Aborted | SagaState::CompensationFailed => {
                debug!(
                    log_id = %self.log_id,
                    sub_tx = sub_tx_id,
                    state = %self.state,
                    "saga is not running, skipping sub-transaction"
                );
                return Ok(self);
            }
            SagaState::Compensating | SagaState::Ended => {
                return Err(self.invalid_state("run a sub-transaction on"));
            }
        }

        let coordinator = self.coordinator;
        let definition = coordinator.definition(sub_tx_id)?;
        let params = coordinator.params().marshal(&args)?;
        definition.check_params(&params)?;
        coordinator.params().unmarshal::<A>(&params)?;

        coordinator.append(&self.log_id, &LogEntry::action_start(sub_tx_id, params.clone()))?;
        match definition.invoke_action(&self.context, &params, coordinator.params())? {
            Ok(()) => {
                coordinator.append(&self.log_id, &LogEntry::action_end(sub_tx_id))?;
            }
            Err(cause) => {
                warn!(
                    log_id = %self.log_id,
                    sub_tx = sub_tx_id,
                    error = %cause,
                    "sub-transaction failed, aborting saga"
                );
                self.run_abort(Some(sub_tx_id.to_string()), Some(cause))?;
            }
        }
        Ok(self)
    }

    /// Aborts the saga and compensates every started step.
    ///
    /// Does nothing if the saga already aborted. A saga left
    /// [`Compensating`](SagaState::Compensating) by a storage failure picks
    /// up the steps that are still uncompensated.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails, a logged step is no longer
    /// registered, or the saga has ended. The saga then stays
    /// `Compensating`.
    pub fn abort(&mut self) -> Result<&mut Self> {
        match self.state {
            SagaState::Running => self.run_abort(None, None)?,
            SagaState::Compensating => self.roll_back()?,
            SagaState::Aborted | SagaState::CompensationFailed => {}
            SagaState::Ended => return Err(self.invalid_state("abort")),
        }
        Ok(self)
    }

    /// Finishes the saga.
    ///
    /// A running saga writes `SagaEnd` and, if configured, removes its log.
    /// An aborted saga writes no `SagaEnd` and keeps its log, so recovery
    /// still classifies it by its `SagaAbort` and compensation records; its
    /// abort outcome is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails, the saga has already ended, or it
    /// is still [`Compensating`](SagaState::Compensating).
    pub fn end_saga(&mut self) -> Result<SagaOutcome<Err>> {
        let outcome = match self.state {
            SagaState::Running => {
                let coordinator = self.coordinator;
                coordinator.append(&self.log_id, &LogEntry::saga_end())?;
                if coordinator.config().cleanup_on_success() {
                    coordinator.cleanup(&self.log_id)?;
                }
                info!(log_id = %self.log_id, "saga completed");
                SagaOutcome::Completed
            }
            SagaState::Aborted | SagaState::CompensationFailed => {
                self.outcome.take().unwrap_or(SagaOutcome::Aborted {
                    failed_step: None,
                    cause: None,
                })
            }
            SagaState::Compensating | SagaState::Ended => return Err(self.invalid_state("end")),
        };
        self.state = SagaState::Ended;
        Ok(outcome)
    }

    fn run_abort(&mut self, failed_step: Option<String>, cause: Option<Err>) -> Result<()> {
        self.state = SagaState::Compensating;
        self.failed_step = failed_step;
        self.cause = cause;
        self.roll_back()
    }

    fn roll_back(&mut self) -> Result<()> {
        let coordinator = self.coordinator;
        let entries = coordinator.read_log(&self.log_id)?;
        if let Some((sub_tx_id, error)) =
            coordinator.roll_back(&self.context, &self.log_id, &entries)?
        {
            self.state = SagaState::CompensationFailed;
            self.outcome = Some(SagaOutcome::CompensationFailed { sub_tx_id, error });
            return Ok(());
        }

        info!(
            log_id = %self.log_id,
            failed_step = ?self.failed_step,
            "saga aborted and compensated"
        );
        self.state = SagaState::Aborted;
        self.outcome = Some(SagaOutcome::Aborted {
            failed_step: self.failed_step.take(),
            cause: self.cause.take(),
        });
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> SagaError {
        SagaError::InvalidState {
            log_id: self.log_id.clone(),
            state: self.state,
            operation,
        }
    }
}

impl<Ctx, Err, S> std::fmt::Debug for Saga<'_, Ctx, Err, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("id", &self.id)
            .field("log_id", &self.log_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
