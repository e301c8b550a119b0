//! Saga coordination for distributed business transactions.
//!
//! A saga is an ordered sequence of sub-transactions, each paired with a
//! compensation. The [`Coordinator`] holds the registered sub-transactions
//! and a [`LogStorage`] handle; every [`Saga`] it starts logs each state
//! change before acting on it. When a sub-transaction fails, the saga replays
//! its own log in reverse and compensates every step it started, using the
//! arguments persisted with each `ActionStart` entry. The same log lets
//! [`Coordinator::resume`] finish the compensation after a restart.
//!
//! ```
//! use saga_coordinator::{Coordinator, MemoryStorage, SagaOutcome};
//!
//! let mut coordinator: Coordinator<(), String, _> = Coordinator::new(MemoryStorage::new());
//! coordinator.add_sub_tx_def(
//!     "reserve",
//!     |_ctx: &(), (seat,): (u32,)| if seat > 0 { Ok(()) } else { Err("no seat".to_string()) },
//!     |_ctx: &(), _args: (u32,)| Ok(()),
//! )?;
//!
//! let mut saga = coordinator.start_saga((), coordinator.next_saga_id())?;
//! saga.sub_tx("reserve", (12_u32,))?;
//! assert_eq!(saga.end_saga()?, SagaOutcome::Completed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod audit;
mod config;
mod coordinator;
mod definition;
mod erased;
mod error;
mod param;
mod recovery;
mod saga;

pub use audit::{SagaAuditLog, StepRecord, StepStatus};
pub use config::{CoordinatorConfig, DEFAULT_LOG_PREFIX, DEFAULT_RETRY_BACKOFF_MS};
pub use coordinator::Coordinator;
pub use definition::{FnSubTx, SubTransaction, SubTxDefinition};
pub use error::{ConfigError, ConfigLoadError, Result, SagaError};
pub use param::{Param, ParamDescriptor, ParamRegistry, SubTxArgs};
pub use recovery::{RecoveredSaga, SagaStatus};
pub use saga::{Saga, SagaOutcome, SagaState};
pub use saga_core::{IdGenerator, IdParts, LogEntry, LogKind, ParamData};
pub use saga_storage::{FileStorage, LogStorage, MemoryStorage, RetryPolicy, StorageError};
