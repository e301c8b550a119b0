use std::borrow::Cow;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::erased::ErasedSubTx;
use crate::error::ConfigError;
use crate::param::SubTxArgs;

/// A forward action paired with its compensation.
///
/// Both handlers receive the coordination context first and the same argument
/// tuple second. The compensation is replayed from the arguments persisted in
/// the saga log, so it must not rely on in-memory state of the action call.
///
/// # Type Parameters
///
/// - `Args`: Argument tuple, persisted with every `ActionStart` entry
/// - `Context`: Per-saga coordination context
/// - `Error`: Business failure reported by either handler
pub trait SubTransaction: Send + Sync + 'static {
    type Args: SubTxArgs;

    type Context;

    type Error;

    /// Stable id used to invoke the sub-transaction and written into its log
    /// entries.
    fn id(&self) -> &str;

    /// Runs the forward step.
    ///
    /// # Errors
    ///
    /// Returns an error if the business operation failed. The saga then
    /// compensates every step started so far, including this one.
    fn action(&self, ctx: &Self::Context, args: Self::Args) -> Result<(), Self::Error>;

    /// Semantically undoes the forward step.
    ///
    /// May be called for an action that failed or only partially applied.
    /// The default implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if the compensation failed; the saga then stops
    /// compensating and needs operator attention.
    fn compensate(&self, ctx: &Self::Context, args: Self::Args) -> Result<(), Self::Error> {
        let _ = (ctx, args);
        Ok(())
    }

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.id())
    }
}

/// A sub-transaction built from two functions or closures.
pub struct FnSubTx<Ctx, Err, A, F, G> {
    id: String,
    action: F,
    compensate: G,
    _marker: PhantomData<fn(&Ctx, A) -> Err>,
}

impl<Ctx, Err, A, F, G> FnSubTx<Ctx, Err, A, F, G>
where
    A: SubTxArgs,
    F: Fn(&Ctx, A) -> Result<(), Err>,
    G: Fn(&Ctx, A) -> Result<(), Err>,
{
    #[must_use]
    pub fn new(id: impl Into<String>, action: F, compensate: G) -> Self {
        Self {
            id: id.into(),
            action,
            compensate,
            _marker: PhantomData,
        }
    }
}

impl<Ctx, Err, A, F, G> SubTransaction for FnSubTx<Ctx, Err, A, F, G>
where
    Ctx: 'static,
    Err: 'static,
    A: SubTxArgs,
    F: Fn(&Ctx, A) -> Result<(), Err> + Send + Sync + 'static,
    G: Fn(&Ctx, A) -> Result<(), Err> + Send + Sync + 'static,
{
    type Args = A;
    type Context = Ctx;
    type Error = Err;

    fn id(&self) -> &str {
        &self.id
    }

    fn action(&self, ctx: &Ctx, args: A) -> Result<(), Err> {
        (self.action)(ctx, args)
    }

    fn compensate(&self, ctx: &Ctx, args: A) -> Result<(), Err> {
        (self.compensate)(ctx, args)
    }
}

/// Read-only view of a registered sub-transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTxDefinition {
    pub id: String,
    pub params: Vec<Cow<'static, str>>,
    pub compensation_description: String,
}

/// Registered sub-transactions keyed by id, in registration order.
pub(crate) struct DefinitionStore<Ctx, Err> {
    definitions: IndexMap<String, Box<dyn ErasedSubTx<Ctx, Err>>>,
}

impl<Ctx, Err> DefinitionStore<Ctx, Err> {
    pub(crate) fn new() -> Self {
        Self {
            definitions: IndexMap::new(),
        }
    }

    /// Stores `definition`, replacing any earlier one with the same id.
    pub(crate) fn add(
        &mut self,
        definition: Box<dyn ErasedSubTx<Ctx, Err>>,
    ) -> Result<&dyn ErasedSubTx<Ctx, Err>, ConfigError> {
        if definition.id().is_empty() {
            return Err(ConfigError::EmptySubTxId);
        }
        let (index, _) = self
            .definitions
            .insert_full(definition.id().to_string(), definition);
        Ok(self.definitions[index].as_ref())
    }

    pub(crate) fn find(&self, sub_tx_id: &str) -> Option<&dyn ErasedSubTx<Ctx, Err>> {
        self.definitions.get(sub_tx_id).map(AsRef::as_ref)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}
