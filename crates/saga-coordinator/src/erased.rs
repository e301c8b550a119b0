use std::borrow::Cow;

use saga_core::ParamData;

use crate::definition::SubTransaction;
use crate::error::ConfigError;
use crate::param::{ParamRegistry, SubTxArgs};

/// Outer error: the persisted parameters do not fit the handler.
/// Inner error: the handler itself reported a business failure.
pub(crate) type Invocation<Err> = Result<Result<(), Err>, ConfigError>;

pub(crate) trait ErasedSubTx<Ctx, Err>: Send + Sync {
    fn id(&self) -> &str;

    fn describe(&self) -> Vec<Cow<'static, str>>;

    fn register_params(&self, registry: &mut ParamRegistry);

    fn invoke_action(
        &self,
        ctx: &Ctx,
        params: &[ParamData],
        registry: &ParamRegistry,
    ) -> Invocation<Err>;

    fn invoke_compensation(
        &self,
        ctx: &Ctx,
        params: &[ParamData],
        registry: &ParamRegistry,
    ) -> Invocation<Err>;

    fn compensation_description(&self) -> String;

    /// Checks marshaled call arguments against the handler signature before
    /// anything is logged.
    fn check_params(&self, params: &[ParamData]) -> Result<(), ConfigError> {
        let expected = self.describe();
        if expected.len() != params.len() {
            return Err(ConfigError::ArgumentCount {
                expected: expected.len(),
                actual: params.len(),
            });
        }
        for (position, (expected, param)) in expected.iter().zip(params).enumerate() {
            if param.param_type != *expected {
                return Err(ConfigError::ArgumentMismatch {
                    position,
                    expected: expected.to_string(),
                    actual: param.param_type.clone(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) struct SubTxWrapper<T> {
    sub_tx: T,
}

impl<T> SubTxWrapper<T> {
    pub(crate) fn new(sub_tx: T) -> Self {
        Self { sub_tx }
    }
}

impl<T> ErasedSubTx<T::Context, T::Error> for SubTxWrapper<T>
where
    T: SubTransaction,
{
    fn id(&self) -> &str {
        self.sub_tx.id()
    }

    fn describe(&self) -> Vec<Cow<'static, str>> {
        T::Args::describe()
    }

    fn register_params(&self, registry: &mut ParamRegistry) {
        registry.register_signature::<T::Args>();
    }

    fn invoke_action(
        &self,
        ctx: &T::Context,
        params: &[ParamData],
        registry: &ParamRegistry,
    ) -> Invocation<T::Error> {
        let args = registry.unmarshal::<T::Args>(params)?;
        Ok(self.sub_tx.action(ctx, args))
    }

    fn invoke_compensation(
        &self,
        ctx: &T::Context,
        params: &[ParamData],
        registry: &ParamRegistry,
    ) -> Invocation<T::Error> {
        let args = registry.unmarshal::<T::Args>(params)?;
        Ok(self.sub_tx.compensate(ctx, args))
    }

    fn compensation_description(&self) -> String {
        self.sub_tx.compensation_description()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct TestContext {
        compensated: Mutex<Vec<String>>,
    }

    #[derive(Debug, PartialEq)]
    struct TestError(String);

    struct ReserveSeat;

    impl SubTransaction for ReserveSeat {
        type Args = (String, u32);
        type Context = TestContext;
        type Error = TestError;

        fn id(&self) -> &str {
            "reserve_seat"
        }

        fn action(
            &self,
            _ctx: &TestContext,
            (flight, seat): (String, u32),
        ) -> Result<(), TestError> {
            if seat == 0 {
                return Err(TestError(format!("no seat 0 on {flight}")));
            }
            Ok(())
        }

        fn compensate(
            &self,
            ctx: &TestContext,
            (flight, seat): (String, u32),
        ) -> Result<(), TestError> {
            ctx.compensated
                .lock()
                .expect("lock")
                .push(format!("release {flight}/{seat}"));
            Ok(())
        }
    }

    struct ReadOnlyLookup;

    impl SubTransaction for ReadOnlyLookup {
        type Args = (String,);
        type Context = TestContext;
        type Error = TestError;

        fn id(&self) -> &str {
            "lookup"
        }

        fn action(&self, _ctx: &TestContext, _args: (String,)) -> Result<(), TestError> {
            Ok(())
        }
    }

    fn context() -> TestContext {
        TestContext {
            compensated: Mutex::new(Vec::new()),
        }
    }

    fn registry_for(wrapper: &dyn ErasedSubTx<TestContext, TestError>) -> ParamRegistry {
        let mut registry = ParamRegistry::new();
        wrapper.register_params(&mut registry);
        registry
    }

    #[test]
    fn wrapper_delegates_id_and_description() {
        let wrapper = SubTxWrapper::new(ReserveSeat);

        assert_eq!(wrapper.id(), "reserve_seat");
        assert_eq!(wrapper.compensation_description(), "undo reserve_seat");
        assert_eq!(wrapper.describe(), vec!["String", "u32"]);
    }

    #[test]
    fn wrapper_invokes_action_from_persisted_params() -> anyhow::Result<()> {
        let wrapper = SubTxWrapper::new(ReserveSeat);
        let registry = registry_for(&wrapper);
        let params = registry.marshal(&("LH400".to_string(), 0_u32))?;

        let outcome = wrapper.invoke_action(&context(), &params, &registry)?;

        assert_eq!(outcome, Err(TestError("no seat 0 on LH400".to_string())));
        Ok(())
    }

    #[test]
    fn wrapper_replays_compensation_with_logged_arguments() -> anyhow::Result<()> {
        let ctx = context();
        let wrapper = SubTxWrapper::new(ReserveSeat);
        let registry = registry_for(&wrapper);
        let params = registry.marshal(&("LH400".to_string(), 12_u32))?;

        let outcome = wrapper.invoke_compensation(&ctx, &params, &registry)?;

        assert!(outcome.is_ok());
        assert_eq!(
            *ctx.compensated.lock().expect("lock"),
            vec!["release LH400/12"]
        );
        Ok(())
    }

    #[test]
    fn read_only_step_uses_default_no_op_compensation() -> anyhow::Result<()> {
        let ctx = context();
        let wrapper = SubTxWrapper::new(ReadOnlyLookup);
        let registry = registry_for(&wrapper);
        let params = registry.marshal(&("foo".to_string(),))?;

        let outcome = wrapper.invoke_compensation(&ctx, &params, &registry)?;

        assert!(outcome.is_ok());
        assert!(ctx.compensated.lock().expect("lock").is_empty());
        Ok(())
    }

    #[test]
    fn check_params_rejects_wrong_argument_types() -> anyhow::Result<()> {
        let wrapper = SubTxWrapper::new(ReserveSeat);
        let mut registry = registry_for(&wrapper);
        registry.register::<i64>();

        let good = registry.marshal(&("LH400".to_string(), 1_u32))?;
        let wrong_type = registry.marshal(&("LH400".to_string(), 1_i64))?;
        let wrong_count = registry.marshal(&("LH400".to_string(),))?;

        assert!(wrapper.check_params(&good).is_ok());
        assert!(matches!(
            wrapper.check_params(&wrong_type),
            Err(ConfigError::ArgumentMismatch { position: 1, .. })
        ));
        assert!(matches!(
            wrapper.check_params(&wrong_count),
            Err(ConfigError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        ));
        Ok(())
    }
}
