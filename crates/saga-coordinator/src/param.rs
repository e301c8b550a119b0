//! Marshaling of sub-transaction arguments.
//!
//! Compensations must be replayable from a persisted log after a restart, so
//! call arguments are stored as JSON text tagged with a stable type name.
//! [`ParamRegistry`] maps those names to the Rust types registered through
//! sub-transaction definitions and back.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;

use indexmap::IndexMap;
use saga_core::{LogCodecError, ParamData};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// A value that can be passed to a sub-transaction and persisted in its log.
///
/// The type name is written into every log entry, so it must stay stable
/// across releases. Use [`impl_param!`](crate::impl_param) for your own types.
pub trait Param: Serialize + DeserializeOwned + Send + 'static {
    fn type_name() -> Cow<'static, str>;
}

/// Implements [`Param`] for a type, tagging it with its own name or with an
/// explicit one.
///
/// ```
/// use saga_coordinator::{Param, impl_param};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Transfer {
///     amount: i64,
/// }
///
/// #[derive(Serialize, Deserialize)]
/// struct AccountId(u64);
///
/// impl_param!(Transfer);
/// impl_param!(AccountId, "bank.AccountId");
///
/// assert_eq!(Transfer::type_name(), "Transfer");
/// assert_eq!(AccountId::type_name(), "bank.AccountId");
/// ```
#[macro_export]
macro_rules! impl_param {
    ($ty:ty) => {
        $crate::impl_param!($ty, stringify!($ty));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::Param for $ty {
            fn type_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed($name)
            }
        }
    };
}

impl_param!(bool);
impl_param!(char);
impl_param!(String);
impl_param!(i8);
impl_param!(i16);
impl_param!(i32);
impl_param!(i64);
impl_param!(isize);
impl_param!(u8);
impl_param!(u16);
impl_param!(u32);
impl_param!(u64);
impl_param!(usize);
impl_param!(f32);
impl_param!(f64);

impl<T: Param> Param for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Vec<{}>", T::type_name()))
    }
}

impl<T: Param> Param for Option<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Option<{}>", T::type_name()))
    }
}

/// Boxed values share the tag of the value they point to; decoding builds a
/// fresh box around the decoded value.
impl<T: Param> Param for Box<T> {
    fn type_name() -> Cow<'static, str> {
        T::type_name()
    }
}

/// What the registry knows about one tagged type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    name: String,
    rust_type: &'static str,
}

impl ParamDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The Rust type first registered under this name.
    #[must_use]
    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }
}

/// Bidirectional map between Rust types and their stable tags.
///
/// Grows monotonically as definitions are added.
#[derive(Debug, Default)]
pub struct ParamRegistry {
    by_name: IndexMap<String, ParamDescriptor>,
    by_type: HashMap<TypeId, String>,
}

impl ParamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its tag. Registering a type again is a no-op.
    pub fn register<T: Param>(&mut self) {
        let name = T::type_name().into_owned();
        self.by_name
            .entry(name.clone())
            .or_insert_with(|| ParamDescriptor {
                name: name.clone(),
                rust_type: std::any::type_name::<T>(),
            });
        self.by_type.entry(TypeId::of::<T>()).or_insert(name);
    }

    /// Registers every argument type of a handler signature.
    pub fn register_signature<A: SubTxArgs>(&mut self) {
        A::register(self);
    }

    #[must_use]
    pub fn name_of<T: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ParamDescriptor> {
        self.by_name.get(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.by_name.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Converts call arguments into tagged, serialized parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnregisteredParam`] if an argument's type was
    /// never registered, or a codec error if it cannot be serialized.
    pub fn marshal<A: SubTxArgs>(&self, args: &A) -> Result<Vec<ParamData>, ConfigError> {
        args.marshal(self)
    }

    /// Rebuilds call arguments from persisted parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownParamType`] for a tag this registry has
    /// never seen, [`ConfigError::ArgumentCount`] or
    /// [`ConfigError::ArgumentMismatch`] if the parameters do not fit `A`, or a
    /// codec error if a payload cannot be decoded.
    pub fn unmarshal<A: SubTxArgs>(&self, params: &[ParamData]) -> Result<A, ConfigError> {
        A::unmarshal(params, self)
    }

    /// Serializes one value under its registered tag.
    ///
    /// # Errors
    ///
    /// See [`ParamRegistry::marshal`].
    pub fn encode<T: Param>(&self, value: &T) -> Result<ParamData, ConfigError> {
        let name = self
            .name_of::<T>()
            .ok_or(ConfigError::UnregisteredParam {
                rust_type: std::any::type_name::<T>(),
            })?;
        let data = serde_json::to_string(value).map_err(|source| LogCodecError::ParamEncode {
            param_type: name.to_string(),
            source,
        })?;
        Ok(ParamData::new(name, data))
    }

    /// Decodes the parameter at `position` into a fresh `T`.
    ///
    /// # Errors
    ///
    /// See [`ParamRegistry::unmarshal`].
    pub fn decode<T: Param>(&self, param: &ParamData, position: usize) -> Result<T, ConfigError> {
        if self.descriptor(&param.param_type).is_none() {
            return Err(ConfigError::UnknownParamType {
                param_type: param.param_type.clone(),
            });
        }
        let expected = T::type_name();
        if param.param_type != expected {
            return Err(ConfigError::ArgumentMismatch {
                position,
                expected: expected.into_owned(),
                actual: param.param_type.clone(),
            });
        }
        serde_json::from_str(&param.data).map_err(|source| {
            LogCodecError::ParamDecode {
                param_type: param.param_type.clone(),
                data: param.data.clone(),
                source,
            }
            .into()
        })
    }
}

/// The argument list of a sub-transaction: a tuple of up to eight [`Param`]s.
///
/// Single arguments are passed as one-element tuples, e.g. `(amount,)`.
pub trait SubTxArgs: Sized + Send + 'static {
    /// Tags of the argument types, in call order.
    fn describe() -> Vec<Cow<'static, str>>;

    fn register(registry: &mut ParamRegistry);

    /// # Errors
    ///
    /// See [`ParamRegistry::marshal`].
    fn marshal(&self, registry: &ParamRegistry) -> Result<Vec<ParamData>, ConfigError>;

    /// # Errors
    ///
    /// See [`ParamRegistry::unmarshal`].
    fn unmarshal(params: &[ParamData], registry: &ParamRegistry) -> Result<Self, ConfigError>;
}

macro_rules! impl_sub_tx_args {
    ($len:expr; $($name:ident : $idx:tt),*) => {
        impl<$($name: Param),*> SubTxArgs for ($($name,)*) {
            fn describe() -> Vec<Cow<'static, str>> {
                vec![$($name::type_name()),*]
            }

            #[allow(unused_variables)]
            fn register(registry: &mut ParamRegistry) {
                $(registry.register::<$name>();)*
            }

            #[allow(unused_variables)]
            fn marshal(&self, registry: &ParamRegistry) -> Result<Vec<ParamData>, ConfigError> {
                Ok(vec![$(registry.encode(&self.$idx)?),*])
            }

            #[allow(unused_variables)]
            fn unmarshal(
                params: &[ParamData],
                registry: &ParamRegistry,
            ) -> Result<Self, ConfigError> {
                if params.len() != $len {
                    return Err(ConfigError::ArgumentCount {
                        expected: $len,
                        actual: params.len(),
                    });
                }
                Ok(($(registry.decode::<$name>(&params[$idx], $idx)?,)*))
            }
        }
    };
}

impl_sub_tx_args!(0;);
impl_sub_tx_args!(1; A: 0);
impl_sub_tx_args!(2; A: 0, B: 1);
impl_sub_tx_args!(3; A: 0, B: 1, C: 2);
impl_sub_tx_args!(4; A: 0, B: 1, C: 2, D: 3);
impl_sub_tx_args!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_sub_tx_args!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_sub_tx_args!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_sub_tx_args!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
