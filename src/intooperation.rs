use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::Arity;
use std::sync::Arc;

// Adapter layer that turns strongly-typed Rust functions into the erased
// `OperationFn` stored in the builtin registry.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume arguments without cloning.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Turns one evaluated argument into a strongly-typed parameter.
///
/// `Param<'a>` is the type the builtin receives. It may borrow from the
/// argument slot or take the value out of it.
pub(crate) trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Nil))
    }
}

impl FromParam for NumberType {
    type Param<'a> = NumberType;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        NumberType::try_from(std::mem::replace(value, Value::Nil))
    }
}

/// Normalizes builtin return types to `Result<Value, Error>`.
pub(crate) trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

macro_rules! impl_into_value_result {
    ($($ty:ty),+) => {
        $(
            impl IntoValueResult for $ty {
                fn into_value_result(self) -> Result<Value, Error> {
                    Ok(self.into())
                }
            }

            impl IntoValueResult for Result<$ty, Error> {
                fn into_value_result(self) -> Result<Value, Error> {
                    self.map(Into::into)
                }
            }
        )+
    };
}

impl IntoValueResult for Value {
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self)
    }
}

impl IntoValueResult for Result<Value, Error> {
    fn into_value_result(self) -> Result<Value, Error> {
        self
    }
}

impl_into_value_result!(NumberType, bool);

/// Converts a typed function into the erased [`OperationFn`].
///
/// `Args` is the tuple of parameter types, named explicitly at the
/// registration site.
pub(crate) trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Implements `IntoOperation` for one fixed arity. Arguments are moved into
/// local slots so that `FromParam` can borrow from or consume each one.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error(Arity::Exact($arity), len)),
                    }
                })
            }
        }
    };
}

// 0-arg functions
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(Arity::Exact(0), args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
