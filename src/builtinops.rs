//! Built-in operations registry.
//!
//! Every name bound in a fresh global frame, apart from the constants, comes
//! from this table. Each entry is either a function, whose arguments are
//! evaluated before the call, or a special form, which receives its argument
//! terms unevaluated together with the calling frame.
//!
//! ## Error Handling
//!
//! - **Type Safety**: arithmetic and comparison accept integers only
//! - **No Coercion**: there is no truthiness; `if` tests for `true` itself
//! - **Overflow Detection**: arithmetic reports overflow instead of wrapping
//! - **Arity Checking**: every builtin validates its argument count

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::{NumberType, Value, cons};
use crate::class::{
    eval_class, eval_class_chmod, eval_class_define, eval_class_finalize, eval_class_set,
};
use crate::environment::Env;
use crate::evaluator::{
    Arity, Context, eval_begin, eval_define, eval_if, eval_lambda, eval_mac, eval_quote, eval_set,
    eval_unquote,
};
use crate::intooperation::{IntoOperation, OperationFn};
use crate::quasiquote::eval_quasiquote;

/// Signature shared by all special forms
pub type SpecialFormFn = fn(&[Value], &Env, Context<'_>) -> Result<Value, Error>;

/// Represents the implementation of a built-in operation
#[derive(Clone)]
pub enum OpKind {
    /// Takes evaluated arguments
    Function(Arc<OperationFn>),
    /// Takes the unevaluated argument terms and the calling frame
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// Name bound in the global frame
    pub name: &'static str,
    pub op_kind: OpKind,
    /// Checked before a function is called; special forms check their own shape
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Builtin Function Implementations
//

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(a: NumberType, b: NumberType) -> bool {
            a $op b
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

// Macro to generate overflow-checked arithmetic
macro_rules! checked_arithmetic {
    ($name:ident, $method:ident, $what:expr) => {
        fn $name(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
            a.$method(b)
                .ok_or_else(|| Error::EvalError(format!("Integer overflow in {}", $what)))
        }
    };
}

checked_arithmetic!(builtin_add, checked_add, "addition");
checked_arithmetic!(builtin_sub, checked_sub, "subtraction");
checked_arithmetic!(builtin_mul, checked_mul, "multiplication");

fn builtin_cons(first: Value, rest: Value) -> Value {
    cons(first, rest)
}

fn builtin_car(value: Value) -> Result<Value, Error> {
    match value {
        Value::Pair(pair) => Ok(pair.first.clone()),
        other => Err(Error::TypeError(format!(
            "car requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(value: Value) -> Result<Value, Error> {
    match value {
        Value::Pair(pair) => Ok(pair.rest.clone()),
        other => Err(Error::TypeError(format!(
            "cdr requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_is(first: Value, second: Value) -> bool {
    first.is(&second)
}

fn builtin_equal(first: Value, second: Value) -> bool {
    first == second
}

fn builtin_display(value: Value) -> Result<Value, Error> {
    let mut stdout = std::io::stdout().lock();
    let written = match &value {
        Value::String(text) => write!(stdout, "{text}"),
        other => write!(stdout, "{other}"),
    };
    written
        .and_then(|()| stdout.flush())
        .map_err(|e| Error::EvalError(format!("display failed: {e}")))?;
    Ok(Value::Nil)
}

fn builtin_newline() -> Result<Value, Error> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout)
        .and_then(|()| stdout.flush())
        .map_err(|e| Error::EvalError(format!("newline failed: {e}")))?;
    Ok(Value::Nil)
}

/// Global registry of all built-in operations, in binding order.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn special_form(name: &'static str, form: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::SpecialForm(form),
            arity: Arity::Any,
        }
    }

    fn numeric(
        name: &'static str,
        f: fn(NumberType, NumberType) -> Result<NumberType, Error>,
    ) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(builtin_fixed::<(NumberType, NumberType), _>(f)),
            arity: Arity::Exact(2),
        }
    }

    fn comparison(name: &'static str, f: fn(NumberType, NumberType) -> bool) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(builtin_fixed::<(NumberType, NumberType), _>(f)),
            arity: Arity::Exact(2),
        }
    }

    vec![
        // Language constructs
        special_form("quote", eval_quote),
        special_form("set!", eval_set),
        special_form("define", eval_define),
        special_form("if", eval_if),
        special_form("lambda", eval_lambda),
        special_form("begin", eval_begin),
        // Classes
        special_form("class", eval_class),
        special_form("class-define!", eval_class_define),
        special_form("class-set!", eval_class_set),
        special_form("class-chmod!", eval_class_chmod),
        special_form("class-finalize!", eval_class_finalize),
        // Macros and templates
        special_form("mac", eval_mac),
        special_form("quasiquote", eval_quasiquote),
        special_form("unquote", eval_unquote),
        // Output
        BuiltinOp {
            name: "display",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_display)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "newline",
            op_kind: OpKind::Function(builtin_fixed::<(), _>(builtin_newline)),
            arity: Arity::Exact(0),
        },
        // Pairs
        BuiltinOp {
            name: "cons",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_cons)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "car",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_car)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "cdr",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_cdr)),
            arity: Arity::Exact(1),
        },
        // Equality
        BuiltinOp {
            name: "is?",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_is)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "equal?",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_equal)),
            arity: Arity::Exact(2),
        },
        // Arithmetic
        numeric("+", builtin_add),
        numeric("*", builtin_mul),
        numeric("-", builtin_sub),
        // Comparison
        comparison("<", builtin_lt),
        comparison(">", builtin_gt),
        comparison("=", builtin_eq),
        comparison("<=", builtin_le),
        comparison(">=", builtin_ge),
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by the name it is bound to
pub fn find_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(value.into())
    }

    fn int(n: NumberType) -> Value {
        Value::Integer(n)
    }

    /// Invoke a function builtin through the registry with evaluated arguments
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_op(name).unwrap_or_else(|| panic!("builtin not found: {name}"));
        match &op.op_kind {
            OpKind::Function(func) => {
                op.validate_arity(args.len())?;
                func(args.to_vec())
            }
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let expected_names = [
            "quote",
            "set!",
            "define",
            "if",
            "lambda",
            "begin",
            "class",
            "class-define!",
            "class-set!",
            "class-chmod!",
            "class-finalize!",
            "mac",
            "quasiquote",
            "unquote",
            "display",
            "newline",
            "cons",
            "car",
            "cdr",
            "is?",
            "equal?",
            "+",
            "*",
            "-",
            "<",
            ">",
            "=",
            "<=",
            ">=",
        ];
        let names: Vec<&str> = get_builtin_ops().iter().map(|op| op.name).collect();
        assert_eq!(names, expected_names);

        let if_op = find_op("if").unwrap();
        assert!(if_op.is_special_form());
        let car_op = find_op("car").unwrap();
        assert!(!car_op.is_special_form());
        assert_eq!(car_op.arity, Arity::Exact(1));
        assert!(std::ptr::eq(car_op, &get_builtin_ops()[17]));

        assert!(find_op("list").is_none());
        assert!(find_op("BaseClass").is_none());
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let pair = cons(int(1), int(2));
        let list = Value::from(vec![1, 2, 3]);
        let same_list = Value::from(vec![1, 2, 3]);

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic
            test!("+", &[int(1), int(2)], success(3)),
            test!("+", &[int(-5), int(10)], success(5)),
            test!("-", &[int(10), int(3)], success(7)),
            test!("-", &[int(0), int(5)], success(-5)),
            test!("*", &[int(-2), int(3)], success(-6)),
            test!("*", &[int(0), int(100)], success(0)),
            test!("+", &[int(NumberType::MAX), int(1)], None),
            test!("-", &[int(NumberType::MIN), int(1)], None),
            test!("*", &[int(NumberType::MAX), int(2)], None),
            test!("+", &[int(1)], None),
            test!("+", &[int(1), int(2), int(3)], None),
            test!("+", &[Value::from("1"), int(2)], None),
            test!("*", &[int(2), Value::Nil], None),
            // Comparison
            test!("<", &[int(2), int(9)], success(true)),
            test!("<", &[int(6), int(6)], success(false)),
            test!(">", &[int(7), int(3)], success(true)),
            test!(">", &[int(-2), int(-1)], success(false)),
            test!("=", &[int(4), int(4)], success(true)),
            test!("=", &[int(4), int(5)], success(false)),
            test!("<=", &[int(3), int(3)], success(true)),
            test!(">=", &[int(2), int(6)], success(false)),
            test!("=", &[Value::Bool(true), Value::Bool(true)], None),
            test!("<", &[int(1)], None),
            // Pairs
            test!("cons", &[int(1), int(2)], Some(pair.clone())),
            test!("cons", &[int(1), Value::Nil], Some(Value::from(vec![1]))),
            test!("car", &[pair.clone()], success(1)),
            test!("cdr", &[pair.clone()], success(2)),
            test!("car", &[list.clone()], success(1)),
            test!("cdr", &[list.clone()], Some(Value::from(vec![2, 3]))),
            test!("car", &[Value::Nil], None),
            test!("cdr", &[int(1)], None),
            test!("car", &[], None),
            // Equality and identity
            test!("equal?", &[list.clone(), same_list.clone()], success(true)),
            test!("equal?", &[list.clone(), pair.clone()], success(false)),
            test!("equal?", &[Value::from("a"), Value::from("a")], success(true)),
            test!("is?", &[list.clone(), same_list.clone()], success(false)),
            test!("is?", &[list.clone(), list.clone()], success(true)),
            test!("is?", &[int(5), int(5)], success(true)),
            test!("is?", &[Value::Nil, Value::Nil], success(true)),
            test!("is?", &[Value::Bool(false), Value::Nil], success(false)),
            test!("is?", &[int(1)], None),
        ];

        for (i, (name, result, expected)) in test_cases.into_iter().enumerate() {
            match (result, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name})", i + 1);
                }
                (Err(_), None) => {}
                (Ok(actual), None) => {
                    panic!("case #{} ({name}): expected error, got {actual}", i + 1)
                }
                (Err(err), Some(expected)) => {
                    panic!("case #{} ({name}): expected {expected}, got {err}", i + 1)
                }
            }
        }
    }

    #[test]
    fn test_overflow_message() {
        let err = call_builtin("+", &[int(NumberType::MAX), int(1)]).unwrap_err();
        assert_eq!(
            err,
            Error::EvalError("Integer overflow in addition".to_owned())
        );
    }

    #[test]
    fn test_output_builtins_return_nil() {
        assert_eq!(call_builtin("display", &[Value::from("")]).unwrap(), Value::Nil);
        assert_eq!(call_builtin("newline", &[]).unwrap(), Value::Nil);
        assert!(call_builtin("newline", &[int(1)]).is_err());
    }
}
