use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{Value, cons, from_list, proper_list};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::class::{Class, ClassId, call_instance};
use crate::environment::{Env, Environment};
use crate::procedure::{Lambda, LambdaKind, Params, call_lambda};
use crate::slots::Access;
use crate::symbol::{Keywords, SymbolTable};
use crate::{Error, EvalConfig};

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(*self, got))
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Interpreter-wide state the evaluator needs besides the environment.
#[derive(Debug)]
pub struct Runtime {
    pub keywords: Keywords,
    pub config: EvalConfig,
    next_class_id: Cell<u64>,
}

impl Runtime {
    pub fn new(keywords: Keywords, config: EvalConfig) -> Self {
        Runtime {
            keywords,
            config,
            next_class_id: Cell::new(0),
        }
    }

    pub(crate) fn fresh_class_id(&self) -> ClassId {
        let id = self.next_class_id.get();
        self.next_class_id.set(id + 1);
        ClassId::new(id)
    }
}

/// Internal access to one class, granted for the duration of a method call.
///
/// Grants form a stack-allocated chain through nested calls; dropping out of a
/// call frame drops its grant, whether the call returned or failed.
#[derive(Debug)]
pub struct Grant<'a> {
    class: ClassId,
    outer: Option<&'a Grant<'a>>,
}

impl<'a> Grant<'a> {
    pub fn new(class: ClassId, outer: Option<&'a Grant<'a>>) -> Self {
        Grant { class, outer }
    }
}

/// Per-call evaluation state, passed by value down the evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    runtime: &'a Runtime,
    depth: usize,
    grant: Option<&'a Grant<'a>>,
}

impl<'a> Context<'a> {
    pub fn new(runtime: &'a Runtime) -> Self {
        Context {
            runtime,
            depth: 0,
            grant: None,
        }
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn keywords(&self) -> &'a Keywords {
        &self.runtime.keywords
    }

    /// Step one level deeper, failing once the configured limit is reached
    pub fn enter(self) -> Result<Self, Error> {
        let max_depth = self.runtime.config.max_depth;
        if self.depth >= max_depth {
            return Err(Error::RecursionTooDeep(max_depth));
        }
        Ok(Context {
            depth: self.depth + 1,
            ..self
        })
    }

    /// The grant currently in force, to chain a new one onto
    pub fn grant(&self) -> Option<&'a Grant<'a>> {
        self.grant
    }

    pub fn with_grant<'b>(self, grant: &'b Grant<'b>) -> Context<'b>
    where
        'a: 'b,
    {
        Context {
            runtime: self.runtime,
            depth: self.depth,
            grant: Some(grant),
        }
    }

    /// Access level for slots of `class` at this point of the call path
    pub fn access_to(&self, class: ClassId) -> Access {
        let mut grant = self.grant;
        while let Some(current) = grant {
            if current.class == class {
                return Access::Internal;
            }
            grant = current.outer;
        }
        Access::External
    }
}

/// Evaluate a term in `env`
pub fn eval(expr: &Value, env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    let ctx = ctx.enter()?;
    match expr {
        Value::Nil
        | Value::Integer(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Lambda(_)
        | Value::Builtin(_)
        | Value::Class(_) => Ok(expr.clone()),

        Value::Symbol(name) => env.lookup(name),

        // The callable decides how its argument terms are evaluated
        Value::Pair(pair) => {
            let callable = eval(&pair.first, env, ctx)?;
            let args = pair.rest.list_elements()?;
            apply(&callable, &args, env, ctx).map_err(|err| add_context(err, expr))
        }
    }
}

/// Helper function to add expression context to errors
fn add_context(error: Error, expr: &Value) -> Error {
    const CONTEXT_MARKER: &str = "\n  Context: ";
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        // Other kinds already name what went wrong
        other => other,
    }
}

/// Evaluate argument terms left to right
pub fn eval_args(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Vec<Value>, Error> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, env, ctx)?);
    }
    Ok(values)
}

/// Invoke `callable` with unevaluated argument terms from a call in `env`
pub fn apply(callable: &Value, args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match callable {
        Value::Builtin(op) => match &op.op_kind {
            OpKind::SpecialForm(special_form) => special_form(args, env, ctx),
            OpKind::Function(func) => {
                let values = eval_args(args, env, ctx)?;
                op.validate_arity(values.len())?;
                trace!(builtin = op.name, args = values.len(), "applying builtin");
                func(values)
            }
        },
        Value::Lambda(lambda) => call_lambda(lambda, args, env, ctx),
        Value::Class(class) => call_instance(class, args, env, ctx),
        other => Err(Error::NotCallable(format!(
            "{other} ({}) cannot be applied",
            other.type_name()
        ))),
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: &[Value], _env: &Env, _ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate set! special form
pub(crate) fn eval_set(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval(expr, env, ctx)?;
            env.assign(name, value)?;
            Ok(Value::Nil)
        }
        [_, _] => Err(Error::InvalidForm("set! requires a symbol".to_owned())),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate define special form
///
/// `(define (name . params) body...)` is rewritten to
/// `(define name (lambda params body...))` before evaluation.
pub(crate) fn eval_define(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval(expr, env, ctx)?;
            env.define(name, value)?;
            Ok(Value::Nil)
        }
        [Value::Pair(signature), body @ ..] if !body.is_empty() => {
            let Value::Symbol(name) = &signature.first else {
                return Err(Error::InvalidForm(format!(
                    "define requires a symbol name, got {}",
                    signature.first
                )));
            };
            let mut lambda_form = vec![
                Value::Symbol(ctx.keywords().lambda.clone()),
                signature.rest.clone(),
            ];
            lambda_form.extend(body.iter().cloned());
            lambda_form.push(Value::Nil);

            let value = eval(&from_list(lambda_form), env, ctx)?;
            env.define(name, value)?;
            Ok(Value::Nil)
        }
        [_, _, ..] => Err(Error::InvalidForm(
            "define requires a symbol or a (name params...) signature".to_owned(),
        )),
        _ => Err(Error::arity_error(Arity::AtLeast(2), args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, rest @ ..] if rest.len() <= 1 => {
            let condition = eval(condition_expr, env, ctx)?;
            // Only the true value selects the consequent
            if matches!(condition, Value::Bool(true)) {
                eval(then_expr, env, ctx)
            } else {
                match rest {
                    [else_expr] => eval(else_expr, env, ctx),
                    _ => Ok(Value::Nil),
                }
            }
        }
        _ => Err(Error::arity_error(Arity::Range(2, 3), args.len())),
    }
}

fn make_closure(
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
    kind: LambdaKind,
) -> Result<Value, Error> {
    match args {
        [params, body @ ..] if !body.is_empty() => {
            let params = Params::parse(params)?;
            let body = cons(
                Value::Symbol(ctx.keywords().begin.clone()),
                proper_list(body.to_vec()),
            );
            Ok(Value::Lambda(Rc::new(Lambda {
                params,
                body,
                env: Rc::clone(env),
                kind,
            })))
        }
        _ => Err(Error::arity_error(Arity::AtLeast(2), args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    make_closure(args, env, ctx, LambdaKind::Function)
}

/// Evaluate mac special form
pub(crate) fn eval_mac(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    make_closure(args, env, ctx, LambdaKind::Macro)
}

/// Evaluate begin special form
pub(crate) fn eval_begin(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Err(Error::arity_error(Arity::AtLeast(1), 0));
    };
    for expr in init {
        eval(expr, env, ctx)?;
    }
    eval(last, env, ctx)
}

/// `unquote` outside a quasiquote template
pub(crate) fn eval_unquote(_args: &[Value], _env: &Env, _ctx: Context<'_>) -> Result<Value, Error> {
    Err(Error::InvalidForm(
        "unquote is only valid inside quasiquote".to_owned(),
    ))
}

/// Create a global environment with the builtin registry and the constants
/// `nil`, `true`, `false` and `BaseClass`
pub fn create_global_env(symbols: &mut SymbolTable, runtime: &Runtime) -> Env {
    let env = Environment::new_global();

    for builtin_op in get_builtin_ops() {
        env.bind(&symbols.intern(builtin_op.name), Value::Builtin(builtin_op));
    }

    env.bind(&symbols.intern("nil"), Value::Nil);
    env.bind(&symbols.intern("true"), Value::Bool(true));
    env.bind(&symbols.intern("false"), Value::Bool(false));
    env.bind(
        &symbols.intern("BaseClass"),
        Value::Class(Class::new(runtime.fresh_class_id(), Vec::new())),
    );

    env
}
