//! User-defined procedures: `lambda` closures and `mac` macros.
//!
//! Both kinds share one parameter-binding algorithm. They differ in whether
//! arguments are evaluated before binding and in what happens to the body's
//! result: a function returns it, a macro treats it as an expansion and
//! evaluates it again in the caller's frame.

use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::ast::{Value, proper_list};
use crate::environment::{Env, Environment};
use crate::evaluator::{Arity, Context, eval, eval_args};
use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaKind {
    Function,
    Macro,
}

/// Parameter specification: a fixed prefix plus an optional rest symbol.
///
/// `()` has neither, `args` is rest only, `(a b)` is fixed only and
/// `(a . more)` has both.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub fixed: Vec<Symbol>,
    pub rest: Option<Symbol>,
}

impl Params {
    pub fn parse(spec: &Value) -> Result<Params, Error> {
        let mut fixed: Vec<Symbol> = Vec::new();
        let mut current = spec;
        loop {
            match current {
                Value::Nil => return Ok(Params { fixed, rest: None }),
                Value::Symbol(rest) => {
                    if fixed.contains(rest) {
                        return Err(duplicate(rest));
                    }
                    return Ok(Params {
                        fixed,
                        rest: Some(rest.clone()),
                    });
                }
                Value::Pair(pair) => {
                    let Value::Symbol(name) = &pair.first else {
                        return Err(Error::InvalidForm(format!(
                            "parameters must be symbols, got {}",
                            pair.first
                        )));
                    };
                    if fixed.contains(name) {
                        return Err(duplicate(name));
                    }
                    fixed.push(name.clone());
                    current = &pair.rest;
                }
                other => {
                    return Err(Error::InvalidForm(format!(
                        "invalid parameter list: {other}"
                    )));
                }
            }
        }
    }

    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.fixed.len()),
            None => Arity::Exact(self.fixed.len()),
        }
    }

    /// Bind `args` into `frame`, packing any surplus into the rest parameter.
    fn bind(&self, mut args: Vec<Value>, frame: &Environment) -> Result<(), Error> {
        self.arity().validate(args.len())?;
        let surplus = args.split_off(self.fixed.len());
        for (name, value) in self.fixed.iter().zip(args) {
            frame.define(name, value)?;
        }
        if let Some(rest) = &self.rest {
            frame.define(rest, proper_list(surplus))?;
        }
        Ok(())
    }
}

fn duplicate(name: &Symbol) -> Error {
    Error::InvalidForm(format!("duplicate parameter name: {name}"))
}

/// A closure over the frame where its `lambda` or `mac` form was evaluated.
pub struct Lambda {
    pub params: Params,
    /// Always a `(begin ...)` form
    pub body: Value,
    pub env: Env,
    pub kind: LambdaKind,
}

/// Apply a closure to the unevaluated argument terms of a call made in `env`.
pub fn call_lambda(
    lambda: &Rc<Lambda>,
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
) -> Result<Value, Error> {
    let values = match lambda.kind {
        LambdaKind::Function => eval_args(args, env, ctx)?,
        LambdaKind::Macro => args.to_vec(),
    };
    trace!(kind = ?lambda.kind, args = values.len(), depth = ctx.depth(), "applying closure");

    let frame = Environment::with_parent(&lambda.env);
    lambda.params.bind(values, &frame)?;
    let result = eval(&lambda.body, &frame, ctx)?;

    match lambda.kind {
        LambdaKind::Function => Ok(result),
        LambdaKind::Macro => {
            trace!(expansion = %result, "macro expanded");
            eval(&result, env, ctx)
        }
    }
}
