//! Quasiquote template expansion.
//!
//! A template is copied structurally. Any sub-list headed by `unquote` is
//! replaced by the value of its argument, and a nested `quasiquote` is kept
//! verbatim. Expansion checks every pair of the spine, so an unquote in
//! dotted position (`` `(a . ,b) ``) is found as well.

use crate::Error;
use crate::ast::{Value, list_with_tail};
use crate::environment::Env;
use crate::evaluator::{Arity, Context, eval};

/// Evaluate quasiquote special form
pub(crate) fn eval_quasiquote(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [template] => expand(template, env, ctx),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Expand `template`, evaluating unquoted parts in `env`.
///
/// Depth is charged once per nesting level; the rest spine is walked in a loop.
pub fn expand(template: &Value, env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    if !matches!(template, Value::Pair(_)) {
        return Ok(template.clone());
    }
    let ctx = ctx.enter()?;
    let keywords = ctx.keywords();

    let mut items = Vec::new();
    let mut current = template;
    let tail = loop {
        let Value::Pair(pair) = current else {
            break current.clone();
        };
        if let Value::Symbol(head) = &pair.first {
            if *head == keywords.unquote {
                break match pair.rest.list_elements()?.as_slice() {
                    [expr] => eval(expr, env, ctx)?,
                    args => {
                        return Err(Error::arity_error_with_expr(
                            Arity::Exact(1),
                            args.len(),
                            current.to_string(),
                        ));
                    }
                };
            }
            if *head == keywords.quasiquote {
                break current.clone();
            }
            if *head == keywords.unquote_splicing {
                return Err(Error::InvalidForm(format!(
                    "unquote-splicing is not supported: {current}"
                )));
            }
        }
        items.push(expand(&pair.first, env, ctx)?);
        current = &pair.rest;
    };

    Ok(list_with_tail(items, tail))
}
