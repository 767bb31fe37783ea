//! Classes: permissioned slot tables with inheritance and self-dispatch.
//!
//! A class is both the template and the object. `(class P1 P2)` copies the
//! variables of every ancestor into a fresh table, after which the new class
//! evolves independently of its parents. Calling a class as `(obj slot args...)`
//! runs the slot's procedure with internal access to `obj`, which is how
//! `private` slots become reachable.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::environment::{Env, Environment};
use crate::evaluator::{Arity, Context, Grant, apply, eval};
use crate::slots::{Access, Datatype, Permission, PermissionFlag, SlotTable};
use crate::symbol::Symbol;

/// Numeric identity of a class, unique within one interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    pub(crate) fn new(id: u64) -> Self {
        ClassId(id)
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Class {
    id: ClassId,
    parents: Vec<Rc<Class>>,
    /// Every transitive ancestor once, depth-first with parents in declaration order
    ancestors: Vec<Rc<Class>>,
    slots: RefCell<SlotTable>,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parent_ids: Vec<ClassId> = self.parents.iter().map(|parent| parent.id).collect();
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("parents", &parent_ids)
            .field("slots", &self.slots.borrow().variables().count())
            .finish()
    }
}

impl Class {
    /// Build a class inheriting the variables of all `parents`.
    ///
    /// Where ancestors clash on a name, the nearer and earlier-listed one wins.
    pub fn new(id: ClassId, parents: Vec<Rc<Class>>) -> Rc<Class> {
        let mut seen = HashSet::new();
        let mut ancestors = Vec::new();
        for parent in &parents {
            let lineage = std::iter::once(parent).chain(parent.ancestors.iter());
            for ancestor in lineage {
                if seen.insert(ancestor.id) {
                    ancestors.push(Rc::clone(ancestor));
                }
            }
        }

        let mut slots = SlotTable::new();
        for ancestor in ancestors.iter().rev() {
            for (name, variable) in ancestor.slots.borrow().variables() {
                slots.inherit(name, variable);
            }
        }

        debug!(
            class = %id,
            parents = parents.len(),
            ancestors = ancestors.len(),
            "constructed class"
        );
        Rc::new(Class {
            id,
            parents,
            ancestors,
            slots: RefCell::new(slots),
        })
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn parents(&self) -> &[Rc<Class>] {
        &self.parents
    }

    pub fn ancestors(&self) -> &[Rc<Class>] {
        &self.ancestors
    }

    pub fn define(&self, name: &Symbol, datatype: Option<Datatype>) -> Result<(), Error> {
        self.slots.borrow_mut().define(name, datatype)
    }

    pub fn set(&self, name: &Symbol, value: Value, access: Access) -> Result<(), Error> {
        self.slots.borrow_mut().set(name, value, access)
    }

    pub fn get(&self, name: &Symbol, access: Access) -> Result<Value, Error> {
        self.slots.borrow().get(name, access)
    }

    pub fn chmod(&self, name: &Symbol, flags: &[PermissionFlag]) -> Result<Permission, Error> {
        let permission = self.slots.borrow_mut().chmod(name, flags)?;
        debug!(class = %self.id, slot = %name, %permission, "changed slot permission");
        Ok(permission)
    }

    pub fn finalise(&self) {
        self.slots.borrow_mut().finalise();
        debug!(class = %self.id, "finalised class");
    }

    pub fn is_finalised(&self) -> bool {
        self.slots.borrow().is_finalised()
    }

    /// Slot names in intern order
    pub fn slot_names(&self) -> Vec<Symbol> {
        self.slots
            .borrow()
            .variables()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Apply `callable` to `args` with internal access to this class.
    ///
    /// The arguments are evaluated in a fresh frame under `caller` whose only
    /// binding is `self`. The grant lives on this stack frame, so it ends
    /// however the call exits.
    pub fn call(
        self: &Rc<Self>,
        callable: &Value,
        args: &[Value],
        caller: &Env,
        ctx: Context<'_>,
    ) -> Result<Value, Error> {
        let frame = Environment::with_parent(caller);
        frame.define(&ctx.keywords().self_, Value::Class(Rc::clone(self)))?;

        let grant = Grant::new(self.id, ctx.grant());
        apply(callable, args, &frame, ctx.with_grant(&grant))
    }
}

/// Apply a class used in call position: `(obj slot args...)`
pub fn call_instance(
    class: &Rc<Class>,
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
) -> Result<Value, Error> {
    let Some((selector, rest)) = args.split_first() else {
        return Err(Error::arity_error(Arity::AtLeast(1), 0));
    };
    let slot = match selector {
        Value::Symbol(name) => name.clone(),
        other => match eval(other, env, ctx)? {
            Value::Symbol(name) => name,
            value => {
                return Err(Error::TypeError(format!(
                    "slot selector must evaluate to a symbol, got {}",
                    value.type_name()
                )));
            }
        },
    };

    let value = class.get(&slot, ctx.access_to(class.id()))?;
    match value {
        Value::Lambda(_) | Value::Builtin(_) => class.call(&value, rest, env, ctx),
        Value::Class(_) if !rest.is_empty() => class.call(&value, rest, env, ctx),
        _ if rest.is_empty() => Ok(value),
        other => Err(Error::NotCallable(format!(
            "slot {slot} of class {} holds {} ({}), which takes no arguments",
            class.id(),
            other,
            other.type_name()
        ))),
    }
}

fn eval_class_operand(expr: &Value, env: &Env, ctx: Context<'_>) -> Result<Rc<Class>, Error> {
    match eval(expr, env, ctx)? {
        Value::Class(class) => Ok(class),
        other => Err(Error::TypeError(format!(
            "expected a class, got {} ({})",
            other,
            other.type_name()
        ))),
    }
}

fn literal_symbol<'v>(expr: &'v Value, what: &str) -> Result<&'v Symbol, Error> {
    expr.as_symbol()
        .ok_or_else(|| Error::InvalidForm(format!("{what} must be a symbol, got {expr}")))
}

/// Evaluate class special form
pub(crate) fn eval_class(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    let parents = args
        .iter()
        .map(|expr| eval_class_operand(expr, env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let id = ctx.runtime().fresh_class_id();
    Ok(Value::Class(Class::new(id, parents)))
}

/// Evaluate class-define! special form
pub(crate) fn eval_class_define(
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
) -> Result<Value, Error> {
    match args {
        [class_expr, name, datatype @ ..] if datatype.len() <= 1 => {
            let class = eval_class_operand(class_expr, env, ctx)?;
            let name = literal_symbol(name, "slot name")?;
            let datatype = match datatype {
                [datatype] => Some(literal_symbol(datatype, "datatype")?.name().parse::<Datatype>()?),
                _ => None,
            };
            class.define(name, datatype)?;
            Ok(Value::Nil)
        }
        _ => Err(Error::arity_error(Arity::Range(2, 3), args.len())),
    }
}

/// Evaluate class-set! special form
pub(crate) fn eval_class_set(args: &[Value], env: &Env, ctx: Context<'_>) -> Result<Value, Error> {
    match args {
        [class_expr, name, expr] => {
            let class = eval_class_operand(class_expr, env, ctx)?;
            let name = literal_symbol(name, "slot name")?;
            let value = eval(expr, env, ctx)?;
            class.set(name, value, ctx.access_to(class.id()))?;
            Ok(Value::Nil)
        }
        _ => Err(Error::arity_error(Arity::Exact(3), args.len())),
    }
}

/// Evaluate class-chmod! special form
pub(crate) fn eval_class_chmod(
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
) -> Result<Value, Error> {
    match args {
        [class_expr, name, flags @ ..] => {
            let class = eval_class_operand(class_expr, env, ctx)?;
            let name = literal_symbol(name, "slot name")?;
            let flags = flags
                .iter()
                .map(|flag| -> Result<PermissionFlag, Error> {
                    literal_symbol(flag, "permission flag")?.name().parse()
                })
                .collect::<Result<Vec<_>, _>>()?;
            class.chmod(name, &flags)?;
            Ok(Value::Nil)
        }
        _ => Err(Error::arity_error(Arity::AtLeast(2), args.len())),
    }
}

/// Evaluate class-finalize! special form
pub(crate) fn eval_class_finalize(
    args: &[Value],
    env: &Env,
    ctx: Context<'_>,
) -> Result<Value, Error> {
    match args {
        [class_expr] => {
            eval_class_operand(class_expr, env, ctx)?.finalise();
            Ok(Value::Nil)
        }
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}
