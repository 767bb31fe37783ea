//! This module defines the term representation shared by the reader and the
//! evaluator. The main enum, [`Value`], is a closed set of variants covering atoms
//! (nil, symbols, integers, strings, booleans), immutable cons pairs, procedures,
//! builtin operations and classes. Helper functions such as [`cons`],
//! [`from_list`] and [`to_list`] convert between pair chains and flat sequences.
//!
//! Equality (`==`, the language's `equal?`) is structural for pairs and strings.
//! Identity (`is?`) is exposed separately through [`Value::is`].

use std::rc::Rc;

use crate::Error;
use crate::builtinops::BuiltinOp;
use crate::class::Class;
use crate::procedure::{Lambda, LambdaKind};
use crate::symbol::Symbol;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Characters allowed in atoms besides ASCII letters and digits
pub(crate) const ATOM_SPECIAL_CHARS: &str = "-_<>%=!^&?*+/";

pub(crate) fn is_atom_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ATOM_SPECIAL_CHARS.contains(c)
}

/// Core term type
#[derive(Clone)]
pub enum Value {
    /// The list terminator, distinct from `false`
    Nil,
    Symbol(Symbol),
    Integer(NumberType),
    String(Rc<str>),
    Bool(bool),
    /// Immutable cons cell
    Pair(Rc<Pair>),
    /// Function or macro closure
    Lambda(Rc<Lambda>),
    /// Entry of the builtin registry (functions and special forms)
    Builtin(&'static BuiltinOp),
    Class(Rc<Class>),
}

/// A cons cell. Fields are never mutated after construction.
#[derive(Clone)]
pub struct Pair {
    pub first: Value,
    pub rest: Value,
}

// Unlinks the rest spine one pair at a time so long lists drop without deep recursion
impl Drop for Pair {
    fn drop(&mut self) {
        let mut rest = std::mem::replace(&mut self.rest, Value::Nil);
        while let Value::Pair(pair) = rest {
            match Rc::try_unwrap(pair) {
                Ok(mut next) => rest = std::mem::replace(&mut next.rest, Value::Nil),
                Err(_) => break,
            }
        }
    }
}

pub fn cons(first: Value, rest: Value) -> Value {
    Value::Pair(Rc::new(Pair { first, rest }))
}

/// Build a pair chain from a flat sequence.
///
/// The collapsing is not uniform: no elements give `nil`, one element is
/// returned as is, two elements become a single pair, and longer inputs fold
/// from the right with the *last element* as the final tail. A proper list of
/// `n` items therefore needs `n + 1` inputs ending in `nil`.
pub fn from_list(items: Vec<Value>) -> Value {
    let mut iter = items.into_iter().rev();
    match iter.next() {
        None => Value::Nil,
        Some(tail) => iter.fold(tail, |rest, first| cons(first, rest)),
    }
}

/// Flatten a pair chain into its elements followed by the terminal tail.
///
/// `(a b)` gives `[a, b, nil]`, `(a . b)` gives `[a, b]` and an atom gives `[atom]`.
pub fn to_list(term: &Value) -> Vec<Value> {
    let mut items = Vec::new();
    let mut current = term;
    while let Value::Pair(pair) = current {
        items.push(pair.first.clone());
        current = &pair.rest;
    }
    items.push(current.clone());
    items
}

/// Prepend `items` onto `tail`.
pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Value {
    items
        .into_iter()
        .rev()
        .fold(tail, |rest, first| cons(first, rest))
}

/// Build a proper, `nil`-terminated list.
pub fn proper_list(items: Vec<Value>) -> Value {
    list_with_tail(items, Value::Nil)
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// Name of the value's kind, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Pair(_) => "pair",
            Value::Lambda(lambda) => match lambda.kind {
                LambdaKind::Function => "procedure",
                LambdaKind::Macro => "macro",
            },
            Value::Builtin(_) => "builtin",
            Value::Class(_) => "class",
        }
    }

    /// Elements of a proper list. `nil` is the empty list; anything else is an
    /// `InvalidForm` error.
    pub fn list_elements(&self) -> Result<Vec<Value>, Error> {
        let mut items = to_list(self);
        match items.pop() {
            Some(Value::Nil) => Ok(items),
            _ => Err(Error::InvalidForm(format!("expected a proper list, got {self}"))),
        }
    }

    /// Identity comparison backing `is?`.
    ///
    /// Pairs, strings, closures and classes are identical only when they are the
    /// same allocation. Integers, booleans, nil and interned symbols compare by
    /// value, which for symbols is their intern id.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let (mut left, mut right) = (self, other);
        // Walk list spines iteratively, recursing only into elements
        loop {
            match (left, right) {
                (Value::Pair(a), Value::Pair(b)) => {
                    if Rc::ptr_eq(a, b) {
                        return true;
                    }
                    if a.first != b.first {
                        return false;
                    }
                    left = &a.rest;
                    right = &b.rest;
                }
                (Value::String(a), Value::String(b)) => return a == b,
                (Value::Lambda(_), Value::Lambda(_))
                | (Value::Builtin(_), Value::Builtin(_))
                | (Value::Class(_), Value::Class(_))
                | (Value::Nil, Value::Nil)
                | (Value::Symbol(_), Value::Symbol(_))
                | (Value::Integer(_), Value::Integer(_))
                | (Value::Bool(_), Value::Bool(_)) => return left.is(right),
                _ => return false,
            }
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Pair(pair) => write!(f, "Pair({:?}, {:?})", pair.first, pair.rest),
            Value::Lambda(lambda) => write!(f, "Lambda({:?}, {:?})", lambda.kind, lambda.params),
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            Value::Class(class) => write!(f, "Class({})", class.id()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Pair(pair) => {
                write!(f, "({}", pair.first)?;
                let mut rest = &pair.rest;
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", next.first)?;
                            rest = &next.rest;
                        }
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Lambda(lambda) => match lambda.kind {
                LambdaKind::Function => write!(f, "#<lambda>"),
                LambdaKind::Macro => write!(f, "#<macro>"),
            },
            Value::Builtin(op) => write!(f, "#<builtin:{}>", op.name),
            Value::Class(class) => write!(f, "#<class:{}>", class.id()),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        proper_list(v.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(Error::TypeError(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for Symbol {
    type Error = Error;

    fn try_from(value: Value) -> Result<Symbol, Error> {
        match value {
            Value::Symbol(sym) => Ok(sym),
            other => Err(Error::TypeError(format!(
                "expected symbol, got {}",
                other.type_name()
            ))),
        }
    }
}
