//! slotlisp - a small Lisp with macros, quasiquote and permissioned classes
//!
//! The interpreter is organised around four pieces:
//!
//! - a term model ([`ast::Value`]) of atoms, cons pairs, procedures and classes,
//! - a binding engine: one permissioned slot table ([`slots::SlotTable`]) composed
//!   by both lexical scope frames ([`environment::Environment`]) and objects
//!   ([`class::Class`]),
//! - an evaluator ([`evaluator`]) with a closed special-form table and the
//!   application protocol for lambdas, macros, builtins and class instances,
//! - a quasiquote engine ([`quasiquote`]) for code templates.
//!
//! ```scheme
//! (define (factorial n) (if (= n 0) 1 (* n (factorial (- n 1)))))
//! (factorial 8)                      ; 40320
//! ((mac (x) x) (+ 1 2))              ; 3, the expansion runs in the caller
//! `(list ,(+ 1 2) 4)                 ; (list 3 4)
//!
//! (define Point (class BaseClass))
//! (class-define! Point x integer)
//! (class-chmod! Point x private)
//! (class-set! Point x 10)            ; InvalidPermission from outside
//! ```
//!
//! ## Evaluation model
//!
//! - `if` takes its consequent only when the predicate is identically `true`
//! - Arithmetic works on checked 64-bit integers and reports overflow
//! - Macros are not hygienic; an expansion is evaluated in the caller's frame
//! - Evaluation depth is bounded, runaway recursion is a recoverable error
//!
//! ## Modules
//!
//! - `reader`: S-expression parsing from text
//! - `evaluator`: Core expression evaluation engine
//! - `builtinops`: Built-in operations and special forms registry
//! - `interpreter`: Embedding facade owning the symbol table and global frame
//! - `repl`: Helpers for interactive and file-driven front ends

use crate::evaluator::Arity;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures in the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Default maximum evaluation depth
/// Sized so runaway recursion is caught within a 2 MiB thread stack in debug
/// builds. A Lisp-level call costs about four nested evaluations.
pub const MAX_EVAL_DEPTH: usize = 128;

/// Tunable limits for an interpreter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Nesting depth at which evaluation fails with [`Error::RecursionTooDeep`]
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// Implementation-imposed limit exceeded (integer overflow)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with a context snippet around `error_offset` (a byte offset)
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let error_offset = error_offset.min(input.len());
        let char_offset = input
            .char_indices()
            .take_while(|(idx, _)| *idx < error_offset)
            .count();
        let context_start = char_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),
    /// Lookup or assignment of a name absent from the whole scope chain
    #[error("MissingSym: {0} is not defined")]
    MissingSym(String),
    /// Redeclaration of a slot in the same table
    #[error("AlreadyDefined: {0} is already defined")]
    AlreadyDefined(String),
    /// Permission denied, virtual slot access, or structural change to a finalised class
    #[error("InvalidPermission: {0}")]
    InvalidPermission(String),
    /// Read of a slot that was declared but never written
    #[error("UnsetValue: {0} has no value")]
    UnsetValue(String),
    #[error(
        "InvalidArity: {}expected {expected} arguments, got {got}",
        expression_prefix(.expression)
    )]
    InvalidArity {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    /// Special form or parameter list with the wrong shape
    #[error("InvalidForm: {0}")]
    InvalidForm(String),
    #[error("NotCallable: {0}")]
    NotCallable(String),
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("RecursionTooDeep: evaluation depth limit exceeded (max: {0})")]
    RecursionTooDeep(usize),
}

impl Error {
    /// Create an InvalidArity error without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::InvalidArity {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an InvalidArity error naming the offending expression
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: String) -> Self {
        Error::InvalidArity {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

fn expression_prefix(expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("expression {expr}: "),
        None => String::new(),
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod class;
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod intooperation;
pub mod procedure;
pub mod quasiquote;
pub mod reader;
pub mod repl;
pub mod slots;
pub mod symbol;

pub use interpreter::Interpreter;
