//! Embedding facade.
//!
//! An [`Interpreter`] owns everything one Lisp world needs: the symbol table,
//! the runtime (keywords, limits, class ids) and the global frame.
//!
//! ```
//! use slotlisp::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! interp.eval_str("(define (square x) (* x x))").unwrap();
//! assert_eq!(interp.eval_str("(square 12)").unwrap().to_string(), "144");
//! ```

use tracing::warn;

use crate::ast::Value;
use crate::environment::Env;
use crate::evaluator::{Context, Runtime, create_global_env, eval};
use crate::reader::parse_program;
use crate::symbol::{Symbol, SymbolTable};
use crate::{Error, EvalConfig};

pub struct Interpreter {
    symbols: SymbolTable,
    runtime: Runtime,
    global: Env,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        let mut symbols = SymbolTable::new();
        let runtime = Runtime::new(symbols.keywords().clone(), config);
        let global = create_global_env(&mut symbols, &runtime);
        Interpreter {
            symbols,
            runtime,
            global,
        }
    }

    /// Read every form in `source` without evaluating anything
    pub fn parse(&mut self, source: &str) -> Result<Vec<Value>, Error> {
        parse_program(source, &mut self.symbols)
    }

    /// Evaluate one form in the global frame
    pub fn eval(&self, expr: &Value) -> Result<Value, Error> {
        eval(expr, &self.global, Context::new(&self.runtime))
    }

    /// Parse and evaluate all forms, returning the value of the last one.
    ///
    /// Stops at the first error. An empty source evaluates to `nil`.
    pub fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let forms = self.parse(source)?;
        let mut result = Value::Nil;
        for form in &forms {
            result = self.eval(form)?;
        }
        Ok(result)
    }

    /// Parse and evaluate all forms, continuing past evaluation errors.
    ///
    /// A parse error aborts before anything is evaluated.
    pub fn run_source(&mut self, source: &str) -> Result<Vec<Result<Value, Error>>, Error> {
        let forms = self.parse(source)?;
        Ok(forms
            .iter()
            .map(|form| {
                let result = self.eval(form);
                if let Err(err) = &result {
                    warn!(form = %form, error = %err, "form failed");
                }
                result
            })
            .collect())
    }

    pub fn global(&self) -> &Env {
        &self.global
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn config(&self) -> EvalConfig {
        self.runtime.config
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_eval_str_returns_last_value() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_str("").unwrap(), Value::Nil);
        assert_eq!(
            interp.eval_str("(define a 1) (define b 2) (+ a b)").unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn test_eval_str_stops_at_first_error() {
        let mut interp = Interpreter::new();
        assert!(interp.eval_str("(define a 1) (car a) (define b 2)").is_err());
        assert_eq!(interp.eval_str("a").unwrap(), Value::Integer(1));
        assert!(matches!(interp.eval_str("b"), Err(Error::MissingSym(_))));
    }

    #[test]
    fn test_run_source_continues_after_errors() {
        let mut interp = Interpreter::new();
        let results = interp
            .run_source("(define a 1) (car a) (define b 2) b")
            .unwrap();
        assert_eq!(results.len(), 4);
        assert!(results[1].is_err());
        assert_eq!(results[3].as_ref().unwrap(), &Value::Integer(2));

        assert!(matches!(
            interp.run_source("(define c 3) (unclosed"),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(interp.eval_str("c"), Err(Error::MissingSym(_))));
    }

    #[test]
    fn test_interpreters_are_isolated() {
        let mut first = Interpreter::new();
        let mut second = Interpreter::new();
        first.eval_str("(define only-here 1)").unwrap();
        assert!(second.eval_str("only-here").is_err());

        // Class ids restart per interpreter
        assert_eq!(first.eval_str("(class BaseClass)").unwrap().to_string(), "#<class:1>");
        assert_eq!(second.eval_str("(class BaseClass)").unwrap().to_string(), "#<class:1>");
    }

    #[test]
    fn test_global_bindings_listing() {
        let mut interp = Interpreter::new();
        interp.eval_str("(define zeta 26)").unwrap();
        let names: Vec<String> = interp
            .global()
            .bindings()
            .into_iter()
            .map(|(name, _)| name.name().to_owned())
            .collect();
        assert!(names.contains(&"BaseClass".to_owned()));
        assert!(names.contains(&"zeta".to_owned()));
        assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));

        let zeta = interp.intern("zeta");
        assert_eq!(interp.global().lookup(&zeta).unwrap(), Value::Integer(26));
        assert!(interp.symbols().get("zeta").is_some());
        assert_eq!(interp.config().max_depth, crate::MAX_EVAL_DEPTH);
    }
}
