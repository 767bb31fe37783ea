//! Helpers for interactive and file-driven front ends.

use std::path::Path;

use tracing::warn;

use crate::Error;
use crate::ast::Value;
use crate::interpreter::Interpreter;

/// Gathers input lines until the brackets balance.
///
/// Brackets inside string literals and `;` comments do not count. A string
/// literal may span lines. Once a line closes every open bracket outside a
/// string, the accumulated text is handed back as one chunk of source.
#[derive(Debug, Default)]
pub struct ExpressionReader {
    buffer: String,
    depth: i64,
    in_string: bool,
}

impl ExpressionReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one line; returns the accumulated source when it is complete
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);
        self.depth += bracket_balance(line, &mut self.in_string);

        if self.depth > 0 || self.in_string || self.buffer.trim().is_empty() {
            if self.depth <= 0 && !self.in_string {
                self.reset();
            }
            return None;
        }
        self.depth = 0;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Whether earlier lines are waiting for closing brackets
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.depth = 0;
        self.in_string = false;
    }
}

/// Net count of `(` over `)` in one line, skipping strings and comments.
/// `in_string` carries an open string literal from one line to the next.
fn bracket_balance(line: &str, in_string: &mut bool) -> i64 {
    let mut balance = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match (*in_string, c) {
            (true, '\\') => {
                chars.next();
            }
            (_, '"') => *in_string = !*in_string,
            (false, ';') => break,
            (false, '(') => balance += 1,
            (false, ')') => balance -= 1,
            _ => {}
        }
    }
    balance
}

/// Outcome of loading a source file
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of forms evaluated successfully
    pub succeeded: usize,
    /// Rendered form and error for every failed form, in order
    pub failures: Vec<(String, Error)>,
    /// Value of the last successful form
    pub last_value: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(Error),
}

/// Evaluate every form of a source file, continuing past failed forms.
///
/// Unreadable files and parse errors abort the load before any evaluation.
pub fn load_file(interp: &mut Interpreter, path: &Path) -> Result<LoadReport, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_source(interp, &source)
}

pub fn load_source(interp: &mut Interpreter, source: &str) -> Result<LoadReport, LoadError> {
    let forms = interp.parse(source).map_err(LoadError::Parse)?;
    let mut report = LoadReport::default();
    for form in &forms {
        match interp.eval(form) {
            Ok(value) => {
                report.succeeded += 1;
                report.last_value = Some(value);
            }
            Err(err) => {
                warn!(form = %form, error = %err, "form failed");
                report.failures.push((form.to_string(), err));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn feed(reader: &mut ExpressionReader, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .filter_map(|line| reader.push_line(line))
            .collect()
    }

    #[test]
    fn test_expression_reader_balancing() {
        let test_cases: Vec<(Vec<&str>, Vec<&str>, bool)> = vec![
            (vec!["(+ 1 2)"], vec!["(+ 1 2)"], false),
            (vec!["(define (f x)", "  (* x 2))"], vec!["(define (f x)\n  (* x 2))"], false),
            (vec!["(a", "(b", "c))"], vec!["(a\n(b\nc))"], false),
            (vec!["(display \")\"", ")"], vec!["(display \")\"\n)"], false),
            (vec!["(a ; ) not a close", ")"], vec!["(a ; ) not a close\n)"], false),
            (vec!["(\"esc\\\"(\""], vec![], true),
            (vec!["", "   "], vec![], false),
            (vec!["42"], vec!["42"], false),
            (vec!["(open"], vec![], true),
            (vec!["x)"], vec!["x)"], false),
            (vec!["(display \"a(", "b\")"], vec!["(display \"a(\nb\")"], false),
            (vec!["(display \"a)", ")\"", ")"], vec!["(display \"a)\n)\"\n)"], false),
            (vec!["\"two", "lines\""], vec!["\"two\nlines\""], false),
            (vec!["\"still open"], vec![], true),
        ];

        for (lines, expected, pending) in test_cases {
            let mut reader = ExpressionReader::new();
            assert_eq!(feed(&mut reader, &lines), expected, "lines {lines:?}");
            assert_eq!(reader.is_pending(), pending, "pending after {lines:?}");
        }
    }

    #[test]
    fn test_reader_reset() {
        let mut reader = ExpressionReader::new();
        assert!(reader.push_line("(unfinished").is_none());
        assert!(reader.is_pending());
        reader.reset();
        assert!(!reader.is_pending());
        assert_eq!(reader.push_line("1").as_deref(), Some("1"));

        assert!(reader.push_line("\"open string").is_none());
        reader.reset();
        assert_eq!(reader.push_line("(+ 1 2)").as_deref(), Some("(+ 1 2)"));
    }

    #[test]
    fn test_load_source_reports_failures() {
        let mut interp = Interpreter::new();
        let report = load_source(
            &mut interp,
            "(define a 1)\n(car a)\n(define b (+ a 1))\nundefined\nb",
        )
        .unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, "(car a)");
        assert!(matches!(report.failures[1].1, Error::MissingSym(_)));
        assert_eq!(report.last_value, Some(Value::Integer(2)));
    }

    #[test]
    fn test_load_errors() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            load_source(&mut interp, "(define a"),
            Err(LoadError::Parse(Error::ParseError(_)))
        ));
        assert!(matches!(
            load_file(&mut interp, Path::new("/nonexistent/slotlisp/file.lisp")),
            Err(LoadError::Io { .. })
        ));
    }
}
