use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace1, not_line_ending},
    combinator::recognize,
    error::ErrorKind,
    multi::many0_count,
    sequence::pair,
};

use crate::ast::{NumberType, Value, from_list, is_atom_char, list_with_tail};
use crate::symbol::{Symbol, SymbolTable};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

type ReadError<'a> = nom::Err<nom::error::Error<&'a str>>;

fn fail(input: &str, code: ErrorKind) -> ReadError<'_> {
    nom::Err::Error(nom::error::Error::new(input, code))
}

/// Skip whitespace and `;` line comments
fn skip_ws(input: &str) -> IResult<&str, usize> {
    many0_count(alt((
        multispace1,
        recognize(pair(char(';'), not_line_ending)),
    )))
    .parse(input)
}

/// `[-+]?[0-9]+`; any other atom is a symbol
fn is_integer_literal(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::from(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return Err(fail(remaining, ErrorKind::Escaped)),
                    None => return Err(fail(char_iter.as_str(), ErrorKind::Eof)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(fail(remaining, ErrorKind::Eof)),
        }
    }
}

/// Recursive-descent reader interning symbols into one table.
///
/// Dispatch is on the first character, so the parsers never backtrack over
/// a partially interned expression.
struct Reader<'s> {
    symbols: &'s mut SymbolTable,
}

impl Reader<'_> {
    fn expr<'a>(&mut self, input: &'a str, depth: usize) -> IResult<&'a str, Value> {
        if depth >= MAX_PARSE_DEPTH {
            return Err(fail(input, ErrorKind::TooLarge));
        }
        let (input, _) = skip_ws(input)?;
        match input.chars().next() {
            None => Err(fail(input, ErrorKind::Eof)),
            Some('(') => self.list(input, depth),
            Some('"') => parse_string(input),
            Some('\'') => {
                let quote = self.symbols.keywords().quote.clone();
                self.prefixed(input, "'", quote, depth)
            }
            Some('`') => {
                let quasiquote = self.symbols.keywords().quasiquote.clone();
                self.prefixed(input, "`", quasiquote, depth)
            }
            Some(',') if input.starts_with(",@") => {
                let splicing = self.symbols.keywords().unquote_splicing.clone();
                self.prefixed(input, ",@", splicing, depth)
            }
            Some(',') => {
                let unquote = self.symbols.keywords().unquote.clone();
                self.prefixed(input, ",", unquote, depth)
            }
            Some(c) if is_atom_char(c) => self.atom(input),
            Some(_) => Err(fail(input, ErrorKind::Char)),
        }
    }

    fn atom<'a>(&mut self, input: &'a str) -> IResult<&'a str, Value> {
        let (remaining, token) = take_while1(is_atom_char).parse(input)?;
        if is_integer_literal(token) {
            return match token.parse::<NumberType>() {
                Ok(n) => Ok((remaining, Value::Integer(n))),
                Err(_) => Err(fail(input, ErrorKind::Digit)),
            };
        }
        Ok((remaining, Value::Symbol(self.symbols.intern(token))))
    }

    /// `'x` and friends read as `(keyword x)`
    fn prefixed<'a>(
        &mut self,
        input: &'a str,
        prefix: &str,
        keyword: Symbol,
        depth: usize,
    ) -> IResult<&'a str, Value> {
        let (input, _) = tag(prefix).parse(input)?;
        let (input, expr) = self.expr(input, depth + 1)?;
        Ok((input, from_list(vec![Value::Symbol(keyword), expr, Value::Nil])))
    }

    fn list<'a>(&mut self, input: &'a str, depth: usize) -> IResult<&'a str, Value> {
        let (mut input, _) = char('(').parse(input)?;
        let mut elements = Vec::new();

        loop {
            let (rest, _) = skip_ws(input)?;
            input = rest;
            match input.chars().next() {
                None => return Err(fail(input, ErrorKind::Eof)),
                Some(')') => return Ok((&input[1..], list_with_tail(elements, Value::Nil))),
                Some('.') if !elements.is_empty() => {
                    let (rest, tail) = self.expr(&input[1..], depth + 1)?;
                    let (rest, _) = skip_ws(rest)?;
                    return match rest.chars().next() {
                        Some(')') => Ok((&rest[1..], list_with_tail(elements, tail))),
                        None => Err(fail(rest, ErrorKind::Eof)),
                        Some(_) => Err(fail(rest, ErrorKind::Char)),
                    };
                }
                Some(_) => {
                    let (rest, element) = self.expr(input, depth + 1)?;
                    elements.push(element);
                    input = rest;
                }
            }
        }
    }
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(input: &str, error: ReadError<'_>) -> ParseError {
    let (remaining, code) = match &error {
        nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, e.code),
        nom::Err::Incomplete(_) => ("", ErrorKind::Eof),
    };
    let position = input.len().saturating_sub(remaining.len());
    let found = remaining.chars().next().map(String::from);

    let (kind, message) = match code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Eof => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        ErrorKind::Digit => (
            ParseErrorKind::ImplementationLimit,
            format!("Integer literal out of range at position {position}"),
        ),
        ErrorKind::Escaped => (
            ParseErrorKind::InvalidSyntax,
            format!("Unknown escape sequence at position {position}"),
        ),
        _ => {
            let near: String = remaining.chars().take(10).collect();
            (
                ParseErrorKind::InvalidSyntax,
                format!("Invalid syntax near '{near}'"),
            )
        }
    };
    ParseError::with_context_and_found(kind, message, input, position, found)
}

/// Parse exactly one expression; only whitespace and comments may follow it
pub fn parse_expr(input: &str, symbols: &mut SymbolTable) -> Result<Value, Error> {
    let mut reader = Reader { symbols };
    let (remaining, value) = reader
        .expr(input, 0)
        .map_err(|e| to_parse_error(input, e))?;
    let (remaining, _) = skip_ws(remaining).map_err(|e| to_parse_error(input, e))?;
    if remaining.is_empty() {
        Ok(value)
    } else {
        let position = input.len() - remaining.len();
        Err(ParseError::with_context_and_found(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input at position {position}"),
            input,
            position,
            remaining.chars().next().map(String::from),
        )
        .into())
    }
}

/// Parse every expression in `input`, in order
pub fn parse_program(input: &str, symbols: &mut SymbolTable) -> Result<Vec<Value>, Error> {
    let mut reader = Reader { symbols };
    let mut forms = Vec::new();
    let mut remaining = input;
    loop {
        let (rest, _) = skip_ws(remaining).map_err(|e| to_parse_error(input, e))?;
        if rest.is_empty() {
            return Ok(forms);
        }
        let (rest, form) = reader
            .expr(rest, 0)
            .map_err(|e| to_parse_error(input, e))?;
        forms.push(form);
        remaining = rest;
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Renders(&'static str),               // Parsing should succeed and render like this
        SpecificError(ParseErrorKind, &'static str), // Should fail with this kind and message fragment
        Error,                               // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            let mut symbols = SymbolTable::new();
            let result = parse_expr(input, &mut symbols);

            match (result, expected) {
                (Ok(actual), Renders(expected_text)) => {
                    let displayed = actual.to_string();
                    assert_eq!(displayed, *expected_text, "{test_id}: value mismatch");

                    // display -> parse -> display is stable
                    let reparsed = parse_expr(&displayed, &mut symbols).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        reparsed.to_string(),
                        displayed,
                        "{test_id}: round-trip display mismatch"
                    );
                }
                (Err(_), Error) => {}
                (Err(crate::Error::ParseError(err)), SpecificError(kind, text)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: kind mismatch ({err})");
                    assert!(
                        err.message.contains(text),
                        "{test_id}: error should contain '{text}', got {}",
                        err.message
                    );
                }
                (Err(err), SpecificError(..)) => {
                    panic!("{test_id}: expected a parse error, got {err:?}");
                }
                (Ok(actual), Error | SpecificError(..)) => {
                    panic!("{test_id}: expected error, got {actual}");
                }
                (Err(err), Renders(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_reader_comprehensive() {
        let test_cases = vec![
            // ===== INTEGERS =====
            ("42", Renders("42")),
            ("-5", Renders("-5")),
            ("+7", Renders("7")),
            ("0001", Renders("1")),
            ("-0", Renders("0")),
            ("9223372036854775807", Renders("9223372036854775807")),
            ("-9223372036854775808", Renders("-9223372036854775808")),
            (
                "99999999999999999999",
                SpecificError(ParseErrorKind::ImplementationLimit, "out of range"),
            ),
            // ===== SYMBOLS =====
            ("foo", Renders("foo")),
            ("+", Renders("+")),
            ("-", Renders("-")),
            (">=", Renders(">=")),
            ("set!", Renders("set!")),
            ("is?", Renders("is?")),
            ("a_b%c^d&e/f", Renders("a_b%c^d&e/f")),
            // Not integers, so symbols
            ("5a", Renders("5a")),
            ("--1", Renders("--1")),
            ("+a1", Renders("+a1")),
            ("-10+", Renders("-10+")),
            ("nil", Renders("nil")),
            ("true", Renders("true")),
            // ===== STRINGS =====
            ("\"hello world\"", Renders("\"hello world\"")),
            (r#""line\nbreak""#, Renders(r#""line\nbreak""#)),
            (r#""quote\"inside""#, Renders(r#""quote\"inside""#)),
            (r#""back\\slash""#, Renders(r#""back\\slash""#)),
            ("\"\"", Renders("\"\"")),
            ("\"(not a list)\"", Renders("\"(not a list)\"")),
            (
                r#""bad\qescape""#,
                SpecificError(ParseErrorKind::InvalidSyntax, "escape"),
            ),
            (
                "\"unterminated",
                SpecificError(ParseErrorKind::Incomplete, "end of input"),
            ),
            // ===== LISTS =====
            ("()", Renders("nil")),
            ("(   )", Renders("nil")),
            ("(1 2 3)", Renders("(1 2 3)")),
            ("( 1   2\t\n3 )", Renders("(1 2 3)")),
            ("((1 2) (3 4))", Renders("((1 2) (3 4))")),
            ("(a . b)", Renders("(a . b)")),
            ("(a b . c)", Renders("(a b . c)")),
            ("(a . (b c))", Renders("(a b c)")),
            ("(a . ())", Renders("(a)")),
            ("(a .b)", Renders("(a . b)")),
            ("(. a)", Error),
            ("(a . b c)", SpecificError(ParseErrorKind::InvalidSyntax, "Invalid syntax")),
            ("(a . )", Error),
            ("(a b", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            // ===== PREFIX FORMS =====
            ("'a", Renders("(quote a)")),
            ("'(1 2)", Renders("(quote (1 2))")),
            ("`(a ,b)", Renders("(quasiquote (a (unquote b)))")),
            ("`(a ,@b)", Renders("(quasiquote (a (unquote-splicing b)))")),
            ("'()", Renders("(quote nil)")),
            ("''a", Renders("(quote (quote a))")),
            ("'", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            // ===== WHITESPACE AND COMMENTS =====
            ("  42  ", Renders("42")),
            ("\t foo \n", Renders("foo")),
            ("; leading comment\n42", Renders("42")),
            ("(1 ; inner comment\n 2)", Renders("(1 2)")),
            ("42 ; trailing comment", Renders("42")),
            // ===== GENERAL ERROR CASES =====
            ("", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            ("   ", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            ("; only a comment", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            (")", SpecificError(ParseErrorKind::InvalidSyntax, "Invalid syntax")),
            ("@invalid", Error),
            ("#t", Error),
            ("3.14", Error),
            ("1 2", SpecificError(ParseErrorKind::TrailingContent, "remaining input")),
            ("(1 2))", SpecificError(ParseErrorKind::TrailingContent, "remaining input")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parser_depth_limits() {
        let parens_under_limit = format!(
            "{}a{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let quotes_under_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH - 1));
        let deep_parens_at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );
        let deep_quotes_at_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH));

        run_parse_tests(vec![
            (
                deep_parens_at_limit.as_str(),
                SpecificError(ParseErrorKind::TooDeeplyNested, "too deeply nested"),
            ),
            (
                deep_quotes_at_limit.as_str(),
                SpecificError(ParseErrorKind::TooDeeplyNested, "too deeply nested"),
            ),
        ]);

        let mut symbols = SymbolTable::new();
        assert!(parse_expr(&parens_under_limit, &mut symbols).is_ok());
        assert!(parse_expr(&quotes_under_limit, &mut symbols).is_ok());
    }

    #[test]
    fn test_reader_interns_symbols() {
        let mut symbols = SymbolTable::new();
        let first = parse_expr("(foo bar foo)", &mut symbols).unwrap();
        let elements = first.list_elements().unwrap();
        assert!(elements[0].is(&elements[2]));
        assert!(!elements[0].is(&elements[1]));

        let again = parse_expr("foo", &mut symbols).unwrap();
        assert!(again.is(&elements[0]));

        let quoted = parse_expr("'x", &mut symbols).unwrap();
        let head = quoted.list_elements().unwrap()[0].clone();
        assert_eq!(head.as_symbol(), Some(&symbols.keywords().quote));
    }

    #[test]
    fn test_long_list_reads_and_drops() {
        let mut symbols = SymbolTable::new();
        let elements: Vec<String> = (0..150_000).map(|i| i.to_string()).collect();
        let source = format!("({})", elements.join(" "));
        let list = parse_expr(&source, &mut symbols).unwrap();
        let items = crate::ast::to_list(&list);
        assert_eq!(items.len(), 150_001);
        assert_eq!(items[149_999], Value::Integer(149_999));
        drop(items);
        drop(list);
    }

    #[test]
    fn test_parse_program() {
        let mut symbols = SymbolTable::new();
        let forms = parse_program(
            "; a program\n(define x 1)\n\n(define y 2) ; trailing\nx",
            &mut symbols,
        )
        .unwrap();
        let rendered: Vec<String> = forms.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["(define x 1)", "(define y 2)", "x"]);

        assert!(parse_program("", &mut symbols).unwrap().is_empty());
        assert!(parse_program("  ; nothing\n", &mut symbols).unwrap().is_empty());

        let err = parse_program("(define x 1)\n(oops", &mut symbols).unwrap_err();
        match err {
            crate::Error::ParseError(err) => {
                assert_eq!(err.kind, ParseErrorKind::Incomplete);
                assert!(err.context.is_some());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
