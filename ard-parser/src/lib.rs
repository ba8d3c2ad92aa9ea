// Parser for the Ard language: tokens in, surface AST plus error list
// out. Parsing never fails fatally; every recoverable syntax error is
// recorded and the parser resynchronizes to keep going.

use ard_ast::{Location, Program};
use ard_diagnostics::{codes, Diagnostic, Span};
use thiserror::Error;

mod parser;
pub use parser::Parser;

/// A recorded syntax error. The parser continues after recording one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl ParseError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        Diagnostic::error(
            codes::SYNTAX,
            self.message.clone(),
            Span::new(file, self.location.line, self.location.column, 1),
        )
    }
}

/// Output of a parse: a program (possibly partial) and every syntax
/// error encountered. The program is never absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a whole source file.
pub fn parse(source: &str) -> ParseResult {
    Parser::new(source).parse()
}
