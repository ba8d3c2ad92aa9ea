// Recursive-descent parser core: cursor helpers, newline handling,
// doc-comment threading, and the two recovery primitives.

use crate::{ParseError, ParseResult};
use ard_ast::{Location, Program};
use ard_lexer::{Token, TokenKind};

mod expressions;
mod items;
mod patterns;
mod primaries;
mod statements;
mod types;

pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) errors: Vec<ParseError>,
    /// Comment text collected while skipping, attached to the next
    /// declaration as documentation.
    pub(crate) pending_doc: Vec<String>,
    /// Struct-literal suppression for `if cond {` style positions.
    pub(crate) no_struct_literal: bool,
}

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(source: &str) -> Self {
        let mut parser = Self {
            tokens: ard_lexer::tokenize(source),
            current: 0,
            errors: Vec::new(),
            pending_doc: Vec::new(),
            no_struct_literal: false,
        };
        parser.swallow_comments();
        parser
    }

    /// Parse the whole file. Imports are accepted only before the
    /// first non-import statement.
    pub fn parse(mut self) -> ParseResult {
        let mut program = Program::default();

        self.skip_newlines();
        while self.check(TokenKind::Use) {
            match self.parse_use() {
                Ok(import) => program.imports.push(import),
                Err(error) => {
                    self.record(error);
                    self.synchronize();
                }
            }
            self.skip_newlines();
        }

        while !self.is_at_end() {
            self.skip_newlines();
            if self.is_at_end() {
                break;
            }
            if self.check(TokenKind::Use) {
                let location = self.location();
                self.record(ParseError::new(
                    location,
                    "Imports must appear at the top of the file",
                ));
                self.synchronize();
                continue;
            }
            match self.parse_statement() {
                Ok(statement) => program.statements.push(statement),
                Err(error) => {
                    self.record(error);
                    self.synchronize();
                }
            }
        }

        ParseResult {
            program,
            errors: self.errors,
        }
    }

    // ==================== Cursor helpers ====================

    pub(crate) fn peek(&self) -> &Token {
        self.tokens
            .get(self.current)
            .unwrap_or_else(|| self.eof_token())
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn eof_token(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        self.tokens.last().unwrap_or_else(|| {
            unreachable!("token stream is never empty")
        })
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn location(&self) -> Location {
        let token = self.peek();
        Location::new(token.line, token.column)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        self.swallow_comments();
        token
    }

    /// Comments never participate in the grammar; their text is kept
    /// for doc attachment.
    fn swallow_comments(&mut self) {
        while matches!(
            self.peek_kind(),
            TokenKind::Comment | TokenKind::BlockComment
        ) {
            let text = self.peek().text.clone();
            self.pending_doc.push(text);
            self.current += 1;
        }
    }

    /// Doc text accumulated since the last declaration, if any.
    pub(crate) fn take_doc(&mut self) -> Option<String> {
        if self.pending_doc.is_empty() {
            return None;
        }
        Some(self.pending_doc.drain(..).collect::<Vec<_>>().join("\n"))
    }

    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) -> Parsed<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    /// Accept an identifier, or a keyword in name position.
    pub(crate) fn consume_word(&mut self, message: &str) -> Parsed<Token> {
        if self.peek_kind().is_word() {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(TokenKind::NewLine) {
            self.advance();
        }
    }

    /// Statement terminator: newline, or a token that closes the
    /// enclosing block.
    pub(crate) fn expect_terminator(&mut self) -> Parsed<()> {
        match self.peek_kind() {
            TokenKind::NewLine => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::RightBrace => Ok(()),
            _ => Err(self.error("Expected a newline after statement")),
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.location(), message)
    }

    pub(crate) fn record(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    // ==================== Recovery ====================

    /// Advance until a newline or the end of input.
    pub(crate) fn synchronize(&mut self) {
        while !self.is_at_end() && !self.check(TokenKind::NewLine) {
            self.advance();
        }
        self.skip_newlines();
    }

    /// Advance until one of `targets`, tracking bracket nesting when a
    /// closer is among the targets so that an inner closer does not
    /// satisfy an outer one.
    pub(crate) fn synchronize_to(&mut self, targets: &[TokenKind]) {
        let tracking = targets.iter().any(|t| {
            matches!(
                t,
                TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket
            )
        });
        let mut depth: i32 = 0;
        while !self.is_at_end() {
            let kind = self.peek_kind();
            if depth == 0 && targets.contains(&kind) {
                return;
            }
            if tracking {
                match kind {
                    TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket => {
                        depth += 1
                    }
                    TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket => {
                        depth -= 1;
                        if depth < 0 {
                            return;
                        }
                    }
                    _ => {}
                }
            }
            self.advance();
        }
    }

}
