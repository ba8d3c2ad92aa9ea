// Statement-level parsing: declarations are delegated to items.rs,
// control flow and assignment forms live here.

use super::Parser;
use crate::ParseError;
use ard_ast::{
    Block, CompoundOp, Expression, ExpressionKind, Statement, StatementKind,
};
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> Parsed<Statement> {
        match self.peek_kind() {
            TokenKind::Let | TokenKind::Mut => self.parse_variable_declaration(),
            TokenKind::Fn => self.parse_function_declaration(false),
            TokenKind::Private => self.parse_private_declaration(),
            TokenKind::Struct => self.parse_struct_definition(false),
            TokenKind::Enum => self.parse_enum_definition(false),
            TokenKind::Trait => self.parse_trait_definition(),
            TokenKind::Impl => self.parse_impl(),
            TokenKind::Type => self.parse_type_declaration(false),
            TokenKind::Extern => self.parse_external_function(),
            TokenKind::While => self.parse_while_loop(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => self.parse_break(),
            _ => self.parse_expression_statement(),
        }
    }

    /// `let|mut name [: Type] = expr`
    fn parse_variable_declaration(&mut self) -> Parsed<Statement> {
        let location = self.location();
        let mutable = self.advance().kind == TokenKind::Mut;
        let name = self.consume(TokenKind::Identifier, "Expected variable name")?;

        let declared_type = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        if !self.match_kind(TokenKind::Equal) {
            // Missing `=`: record and skip to the next statement; the
            // declaration is dropped.
            let error = self.error(format!(
                "Expected '=' after variable name '{}'",
                name.text
            ));
            return Err(error);
        }

        let value = self.parse_expression()?;
        self.expect_terminator()?;

        Ok(Statement::new(
            location,
            StatementKind::VariableDeclaration {
                name: name.text,
                mutable,
                declared_type,
                value,
            },
        ))
    }

    /// `while [cond] { body }`; no condition means loop forever.
    fn parse_while_loop(&mut self) -> Parsed<Statement> {
        let location = self.location();
        self.advance();
        let condition = if self.check(TokenKind::LeftBrace) {
            None
        } else {
            Some(self.parse_condition()?)
        };
        let body = self.parse_block()?;
        Ok(Statement::new(
            location,
            StatementKind::WhileLoop { condition, body },
        ))
    }

    /// `for` heads: C-style when the cursor clause starts with
    /// `let`/`mut`, otherwise `for cursor[, cursor2] in iterable`.
    fn parse_for(&mut self) -> Parsed<Statement> {
        let location = self.location();
        self.advance();

        if matches!(self.peek_kind(), TokenKind::Let | TokenKind::Mut) {
            let init = Box::new(self.parse_for_clause_declaration()?);
            let condition = self.parse_condition()?;
            self.consume(TokenKind::Semicolon, "Expected ';' after loop condition")?;
            let step = Box::new(self.parse_for_step()?);
            let body = self.parse_block()?;
            return Ok(Statement::new(
                location,
                StatementKind::ForLoop {
                    init,
                    condition,
                    step,
                    body,
                },
            ));
        }

        let cursor = self.consume(TokenKind::Identifier, "Expected loop cursor")?;
        let cursor2 = if self.match_kind(TokenKind::Comma) {
            Some(
                self.consume(TokenKind::Identifier, "Expected second loop cursor")?
                    .text,
            )
        } else {
            None
        };
        self.consume(TokenKind::In, "Expected 'in' in for loop")?;
        let iterable = self.parse_condition()?;
        let body = self.parse_block()?;

        // A literal range iterable is a range loop with its own IR
        // shape downstream.
        if let ExpressionKind::RangeLiteral { start, end } = iterable.kind {
            return Ok(Statement::new(
                location,
                StatementKind::RangeLoop {
                    cursor: cursor.text,
                    cursor2,
                    start: *start,
                    end: *end,
                    body,
                },
            ));
        }

        Ok(Statement::new(
            location,
            StatementKind::ForInLoop {
                cursor: cursor.text,
                cursor2,
                iterable,
                body,
            },
        ))
    }

    /// The init clause of a C-style for: `let|mut name = expr ;`
    fn parse_for_clause_declaration(&mut self) -> Parsed<Statement> {
        let location = self.location();
        let mutable = self.advance().kind == TokenKind::Mut;
        let name = self.consume(TokenKind::Identifier, "Expected variable name")?;
        let declared_type = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.consume(TokenKind::Equal, "Expected '=' in loop initializer")?;
        let value = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after loop initializer")?;
        Ok(Statement::new(
            location,
            StatementKind::VariableDeclaration {
                name: name.text,
                mutable,
                declared_type,
                value,
            },
        ))
    }

    /// The step clause of a C-style for: an assignment or
    /// increment/decrement, no terminator.
    fn parse_for_step(&mut self) -> Parsed<Statement> {
        let location = self.location();
        let was = self.no_struct_literal;
        self.no_struct_literal = true;
        let target = self.parse_expression();
        self.no_struct_literal = was;
        let target = target?;
        self.finish_assignment(location, target, false)
    }

    /// `break` requires a trailing newline; a missing one is recorded
    /// but the node is still produced.
    fn parse_break(&mut self) -> Parsed<Statement> {
        let location = self.location();
        self.advance();
        if self.check(TokenKind::NewLine) {
            self.advance();
        } else if !self.is_at_end() {
            let error = self.error("Expected a newline after 'break'");
            self.record(error);
        }
        Ok(Statement::new(location, StatementKind::Break))
    }

    fn parse_expression_statement(&mut self) -> Parsed<Statement> {
        let location = self.location();

        // A bare `->` means a stray try-handler.
        if self.check(TokenKind::Arrow) {
            let error = self.error("'->' is only valid after a 'try' expression");
            self.advance();
            return Err(error);
        }

        let expression = self.parse_expression()?;

        if matches!(
            self.peek_kind(),
            TokenKind::Equal | TokenKind::Increment | TokenKind::Decrement
        ) {
            let statement = self.finish_assignment(location, expression, true)?;
            return Ok(statement);
        }

        self.expect_terminator()?;
        Ok(Statement::new(
            location,
            StatementKind::Expression(expression),
        ))
    }

    /// Parse the `= expr`, `=+ expr`, or `=- expr` tail of an
    /// assignment statement.
    fn finish_assignment(
        &mut self,
        location: ard_ast::Location,
        target: Expression,
        terminated: bool,
    ) -> Parsed<Statement> {
        let kind = match self.peek_kind() {
            TokenKind::Equal => {
                self.advance();
                let value = self.parse_expression()?;
                StatementKind::Assignment { target, value }
            }
            TokenKind::Increment => {
                self.advance();
                let value = self.parse_expression()?;
                StatementKind::CompoundAssignment {
                    target,
                    operator: CompoundOp::Increment,
                    value,
                }
            }
            TokenKind::Decrement => {
                self.advance();
                let value = self.parse_expression()?;
                StatementKind::CompoundAssignment {
                    target,
                    operator: CompoundOp::Decrement,
                    value,
                }
            }
            _ => {
                // C-style step clause without an operator: keep the
                // expression itself.
                StatementKind::Expression(target)
            }
        };
        if terminated {
            self.expect_terminator()?;
        }
        Ok(Statement::new(location, kind))
    }

    /// `{ statements }` with newline separation.
    pub(crate) fn parse_block(&mut self) -> Parsed<Block> {
        let location = self.location();
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.record(error);
                    self.synchronize_to(&[TokenKind::NewLine, TokenKind::RightBrace]);
                    self.skip_newlines();
                }
            }
            self.skip_newlines();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close block")?;
        Ok(Block {
            location,
            statements,
        })
    }

    /// An expression in condition/subject/iterable position, where a
    /// `{` begins the following block rather than a struct literal.
    pub(crate) fn parse_condition(&mut self) -> Parsed<Expression> {
        let was = self.no_struct_literal;
        self.no_struct_literal = true;
        let result = self.parse_expression();
        self.no_struct_literal = was;
        result
    }
}
