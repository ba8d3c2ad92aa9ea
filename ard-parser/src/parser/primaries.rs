// Primary expressions: literals, interpolated strings, containers,
// identifiers and the call/static/struct-instance forms hanging off
// them, `if`, `match`, `try`, and anonymous functions.

use super::Parser;
use crate::ParseError;
use ard_ast::{
    Block, CallArg, ConditionalCase, ElseBranch, Expression, ExpressionKind, Location, MatchCase,
    Statement, StatementKind, StrPart, TypeExpr,
};
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub(crate) fn parse_primary(&mut self) -> Parsed<Expression> {
        let location = self.location();
        match self.peek_kind() {
            TokenKind::Number => self.parse_number(),
            TokenKind::True => {
                self.advance();
                Ok(Expression::new(location, ExpressionKind::BoolLiteral(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::new(
                    location,
                    ExpressionKind::BoolLiteral(false),
                ))
            }
            TokenKind::Str => self.parse_interpolated_string(),
            TokenKind::LeftBracket => self.parse_container_literal(),
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_grouped()?;
                self.consume(TokenKind::RightParen, "Expected ')' to close grouping")?;
                Ok(inner)
            }
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Fn => self.parse_anonymous_function(),
            TokenKind::At => {
                self.advance();
                Ok(Expression::new(location, ExpressionKind::SelfRef))
            }
            TokenKind::Identifier => self.parse_identifier_expression(),
            TokenKind::Unknown => {
                let token = self.advance();
                Err(ParseError::new(
                    location,
                    format!("Unexpected character '{}'", token.text),
                ))
            }
            other => Err(self.error(format!("Expected an expression, found {}", other))),
        }
    }

    /// Inside parentheses a struct literal is unambiguous again.
    fn parse_grouped(&mut self) -> Parsed<Expression> {
        let was = self.no_struct_literal;
        self.no_struct_literal = false;
        let result = self.parse_expression();
        self.no_struct_literal = was;
        result
    }

    fn parse_number(&mut self) -> Parsed<Expression> {
        let location = self.location();
        let token = self.advance();
        if token.text.contains('.') {
            match token.text.parse::<f64>() {
                Ok(value) => Ok(Expression::new(
                    location,
                    ExpressionKind::FloatLiteral(value),
                )),
                Err(_) => Err(ParseError::new(
                    location,
                    format!("Invalid number literal '{}'", token.text),
                )),
            }
        } else {
            match token.text.parse::<i64>() {
                Ok(value) => Ok(Expression::new(location, ExpressionKind::IntLiteral(value))),
                Err(_) => Err(ParseError::new(
                    location,
                    format!("Number literal '{}' is out of range", token.text),
                )),
            }
        }
    }

    /// A string literal is chunks alternating with interpolated
    /// expressions: Str (ExprOpen expr ExprClose Str)*.
    fn parse_interpolated_string(&mut self) -> Parsed<Expression> {
        let location = self.location();
        let mut parts = Vec::new();
        let first = self.advance();
        if !first.text.is_empty() {
            parts.push(StrPart::Literal(first.text));
        }
        while self.check(TokenKind::ExprOpen) {
            self.advance();
            let inner = self.parse_grouped()?;
            parts.push(StrPart::Expr(inner));
            self.consume(TokenKind::ExprClose, "Expected '}' to close interpolation")?;
            let chunk = self.consume(TokenKind::Str, "Unterminated string literal")?;
            if !chunk.text.is_empty() {
                parts.push(StrPart::Literal(chunk.text));
            }
        }
        Ok(Expression::new(
            location,
            ExpressionKind::InterpolatedString(parts),
        ))
    }

    /// `[a, b]`, `[]`, `[k: v, ...]`, `[:]`.
    fn parse_container_literal(&mut self) -> Parsed<Expression> {
        let location = self.location();
        self.advance();
        self.skip_newlines();

        // Empty map `[:]`.
        if self.check(TokenKind::Colon) {
            self.advance();
            self.consume(TokenKind::RightBracket, "Expected ']' to close map literal")?;
            return Ok(Expression::new(location, ExpressionKind::MapLiteral(vec![])));
        }
        // Empty list `[]`.
        if self.match_kind(TokenKind::RightBracket) {
            return Ok(Expression::new(
                location,
                ExpressionKind::ListLiteral(vec![]),
            ));
        }

        let first = self.parse_grouped()?;
        if self.match_kind(TokenKind::Colon) {
            let value = self.parse_grouped()?;
            let mut entries = vec![(first, value)];
            while self.match_kind(TokenKind::Comma) {
                self.skip_newlines();
                if self.check(TokenKind::RightBracket) {
                    break;
                }
                let key = self.parse_grouped()?;
                self.consume(TokenKind::Colon, "Expected ':' in map entry")?;
                let value = self.parse_grouped()?;
                entries.push((key, value));
            }
            self.skip_newlines();
            self.consume(TokenKind::RightBracket, "Expected ']' to close map literal")?;
            return Ok(Expression::new(location, ExpressionKind::MapLiteral(entries)));
        }

        let mut items = vec![first];
        while self.match_kind(TokenKind::Comma) {
            self.skip_newlines();
            if self.check(TokenKind::RightBracket) {
                break;
            }
            items.push(self.parse_grouped()?);
        }
        self.skip_newlines();
        self.consume(TokenKind::RightBracket, "Expected ']' to close list literal")?;
        Ok(Expression::new(location, ExpressionKind::ListLiteral(items)))
    }

    fn parse_if(&mut self) -> Parsed<Expression> {
        let location = self.location();
        self.advance();
        let condition = self.parse_condition()?;
        let body = self.parse_block()?;
        let else_branch = if self.match_kind(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(Box::new(ElseBranch::If(self.parse_if()?)))
            } else {
                Some(Box::new(ElseBranch::Block(self.parse_block()?)))
            }
        } else {
            None
        };
        Ok(Expression::new(
            location,
            ExpressionKind::If {
                condition: Box::new(condition),
                body,
                else_branch,
            },
        ))
    }

    /// `match SUBJ { pat => body, ... }` or the subject-less
    /// conditional form `match { cond => body, ... }`.
    fn parse_match(&mut self) -> Parsed<Expression> {
        let location = self.location();
        self.advance();

        if self.check(TokenKind::LeftBrace) {
            return self.parse_conditional_match(location);
        }

        let subject = self.parse_condition()?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after match subject")?;
        let mut cases = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let case_location = self.location();
            let pattern = self.parse_pattern()?;
            self.consume(TokenKind::FatArrow, "Expected '=>' after match pattern")?;
            let body = self.parse_case_body()?;
            cases.push(MatchCase {
                location: case_location,
                pattern,
                body,
            });
            let separated = self.match_kind(TokenKind::Comma) | self.check(TokenKind::NewLine);
            self.skip_newlines();
            if !separated {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close match")?;
        Ok(Expression::new(
            location,
            ExpressionKind::MatchExpression {
                subject: Box::new(subject),
                cases,
            },
        ))
    }

    fn parse_conditional_match(&mut self, location: Location) -> Parsed<Expression> {
        self.consume(TokenKind::LeftBrace, "Expected '{' after 'match'")?;
        let mut cases = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let case_location = self.location();
            let condition = if self.check(TokenKind::Identifier) && self.peek().text == "_" {
                self.advance();
                None
            } else {
                Some(self.parse_condition()?)
            };
            self.consume(TokenKind::FatArrow, "Expected '=>' after match condition")?;
            let body = self.parse_case_body()?;
            cases.push(ConditionalCase {
                location: case_location,
                condition,
                body,
            });
            let separated = self.match_kind(TokenKind::Comma) | self.check(TokenKind::NewLine);
            self.skip_newlines();
            if !separated {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close match")?;
        Ok(Expression::new(
            location,
            ExpressionKind::ConditionalMatchExpression { cases },
        ))
    }

    /// A case body is a block or a single expression wrapped as one.
    fn parse_case_body(&mut self) -> Parsed<Block> {
        if self.check(TokenKind::LeftBrace) {
            return self.parse_block();
        }
        let location = self.location();
        let expression = self.parse_grouped()?;
        Ok(Block {
            location,
            statements: vec![Statement::new(
                location,
                StatementKind::Expression(expression),
            )],
        })
    }

    /// `fn (params) [Ret] { body }` in expression position.
    fn parse_anonymous_function(&mut self) -> Parsed<Expression> {
        let location = self.location();
        self.advance();
        let parameters = self.parse_parameter_list()?;
        let return_type = if self.check(TokenKind::LeftBrace) {
            None
        } else {
            Some(self.parse_type_expr()?)
        };
        let body = self.parse_block()?;
        Ok(Expression::new(
            location,
            ExpressionKind::AnonymousFunction {
                parameters,
                return_type,
                body,
            },
        ))
    }

    /// Identifier-headed forms: `try`, plain names, calls, static
    /// paths, and struct instances.
    fn parse_identifier_expression(&mut self) -> Parsed<Expression> {
        let location = self.location();
        let name = self.advance().text;

        // `try` is a keyword-recognized identifier.
        if name == "try" {
            return self.parse_try(location);
        }

        if self.check(TokenKind::ColonColon) {
            return self.parse_static_path(location, name);
        }

        if let Some(type_args) = self.try_parse_type_args() {
            let args = self.parse_call_args()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::FunctionCall {
                    name,
                    type_args,
                    args,
                },
            ));
        }

        if self.check(TokenKind::LeftParen) {
            let args = self.parse_call_args()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::FunctionCall {
                    name,
                    type_args: vec![],
                    args,
                },
            ));
        }

        if self.check(TokenKind::LeftBrace)
            && !self.no_struct_literal
            && name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        {
            let fields = self.parse_struct_instance_fields()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::StructInstance { name, fields },
            ));
        }

        Ok(Expression::new(location, ExpressionKind::Identifier(name)))
    }

    /// `try EXPR [-> NAME { BLOCK } | -> HANDLER]`. The bare-handler
    /// form desugars to `-> err { HANDLER(err) }`.
    fn parse_try(&mut self, location: Location) -> Parsed<Expression> {
        let expression = self.parse_expression()?;

        if !self.match_kind(TokenKind::Arrow) {
            return Ok(Expression::new(
                location,
                ExpressionKind::Try {
                    expression: Box::new(expression),
                    catch_name: None,
                    catch_block: None,
                },
            ));
        }

        let name = self.consume(TokenKind::Identifier, "Expected a name after '->'")?;
        if self.check(TokenKind::LeftBrace) {
            let catch_block = self.parse_block()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::Try {
                    expression: Box::new(expression),
                    catch_name: Some(name.text),
                    catch_block: Some(catch_block),
                },
            ));
        }

        // Handler-function form.
        let handler_location = Location::new(name.line, name.column);
        let call = Expression::new(
            handler_location,
            ExpressionKind::FunctionCall {
                name: name.text,
                type_args: vec![],
                args: vec![CallArg {
                    name: None,
                    mutable: false,
                    value: Expression::new(
                        handler_location,
                        ExpressionKind::Identifier("err".to_string()),
                    ),
                }],
            },
        );
        Ok(Expression::new(
            location,
            ExpressionKind::Try {
                expression: Box::new(expression),
                catch_name: Some("err".to_string()),
                catch_block: Some(Block {
                    location: handler_location,
                    statements: vec![Statement::new(
                        handler_location,
                        StatementKind::Expression(call),
                    )],
                }),
            },
        ))
    }

    /// Greedy `::` path. The final segment's syntactic role picks the
    /// node: a call, a struct construction, or a static property.
    fn parse_static_path(&mut self, location: Location, first: String) -> Parsed<Expression> {
        let mut segments = vec![first];
        while self.match_kind(TokenKind::ColonColon) {
            let segment = self.consume_word("Expected a name after '::'")?;
            segments.push(segment.text);
        }
        let last = segments.pop().unwrap_or_default();
        let target = segments.join("::");

        if let Some(type_args) = self.try_parse_type_args() {
            let args = self.parse_call_args()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::StaticFunction {
                    target,
                    function: last,
                    type_args,
                    args,
                },
            ));
        }

        if self.check(TokenKind::LeftParen) {
            let args = self.parse_call_args()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::StaticFunction {
                    target,
                    function: last,
                    type_args: vec![],
                    args,
                },
            ));
        }

        if self.check(TokenKind::LeftBrace)
            && !self.no_struct_literal
            && last.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        {
            let name = if target.is_empty() {
                last
            } else {
                format!("{}::{}", target, last)
            };
            let fields = self.parse_struct_instance_fields()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::StructInstance { name, fields },
            ));
        }

        Ok(Expression::new(
            location,
            ExpressionKind::StaticProperty {
                target,
                property: last,
            },
        ))
    }

    /// Explicit call-site type args: `name<Int, Str>(...)`. Only
    /// committed when the bracketed list is followed by `(`.
    fn try_parse_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        if !self.check(TokenKind::Less) {
            return None;
        }
        let saved_current = self.current;
        let saved_errors = self.errors.len();
        self.advance();
        let mut type_args = Vec::new();
        loop {
            match self.parse_type_expr() {
                Ok(ty) => type_args.push(ty),
                Err(_) => {
                    self.current = saved_current;
                    self.errors.truncate(saved_errors);
                    return None;
                }
            }
            if self.match_kind(TokenKind::Comma) {
                continue;
            }
            break;
        }
        if self.match_kind(TokenKind::Greater) && self.check(TokenKind::LeftParen) {
            Some(type_args)
        } else {
            self.current = saved_current;
            self.errors.truncate(saved_errors);
            None
        }
    }

    /// `(arg, ...)` where arg is `[name:] [mut] expr`. A named
    /// argument may not be followed by a positional one.
    pub(crate) fn parse_call_args(&mut self) -> Parsed<Vec<CallArg>> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let mut args = Vec::new();
        let mut saw_named = false;
        self.skip_newlines();
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            let arg_location = self.location();
            let name = if self.check(TokenKind::Identifier)
                && self.peek_at(1) == TokenKind::Colon
            {
                let name = self.advance().text;
                self.advance();
                Some(name)
            } else {
                None
            };
            if name.is_some() {
                saw_named = true;
            } else if saw_named {
                let error = ParseError::new(
                    arg_location,
                    "Positional arguments cannot follow named arguments",
                );
                self.record(error);
            }
            let mutable = self.match_kind(TokenKind::Mut);
            let value = self.parse_grouped()?;
            args.push(CallArg {
                name,
                mutable,
                value,
            });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.skip_newlines();
        self.consume(TokenKind::RightParen, "Expected ')' to close arguments")?;
        Ok(args)
    }

    pub(crate) fn parse_struct_instance_fields(&mut self) -> Parsed<Vec<(String, Expression)>> {
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let name = self.consume_word("Expected field name")?;
            self.consume(TokenKind::Colon, "Expected ':' after field name")?;
            let value = self.parse_grouped()?;
            fields.push((name.text, value));
            let separated = self.match_kind(TokenKind::Comma) | self.check(TokenKind::NewLine);
            self.skip_newlines();
            if !separated {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close struct literal")?;
        Ok(fields)
    }
}
