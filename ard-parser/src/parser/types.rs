// Surface type syntax: named types, `[T]`, `[K:V]`, `T?`, `V!E`, and
// function types `fn (T, U) R`.

use super::Parser;
use crate::ParseError;
use ard_ast::TypeExpr;
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub(crate) fn parse_type_expr(&mut self) -> Parsed<TypeExpr> {
        let base = self.parse_type_primary()?;
        self.parse_type_postfix(base)
    }

    fn parse_type_postfix(&mut self, mut ty: TypeExpr) -> Parsed<TypeExpr> {
        loop {
            match self.peek_kind() {
                TokenKind::Question => {
                    self.advance();
                    ty = TypeExpr::Maybe(Box::new(ty));
                }
                TokenKind::Bang => {
                    self.advance();
                    let err = self.parse_type_primary()?;
                    let err = match self.peek_kind() {
                        TokenKind::Question => {
                            self.advance();
                            TypeExpr::Maybe(Box::new(err))
                        }
                        _ => err,
                    };
                    ty = TypeExpr::Result(Box::new(ty), Box::new(err));
                }
                _ => return Ok(ty),
            }
        }
    }

    fn parse_type_primary(&mut self) -> Parsed<TypeExpr> {
        match self.peek_kind() {
            TokenKind::Identifier => {
                let name = self.advance().text;
                Ok(TypeExpr::Named(name))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let first = self.parse_type_expr()?;
                if self.match_kind(TokenKind::Colon) {
                    let value = self.parse_type_expr()?;
                    self.consume(TokenKind::RightBracket, "Expected ']' to close map type")?;
                    Ok(TypeExpr::Map(Box::new(first), Box::new(value)))
                } else {
                    self.consume(TokenKind::RightBracket, "Expected ']' to close list type")?;
                    Ok(TypeExpr::List(Box::new(first)))
                }
            }
            TokenKind::Fn => {
                self.advance();
                self.consume(TokenKind::LeftParen, "Expected '(' in function type")?;
                let mut parameters = Vec::new();
                while !self.check(TokenKind::RightParen) && !self.is_at_end() {
                    parameters.push(self.parse_type_expr()?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightParen, "Expected ')' in function type")?;
                let return_type = if self.type_starts_here() {
                    self.parse_type_expr()?
                } else {
                    TypeExpr::Named("Void".to_string())
                };
                Ok(TypeExpr::Function {
                    parameters,
                    return_type: Box::new(return_type),
                })
            }
            _ => Err(self.error("Expected a type")),
        }
    }

    pub(crate) fn type_starts_here(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Identifier | TokenKind::LeftBracket | TokenKind::Fn
        )
    }
}
