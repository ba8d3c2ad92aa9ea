// Match patterns. The grammar is a strict subset of expression-head
// syntax so a single token of lookahead picks the pattern kind.

use super::Parser;
use crate::ParseError;
use ard_ast::{Pattern, TypeExpr};
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub(crate) fn parse_pattern(&mut self) -> Parsed<Pattern> {
        match self.peek_kind() {
            TokenKind::Number | TokenKind::Minus => self.parse_int_pattern(),
            TokenKind::True => {
                self.advance();
                Ok(Pattern::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Pattern::Bool(false))
            }
            TokenKind::Str => {
                let token = self.advance();
                if self.check(TokenKind::ExprOpen) {
                    return Err(self.error("String patterns cannot contain interpolation"));
                }
                Ok(Pattern::Str(token.text))
            }
            TokenKind::LeftBracket | TokenKind::Fn => {
                let ty = self.parse_type_expr()?;
                Ok(Pattern::Type(ty))
            }
            TokenKind::Identifier => self.parse_word_pattern(),
            other => Err(self.error(format!("Expected a pattern, found {}", other))),
        }
    }

    /// Int literal or `lo..hi` range, either side possibly negative.
    fn parse_int_pattern(&mut self) -> Parsed<Pattern> {
        let low = self.parse_pattern_int()?;
        if self.match_kind(TokenKind::DotDot) {
            let high = self.parse_pattern_int()?;
            return Ok(Pattern::Range(low, high));
        }
        Ok(Pattern::Int(low))
    }

    fn parse_pattern_int(&mut self) -> Parsed<i64> {
        let negative = self.match_kind(TokenKind::Minus);
        let token = self.consume(TokenKind::Number, "Expected an integer in pattern")?;
        let value: i64 = token
            .text
            .parse()
            .map_err(|_| self.error(format!("Invalid integer '{}' in pattern", token.text)))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_word_pattern(&mut self) -> Parsed<Pattern> {
        let word = self.advance();
        match word.text.as_str() {
            "_" => Ok(Pattern::CatchAll),
            "none" => Ok(Pattern::None),
            "some" if self.check(TokenKind::LeftParen) => {
                self.advance();
                let binding = self.consume(TokenKind::Identifier, "Expected a binding name")?;
                self.consume(TokenKind::RightParen, "Expected ')' after binding")?;
                Ok(Pattern::Some(binding.text))
            }
            "ok" if self.check(TokenKind::LeftParen) => {
                self.advance();
                let binding = self.consume(TokenKind::Identifier, "Expected a binding name")?;
                self.consume(TokenKind::RightParen, "Expected ')' after binding")?;
                Ok(Pattern::Ok(binding.text))
            }
            "err" if self.check(TokenKind::LeftParen) => {
                self.advance();
                let binding = self.consume(TokenKind::Identifier, "Expected a binding name")?;
                self.consume(TokenKind::RightParen, "Expected ')' after binding")?;
                Ok(Pattern::Err(binding.text))
            }
            _ => {
                if self.match_kind(TokenKind::ColonColon) {
                    let variant =
                        self.consume(TokenKind::Identifier, "Expected variant name after '::'")?;
                    return Ok(Pattern::EnumVariant {
                        enum_name: Some(word.text),
                        variant: variant.text,
                    });
                }
                // Uppercase names are union-alternative type patterns;
                // lowercase names are bare enum variants.
                if word.text.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                    Ok(Pattern::Type(TypeExpr::Named(word.text)))
                } else {
                    Ok(Pattern::EnumVariant {
                        enum_name: None,
                        variant: word.text,
                    })
                }
            }
        }
    }
}
