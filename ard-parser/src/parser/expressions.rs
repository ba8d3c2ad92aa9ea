// Expression parsing by precedence climbing:
// or < and < comparison/range < additive < multiplicative < unary <
// member/call/static. Orderings of equal precedence chain into a
// single ChainedComparison node.

use super::Parser;
use crate::ParseError;
use ard_ast::{BinaryOp, Expression, ExpressionKind, UnaryOp};
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Parsed<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Parsed<Expression> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let location = left.location;
            self.advance();
            let right = self.parse_and()?;
            left = Expression::new(
                location,
                ExpressionKind::Binary {
                    operator: BinaryOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Parsed<Expression> {
        let mut left = self.parse_comparison()?;
        while self.check(TokenKind::And) {
            let location = left.location;
            self.advance();
            let right = self.parse_comparison()?;
            left = Expression::new(
                location,
                ExpressionKind::Binary {
                    operator: BinaryOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    /// Comparison tier also owns `..`: a range is `lo..hi` with both
    /// sides at additive precedence, and does not chain.
    fn parse_comparison(&mut self) -> Parsed<Expression> {
        let first = self.parse_additive()?;

        if self.check(TokenKind::DotDot) {
            let location = first.location;
            self.advance();
            let end = self.parse_additive()?;
            return Ok(Expression::new(
                location,
                ExpressionKind::RangeLiteral {
                    start: Box::new(first),
                    end: Box::new(end),
                },
            ));
        }

        let mut operands = vec![first];
        let mut operators = Vec::new();
        while let Some(op) = comparison_op(self.peek_kind()) {
            self.advance();
            operators.push(op);
            operands.push(self.parse_additive()?);
        }

        match operators.len() {
            0 => Ok(operands.remove(0)),
            1 => {
                let right = operands.pop().unwrap_or_else(|| unreachable!());
                let left = operands.pop().unwrap_or_else(|| unreachable!());
                let location = left.location;
                Ok(Expression::new(
                    location,
                    ExpressionKind::Binary {
                        operator: operators[0],
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                ))
            }
            _ => {
                if operators.iter().any(|op| !op.is_ordering()) {
                    let error = self.error("'==' and '!=' cannot be chained");
                    self.record(error);
                }
                let location = operands[0].location;
                Ok(Expression::new(
                    location,
                    ExpressionKind::ChainedComparison {
                        operands,
                        operators,
                    },
                ))
            }
        }
    }

    fn parse_additive(&mut self) -> Parsed<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            let location = left.location;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::new(
                location,
                ExpressionKind::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
    }

    fn parse_multiplicative(&mut self) -> Parsed<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            let location = left.location;
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::new(
                location,
                ExpressionKind::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
    }

    fn parse_unary(&mut self) -> Parsed<Expression> {
        let operator = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let location = self.location();
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expression::new(
            location,
            ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
        ))
    }

    /// Member access and method calls: `expr.name`, `expr.name(args)`.
    fn parse_postfix(&mut self) -> Parsed<Expression> {
        let mut expr = self.parse_primary()?;
        while self.match_kind(TokenKind::Dot) {
            let location = expr.location;
            let member = self.consume_word("Expected a member name after '.'")?;
            if self.check(TokenKind::LeftParen) {
                let args = self.parse_call_args()?;
                expr = Expression::new(
                    location,
                    ExpressionKind::InstanceMethod {
                        receiver: Box::new(expr),
                        method: member.text,
                        args,
                    },
                );
            } else {
                expr = Expression::new(
                    location,
                    ExpressionKind::InstanceProperty {
                        receiver: Box::new(expr),
                        property: member.text,
                    },
                );
            }
        }
        Ok(expr)
    }
}

fn comparison_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::BangEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        _ => return None,
    };
    Some(op)
}
