//! Recursive-descent parser producing a name-resolved [`Expr`].
//!
//! Precedence, loosest first: `||`, `&&`, equality, relational, additive,
//! multiplicative, unary, postfix (`.name`, `[index]`, `.method(args)`).

use super::error::ExprError;
use super::lexer::{Spanned, Token};
use super::suggest::{fuzzy_match, hint};
use super::{BinaryOp, Expr, Field, Literal, LogicalOp, Method, UnaryOp, MAX_NESTING};

pub(crate) fn parse(tokens: &[Spanned]) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    /// Current recursion depth through nested sub-expressions.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExprError::TooDeep { limit: MAX_NESTING });
        }
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            expr = Expr::Logical(LogicalOp::Or, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_equality()?;
            expr = Expr::Logical(LogicalOp::And, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_relation()?;
        while let Some(op) = self.binary_op(|t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::EqEqEq => Some(BinaryOp::StrictEq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::NotEqEq => Some(BinaryOp::StrictNotEq),
            _ => None,
        }) {
            let rhs = self.parse_relation()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_relation(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_additive()?;
        while let Some(op) = self.binary_op(|t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        }) {
            let rhs = self.parse_additive()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_term()?;
        while let Some(op) = self.binary_op(|t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        }) {
            let rhs = self.parse_term()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_unary()?;
        while let Some(op) = self.binary_op(|t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        }) {
            let rhs = self.parse_unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = if self.eat(&Token::Bang) {
            UnaryOp::Not
        } else if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else {
            return self.parse_postfix();
        };
        // `!!!!x` recurses once per operator.
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExprError::TooDeep { limit: MAX_NESTING });
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident("property or method name")?;
                if self.eat(&Token::LParen) {
                    expr = self.finish_call(expr, &name)?;
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn finish_call(&mut self, receiver: Expr, name: &str) -> Result<Expr, ExprError> {
        let method = Method::from_name(name).ok_or_else(|| ExprError::UnknownMethod {
            name: name.to_string(),
            hint: hint(fuzzy_match(name, Method::NAMES)),
        })?;

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, "`,` or `)`")?;
                break;
            }
        }

        if args.len() != method.arity() {
            return Err(ExprError::WrongArity {
                method: method.as_str(),
                expected: method.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(Box::new(receiver), method, args))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let Some(spanned) = self.advance() else {
            return Err(ExprError::UnexpectedEnd {
                expected: "a value",
            });
        };
        match &spanned.token {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(*n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s.clone()))),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(expr)
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" => Ok(Expr::Literal(Literal::Null)),
                "undefined" => Ok(Expr::Literal(Literal::Undefined)),
                _ => Field::from_name(name)
                    .map(Expr::Field)
                    .ok_or_else(|| ExprError::UnknownVariable {
                        name: name.clone(),
                        hint: hint(fuzzy_match(name, Field::NAMES)),
                    }),
            },
            other => Err(ExprError::UnexpectedToken {
                expected: "a value",
                found: other.to_string(),
                at: spanned.at,
            }),
        }
    }

    // ── Token helpers ───────────────────────────────────────────────

    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(spanned) if spanned.token == *expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn binary_op(&mut self, select: impl Fn(&Token) -> Option<BinaryOp>) -> Option<BinaryOp> {
        let op = select(&self.peek()?.token)?;
        self.pos += 1;
        Some(op)
    }

    fn expect(&mut self, expected: &Token, label: &'static str) -> Result<(), ExprError> {
        match self.advance() {
            Some(spanned) if spanned.token == *expected => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                expected: label,
                found: spanned.token.to_string(),
                at: spanned.at,
            }),
            None => Err(ExprError::UnexpectedEnd { expected: label }),
        }
    }

    fn expect_ident(&mut self, label: &'static str) -> Result<String, ExprError> {
        match self.advance() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => Ok(name.clone()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                expected: label,
                found: spanned.token.to_string(),
                at: spanned.at,
            }),
            None => Err(ExprError::UnexpectedEnd { expected: label }),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                expected: "end of expression",
                found: spanned.token.to_string(),
                at: spanned.at,
            }),
        }
    }
}
