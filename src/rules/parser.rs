//! Condition parser: precedence climbing over the lexer's token stream.

use super::lexer::{Lexer, Spanned, Token};
use super::value::ArithOp;
use crate::error::ExpressionError;

/// Nesting limit for parenthesised and unary sub-expressions.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Compiled condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    /// Dotted identifier path, e.g. `city.temp` or `$main`
    Field(Vec<String>),
    /// 1-based positional access
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        _ => Err(parser.unexpected("end of expression")),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ExpressionError {
        match self.peek() {
            Token::Eof => ExpressionError::UnexpectedEnd(expected.to_string()),
            found => ExpressionError::UnexpectedToken {
                found: found.describe(),
                expected: expected.to_string(),
                pos: self.offset(),
            },
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ExpressionError> {
        if *self.peek() == token {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_equality()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => CompareOp::Eq,
                Token::NotEq => CompareOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => CompareOp::Lt,
                Token::Le => CompareOp::Le,
                Token::Gt => CompareOp::Gt,
                Token::Ge => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Not => UnaryOp::Not,
            Token::Plus => {
                self.advance();
                return self.parse_unary();
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LBracket => {
                    self.advance();
                    self.enter()?;
                    let index = self.parse_or()?;
                    self.leave();
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        Token::Num(n) if n.fract() == 0.0 && n >= 0.0 => format!("{}", n as u64),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("field name after '.'"));
                        }
                    };
                    expr = match expr {
                        Expr::Field(mut path) => {
                            path.push(name);
                            Expr::Field(path)
                        }
                        other => {
                            return Err(ExpressionError::InvalidValue(format!(
                                "cannot access '.{}' on {:?}",
                                name, other
                            )))
                        }
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek().clone() {
            Token::Num(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Ident(name) => {
                self.advance();
                if *self.peek() == Token::LParen {
                    self.advance();
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Field(vec![name]))
                }
            }
            Token::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        self.enter()?;
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => break,
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("',' or ')'"));
                }
            }
        }
        self.leave();
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &[&str]) -> Box<Expr> {
        Box::new(Expr::Field(path.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + 2 * 3 > 4 and not b").unwrap();
        match expr {
            Expr::Logical(LogicalOp::And, left, right) => {
                assert!(matches!(*left, Expr::Compare(CompareOp::Gt, _, _)));
                assert_eq!(*right, Expr::Unary(UnaryOp::Not, field(&["b"])));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_paths_indexing_and_calls() {
        assert_eq!(
            parse("city.weather.temp").unwrap(),
            *field(&["city", "weather", "temp"])
        );
        assert_eq!(
            parse("$main[1]").unwrap(),
            Expr::Index(field(&["$main"]), Box::new(Expr::Number(1.0)))
        );
        assert_eq!(
            parse("days(3)").unwrap(),
            Expr::Call("days".to_string(), vec![Expr::Number(3.0)])
        );
        assert_eq!(parse("now()").unwrap(), Expr::Call("now".to_string(), vec![]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("temp >"),
            Err(ExpressionError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            parse("(a"),
            Err(ExpressionError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            parse("a b"),
            Err(ExpressionError::UnexpectedToken { pos: 2, .. })
        ));
        assert!(matches!(
            parse("max(1 2)"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&deep), Err(ExpressionError::TooDeep(_))));
        let ok = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse(&ok).unwrap(), Expr::Number(1.0));
    }
}
