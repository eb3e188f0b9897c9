//! Condition lexer.

use crate::error::ExpressionError;
use std::iter::Peekable;
use std::str::CharIndices;

/// Condition token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,

    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Num(n) => format!("number {}", n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::Eof => "end of expression".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A token with its starting character offset.
pub type Spanned = (Token, usize);

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    len: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            len: input.len(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ExpressionError> {
        let mut tokens = Vec::new();
        while let Some(&(pos, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match c {
                '0'..='9' => self.read_number()?,
                '.' if self.next_is_digit() => self.read_number()?,
                '"' | '\'' => self.read_string(c, pos)?,
                c if is_ident_start(c) => self.read_identifier(),
                _ => self.read_symbol(c, pos)?,
            };
            tokens.push((token, pos));
        }
        tokens.push((Token::Eof, self.len));
        Ok(tokens)
    }

    fn next_is_digit(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some((_, d)) if d.is_ascii_digit())
    }

    fn read_number(&mut self) -> Result<Token, ExpressionError> {
        let mut text = String::new();
        let mut seen_exp = false;
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                text.push(c);
                self.chars.next();
                if let Some(&(_, sign)) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.chars.next();
                    }
                }
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Token::Num)
            .map_err(|_| ExpressionError::InvalidNumber(text))
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<Token, ExpressionError> {
        self.chars.next();
        let mut text = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, other)) => text.push(other),
                    None => break,
                },
                c if c == quote => return Ok(Token::Str(text)),
                c => text.push(c),
            }
        }
        Err(ExpressionError::UnterminatedString(start))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if is_ident_continue(c) {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match ident.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Ident(ident),
        }
    }

    fn read_symbol(&mut self, c: char, pos: usize) -> Result<Token, ExpressionError> {
        self.chars.next();
        let followed_by_eq = matches!(self.chars.peek(), Some((_, '=')));
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '<' if followed_by_eq => {
                self.chars.next();
                Token::Le
            }
            '<' => Token::Lt,
            '>' if followed_by_eq => {
                self.chars.next();
                Token::Ge
            }
            '>' => Token::Gt,
            '=' if followed_by_eq => {
                self.chars.next();
                Token::EqEq
            }
            '!' if followed_by_eq => {
                self.chars.next();
                Token::NotEq
            }
            '!' => Token::Not,
            '&' if matches!(self.chars.peek(), Some((_, '&'))) => {
                self.chars.next();
                Token::And
            }
            '|' if matches!(self.chars.peek(), Some((_, '|'))) => {
                self.chars.next();
                Token::Or
            }
            _ => return Err(ExpressionError::UnexpectedChar { ch: c, pos }),
        };
        Ok(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
