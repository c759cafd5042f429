//! Tokenizer for filter expressions.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Number(n) => return write!(f, "{n}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::Ident(name) => return f.write_str(name),
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Bang => "!",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::EqEq => "==",
            Token::EqEqEq => "===",
            Token::NotEq => "!=",
            Token::NotEqEq => "!==",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub at: usize,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut lexer = Lexer {
        input,
        chars: input.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> Result<Option<Spanned>, ExprError> {
        self.skip_whitespace();
        let Some(&(at, ch)) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '"' | '\'' => self.lex_string(at, ch)?,
            '0'..='9' => self.lex_number(at)?,
            c if is_ident_start(c) => self.lex_identifier(at),
            _ => self.lex_punct(at, ch)?,
        };
        Ok(Some(Spanned { token, at }))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some((_, c)) if *c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn lex_punct(&mut self, at: usize, ch: char) -> Result<Token, ExprError> {
        self.chars.next();
        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '&' if self.eat('&') => Token::AndAnd,
            '|' if self.eat('|') => Token::OrOr,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    Token::EqEqEq
                } else {
                    Token::EqEq
                }
            }
            '!' if self.eat('=') => {
                if self.eat('=') {
                    Token::NotEqEq
                } else {
                    Token::NotEq
                }
            }
            '!' => Token::Bang,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            // Lone `&`, `|` and `=` (no assignment in this language).
            _ => return Err(ExprError::UnexpectedChar { ch, at }),
        };
        Ok(token)
    }

    fn lex_string(&mut self, at: usize, quote: char) -> Result<Token, ExprError> {
        self.chars.next();
        let mut out = String::new();
        loop {
            let Some((_, ch)) = self.chars.next() else {
                return Err(ExprError::UnterminatedString { at });
            };
            match ch {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => {
                    let Some((_, escaped)) = self.chars.next() else {
                        return Err(ExprError::UnterminatedString { at });
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }

    fn lex_number(&mut self, at: usize) -> Result<Token, ExprError> {
        let mut end = at;
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let accept = match c {
                '0'..='9' => true,
                '.' if !seen_dot && !seen_exp => {
                    // `1.toString` is not a number; require a digit after the dot.
                    let next = self.input[i + 1..].chars().next();
                    if matches!(next, Some(d) if d.is_ascii_digit()) {
                        seen_dot = true;
                        true
                    } else {
                        false
                    }
                }
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    true
                }
                '+' | '-' if seen_exp && matches!(self.input[..i].chars().last(), Some('e' | 'E')) => true,
                _ => false,
            };
            if !accept {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }

        let text = &self.input[at..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExprError::InvalidNumber {
                text: text.to_string(),
                at,
            })
    }

    fn lex_identifier(&mut self, at: usize) -> Token {
        let mut end = at;
        while let Some(&(i, c)) = self.chars.peek() {
            if !is_ident_continue(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        Token::Ident(self.input[at..end].to_string())
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}
