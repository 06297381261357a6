//! Token definitions and the lexer wrapper for schema source text.

use crate::model::Span;
use logos::Logos;
use std::fmt;

/// Token types for the Yuni schema language
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Line comments
#[logos(skip r"/\*([^*]|\*[^/])*\*/")] // Block comments
pub enum Token {
    /// An unquoted word: keyword, identifier, prefixed name, date or number.
    #[regex(r"[A-Za-z0-9_.:\-]+", |lex| lex.slice().to_owned())]
    Word(String),

    /// A double-quoted string literal with escape handling.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len()-1])
    })]
    StringLit(String),

    #[token("/")]
    Slash,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token(";")]
    Semicolon,

    // Error token for unrecognized input
    Error,
}

/// Unescape a string literal
fn unescape_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }

    result
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(s) => write!(f, "'{}'", s),
            Token::StringLit(s) => write!(f, "\"{}\"", s),
            Token::Slash => write!(f, "'/'"),
            Token::LeftBrace => write!(f, "'{{'"),
            Token::RightBrace => write!(f, "'}}'"),
            Token::Semicolon => write!(f, "';'"),
            Token::Error => write!(f, "<error>"),
        }
    }
}

/// A token with its span information
#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithSpan {
    pub token: Token,
    pub span: Span,
}

/// Lexer for schema source text
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: Token::lexer(input),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = TokenWithSpan;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;
        let span = Span::from(self.inner.span());
        let token = match result {
            Ok(token) => token,
            Err(_) => Token::Error,
        };
        Some(TokenWithSpan { token, span })
    }
}
