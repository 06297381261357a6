//! スキーマ文テキストのパーサー
//!
//! トークン列を文の木（`IrStatement`）へ変換します。文法は
//! `keyword [argument] ( ";" | "{" substatement* "}" )` だけの再帰構造です。

use crate::error::ParserError;
use crate::model::{Keyword, Span};

use super::ir::IrStatement;
use super::token::{Token, TokenWithSpan};

pub type ParseResult<T> = Result<T, ParserError>;

/// スキーマ文パーサー
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<TokenWithSpan>,
    current: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<TokenWithSpan>) -> Self {
        Self {
            source,
            tokens,
            current: 0,
        }
    }

    /// ソース全体を解析し、単一のルート文を返す
    pub fn parse(&mut self) -> ParseResult<IrStatement> {
        let root = self.parse_statement()?;
        if let Some(tok) = self.tokens.get(self.current) {
            return Err(ParserError::InvalidSyntax {
                message: format!("ルート文の後に{}が余っています", tok.token),
                span: tok.span,
            });
        }
        Ok(root)
    }

    /// 一つの文を解析
    fn parse_statement(&mut self) -> ParseResult<IrStatement> {
        let (keyword, keyword_span) = self.parse_keyword()?;
        let (raw_argument, arg_span) = self.parse_argument()?;

        let mut children = Vec::new();
        let end;
        match self.current_token() {
            Some(Token::Semicolon) => {
                end = self.current_span().end;
                self.advance();
            }
            Some(Token::LeftBrace) => {
                self.advance();
                loop {
                    match self.current_token() {
                        Some(Token::RightBrace) => break,
                        Some(_) => children.push(self.parse_statement()?),
                        None => {
                            return Err(ParserError::UnexpectedEof {
                                expected: "'}'".to_string(),
                                span: self.last_span(),
                            })
                        }
                    }
                }
                end = self.current_span().end;
                self.advance();
            }
            Some(other) => {
                return Err(ParserError::UnexpectedToken {
                    expected: "';'または'{'".to_string(),
                    found: other.to_string(),
                    span: self.current_span(),
                })
            }
            None => {
                return Err(ParserError::UnexpectedEof {
                    expected: "';'または'{'".to_string(),
                    span: self.last_span(),
                })
            }
        }

        Ok(IrStatement {
            keyword,
            raw_argument,
            span: Span::new(keyword_span.start, end),
            arg_span,
            children,
        })
    }

    /// キーワードを解析（`name`または`prefix:name`）
    fn parse_keyword(&mut self) -> ParseResult<(Keyword, Span)> {
        let span = self.current_span();
        let word = match self.current_token() {
            Some(Token::Word(w)) => w.clone(),
            Some(other) => {
                return Err(ParserError::UnexpectedToken {
                    expected: "キーワード".to_string(),
                    found: other.to_string(),
                    span,
                })
            }
            None => {
                return Err(ParserError::UnexpectedEof {
                    expected: "キーワード".to_string(),
                    span: self.last_span(),
                })
            }
        };
        self.advance();

        let keyword = match word.split_once(':') {
            Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => Keyword::Prefixed {
                prefix: prefix.to_string(),
                name: name.to_string(),
            },
            Some(_) => {
                return Err(ParserError::InvalidSyntax {
                    message: format!("不正なキーワード '{}'", word),
                    span,
                })
            }
            None => Keyword::Plain(word),
        };
        Ok((keyword, span))
    }

    /// 引数を解析
    ///
    /// 文字列リテラルひとつ、または`Word`と`/`の連続を引数として受け取る。
    /// 後者は元のソース断片をそのまま生の引数文字列にする。
    fn parse_argument(&mut self) -> ParseResult<(Option<String>, Option<Span>)> {
        match self.current_token() {
            Some(Token::StringLit(s)) => {
                let span = self.current_span();
                let value = s.clone();
                self.advance();
                Ok((Some(value), Some(span)))
            }
            Some(Token::Word(_)) | Some(Token::Slash) => {
                let start = self.current_span().start;
                let mut end = self.current_span().end;
                while matches!(
                    self.current_token(),
                    Some(Token::Word(_)) | Some(Token::Slash)
                ) {
                    end = self.current_span().end;
                    self.advance();
                }
                let raw = self.source[start..end].to_string();
                Ok((Some(raw), Some(Span::new(start, end))))
            }
            _ => Ok((None, None)),
        }
    }

    // ==================== ユーティリティメソッド ====================

    /// 現在のトークンを取得
    fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|t| &t.token)
    }

    /// 現在のスパンを取得
    fn current_span(&self) -> Span {
        self.tokens
            .get(self.current)
            .map(|t| t.span)
            .unwrap_or_else(Span::dummy)
    }

    /// 直前のトークンのスパン（EOFエラー用）
    fn last_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| t.span)
            .unwrap_or_else(Span::dummy)
    }

    /// 次のトークンに進む
    fn advance(&mut self) {
        if self.current < self.tokens.len() {
            self.current += 1;
        }
    }
}
