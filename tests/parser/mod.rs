//! 構文解析テストの共通モジュール
//!
//! 構文解析テストで使用する共通のヘルパー関数を定義する。

use yunischema::error::ParserError;
use yunischema::source::{IrStatement, Lexer, ParseResult, Parser};

/// ソーステキストを字句解析・構文解析してルート文を返すヘルパー関数
pub fn parse_source(text: &str) -> ParseResult<IrStatement> {
    let tokens: Vec<_> = Lexer::new(text).collect();
    Parser::new(text, tokens).parse()
}

/// 解析に成功することを確認するヘルパー関数
pub fn assert_parses(text: &str) -> IrStatement {
    parse_source(text).expect("Parsing should succeed")
}

/// 解析に失敗することを確認するヘルパー関数
pub fn assert_parse_error(text: &str) -> ParserError {
    parse_source(text).expect_err("Parsing should fail")
}

// サブモジュールの宣言
#[cfg(test)]
mod basic_test;
#[cfg(test)]
mod literal_test;
#[cfg(test)]
mod error_test;
