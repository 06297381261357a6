//! ソーステキストの取り込みモジュール
//!
//! スキーマ文テキストの字句解析・構文解析、およびその結果を
//! リアクタへフェーズごとに流し込むストリームソースを提供します。

mod ir;
mod parser;
mod token;

// 公開API
pub use ir::{IrStatement, TextSource};
pub use parser::{ParseResult, Parser};
pub use token::{Lexer, Token, TokenWithSpan};
