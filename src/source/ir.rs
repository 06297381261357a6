//! 解析済みソースの中間表現
//!
//! パーサーが返す文の木 (`IrStatement`) と、それをフェーズごとに
//! リアクタへ流し込む [`TextSource`] を提供します。木はテキストの
//! 構造そのままで、意味付けはすべてリアクタ側のサポートが行います。

use crate::error::{LexerError, ParserError, SchemaResult};
use crate::model::{Keyword, Revision, SourceKey, Span, Unqualified};
use crate::reactor::{ModelProcessingPhase, StatementStreamSource, StatementWriter};

use super::parser::Parser;
use super::token::{Lexer, Token};

/// 解析済みの一文。
#[derive(Debug, Clone, PartialEq)]
pub struct IrStatement {
    pub keyword: Keyword,
    pub raw_argument: Option<String>,
    /// キーワードから終端までの全体。
    pub span: Span,
    pub arg_span: Option<Span>,
    pub children: Vec<IrStatement>,
}

impl IrStatement {
    /// 指定の素キーワードを持つ子文を順に返す。
    pub fn children_named<'a>(
        &'a self,
        keyword: &'a str,
    ) -> impl Iterator<Item = &'a IrStatement> + 'a {
        self.children
            .iter()
            .filter(move |child| child.keyword == Keyword::Plain(keyword.to_owned()))
    }
}

/// テキスト 1 本から解析したストリームソース。
///
/// 走査のたびに同じ木を書き込み器へ流す。どの文を作り直さず再開
/// するかは書き込み器側が出現位置で判断する。
#[derive(Debug)]
pub struct TextSource {
    key: SourceKey,
    root: IrStatement,
}

impl TextSource {
    /// ソーステキストを字句解析・構文解析し、識別キーを導出する。
    pub fn parse(text: &str) -> SchemaResult<Self> {
        let tokens: Vec<_> = Lexer::new(text).collect();
        if let Some(bad) = tokens.iter().find(|t| t.token == Token::Error) {
            return Err(LexerError::UnrecognizedToken {
                token: text[bad.span.start..bad.span.end].to_string(),
                span: bad.span,
            }
            .into());
        }
        let root = Parser::new(text, tokens).parse()?;
        let key = derive_key(&root)?;
        Ok(Self { key, root })
    }

    pub fn root(&self) -> &IrStatement {
        &self.root
    }
}

/// ルート文からソースの識別キーを導く。
///
/// 名前はルートの引数、リビジョンは revision 部分文のうち最新の
/// もの。revision が無いソースはリビジョン無しで識別される。
fn derive_key(root: &IrStatement) -> SchemaResult<SourceKey> {
    let at = root.arg_span.unwrap_or(root.span);
    let Some(raw) = root.raw_argument.as_deref() else {
        return Err(ParserError::InvalidSyntax {
            message: "ルート文に名前がありません".to_owned(),
            span: at,
        }
        .into());
    };
    let name = Unqualified::try_new(raw).map_err(|message| ParserError::InvalidSyntax {
        message,
        span: at,
    })?;
    let mut latest: Option<Revision> = None;
    for revision in root.children_named("revision") {
        let Some(raw) = revision.raw_argument.as_deref() else {
            continue;
        };
        let parsed =
            Revision::try_new(raw).map_err(|message| ParserError::InvalidSyntax {
                message,
                span: revision.arg_span.unwrap_or(revision.span),
            })?;
        if latest.as_ref() < Some(&parsed) {
            latest = Some(parsed);
        }
    }
    Ok(SourceKey::new(name, latest))
}

impl StatementStreamSource for TextSource {
    fn key(&self) -> SourceKey {
        self.key.clone()
    }

    fn write(
        &self,
        _phase: ModelProcessingPhase,
        writer: &mut dyn StatementWriter,
    ) -> SchemaResult<()> {
        write_statement(&self.root, 0, writer)
    }
}

fn write_statement(
    stmt: &IrStatement,
    position: usize,
    writer: &mut dyn StatementWriter,
) -> SchemaResult<()> {
    let wants_children = writer.start_statement(
        position,
        &stmt.keyword,
        stmt.raw_argument.as_deref(),
        stmt.span,
    )?;
    // テキスト上は常に部分木が揃っている
    writer.store_statement(stmt.children.len(), true)?;
    if wants_children {
        for (index, child) in stmt.children.iter().enumerate() {
            write_statement(child, index, writer)?;
        }
    }
    writer.end_statement()
}
