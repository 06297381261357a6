//! 統一的なエラーハンドリングモジュール
//!
//! このモジュールは、yunischemaコンパイラ全体で使用される統一的なエラー型と
//! エラー報告システムを提供します。字句解析から実効モデル構築までの各段階の
//! エラーをひとつの型に集約します。

use crate::model::{SourceKey, SourceRef, Span};
use crate::reactor::ModelProcessingPhase;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// yunischemaコンパイラの統一エラー型
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    /// レキサーエラー
    #[error("字句解析エラー")]
    Lexer(#[from] LexerError),

    /// パーサーエラー
    #[error("構文解析エラー")]
    Parser(#[from] ParserError),

    /// 文単位の意味解析エラー
    #[error("意味解析エラー")]
    Source(#[from] SourceError),

    /// リアクター全体のエラー
    #[error("モデル構築エラー")]
    Reactor(#[from] ReactorError),

    /// ファイルI/Oエラー
    #[error("ファイル操作エラー: {0}")]
    Io(String),

    /// その他のエラー
    #[error("{0}")]
    Other(String),
}

/// レキサーエラーの詳細
#[derive(Error, Debug, Clone)]
pub enum LexerError {
    #[error("認識できないトークン: '{token}'")]
    UnrecognizedToken { token: String, span: Span },

    #[error("未終了の文字列リテラル")]
    UnterminatedString { span: Span },
}

/// パーサーエラーの詳細
#[derive(Error, Debug, Clone)]
pub enum ParserError {
    #[error("予期しないトークン: {expected}を期待しましたが、{found}が見つかりました")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("予期しない入力の終了")]
    UnexpectedEof { expected: String, span: Span },

    #[error("不正な構文: {message}")]
    InvalidSyntax { message: String, span: Span },
}

/// 文単位の意味解析エラーの詳細
///
/// すべてのバリアントが発生位置の`SourceRef`を保持します。
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("不正な引数: {message}")]
    InvalidArgument { message: String, at: SourceRef },

    #[error("{parent}の中で{keyword}文は使用できません")]
    InvalidSubstatement {
        keyword: String,
        parent: String,
        at: SourceRef,
    },

    #[error("必須の{keyword}文が{parent}にありません")]
    MissingStatement {
        keyword: String,
        parent: String,
        at: SourceRef,
    },

    #[error("{kind} {name} は既に定義されています")]
    DuplicateDefinition {
        kind: String,
        name: String,
        at: SourceRef,
    },

    #[error("解決できない参照: {message}")]
    InferenceFailed { message: String, at: SourceRef },

    #[error("未知の文: {keyword}")]
    UnknownStatement { keyword: String, at: SourceRef },
}

impl SourceError {
    /// エラーの発生位置
    pub fn source_ref(&self) -> &SourceRef {
        match self {
            Self::InvalidArgument { at, .. }
            | Self::InvalidSubstatement { at, .. }
            | Self::MissingStatement { at, .. }
            | Self::DuplicateDefinition { at, .. }
            | Self::InferenceFailed { at, .. }
            | Self::UnknownStatement { at, .. } => at,
        }
    }
}

/// リアクター全体のエラーの詳細
#[derive(Error, Debug, Clone)]
pub enum ReactorError {
    /// あるソースがフェーズを完了できなかったことを示す集約エラー。
    /// ソースごとの最初の失敗をcauseに、残りをsuppressedに保持します。
    #[error("フェーズ{phase}をソース{source}で完了できませんでした")]
    SomeModifiersUnresolved {
        phase: ModelProcessingPhase,
        source: SourceKey,
        #[source]
        cause: Box<SchemaError>,
        suppressed: Vec<SchemaError>,
    },

    /// 現在のフェーズで動作が登録されていない名前空間へのアクセス。
    /// モデルのエラーではなく利用側の欠陥として扱われます。
    #[error("名前空間{namespace}はフェーズ{phase}では利用できません")]
    NamespaceNotAvailable {
        namespace: &'static str,
        phase: ModelProcessingPhase,
    },

    #[error("内部エラー: {message}")]
    Internal { message: String },
}

/// エラー情報とソースコードの位置情報を含むエラー
#[derive(Debug, Clone)]
pub struct DiagnosticError {
    pub error: SchemaError,
    pub file_id: usize,
}

impl DiagnosticError {
    pub fn new(error: SchemaError, file_id: usize) -> Self {
        Self { error, file_id }
    }

    /// codespan-reportingのDiagnosticに変換
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let (message, labels, notes) = match &self.error {
            SchemaError::Lexer(e) => match e {
                LexerError::UnrecognizedToken { token, span } => (
                    format!("認識できないトークン: '{}'", token),
                    vec![Label::primary(self.file_id, span.start..span.end)
                        .with_message("ここに不正なトークンがあります")],
                    vec![],
                ),
                LexerError::UnterminatedString { span } => (
                    "未終了の文字列リテラル".to_string(),
                    vec![Label::primary(self.file_id, span.start..span.end)
                        .with_message("文字列が閉じられていません")],
                    vec![],
                ),
            },
            SchemaError::Parser(e) => match e {
                ParserError::UnexpectedToken {
                    expected,
                    found,
                    span,
                } => (
                    format!(
                        "予期しないトークン: {}を期待しましたが、{}が見つかりました",
                        expected, found
                    ),
                    vec![Label::primary(self.file_id, span.start..span.end)],
                    vec![],
                ),
                ParserError::UnexpectedEof { expected, span } => (
                    format!("予期しない入力の終了: {}を期待していました", expected),
                    vec![Label::primary(self.file_id, span.start..span.end)],
                    vec![],
                ),
                ParserError::InvalidSyntax { message, span } => (
                    format!("不正な構文: {}", message),
                    vec![Label::primary(self.file_id, span.start..span.end)],
                    vec![],
                ),
            },
            SchemaError::Source(e) => self.source_error_to_diagnostic(e),
            SchemaError::Reactor(e) => match e {
                ReactorError::SomeModifiersUnresolved {
                    phase,
                    source,
                    cause,
                    suppressed,
                } => (
                    format!(
                        "フェーズ{}をソース{}で完了できませんでした: {}",
                        phase, source, cause
                    ),
                    vec![],
                    if suppressed.is_empty() {
                        vec![]
                    } else {
                        vec![format!("他に{}件のエラーが抑制されています", suppressed.len())]
                    },
                ),
                ReactorError::NamespaceNotAvailable { namespace, phase } => (
                    format!(
                        "名前空間{}はフェーズ{}では利用できません",
                        namespace, phase
                    ),
                    vec![],
                    vec![],
                ),
                ReactorError::Internal { message } => {
                    (format!("内部エラー: {}", message), vec![], vec![])
                }
            },
            SchemaError::Io(message) => {
                (format!("ファイル操作エラー: {}", message), vec![], vec![])
            }
            SchemaError::Other(message) => (message.clone(), vec![], vec![]),
        };

        Diagnostic::error()
            .with_message(message)
            .with_labels(labels)
            .with_notes(notes)
    }

    fn source_error_to_diagnostic(
        &self,
        e: &SourceError,
    ) -> (String, Vec<Label<usize>>, Vec<String>) {
        let span = e.source_ref().span;
        let label = Label::primary(self.file_id, span.start..span.end);
        match e {
            SourceError::InvalidArgument { message, .. } => (
                format!("不正な引数: {}", message),
                vec![label],
                vec![],
            ),
            SourceError::InvalidSubstatement {
                keyword, parent, ..
            } => (
                format!("{}の中で{}文は使用できません", parent, keyword),
                vec![label],
                vec![],
            ),
            SourceError::MissingStatement {
                keyword, parent, ..
            } => (
                format!("必須の{}文が{}にありません", keyword, parent),
                vec![label.with_message("この文の中に必要です")],
                vec![],
            ),
            SourceError::DuplicateDefinition { kind, name, .. } => (
                format!("{} {} は既に定義されています", kind, name),
                vec![label.with_message("重複した定義")],
                vec![],
            ),
            SourceError::InferenceFailed { message, .. } => (
                format!("解決できない参照: {}", message),
                vec![label.with_message("この参照を解決できませんでした")],
                vec![],
            ),
            SourceError::UnknownStatement { keyword, .. } => (
                format!("未知の文: {}", keyword),
                vec![label.with_message("この文は定義されていません")],
                vec![],
            ),
        }
    }
}

/// 複数のエラーを蓄積するためのコレクター
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<DiagnosticError>,
    warnings: Vec<DiagnosticError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// エラーを追加
    pub fn add_error(&mut self, error: SchemaError, file_id: usize) {
        self.errors.push(DiagnosticError::new(error, file_id));
    }

    /// 警告を追加
    pub fn add_warning(&mut self, error: SchemaError, file_id: usize) {
        self.warnings.push(DiagnosticError::new(error, file_id));
    }

    /// エラーがあるかどうか
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// エラーの数
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// すべてのエラーを取得
    pub fn errors(&self) -> &[DiagnosticError] {
        &self.errors
    }

    /// すべての警告を取得
    pub fn warnings(&self) -> &[DiagnosticError] {
        &self.warnings
    }

    /// 最初のエラーを取得
    pub fn first_error(&self) -> Option<&DiagnosticError> {
        self.errors.first()
    }
}

/// Result型のエイリアス
pub type SchemaResult<T> = Result<T, SchemaError>;

/// エラー変換用のヘルパートレイト
pub trait IntoSchemaError {
    fn into_schema_error(self) -> SchemaError;
}

impl IntoSchemaError for std::io::Error {
    fn into_schema_error(self) -> SchemaError {
        SchemaError::Io(self.to_string())
    }
}

impl IntoSchemaError for anyhow::Error {
    fn into_schema_error(self) -> SchemaError {
        SchemaError::Other(self.to_string())
    }
}

impl From<std::io::Error> for SchemaError {
    fn from(e: std::io::Error) -> Self {
        SchemaError::Io(e.to_string())
    }
}

/// エラーコンテキスト追加用のヘルパートレイト
pub trait WithContext<T> {
    fn with_context<F>(self, f: F) -> SchemaResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> WithContext<T> for Result<T, E>
where
    E: IntoSchemaError,
{
    fn with_context<F>(self, f: F) -> SchemaResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into_schema_error();
            match base_error {
                SchemaError::Other(msg) => SchemaError::Other(format!("{}: {}", f(), msg)),
                _ => base_error,
            }
        })
    }
}
