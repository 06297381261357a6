//! モデル処理フェーズの定義

use std::fmt;

/// フェーズ完了マーカーのコンパクトな数値表現
///
/// `Option<ModelProcessingPhase>`の代わりにノードへ埋め込むための
/// 符号化です。`NULL`は「まだどのフェーズも完了していない」を表します。
pub mod execution_order {
    pub type ExecutionOrder = u8;

    pub const NULL: ExecutionOrder = 0;
    pub const INIT: ExecutionOrder = 1;
    pub const SOURCE_PRE_LINKAGE: ExecutionOrder = 2;
    pub const SOURCE_LINKAGE: ExecutionOrder = 3;
    pub const STATEMENT_DEFINITION: ExecutionOrder = 4;
    pub const FULL_DECLARATION: ExecutionOrder = 5;
    pub const EFFECTIVE_MODEL: ExecutionOrder = 6;
}

pub use execution_order::ExecutionOrder;

/// バッチ処理の順序付きフェーズ
///
/// 各フェーズは全ソースで完全に終わってから次のフェーズに進みます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelProcessingPhase {
    /// 文脈が生成された直後の状態
    Init,
    /// 必要なソースの発見とライブラリソースの取り込み
    SourcePreLinkage,
    /// ソース間参照の結び付け
    SourceLinkage,
    /// 拡張機構が対象とする文種別の解決
    StatementDefinition,
    /// grouping/augment展開を含む宣言木の完全な実体化
    FullDeclaration,
    /// 最終的な実効表現の構築
    EffectiveModel,
}

impl ModelProcessingPhase {
    /// このフェーズの直前のフェーズ
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Init => None,
            Self::SourcePreLinkage => Some(Self::Init),
            Self::SourceLinkage => Some(Self::SourcePreLinkage),
            Self::StatementDefinition => Some(Self::SourceLinkage),
            Self::FullDeclaration => Some(Self::StatementDefinition),
            Self::EffectiveModel => Some(Self::FullDeclaration),
        }
    }

    /// 実行順の数値表現
    pub fn execution_order(self) -> ExecutionOrder {
        match self {
            Self::Init => execution_order::INIT,
            Self::SourcePreLinkage => execution_order::SOURCE_PRE_LINKAGE,
            Self::SourceLinkage => execution_order::SOURCE_LINKAGE,
            Self::StatementDefinition => execution_order::STATEMENT_DEFINITION,
            Self::FullDeclaration => execution_order::FULL_DECLARATION,
            Self::EffectiveModel => execution_order::EFFECTIVE_MODEL,
        }
    }

    /// 数値表現からの復元
    pub fn from_execution_order(order: ExecutionOrder) -> Option<Self> {
        match order {
            execution_order::INIT => Some(Self::Init),
            execution_order::SOURCE_PRE_LINKAGE => Some(Self::SourcePreLinkage),
            execution_order::SOURCE_LINKAGE => Some(Self::SourceLinkage),
            execution_order::STATEMENT_DEFINITION => Some(Self::StatementDefinition),
            execution_order::FULL_DECLARATION => Some(Self::FullDeclaration),
            execution_order::EFFECTIVE_MODEL => Some(Self::EffectiveModel),
            _ => None,
        }
    }

    /// `completed`が指すフェーズまで終わっていれば、このフェーズも
    /// 完了しているとみなせるか
    pub fn is_completed_by(self, completed: ExecutionOrder) -> bool {
        completed >= self.execution_order()
    }

    /// 処理順にすべてのフェーズ（Initを除く）を返す
    pub fn executable_phases() -> [Self; 5] {
        [
            Self::SourcePreLinkage,
            Self::SourceLinkage,
            Self::StatementDefinition,
            Self::FullDeclaration,
            Self::EffectiveModel,
        ]
    }
}

impl fmt::Display for ModelProcessingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::SourcePreLinkage => "source-pre-linkage",
            Self::SourceLinkage => "source-linkage",
            Self::StatementDefinition => "statement-definition",
            Self::FullDeclaration => "full-declaration",
            Self::EffectiveModel => "effective-model",
        })
    }
}
