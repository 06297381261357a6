//! 複製操作の種別と履歴

use std::fmt;

/// 文脈がどの複製操作で生まれたかを表す種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyType {
    /// 複製ではなく宣言そのもの
    Original,
    /// `uses`によるgrouping展開で追加された
    AddedByUses,
    /// `augment`で追加された
    AddedByAugmentation,
    /// grouping内の`augment`がuses展開とともに適用されて追加された
    AddedByUsesAugmentation,
}

impl CopyType {
    const VALUES: [CopyType; 4] = [
        CopyType::Original,
        CopyType::AddedByUses,
        CopyType::AddedByAugmentation,
        CopyType::AddedByUsesAugmentation,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Original => 0b0001,
            Self::AddedByUses => 0b0010,
            Self::AddedByAugmentation => 0b0100,
            Self::AddedByUsesAugmentation => 0b1000,
        }
    }

    /// この操作で複製された文の「子」を複製するときに使う操作。
    ///
    /// augment 由来の複製の下では子は元の文として数え直し、
    /// uses-augment 由来なら uses 由来として連鎖させる。
    pub fn child_copy_type(self) -> CopyType {
        match self {
            Self::AddedByAugmentation => Self::Original,
            Self::AddedByUsesAugmentation => Self::AddedByUses,
            other => other,
        }
    }
}

impl fmt::Display for CopyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Original => "original",
            Self::AddedByUses => "added-by-uses",
            Self::AddedByAugmentation => "added-by-augmentation",
            Self::AddedByUsesAugmentation => "added-by-uses-augmentation",
        })
    }
}

/// 文脈が経てきた複製操作の圧縮された要約
///
/// 最後の操作と、これまでに現れた操作の集合をひとつのバイト列に
/// 詰めています。完全な履歴の列は保持しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyHistory {
    last: CopyType,
    seen: u8,
}

impl CopyHistory {
    /// 宣言そのものの履歴
    pub const fn original() -> Self {
        Self {
            last: CopyType::Original,
            seen: 0b0001,
        }
    }

    /// 最後に適用された複製操作
    pub fn last_operation(self) -> CopyType {
        self.last
    }

    /// 指定の操作を一度でも経ているか
    pub fn contains(self, op: CopyType) -> bool {
        self.seen & op.bit() != 0
    }

    /// 操作を追記した新しい履歴を返す
    pub fn append(self, op: CopyType) -> Self {
        Self {
            last: op,
            seen: self.seen | op.bit(),
        }
    }

    /// 経てきた操作の集合（定義順）
    pub fn operations(self) -> impl Iterator<Item = CopyType> {
        CopyType::VALUES
            .into_iter()
            .filter(move |op| self.seen & op.bit() != 0)
    }
}

impl Default for CopyHistory {
    fn default() -> Self {
        Self::original()
    }
}

/// 文種別ごとの複製ポリシー
///
/// リアクターが文脈を別の場所へ複製するとき、この値に従って
/// 再利用・複製・拒否・無視を選択します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// 文の意味が文脈に依存しないため、同じ文脈をそのまま再利用する
    ContextIndependent,
    /// 部分文のポリシーも無視して、定義された場所の文脈を厳密に再利用する
    ExactReplica,
    /// 宣言を共有しつつ、独立して進化する複製を作る
    DeclaredCopy,
    /// 複製の試み自体をエラーにする（トップレベル専用の文）
    Reject,
    /// 複製先では存在しないものとして扱う
    Ignore,
}

impl CopyPolicy {
    /// この種別の文が複製先で再利用可能か
    pub fn reuses_original(self) -> bool {
        matches!(self, Self::ContextIndependent | Self::ExactReplica)
    }
}

/// 完全複製の文脈を抱えた親が、さらに複製されたときの扱い
///
/// 完全複製の文自身が複製されるときに部分文のポリシーが無視される
/// のは常で、この設定の及ぶところではありません。決めるのは、その
/// 文の代理を抱えた親がもう一度複製されるとき、代理の中の文 (拡張
/// 文を含む) をポリシー評価へ回すかどうかだけです。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaPolicy {
    /// 代理をひとまとまりとして使い回す
    #[default]
    Opaque,
    /// 実体を宣言コピーし直し、部分文のポリシーを評価し直す
    Reevaluate,
}
