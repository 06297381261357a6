//! 文脈木 (statement context tree)
//!
//! すべての文脈は 1 本のアリーナ [`StatementTree`] に確保され、
//! [`StmtId`] で参照し合う。親子関係、フェーズ進行、名前空間の
//! 局所格納、複製履歴はノード自身が持ち、形状 ([`StmtShape`]) が
//! 「どう作られた文脈か」を区別する。木の操作のうち他の部品
//! (サポート表や推論エンジン) を要するものは大域文脈側にある。

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ReactorError, SchemaResult};
use crate::model::{ArgumentValue, DeclaredStatement, EffectiveStatement, SourceRef};

use super::action::PrereqRef;
use super::copy::CopyHistory;
use super::namespace::NamespaceStorage;
use super::phase::{execution_order, ExecutionOrder, ModelProcessingPhase};
use super::source::SourceId;
use super::support::SupportHandle;

/// アリーナ内の文脈への参照。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 文脈の形状。作られ方と子の扱いを決める。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtShape {
    /// ソースストリームから直接作られ、後続フェーズの再走査で再開される。
    Resumed,
    /// プロトタイプからの複製。子はアクセス時に初めて写し取る。
    Inferred {
        prototype: StmtId,
        materialized: bool,
    },
    /// 明示的な複製。作成時点で子まで写し取られている。
    Copied { prototype: StmtId },
    /// 別の文脈を別の親の下に読み出し専用で見せる代理。
    Replica { original: StmtId },
}

/// アリーナに置かれる 1 文脈分の状態。
#[derive(Debug)]
pub struct StatementNode {
    pub(super) parent: Option<StmtId>,
    pub(super) source: SourceId,
    pub(super) shape: StmtShape,
    pub(super) support: SupportHandle,
    /// ソースに書かれたままのキーワード。拡張は接頭辞付きで残る。
    pub(super) keyword: String,
    pub(super) argument: ArgumentValue,
    pub(super) raw_argument: Option<String>,
    pub(super) location: SourceRef,
    pub(super) declared: Vec<StmtId>,
    pub(super) effective: Vec<StmtId>,
    /// 完了済みフェーズの実行順。単調にしか増えない。
    pub(super) completed: ExecutionOrder,
    pub(super) open_mutations: IndexMap<ModelProcessingPhase, u32>,
    pub(super) phase_listeners: Vec<(ModelProcessingPhase, PrereqRef)>,
    pub(super) copy_history: CopyHistory,
    /// 複製列の果ての、ソース由来の文脈。
    pub(super) original: Option<StmtId>,
    /// if-feature 判定の結果。未評価なら `None`。
    pub(super) supported: Option<bool>,
    pub(super) fully_defined: bool,
    /// ソース内の親の下での出現位置。ストリーム由来の文脈だけ持つ。
    pub(super) stream_position: Option<usize>,
    /// 暗黙に差し込まれた親 (choice 直下の case など) なら真。
    pub(super) implicit: bool,
    pub(super) declared_view: Option<Arc<DeclaredStatement>>,
    pub(super) effective_view: Option<Arc<EffectiveStatement>>,
    pub(super) storage: NamespaceStorage,
    pub(super) refcount: u32,
}

impl StatementNode {
    pub fn new(
        parent: Option<StmtId>,
        source: SourceId,
        shape: StmtShape,
        support: SupportHandle,
        keyword: String,
        argument: ArgumentValue,
        raw_argument: Option<String>,
        location: SourceRef,
    ) -> Self {
        Self {
            parent,
            source,
            shape,
            support,
            keyword,
            argument,
            raw_argument,
            location,
            declared: Vec::new(),
            effective: Vec::new(),
            completed: execution_order::NULL,
            open_mutations: IndexMap::new(),
            phase_listeners: Vec::new(),
            copy_history: CopyHistory::original(),
            original: None,
            supported: None,
            fully_defined: false,
            stream_position: None,
            implicit: false,
            declared_view: None,
            effective_view: None,
            storage: NamespaceStorage::new(),
            refcount: 0,
        }
    }

    pub fn parent(&self) -> Option<StmtId> {
        self.parent
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn shape(&self) -> &StmtShape {
        &self.shape
    }

    pub fn support(&self) -> SupportHandle {
        Arc::clone(&self.support)
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn argument(&self) -> &ArgumentValue {
        &self.argument
    }

    pub fn raw_argument(&self) -> Option<&str> {
        self.raw_argument.as_deref()
    }

    pub fn location(&self) -> &SourceRef {
        &self.location
    }

    pub fn copy_history(&self) -> CopyHistory {
        self.copy_history
    }

    pub fn is_completed(&self, phase: ModelProcessingPhase) -> bool {
        phase.is_completed_by(self.completed)
    }
}

/// 文脈アリーナ。
#[derive(Debug, Default)]
pub struct StatementTree {
    nodes: Vec<StatementNode>,
}

impl StatementTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: StatementNode) -> SchemaResult<StmtId> {
        let id = u32::try_from(self.nodes.len()).map_err(|_| ReactorError::Internal {
            message: "文脈アリーナが上限に達した".into(),
        })?;
        self.nodes.push(node);
        Ok(StmtId(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: StmtId) -> &StatementNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: StmtId) -> &mut StatementNode {
        &mut self.nodes[id.index()]
    }

    /// 代理 (replica) の連鎖をたどり、実体の文脈を返す。
    pub fn resolve(&self, id: StmtId) -> StmtId {
        let mut current = id;
        while let StmtShape::Replica { original } = self.node(current).shape {
            current = original;
        }
        current
    }

    /// 複製列の果てのソース由来文脈。複製でなければ自分自身。
    pub fn original_of(&self, id: StmtId) -> StmtId {
        self.node(id).original.unwrap_or(id)
    }

    pub fn declared_children(&self, id: StmtId) -> &[StmtId] {
        &self.node(self.resolve(id)).declared
    }

    pub fn effective_children(&self, id: StmtId) -> &[StmtId] {
        &self.node(self.resolve(id)).effective
    }

    /// 宣言された子と推論で足された子を宣言順で連ねて返す。
    pub fn all_children(&self, id: StmtId) -> Vec<StmtId> {
        let node = self.node(self.resolve(id));
        node.declared
            .iter()
            .chain(node.effective.iter())
            .copied()
            .collect()
    }

    pub fn add_declared_child(&mut self, parent: StmtId, child: StmtId) {
        self.node_mut(parent).declared.push(child);
    }

    pub fn add_effective_child(&mut self, parent: StmtId, child: StmtId) {
        self.node_mut(parent).effective.push(child);
    }

    /// ストリームの出現位置から再開すべき既存の子を探す。
    ///
    /// 暗黙に差し込まれた親の下に付け替えられた子も、元の親からの
    /// 探索で見つかる。
    pub fn find_resumed_child(&self, parent: StmtId, position: usize) -> Option<StmtId> {
        let node = self.node(parent);
        for &child in node.declared.iter().chain(node.effective.iter()) {
            let child_node = self.node(child);
            if child_node.stream_position == Some(position) {
                return Some(child);
            }
            if child_node.implicit {
                if let Some(found) = self.find_resumed_child(child, position) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// ルートまでの祖先列。自分自身は含まない。
    pub fn ancestors(&self, id: StmtId) -> Vec<StmtId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).parent;
        }
        chain
    }

    /// 属するソースのルート文脈。
    pub fn root_of(&self, id: StmtId) -> StmtId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current
    }

    /// フェーズ到達を待つリスナを登録する。既に到達済みなら登録せず
    /// 真を返し、呼び出し側がその場で解決する。
    pub fn add_phase_listener(
        &mut self,
        id: StmtId,
        phase: ModelProcessingPhase,
        target: PrereqRef,
    ) -> bool {
        let node = self.node_mut(id);
        if phase.is_completed_by(node.completed) {
            true
        } else {
            node.phase_listeners.push((phase, target));
            false
        }
    }

    /// フェーズ完了を差し止める変異を 1 件開く。
    pub fn open_mutation(&mut self, id: StmtId, phase: ModelProcessingPhase) {
        *self.node_mut(id).open_mutations.entry(phase).or_insert(0) += 1;
    }

    /// 変異を 1 件閉じる。開いていない変異を閉じるのは内部不整合。
    pub fn close_mutation(&mut self, id: StmtId, phase: ModelProcessingPhase) -> SchemaResult<()> {
        match self.node_mut(id).open_mutations.get_mut(&phase) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(ReactorError::Internal {
                message: format!("{} の変異カウントが負になった", phase),
            }
            .into()),
        }
    }

    fn has_open_mutations(&self, id: StmtId, phase: ModelProcessingPhase) -> bool {
        self.node(id)
            .open_mutations
            .get(&phase)
            .copied()
            .unwrap_or(0)
            > 0
    }

    /// 部分木のフェーズ完了を試みる。
    ///
    /// すべての子が到達し、かつ自分に開いた変異が無いときにだけ
    /// 完了し、到達を待っていたリスナを `fired` へ払い出す。
    /// 未実体化の複製は子を持たない扱いで完了できる。
    pub fn try_complete(
        &mut self,
        id: StmtId,
        phase: ModelProcessingPhase,
        fired: &mut Vec<PrereqRef>,
    ) -> SchemaResult<bool> {
        if self.node(id).is_completed(phase) {
            return Ok(true);
        }
        if let StmtShape::Replica { original } = self.node(id).shape {
            if self.node(original).is_completed(phase) {
                self.advance(id, phase, fired);
                return Ok(true);
            }
            return Ok(false);
        }
        if self.has_open_mutations(id, phase) {
            return Ok(false);
        }
        let children = self.all_children(id);
        let mut done = true;
        for child in children {
            if !self.try_complete(child, phase, fired)? {
                done = false;
            }
        }
        if done && self.has_open_mutations(id, phase) {
            done = false;
        }
        if done {
            self.advance(id, phase, fired);
        }
        Ok(done)
    }

    fn advance(&mut self, id: StmtId, phase: ModelProcessingPhase, fired: &mut Vec<PrereqRef>) {
        let node = self.node_mut(id);
        if node.completed < phase.execution_order() {
            node.completed = phase.execution_order();
        }
        let completed = node.completed;
        let mut index = 0;
        while index < node.phase_listeners.len() {
            if node.phase_listeners[index].0.is_completed_by(completed) {
                let (_, target) = node.phase_listeners.remove(index);
                fired.push(target);
            } else {
                index += 1;
            }
        }
    }
}
