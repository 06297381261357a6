//! 文脈の複製
//!
//! uses や augment の展開はすべてここを通る。複製の仕方は複製される
//! 文のサポートが宣言する方針で決まり、同じ文脈の共有、代理の作成、
//! 再帰的な複製、黙っての脱落のいずれかになる。遅延複製の文脈は
//! 子が初めて必要になったときにプロトタイプから写し取る。

use crate::error::{ReactorError, SchemaResult, SourceError};
use crate::model::QualifiedName;

use super::context::{StatementNode, StmtId, StmtShape};
use super::copy::{CopyPolicy, CopyType, ReplicaPolicy};
use super::global::BuildGlobalContext;
use super::namespace::{StorageRef, SCHEMA_TREE, SUPPORTED_FEATURES};

impl BuildGlobalContext {
    /// 文脈を新しい親の下へ複製する。
    ///
    /// 方針が文脈非依存なら同じ文脈をそのまま返し、無視なら `None`。
    /// 返った文脈はまだ親に繋がれていない。繋ぐのは
    /// [`attach_effective_child`](Self::attach_effective_child) の仕事。
    pub fn child_copy_of(
        &mut self,
        stmt: StmtId,
        parent: StmtId,
        copy_type: CopyType,
    ) -> SchemaResult<Option<StmtId>> {
        let original = self.tree.resolve(stmt);
        let support = self.tree.node(original).support();
        match support.copy_policy() {
            CopyPolicy::ContextIndependent => Ok(Some(original)),
            CopyPolicy::Ignore => Ok(None),
            CopyPolicy::Reject => Err(ReactorError::Internal {
                message: format!(
                    "{} は複製の中に現れてはならない",
                    self.tree.node(original).keyword()
                ),
            }
            .into()),
            CopyPolicy::ExactReplica => {
                // 代理越しの再複製だけが設定の対象。実体から作る最初の
                // 代理は設定に関わらず代理になる。
                if original != stmt
                    && self.config.replica_policy() == ReplicaPolicy::Reevaluate
                {
                    self.copy_of(original, parent, copy_type).map(Some)
                } else {
                    self.replica_of(original, parent).map(Some)
                }
            }
            CopyPolicy::DeclaredCopy => self.copy_of(original, parent, copy_type).map(Some),
        }
    }

    /// 文脈まるごとを新しい親の下へ複製し、子も作成時点で写し取る。
    ///
    /// 方針の扱いは [`child_copy_of`](Self::child_copy_of) と同じ。
    /// 宣言コピーになった場合は遅延実体化を待たずその場で子を写し、
    /// 複製済みの形に固定する。augment の対象への写し込みはこちらを使う。
    pub fn copy_as_child_of(
        &mut self,
        stmt: StmtId,
        parent: StmtId,
        copy_type: CopyType,
    ) -> SchemaResult<Option<StmtId>> {
        let Some(copied) = self.child_copy_of(stmt, parent, copy_type)? else {
            return Ok(None);
        };
        let prototype = match self.tree.node(copied).shape() {
            StmtShape::Inferred { prototype, .. } => *prototype,
            _ => return Ok(Some(copied)),
        };
        self.materialize(copied)?;
        self.tree.node_mut(copied).shape = StmtShape::Copied { prototype };
        Ok(Some(copied))
    }

    /// 実体を別の親の下に読み出し専用で見せる代理を作る。
    fn replica_of(&mut self, original: StmtId, parent: StmtId) -> SchemaResult<StmtId> {
        self.tree.pin(original);
        let source = self.tree.node(parent).source();
        let orig = self.tree.node(original);
        let mut node = StatementNode::new(
            Some(parent),
            source,
            StmtShape::Replica { original },
            orig.support(),
            orig.keyword().to_owned(),
            orig.argument().clone(),
            orig.raw_argument().map(str::to_owned),
            orig.location().clone(),
        );
        node.completed = orig.completed;
        node.copy_history = orig.copy_history;
        node.original = Some(self.tree.original_of(original));
        self.tree.alloc(node)
    }

    /// プロトタイプからの遅延複製を作る。子はまだ写し取らない。
    fn copy_of(
        &mut self,
        prototype: StmtId,
        parent: StmtId,
        copy_type: CopyType,
    ) -> SchemaResult<StmtId> {
        let source = self.tree.node(parent).source();
        let target_module = self.current_module_id(parent)?;
        let proto_module = self.current_module_id(prototype)?;

        let proto = self.tree.node(prototype);
        let support = proto.support();
        let argument = match (&target_module, &proto_module) {
            (Some(target), Some(from)) if target != from => {
                support.adapt_argument(proto.argument(), target)
            }
            _ => proto.argument().clone(),
        };
        let mut node = StatementNode::new(
            Some(parent),
            source,
            StmtShape::Inferred {
                prototype,
                materialized: false,
            },
            support,
            proto.keyword().to_owned(),
            argument,
            proto.raw_argument().map(str::to_owned),
            proto.location().clone(),
        );
        node.completed = proto.completed;
        node.copy_history = proto.copy_history.append(copy_type);
        node.original = Some(self.tree.original_of(prototype));
        self.tree.alloc(node)
    }

    /// 遅延複製の子を実体化する。2 回目以降の呼び出しは何もしない。
    ///
    /// プロトタイプの宣言された子のうち機能判定を通ったもの、および
    /// 推論で足された子を、この文脈の複製種別に合わせて写し取る。
    pub fn materialize(&mut self, stmt: StmtId) -> SchemaResult<()> {
        let (prototype, child_copy) = match self.tree.node(stmt).shape() {
            StmtShape::Inferred {
                prototype,
                materialized: false,
            } => (
                *prototype,
                self.tree.node(stmt).copy_history().last_operation().child_copy_type(),
            ),
            _ => return Ok(()),
        };
        if let StmtShape::Inferred { materialized, .. } = &mut self.tree.node_mut(stmt).shape {
            *materialized = true;
        }

        self.materialize(prototype)?;

        let declared = self.tree.declared_children(prototype).to_vec();
        for child in declared {
            if !self.is_supported(child)? {
                continue;
            }
            if let Some(copied) = self.child_copy_of(child, stmt, child_copy)? {
                self.attach_effective_child(stmt, copied)?;
            }
        }
        let effective = self.tree.effective_children(prototype).to_vec();
        for child in effective {
            if let Some(copied) = self.child_copy_of(child, stmt, child_copy)? {
                self.attach_effective_child(stmt, copied)?;
            }
        }
        Ok(())
    }

    /// 推論で生まれた子を親に繋ぐ。必要なら暗黙の親を間に挟む。
    pub fn attach_effective_child(&mut self, parent: StmtId, child: StmtId) -> SchemaResult<()> {
        let parent = self.tree.resolve(parent);
        // 文脈非依存の共有: 既に別の親を持つ文脈はそのまま相乗りする
        let attached = self.tree.node(child).parent();
        if attached.is_some() && attached != Some(parent) {
            self.tree.pin(child);
            self.tree.add_effective_child(parent, child);
            return Ok(());
        }

        let actual_parent = match self.interpose_implicit_parent(parent, child)? {
            Some(wrapper) => {
                self.tree.add_effective_child(parent, wrapper);
                self.register_schema_node(wrapper)?;
                wrapper
            }
            None => parent,
        };
        self.tree.node_mut(child).parent = Some(actual_parent);
        self.tree.add_effective_child(actual_parent, child);
        self.register_schema_node(child)
    }

    /// ソースストリーム由来の子を親に繋ぐ。
    pub(super) fn attach_declared_child(&mut self, parent: StmtId, child: StmtId) -> SchemaResult<()> {
        let actual_parent = match self.interpose_implicit_parent(parent, child)? {
            Some(wrapper) => {
                self.tree.add_declared_child(parent, wrapper);
                self.register_schema_node(wrapper)?;
                wrapper
            }
            None => parent,
        };
        self.tree.node_mut(child).parent = Some(actual_parent);
        self.tree.add_declared_child(actual_parent, child);
        self.register_schema_node(child)
    }

    /// 親のサポートが要求する暗黙の親を作る。choice 直下の case なし
    /// データノードに対する case がその例で、名前は子の識別子を
    /// 引き継ぐ。子リストへ繋ぐのは呼び出し側。
    fn interpose_implicit_parent(
        &mut self,
        parent: StmtId,
        child: StmtId,
    ) -> SchemaResult<Option<StmtId>> {
        let parent_support = self.tree.node(self.tree.resolve(parent)).support();
        let child_support = self.tree.node(child).support();
        let Some(wrapper_support) = parent_support.implicit_child_wrapper(child_support.definition())
        else {
            return Ok(None);
        };

        let child_node = self.tree.node(child);
        let mut wrapper = StatementNode::new(
            Some(parent),
            child_node.source(),
            StmtShape::Resumed,
            wrapper_support.clone(),
            wrapper_support.definition().keyword().to_owned(),
            child_node.argument().clone(),
            None,
            child_node.location().clone(),
        );
        wrapper.implicit = true;
        wrapper.completed = child_node.completed;
        wrapper.copy_history = child_node.copy_history();
        self.tree.alloc(wrapper).map(Some)
    }

    /// データノードを親のスキーマ木に登録する。同名の登録が既に
    /// あれば重複定義として失敗する。
    fn register_schema_node(&mut self, child: StmtId) -> SchemaResult<()> {
        let node = self.tree.node(child);
        if !node.support().is_schema_tree_member() {
            return Ok(());
        }
        let Some(parent) = node.parent() else {
            return Ok(());
        };
        let local = match node.argument().local_name() {
            Some(name) => name.clone(),
            // input/output は引数を持たず、キーワードがそのまま名前になる
            None => match crate::model::Unqualified::try_new(node.keyword()) {
                Ok(name) => name,
                Err(_) => return Ok(()),
            },
        };
        let location = node.location().clone();
        let Some(module) = self.current_module_id(child)? else {
            return Ok(());
        };
        let qname = QualifiedName {
            module,
            local: local.clone(),
        };
        let previous = self.put_ns(
            StorageRef::Statement(parent),
            SCHEMA_TREE,
            qname,
            child,
        )?;
        if previous.is_some() {
            return Err(SourceError::DuplicateDefinition {
                kind: "data node".into(),
                name: local.to_string(),
                at: location,
            }
            .into());
        }
        Ok(())
    }

    /// if-feature による有効判定。判定は文脈ごとに一度だけ行われる。
    pub fn is_supported(&mut self, stmt: StmtId) -> SchemaResult<bool> {
        if let Some(verdict) = self.tree.node(stmt).supported {
            return Ok(verdict);
        }
        let verdict = self.compute_supported(stmt)?;
        self.tree.node_mut(stmt).supported = Some(verdict);
        Ok(verdict)
    }

    fn compute_supported(&mut self, stmt: StmtId) -> SchemaResult<bool> {
        let Some(features) = self.get_ns(StorageRef::Global, SUPPORTED_FEATURES, ())? else {
            return Ok(true);
        };
        let children = self.tree.declared_children(stmt).to_vec();
        for child in children {
            let child_node = self.tree.node(child);
            if !child_node.support().is_feature_guard() {
                continue;
            }
            let argument = child_node.argument().clone();
            let crate::model::ArgumentValue::UnresolvedQName { prefix, local } = &argument else {
                continue;
            };
            let Some(feature) =
                self.resolve_qname(stmt, prefix.as_ref().map(|p| p.as_str()), local)?
            else {
                // 接頭辞が解決できない場合は if-feature 側の検査が報告する
                continue;
            };
            if !features.contains(&feature) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
