//! ビルド全体の大域文脈とフェーズ駆動
//!
//! [`StatementReactor`] はフェーズごとのサポート束だけを持つ不変の
//! 設定で、1 回のビルドの可変状態はすべて [`BuildGlobalContext`] に
//! 集まる。ここがソース群・文脈木・名前空間・推論動作を束ね、
//! フェーズを順に静止状態まで駆動する。

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::error::{ReactorError, SchemaError, SchemaResult};
use crate::model::{
    ArgumentValue, DeclaredModel, DeclaredModuleView, DeclaredStatement, EffectiveModel,
    EffectiveStatement, FeatureSet, ModuleId, ModuleView, QualifiedName, SourceKey, SourceRef,
    StatementView, Unqualified,
};

use super::action::PrereqValue;
use super::context::{StatementNode, StatementTree, StmtId, StmtShape};
use super::copy::ReplicaPolicy;
use super::namespace::{
    DeviationMap, NamespaceBehaviour, NamespaceId, NamespaceKey, NamespaceRegistry,
    NamespaceStorage, NamespaceValue, NsKey, NsValue, ParserNamespace, StorageRef,
    MODULES_DEVIATED_BY, MODULE_CTX_TO_ID, PREFIX_TO_MODULE, SUPPORTED_FEATURES,
};
use super::phase::ModelProcessingPhase;
use super::source::{PhaseCompletionProgress, SourceContext, SourceId, StatementStreamSource};
use super::support::{StatementSupportBundle, SupportHandle};

/// 取り込み時の互換動作。厳格モードでは import が正確なリビジョン
/// 一致でしか解決されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    #[default]
    Lenient,
    Strict,
}

/// リアクタの不変設定。フェーズごとのサポート束と、全束の名前空間
/// 登録を検証済みのレジストリ。
#[derive(Debug)]
pub(super) struct ReactorConfig {
    bundles: IndexMap<ModelProcessingPhase, Arc<StatementSupportBundle>>,
    registry: NamespaceRegistry,
    replica_policy: ReplicaPolicy,
}

impl ReactorConfig {
    pub(super) fn bundle_for(
        &self,
        phase: ModelProcessingPhase,
    ) -> Option<&Arc<StatementSupportBundle>> {
        self.bundles.get(&phase)
    }

    pub(super) fn replica_policy(&self) -> ReplicaPolicy {
        self.replica_policy
    }
}

/// 文サポートの束からモデルを組み立てるリアクタ。
///
/// 一度組み上げれば何度でも [`new_build`](Self::new_build) でビルドを
/// 開始できる。
#[derive(Debug, Clone)]
pub struct StatementReactor {
    config: Arc<ReactorConfig>,
}

impl StatementReactor {
    pub fn builder() -> StatementReactorBuilder {
        StatementReactorBuilder::default()
    }

    pub fn new_build(&self) -> BuildAction {
        BuildAction {
            rx: BuildGlobalContext::new(Arc::clone(&self.config)),
        }
    }
}

#[derive(Debug, Default)]
pub struct StatementReactorBuilder {
    bundles: IndexMap<ModelProcessingPhase, Arc<StatementSupportBundle>>,
    replica_policy: ReplicaPolicy,
}

impl StatementReactorBuilder {
    /// 指定フェーズの走査で使うサポート束を据える。
    pub fn bundle(
        mut self,
        phase: ModelProcessingPhase,
        bundle: Arc<StatementSupportBundle>,
    ) -> Self {
        self.bundles.insert(phase, bundle);
        self
    }

    /// 完全複製の文脈を抱えた親が再複製されたときの扱いを据える。
    pub fn replica_policy(mut self, policy: ReplicaPolicy) -> Self {
        self.replica_policy = policy;
        self
    }

    /// 全束の名前空間登録を検証してリアクタを組み上げる。
    pub fn build(self) -> SchemaResult<StatementReactor> {
        let mut registry = NamespaceRegistry::new();
        registry.register(
            SUPPORTED_FEATURES.id(),
            NamespaceBehaviour::Global,
            ModelProcessingPhase::Init,
        )?;
        registry.register(
            MODULES_DEVIATED_BY.id(),
            NamespaceBehaviour::Global,
            ModelProcessingPhase::Init,
        )?;
        for (phase, bundle) in &self.bundles {
            bundle.register_namespaces(&mut registry, *phase)?;
        }
        Ok(StatementReactor {
            config: Arc::new(ReactorConfig {
                bundles: self.bundles,
                registry,
                replica_policy: self.replica_policy,
            }),
        })
    }
}

/// 要求されるまで読み込まれないライブラリソースの置き場。
#[derive(Debug)]
struct LibrarySlot {
    key: SourceKey,
    stream: Option<Box<dyn StatementStreamSource>>,
}

/// ビルド 1 回分の可変状態。
///
/// リアクタ配下のモジュールはフィールドへ直接触れる。語彙のサポート
/// 実装には公開メソッドだけを見せる。
#[derive(Debug)]
pub struct BuildGlobalContext {
    pub(super) config: Arc<ReactorConfig>,
    registry: NamespaceRegistry,
    pub(super) tree: StatementTree,
    pub(super) sources: Vec<SourceContext>,
    libraries: Vec<LibrarySlot>,
    global_storage: NamespaceStorage,
    pub(super) listeners: super::namespace::NamespaceListeners,
    pub(super) current_phase: ModelProcessingPhase,
    parser_mode: ParserMode,
}

impl BuildGlobalContext {
    fn new(config: Arc<ReactorConfig>) -> Self {
        let registry = config.registry.clone();
        Self {
            config,
            registry,
            tree: StatementTree::new(),
            sources: Vec::new(),
            libraries: Vec::new(),
            global_storage: NamespaceStorage::new(),
            listeners: super::namespace::NamespaceListeners::new(),
            current_phase: ModelProcessingPhase::Init,
            parser_mode: ParserMode::default(),
        }
    }

    pub fn current_phase(&self) -> ModelProcessingPhase {
        self.current_phase
    }

    pub fn parser_mode(&self) -> ParserMode {
        self.parser_mode
    }

    /// 文脈ノードへの読み出しアクセス。代理は実体へ解決される。
    pub fn statement(&self, stmt: StmtId) -> &StatementNode {
        self.tree.node(self.tree.resolve(stmt))
    }

    /// 解決を挟まない、繋がれた場所での親。
    pub fn parent_of(&self, stmt: StmtId) -> Option<StmtId> {
        self.tree.node(stmt).parent()
    }

    pub fn root_of(&self, stmt: StmtId) -> StmtId {
        self.tree.root_of(stmt)
    }

    /// 文脈が属するソース。複製なら複製先のソースを返す。
    pub fn source_of(&self, stmt: StmtId) -> SourceId {
        self.tree.node(stmt).source()
    }

    pub fn source_key(&self, source: SourceId) -> &SourceKey {
        &self.sources[source.index()].key
    }

    pub fn declared_substatements(&self, stmt: StmtId) -> &[StmtId] {
        self.tree.declared_children(self.tree.resolve(stmt))
    }

    pub fn effective_substatements(&self, stmt: StmtId) -> &[StmtId] {
        self.tree.effective_children(stmt)
    }

    /// 指定キーワードの最初の宣言済み部分文。
    pub fn find_declared_substatement(&self, stmt: StmtId, keyword: &str) -> Option<StmtId> {
        self.declared_substatements(stmt)
            .iter()
            .copied()
            .find(|&child| self.tree.node(child).keyword() == keyword)
    }

    /// 暗黙の有効子を作って親へ繋ぐ。rpc 配下の input/output のように
    /// 書かれなくても存在する文のための入口。
    pub fn add_implicit_child(
        &mut self,
        parent: StmtId,
        support: SupportHandle,
    ) -> SchemaResult<StmtId> {
        let parent = self.tree.resolve(parent);
        let parent_node = self.tree.node(parent);
        let mut node = StatementNode::new(
            Some(parent),
            parent_node.source(),
            StmtShape::Resumed,
            Arc::clone(&support),
            support.definition().keyword().to_owned(),
            ArgumentValue::Empty,
            None,
            parent_node.location().clone(),
        );
        node.implicit = true;
        node.completed = parent_node.completed;
        node.copy_history = parent_node.copy_history();
        let child = self.tree.alloc(node)?;
        self.attach_effective_child(parent, child)?;
        Ok(child)
    }

    /// 宣言済み部分文の個数制約を検査する。
    pub fn validate_substatements(&self, stmt: StmtId) -> SchemaResult<()> {
        let id = self.tree.resolve(stmt);
        let support = self.tree.node(id).support();
        let Some(validator) = support.validator() else {
            return Ok(());
        };
        let children: Vec<(String, SourceRef)> = self
            .tree
            .declared_children(id)
            .iter()
            .map(|&child| {
                let node = self.tree.node(child);
                (node.keyword().to_owned(), node.location().clone())
            })
            .collect();
        validator.validate(&children, self.tree.node(id).location())
    }

    /// 型付き名前空間から 1 件読む。
    pub fn get_ns<K: NamespaceKey, V: NamespaceValue>(
        &mut self,
        origin: StorageRef,
        ns: ParserNamespace<K, V>,
        key: K,
    ) -> SchemaResult<Option<V>> {
        Ok(self
            .read_ns_entry(origin, ns.id(), &key.into_key())?
            .and_then(V::from_value))
    }

    /// 型付き名前空間へ 1 件書く。置き換えた以前の値を返す。
    pub fn put_ns<K: NamespaceKey, V: NamespaceValue>(
        &mut self,
        origin: StorageRef,
        ns: ParserNamespace<K, V>,
        key: K,
        value: V,
    ) -> SchemaResult<Option<V>> {
        Ok(self
            .write_ns_entry(origin, ns.id(), key.into_key(), value.into_value())?
            .and_then(V::from_value))
    }

    /// 挙動に従って格納を探索し、起点から見える 1 件を読む。
    ///
    /// 文局所の読み出しは遅延複製の実体化を先に要求する。スキーマ木
    /// の参照が未実体化の複製に触れるのはここが唯一の入口になる。
    pub(super) fn read_ns_entry(
        &mut self,
        origin: StorageRef,
        id: NamespaceId,
        key: &NsKey,
    ) -> SchemaResult<Option<NsValue>> {
        let behaviour = self.registry.available(id, self.current_phase)?.behaviour.clone();
        match behaviour {
            NamespaceBehaviour::Global => Ok(self.global_storage.get(id, key).cloned()),
            NamespaceBehaviour::SourceLocal => {
                let source = self.origin_source(origin)?;
                Ok(self.sources[source].storage.get(id, key).cloned())
            }
            NamespaceBehaviour::RootStatementLocal => match self.origin_root(origin)? {
                Some(root) => Ok(self.tree.node(root).storage.get(id, key).cloned()),
                None => Ok(None),
            },
            NamespaceBehaviour::StatementLocal => {
                let stmt = self.tree.resolve(self.origin_statement(origin)?);
                self.materialize(stmt)?;
                Ok(self.tree.node(stmt).storage.get(id, key).cloned())
            }
            NamespaceBehaviour::TreeScoped => {
                if let StorageRef::Statement(stmt) = origin {
                    let mut current = Some(self.tree.resolve(stmt));
                    while let Some(node) = current {
                        if let Some(value) = self.tree.node(node).storage.get(id, key) {
                            return Ok(Some(value.clone()));
                        }
                        current = self.tree.node(node).parent().map(|p| self.tree.resolve(p));
                    }
                }
                if !matches!(origin, StorageRef::Global) {
                    let source = self.origin_source(origin)?;
                    if let Some(value) = self.sources[source].storage.get(id, key) {
                        return Ok(Some(value.clone()));
                    }
                }
                Ok(self.global_storage.get(id, key).cloned())
            }
            NamespaceBehaviour::Derived { backing, transform } => {
                let Some(mapped) = transform.apply(key) else {
                    return Ok(None);
                };
                self.read_ns_entry(origin, backing, &mapped)
            }
        }
    }

    /// 起点から見える全エントリ。木スコープでは近いものが勝つ。
    pub(super) fn ns_entries_visible(
        &mut self,
        origin: StorageRef,
        id: NamespaceId,
    ) -> SchemaResult<Vec<(NsKey, NsValue)>> {
        let behaviour = self.registry.available(id, self.current_phase)?.behaviour.clone();
        fn cloned(storage: &NamespaceStorage, id: NamespaceId) -> Vec<(NsKey, NsValue)> {
            storage
                .entries(id)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }
        match behaviour {
            NamespaceBehaviour::Global => Ok(cloned(&self.global_storage, id)),
            NamespaceBehaviour::SourceLocal => {
                let source = self.origin_source(origin)?;
                Ok(cloned(&self.sources[source].storage, id))
            }
            NamespaceBehaviour::RootStatementLocal => match self.origin_root(origin)? {
                Some(root) => Ok(cloned(&self.tree.node(root).storage, id)),
                None => Ok(Vec::new()),
            },
            NamespaceBehaviour::StatementLocal => {
                let stmt = self.tree.resolve(self.origin_statement(origin)?);
                self.materialize(stmt)?;
                Ok(cloned(&self.tree.node(stmt).storage, id))
            }
            NamespaceBehaviour::TreeScoped => {
                let mut merged: IndexMap<NsKey, NsValue> = IndexMap::new();
                if let StorageRef::Statement(stmt) = origin {
                    let mut current = Some(self.tree.resolve(stmt));
                    while let Some(node) = current {
                        for (key, value) in self.tree.node(node).storage.entries(id) {
                            merged.entry(key.clone()).or_insert_with(|| value.clone());
                        }
                        current = self.tree.node(node).parent().map(|p| self.tree.resolve(p));
                    }
                }
                if !matches!(origin, StorageRef::Global) {
                    let source = self.origin_source(origin)?;
                    for (key, value) in self.sources[source].storage.entries(id) {
                        merged.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                for (key, value) in self.global_storage.entries(id) {
                    merged.entry(key.clone()).or_insert_with(|| value.clone());
                }
                Ok(merged.into_iter().collect())
            }
            NamespaceBehaviour::Derived { backing, transform } => {
                let entries = self.ns_entries_visible(origin, backing)?;
                Ok(entries
                    .into_iter()
                    .filter_map(|(key, value)| transform.invert(&key).map(|k| (k, value)))
                    .collect())
            }
        }
    }

    /// 挙動が決める格納ノードへ書き、見える待ち手を発火させる。
    ///
    /// 同じ値の上書きは何も起こさない。派生名前空間への書き込みは
    /// 捨てられ、状態はすべて裏側の名前空間が持つ。
    pub(super) fn write_ns_entry(
        &mut self,
        origin: StorageRef,
        id: NamespaceId,
        key: NsKey,
        value: NsValue,
    ) -> SchemaResult<Option<NsValue>> {
        let behaviour = self.registry.available(id, self.current_phase)?.behaviour.clone();
        let (previous, target) = match &behaviour {
            NamespaceBehaviour::Derived { .. } => {
                trace!("派生名前空間 {id} への書き込みを捨てる");
                return Ok(None);
            }
            NamespaceBehaviour::Global => (
                self.global_storage.put(id, key.clone(), value.clone()),
                StorageRef::Global,
            ),
            NamespaceBehaviour::SourceLocal => {
                let source = self.origin_source(origin)?;
                (
                    self.sources[source].storage.put(id, key.clone(), value.clone()),
                    StorageRef::Source(SourceId(source as u32)),
                )
            }
            NamespaceBehaviour::RootStatementLocal => {
                let Some(root) = self.origin_root(origin)? else {
                    return Err(ReactorError::Internal {
                        message: format!("ルート未確定のソースが {id} へ書き込んだ"),
                    }
                    .into());
                };
                (
                    self.tree.node_mut(root).storage.put(id, key.clone(), value.clone()),
                    StorageRef::Statement(root),
                )
            }
            NamespaceBehaviour::StatementLocal | NamespaceBehaviour::TreeScoped => {
                let stmt = self.tree.resolve(self.origin_statement(origin)?);
                (
                    self.tree.node_mut(stmt).storage.put(id, key.clone(), value.clone()),
                    StorageRef::Statement(stmt),
                )
            }
        };
        if previous.as_ref() == Some(&value) {
            return Ok(previous);
        }
        trace!("{id}[{key}] を書き込む");

        let mut fired = {
            let tree = &self.tree;
            let sources = &self.sources;
            self.listeners.fire(id, &key, &value, |origin| {
                write_visible_from(tree, sources, &behaviour, target, origin)
            })
        };
        for (derived_id, transform) in self.registry.derived_over(id) {
            if let Some(derived_key) = transform.invert(&key) {
                let tree = &self.tree;
                let sources = &self.sources;
                fired.extend(self.listeners.fire(derived_id, &derived_key, &value, |origin| {
                    write_visible_from(tree, sources, &behaviour, target, origin)
                }));
            }
        }
        for listener in fired {
            self.resolve_prereq(listener.target, PrereqValue::Ns(listener.value));
        }
        Ok(previous)
    }

    fn origin_source(&self, origin: StorageRef) -> SchemaResult<usize> {
        match origin {
            StorageRef::Global => Err(ReactorError::Internal {
                message: "ソース局所名前空間にグローバル起点で触れた".into(),
            }
            .into()),
            StorageRef::Source(id) => Ok(id.index()),
            StorageRef::Statement(stmt) => Ok(self.tree.node(stmt).source().index()),
        }
    }

    fn origin_statement(&self, origin: StorageRef) -> SchemaResult<StmtId> {
        match origin {
            StorageRef::Statement(stmt) => Ok(stmt),
            _ => Err(ReactorError::Internal {
                message: "文局所名前空間に文以外の起点で触れた".into(),
            }
            .into()),
        }
    }

    fn origin_root(&self, origin: StorageRef) -> SchemaResult<Option<StmtId>> {
        match origin {
            StorageRef::Global => Err(ReactorError::Internal {
                message: "ルート文局所名前空間にグローバル起点で触れた".into(),
            }
            .into()),
            StorageRef::Source(id) => Ok(self.sources[id.index()].root),
            StorageRef::Statement(stmt) => Ok(Some(self.tree.root_of(stmt))),
        }
    }

    /// 文が繋がれている場所のモジュール識別子。
    pub fn current_module_id(&mut self, stmt: StmtId) -> SchemaResult<Option<ModuleId>> {
        let root = self.tree.root_of(self.tree.resolve(stmt));
        self.get_ns(StorageRef::Global, MODULE_CTX_TO_ID, root)
    }

    /// 接頭辞付きの名前を完全名へ解決する。
    ///
    /// 解決は定義文脈で行う。複製で運ばれてきた文は複製元をたどり、
    /// 定義元ソースの接頭辞表を引く。接頭辞が無ければ定義元の
    /// モジュール自身に属する。
    pub fn resolve_qname(
        &mut self,
        stmt: StmtId,
        prefix: Option<&str>,
        local: &Unqualified,
    ) -> SchemaResult<Option<QualifiedName>> {
        let base = self.tree.original_of(self.tree.resolve(stmt));
        let module = match prefix {
            None => {
                let root = self.tree.root_of(base);
                self.get_ns(StorageRef::Global, MODULE_CTX_TO_ID, root)?
            }
            Some(prefix) => {
                let source = self.tree.node(base).source();
                let Some(module_ctx) = self.get_ns(
                    StorageRef::Source(source),
                    PREFIX_TO_MODULE,
                    prefix.to_owned(),
                )?
                else {
                    return Ok(None);
                };
                self.get_ns(StorageRef::Global, MODULE_CTX_TO_ID, module_ctx)?
            }
        };
        Ok(module.map(|module| QualifiedName {
            module,
            local: local.clone(),
        }))
    }

    pub(super) fn record_source_failure(&mut self, source: SourceId, error: SchemaError) {
        debug!("ソース {} の失敗を記録する: {error}", self.sources[source.index()].key);
        self.sources[source.index()].failures.push(error);
    }

    /// 実行フェーズを `last` まで順に駆動する。
    pub(super) fn execute_phases(&mut self, last: ModelProcessingPhase) -> SchemaResult<()> {
        for phase in ModelProcessingPhase::executable_phases() {
            if phase > last {
                break;
            }
            self.current_phase = phase;
            debug!("フェーズ {phase} を開始する ({} ソース)", self.sources.len());
            self.drive_phase(phase)?;
        }
        Ok(())
    }

    /// 1 フェーズを静止状態まで進める。
    ///
    /// 走査でストリームを写した後、完了試行と動作の実行を進捗が
    /// 止まるまで繰り返す。静止してなお残った動作はちょうど 1 回
    /// 棄却され、棄却が変異を閉じた分だけもう一巡だけ続ける。
    fn drive_phase(&mut self, phase: ModelProcessingPhase) -> SchemaResult<()> {
        if phase != ModelProcessingPhase::EffectiveModel {
            self.load_phase_statements(phase);
            if phase == ModelProcessingPhase::SourcePreLinkage {
                self.pull_required_libraries(phase);
            }
        }
        loop {
            loop {
                let mut progressed = false;
                for index in 0..self.sources.len() {
                    if !self.sources[index].failures.is_empty()
                        || self.sources[index].finished >= phase
                    {
                        continue;
                    }
                    match self.try_finish_source_phase(index, phase) {
                        Ok(PhaseCompletionProgress::NoProgress) => {}
                        Ok(_) => progressed = true,
                        Err(error) => self.record_source_failure(SourceId(index as u32), error),
                    }
                }
                if self.run_pending_actions() {
                    progressed = true;
                }
                if !progressed {
                    break;
                }
            }
            let mut rejected = false;
            for index in 0..self.sources.len() {
                if self.sources[index].failures.is_empty()
                    && self.sources[index].finished < phase
                    && self.has_pending_modifiers(index, phase)
                {
                    self.fail_source_modifiers(index);
                    rejected = true;
                }
            }
            if !rejected {
                break;
            }
        }
        let unfinished: Vec<usize> = (0..self.sources.len())
            .filter(|&index| {
                !self.sources[index].failures.is_empty() || self.sources[index].finished < phase
            })
            .collect();
        if unfinished.is_empty() {
            debug!("フェーズ {phase} が完了した ({} 文脈)", self.tree.len());
            return Ok(());
        }
        Err(self.aggregate_failure(phase, &unfinished))
    }

    /// 各ソースのストリームをこのフェーズ分だけ木へ写す。1 フェーズ
    /// につき 1 回きり。途中の失敗はソース単位で記録して先へ進む。
    fn load_phase_statements(&mut self, phase: ModelProcessingPhase) {
        for index in 0..self.sources.len() {
            if !self.sources[index].failures.is_empty() {
                continue;
            }
            match self.stream_source(index, phase) {
                Ok(true) => {
                    trace!("ソース {} が新しい文脈を書いた", self.sources[index].key)
                }
                Ok(false) => {}
                Err(error) => self.record_source_failure(SourceId(index as u32), error),
            }
        }
    }

    /// 要求されたライブラリソースを取り込み切るまで繰り返す。
    ///
    /// 正確なリビジョン要求を先に満たし、動きが無くなったら名前
    /// だけの要求を手持ちの最新リビジョンで満たす。これを交互に、
    /// どちらも進まなくなるまで続ける。満たせない要求が残っても
    /// ここでは失敗にしない。足りない分は import の解決が報告する。
    fn pull_required_libraries(&mut self, phase: ModelProcessingPhase) {
        loop {
            for slot in &mut self.libraries {
                if slot.stream.is_some() && self.sources.iter().any(|s| s.key == slot.key) {
                    debug!("読み込み済みと重複するライブラリソース {} を捨てる", slot.key);
                    slot.stream = None;
                }
            }
            let required: Vec<SourceKey> = self
                .sources
                .iter()
                .flat_map(|source| source.required.iter().cloned())
                .collect();
            let mut promoted = false;
            for wanted in required.iter().filter(|key| key.revision.is_some()) {
                if self.sources.iter().any(|s| &s.key == wanted) {
                    continue;
                }
                if let Some(index) = self
                    .libraries
                    .iter()
                    .position(|slot| slot.stream.is_some() && &slot.key == wanted)
                {
                    self.promote_library(index, phase);
                    promoted = true;
                }
            }
            if promoted {
                continue;
            }
            for wanted in required.iter().filter(|key| key.revision.is_none()) {
                if self.sources.iter().any(|s| s.key.name == wanted.name) {
                    continue;
                }
                let mut best: Option<usize> = None;
                for (index, slot) in self.libraries.iter().enumerate() {
                    if slot.stream.is_none() || slot.key.name != wanted.name {
                        continue;
                    }
                    match best {
                        Some(current) if self.libraries[current].key.revision >= slot.key.revision => {}
                        _ => best = Some(index),
                    }
                }
                if let Some(index) = best {
                    self.promote_library(index, phase);
                    promoted = true;
                }
            }
            if !promoted {
                break;
            }
        }
    }

    fn promote_library(&mut self, library_index: usize, phase: ModelProcessingPhase) {
        let Some(stream) = self.libraries[library_index].stream.take() else {
            return;
        };
        let id = SourceId(self.sources.len() as u32);
        debug!("ライブラリソース {} を取り込む", self.libraries[library_index].key);
        let mut context = SourceContext::new(id, stream);
        context.library = true;
        self.sources.push(context);
        if let Err(error) = self.stream_source(id.index(), phase) {
            self.record_source_failure(id, error);
        }
    }

    /// 未完のソースの失敗を 1 つの例外へ集約する。最初の失敗が第一
    /// 原因になり、同じソースの残りと他ソースの分は抑制側に並ぶ。
    fn aggregate_failure(&mut self, phase: ModelProcessingPhase, unfinished: &[usize]) -> SchemaError {
        let mut primary: Option<(SourceKey, SchemaError, Vec<SchemaError>)> = None;
        for &index in unfinished {
            let key = self.sources[index].key.clone();
            let mut failures = std::mem::take(&mut self.sources[index].failures);
            if failures.is_empty() {
                failures.push(SchemaError::Other(format!(
                    "ソース {key} はフェーズ {phase} を完了できなかった"
                )));
            }
            let first = failures.remove(0);
            match &mut primary {
                None => primary = Some((key, first, failures)),
                Some((_, _, suppressed)) => {
                    suppressed.push(first);
                    suppressed.extend(failures);
                }
            }
        }
        match primary {
            Some((source, cause, suppressed)) => ReactorError::SomeModifiersUnresolved {
                phase,
                source,
                cause: Box::new(cause),
                suppressed,
            }
            .into(),
            None => ReactorError::Internal {
                message: format!("フェーズ {phase} の失敗集約が空だった"),
            }
            .into(),
        }
    }

    /// 宣言ビューを組み立てる。文脈ごとに最大 1 回で、複製は複製元の
    /// ビューを共有する。
    pub(super) fn build_declared_view(&mut self, stmt: StmtId) -> SchemaResult<Arc<DeclaredStatement>> {
        let id = self.tree.original_of(self.tree.resolve(stmt));
        if let Some(view) = &self.tree.node(id).declared_view {
            return Ok(Arc::clone(view));
        }
        let children = self.tree.declared_children(id).to_vec();
        let mut substatements = Vec::with_capacity(children.len());
        for child in children {
            substatements.push(self.build_declared_view(child)?);
        }
        let node = self.tree.node(id);
        let view = Arc::new(DeclaredStatement {
            view: StatementView {
                keyword: node.keyword().to_owned(),
                argument: node.argument().clone(),
                raw_argument: node.raw_argument().map(str::to_owned),
                location: node.location().clone(),
                substatements,
            },
        });
        self.tree.node_mut(id).declared_view = Some(Arc::clone(&view));
        Ok(view)
    }

    /// 有効ビューを組み立てる。遅延複製はここで実体化され、機能で
    /// 無効な子と定義専用の文は脱落する。
    pub(super) fn build_effective_view(&mut self, stmt: StmtId) -> SchemaResult<Arc<EffectiveStatement>> {
        let id = self.tree.resolve(stmt);
        if let Some(view) = &self.tree.node(id).effective_view {
            return Ok(Arc::clone(view));
        }
        self.materialize(id)?;
        let children = self.tree.all_children(id);
        let mut substatements = Vec::with_capacity(children.len());
        for child in children {
            if !self.is_supported(child)? {
                continue;
            }
            let support = self.tree.node(self.tree.resolve(child)).support();
            if !support.is_effective_in_place() {
                continue;
            }
            substatements.push(self.build_effective_view(child)?);
        }
        let declared = if self.tree.node(id).implicit {
            None
        } else {
            Some(self.build_declared_view(id)?)
        };
        let node = self.tree.node(id);
        let view = Arc::new(EffectiveStatement {
            view: StatementView {
                keyword: node.keyword().to_owned(),
                argument: node.argument().clone(),
                raw_argument: node.raw_argument().map(str::to_owned),
                location: node.location().clone(),
                substatements,
            },
            declared,
        });
        self.tree.node_mut(id).effective_view = Some(Arc::clone(&view));
        Ok(view)
    }

    pub(super) fn assemble_declared(&mut self) -> SchemaResult<DeclaredModel> {
        let mut modules = Vec::new();
        for index in 0..self.sources.len() {
            if self.sources[index].library {
                continue;
            }
            let key = self.sources[index].key.clone();
            let Some(root) = self.sources[index].root else {
                return Err(ReactorError::Internal {
                    message: format!("完了したソース {key} にルート文脈が無い"),
                }
                .into());
            };
            let declared = self.build_declared_view(root)?;
            modules.push(DeclaredModuleView {
                source: key,
                declared,
            });
        }
        Ok(DeclaredModel { modules })
    }

    pub(super) fn assemble_model(&mut self) -> SchemaResult<EffectiveModel> {
        let mut modules = Vec::new();
        for index in 0..self.sources.len() {
            if self.sources[index].library {
                continue;
            }
            let key = self.sources[index].key.clone();
            let Some(root) = self.sources[index].root else {
                return Err(ReactorError::Internal {
                    message: format!("完了したソース {key} にルート文脈が無い"),
                }
                .into());
            };
            let declared = self.build_declared_view(root)?;
            let effective = self.build_effective_view(root)?;
            modules.push(ModuleView {
                source: key,
                declared,
                effective,
            });
        }
        Ok(EffectiveModel { modules })
    }

    /// ビューの組み立て後に不要になった文脈の格納を回収する。代理の
    /// 回収が実体の参照を外すので、進まなくなるまで繰り返す。
    pub(super) fn sweep_all(&mut self) {
        let roots: Vec<StmtId> = self.sources.iter().filter_map(|s| s.root).collect();
        let mut total = 0;
        loop {
            let mut swept = 0;
            for &root in &roots {
                swept += self.tree.sweep(root);
            }
            if swept == 0 {
                break;
            }
            total += swept;
        }
        for source in &mut self.sources {
            source.storage = NamespaceStorage::new();
        }
        debug!("{total} 文脈の格納を回収した (全 {} 文脈)", self.tree.len());
    }
}

/// `target` への書き込みが `origin` の待ち手から見えるか。
fn write_visible_from(
    tree: &StatementTree,
    sources: &[SourceContext],
    behaviour: &NamespaceBehaviour,
    target: StorageRef,
    origin: StorageRef,
) -> bool {
    match behaviour {
        NamespaceBehaviour::Global => true,
        NamespaceBehaviour::SourceLocal => {
            let origin_source = match origin {
                StorageRef::Global => return false,
                StorageRef::Source(id) => id,
                StorageRef::Statement(stmt) => tree.node(stmt).source(),
            };
            target == StorageRef::Source(origin_source)
        }
        NamespaceBehaviour::RootStatementLocal => {
            let origin_root = match origin {
                StorageRef::Global => return false,
                StorageRef::Source(id) => sources[id.index()].root,
                StorageRef::Statement(stmt) => Some(tree.root_of(stmt)),
            };
            origin_root.map(StorageRef::Statement) == Some(target)
        }
        NamespaceBehaviour::StatementLocal => match origin {
            StorageRef::Statement(stmt) => StorageRef::Statement(tree.resolve(stmt)) == target,
            _ => false,
        },
        NamespaceBehaviour::TreeScoped => {
            let StorageRef::Statement(origin_stmt) = origin else {
                return false;
            };
            let StorageRef::Statement(written) = target else {
                return false;
            };
            let mut current = Some(tree.resolve(origin_stmt));
            while let Some(node) = current {
                if node == written {
                    return true;
                }
                current = tree.node(node).parent().map(|p| tree.resolve(p));
            }
            false
        }
        NamespaceBehaviour::Derived { .. } => false,
    }
}

/// ビルド 1 回分の入口。ソースと設定を与えてからモデルを要求する。
#[derive(Debug)]
pub struct BuildAction {
    rx: BuildGlobalContext,
}

impl BuildAction {
    /// 最終モデルに含まれる主ソースを追加する。
    pub fn add_source(&mut self, source: Box<dyn StatementStreamSource>) {
        let id = SourceId(self.rx.sources.len() as u32);
        debug!("主ソース {} を追加する", source.key());
        self.rx.sources.push(SourceContext::new(id, source));
    }

    /// 他のソースから要求されたときだけ読み込まれるライブラリ
    /// ソースを追加する。
    pub fn add_library_source(&mut self, source: Box<dyn StatementStreamSource>) {
        debug!("ライブラリソース {} を登録する", source.key());
        self.rx.libraries.push(LibrarySlot {
            key: source.key(),
            stream: Some(source),
        });
    }

    /// 有効と見なす機能の集合。`None` なら全機能が有効。
    pub fn set_supported_features(&mut self, features: Option<FeatureSet>) -> SchemaResult<()> {
        if let Some(features) = features {
            self.rx
                .put_ns(StorageRef::Global, SUPPORTED_FEATURES, (), Arc::new(features))?;
        }
        Ok(())
    }

    /// モジュールごとに逸脱の適用を許す元モジュールの表。
    pub fn set_modules_deviated_by(&mut self, deviations: DeviationMap) -> SchemaResult<()> {
        self.rx
            .put_ns(StorageRef::Global, MODULES_DEVIATED_BY, (), Arc::new(deviations))?;
        Ok(())
    }

    pub fn set_parser_mode(&mut self, mode: ParserMode) {
        self.rx.parser_mode = mode;
    }

    /// 完全宣言フェーズまで進め、宣言ビューを返す。
    pub fn build_declared(mut self) -> SchemaResult<DeclaredModel> {
        self.rx.execute_phases(ModelProcessingPhase::FullDeclaration)?;
        self.rx.assemble_declared()
    }

    /// 有効モデルフェーズまで進め、最終モデルを返す。
    pub fn build_effective(mut self) -> SchemaResult<EffectiveModel> {
        self.rx.execute_phases(ModelProcessingPhase::EffectiveModel)?;
        let model = self.rx.assemble_model()?;
        self.rx.sweep_all();
        Ok(model)
    }
}
