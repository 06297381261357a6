//! 名前空間の格納と可視性制御
//!
//! リアクタの各部は名前空間を介してのみ情報を共有する。名前空間は
//! 型付きトークン [`ParserNamespace`] で識別され、実体はキーと値の
//! 平坦な表現 ([`NsKey`] / [`NsValue`]) として文・ソース・グローバルの
//! いずれかの格納ノードに保持される。どのノードに書き込み、どの範囲
//! から読み出せるかは登録済みの [`NamespaceBehaviour`] が決める。

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ReactorError, SchemaResult};
use crate::model::{FeatureSet, ModuleId, QualifiedName, SourceKey, Unqualified};

use super::action::PrereqRef;
use super::context::StmtId;
use super::phase::ModelProcessingPhase;
use super::source::SourceId;
use super::support::SupportHandle;

/// モジュール単位の逸脱(deviation)対応表。
pub type DeviationMap = IndexMap<ModuleId, Vec<ModuleId>>;

/// 名前空間の識別子。登録と参照の両方で同じ静的文字列を使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub &'static str);

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// 名前空間への型付きの入口。
///
/// 格納自体は [`NsKey`] と [`NsValue`] に平坦化されるが、利用側は
/// このトークンを通じてキーと値の型を静的に固定できる。
pub struct ParserNamespace<K, V> {
    id: NamespaceId,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> ParserNamespace<K, V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            id: NamespaceId(name),
            _marker: PhantomData,
        }
    }

    pub const fn id(&self) -> NamespaceId {
        self.id
    }
}

impl<K: NamespaceKey, V: NamespaceValue> ParserNamespace<K, V> {
    pub fn key(&self, key: K) -> NsKey {
        key.into_key()
    }

    pub fn encode(&self, value: V) -> NsValue {
        value.into_value()
    }

    pub fn decode(&self, value: NsValue) -> Option<V> {
        V::from_value(value)
    }
}

impl<K, V> Clone for ParserNamespace<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for ParserNamespace<K, V> {}

impl<K, V> fmt::Debug for ParserNamespace<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParserNamespace").field(&self.id.0).finish()
    }
}

/// 名前空間キーの平坦表現。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NsKey {
    /// キーを持たない設定値用の単一キー。
    Empty,
    Name(Unqualified),
    Prefix(String),
    Source(SourceKey),
    Module(ModuleId),
    QName(QualifiedName),
    Stmt(StmtId),
}

impl fmt::Display for NsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("()"),
            Self::Name(name) => write!(f, "{name}"),
            Self::Prefix(prefix) => write!(f, "{prefix}"),
            Self::Source(key) => write!(f, "{key}"),
            Self::Module(id) => write!(f, "{id}"),
            Self::QName(name) => write!(f, "{name}"),
            Self::Stmt(id) => write!(f, "{id:?}"),
        }
    }
}

/// 名前空間値の平坦表現。文脈参照と設定値の双方を運ぶ。
#[derive(Debug, Clone)]
pub enum NsValue {
    Stmt(StmtId),
    Module(ModuleId),
    Name(Unqualified),
    Source(SourceKey),
    Uri(String),
    Features(Arc<FeatureSet>),
    Deviations(Arc<DeviationMap>),
    Support(SupportHandle),
}

impl PartialEq for NsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Stmt(a), Self::Stmt(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => a == b,
            (Self::Name(a), Self::Name(b)) => a == b,
            (Self::Source(a), Self::Source(b)) => a == b,
            (Self::Uri(a), Self::Uri(b)) => a == b,
            (Self::Features(a), Self::Features(b)) => a == b,
            (Self::Deviations(a), Self::Deviations(b)) => a == b,
            (Self::Support(a), Self::Support(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for NsValue {}

/// [`NsKey`] へ変換できるキー型。
pub trait NamespaceKey: Clone {
    fn into_key(self) -> NsKey;
}

impl NamespaceKey for () {
    fn into_key(self) -> NsKey {
        NsKey::Empty
    }
}

impl NamespaceKey for Unqualified {
    fn into_key(self) -> NsKey {
        NsKey::Name(self)
    }
}

impl NamespaceKey for String {
    fn into_key(self) -> NsKey {
        NsKey::Prefix(self)
    }
}

impl NamespaceKey for SourceKey {
    fn into_key(self) -> NsKey {
        NsKey::Source(self)
    }
}

impl NamespaceKey for ModuleId {
    fn into_key(self) -> NsKey {
        NsKey::Module(self)
    }
}

impl NamespaceKey for QualifiedName {
    fn into_key(self) -> NsKey {
        NsKey::QName(self)
    }
}

impl NamespaceKey for StmtId {
    fn into_key(self) -> NsKey {
        NsKey::Stmt(self)
    }
}

/// [`NsValue`] との間で往復できる値型。
pub trait NamespaceValue: Clone + Sized {
    fn into_value(self) -> NsValue;
    fn from_value(value: NsValue) -> Option<Self>;
}

impl NamespaceValue for StmtId {
    fn into_value(self) -> NsValue {
        NsValue::Stmt(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Stmt(id) => Some(id),
            _ => None,
        }
    }
}

impl NamespaceValue for ModuleId {
    fn into_value(self) -> NsValue {
        NsValue::Module(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Module(id) => Some(id),
            _ => None,
        }
    }
}

impl NamespaceValue for Unqualified {
    fn into_value(self) -> NsValue {
        NsValue::Name(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl NamespaceValue for SourceKey {
    fn into_value(self) -> NsValue {
        NsValue::Source(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Source(key) => Some(key),
            _ => None,
        }
    }
}

impl NamespaceValue for String {
    fn into_value(self) -> NsValue {
        NsValue::Uri(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Uri(uri) => Some(uri),
            _ => None,
        }
    }
}

impl NamespaceValue for Arc<FeatureSet> {
    fn into_value(self) -> NsValue {
        NsValue::Features(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Features(set) => Some(set),
            _ => None,
        }
    }
}

impl NamespaceValue for Arc<DeviationMap> {
    fn into_value(self) -> NsValue {
        NsValue::Deviations(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Deviations(map) => Some(map),
            _ => None,
        }
    }
}

impl NamespaceValue for SupportHandle {
    fn into_value(self) -> NsValue {
        NsValue::Support(self)
    }

    fn from_value(value: NsValue) -> Option<Self> {
        match value {
            NsValue::Support(support) => Some(support),
            _ => None,
        }
    }
}

/// 派生名前空間のキー変換。要求キーを裏側の名前空間のキーへ写す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyTransform {
    /// キーをそのまま使う別名。
    Identity,
    /// モジュール名をリビジョン無しのソースキーへ写す。
    NameToAnyRevision,
}

impl KeyTransform {
    pub fn apply(&self, key: &NsKey) -> Option<NsKey> {
        match self {
            Self::Identity => Some(key.clone()),
            Self::NameToAnyRevision => match key {
                NsKey::Name(name) => Some(NsKey::Source(SourceKey {
                    name: name.clone(),
                    revision: None,
                })),
                _ => None,
            },
        }
    }

    /// 逆方向の変換。裏側への書き込みがどの派生キーとして見えるかを
    /// 返す。対応する派生キーが無い書き込みは `None`。
    pub fn invert(&self, key: &NsKey) -> Option<NsKey> {
        match self {
            Self::Identity => Some(key.clone()),
            Self::NameToAnyRevision => match key {
                NsKey::Source(SourceKey {
                    name,
                    revision: None,
                }) => Some(NsKey::Name(name.clone())),
                _ => None,
            },
        }
    }
}

/// 名前空間の可視性の種別。
///
/// 書き込み先と読み出し時の探索範囲を決める。読み出しの探索は
/// 文からルート文、ソース、グローバルの順で親格納へ遡る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceBehaviour {
    /// リアクタ全体で単一の表。
    Global,
    /// ソースごとの表。同一ソース内の文からだけ見える。
    SourceLocal,
    /// ルート文ごとの表。ソース内のどの文からも見える。
    RootStatementLocal,
    /// 書き込んだ文の上でだけ見える。
    StatementLocal,
    /// 書き込んだ文を根とする部分木から見える。
    TreeScoped,
    /// 別の名前空間からキー変換で引く読み出し専用の窓。
    Derived {
        backing: NamespaceId,
        transform: KeyTransform,
    },
}

/// 登録済み名前空間。`since` 以降のフェーズでのみ利用できる。
#[derive(Debug, Clone)]
pub struct RegisteredNamespace {
    pub behaviour: NamespaceBehaviour,
    pub since: ModelProcessingPhase,
}

/// リアクタ構築時に確定する名前空間の一覧。
///
/// 同じ識別子を異なる可視性で登録し直すことはできない。
#[derive(Debug, Default, Clone)]
pub struct NamespaceRegistry {
    entries: IndexMap<NamespaceId, RegisteredNamespace>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: NamespaceId,
        behaviour: NamespaceBehaviour,
        since: ModelProcessingPhase,
    ) -> SchemaResult<()> {
        match self.entries.get(&id) {
            None => {
                self.entries.insert(id, RegisteredNamespace { behaviour, since });
                Ok(())
            }
            Some(existing) if existing.behaviour == behaviour => Ok(()),
            Some(_) => Err(ReactorError::Internal {
                message: format!("名前空間 {id} が異なる可視性で再登録された"),
            }
            .into()),
        }
    }

    /// 現在のフェーズで利用可能な登録を返す。未登録または早すぎる
    /// 参照は利用側の定義漏れであり、即座に失敗させる。
    pub fn available(
        &self,
        id: NamespaceId,
        phase: ModelProcessingPhase,
    ) -> SchemaResult<&RegisteredNamespace> {
        match self.entries.get(&id) {
            Some(entry) if entry.since <= phase => Ok(entry),
            _ => Err(ReactorError::NamespaceNotAvailable {
                namespace: id.0,
                phase,
            }
            .into()),
        }
    }

    pub fn contains(&self, id: NamespaceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// `backing` を裏側に持つ派生名前空間の一覧。裏側への書き込みを
    /// 派生側の待機者へも届けるために使う。
    pub fn derived_over(&self, backing: NamespaceId) -> Vec<(NamespaceId, KeyTransform)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| match &entry.behaviour {
                NamespaceBehaviour::Derived {
                    backing: b,
                    transform,
                } if *b == backing => Some((*id, transform.clone())),
                _ => None,
            })
            .collect()
    }
}

/// 1 つの格納ノードが持つ名前空間の実体。
#[derive(Debug, Default, Clone)]
pub struct NamespaceStorage {
    namespaces: IndexMap<NamespaceId, IndexMap<NsKey, NsValue>>,
}

impl NamespaceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NamespaceId, key: &NsKey) -> Option<&NsValue> {
        self.namespaces.get(&id)?.get(key)
    }

    /// 値を格納し、置き換えた以前の値を返す。
    pub fn put(&mut self, id: NamespaceId, key: NsKey, value: NsValue) -> Option<NsValue> {
        self.namespaces.entry(id).or_default().insert(key, value)
    }

    /// 指定名前空間の全エントリを挿入順で返す。
    pub fn entries(&self, id: NamespaceId) -> impl Iterator<Item = (&NsKey, &NsValue)> {
        self.namespaces.get(&id).into_iter().flat_map(|map| map.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(|map| map.is_empty())
    }
}

/// 値の登場を条件で待つときの選別規則。
///
/// 完全一致キーでは表せない「最新リビジョン」のような待ち合わせに
/// 使う。既存エントリの走査では `prefers` がより良い候補を選ぶ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceKeyCriterion {
    /// 名前が一致するモジュールのうち最新リビジョンのもの。
    LatestRevision { name: Unqualified },
}

impl NamespaceKeyCriterion {
    pub fn matches(&self, key: &NsKey) -> bool {
        match self {
            Self::LatestRevision { name } => {
                matches!(key, NsKey::Source(source) if source.name == *name)
            }
        }
    }

    /// `candidate` が `current` より厳密に良い場合にのみ真。
    pub fn prefers(&self, candidate: &NsKey, current: &NsKey) -> bool {
        match self {
            Self::LatestRevision { .. } => match (candidate, current) {
                (NsKey::Source(a), NsKey::Source(b)) => a.revision > b.revision,
                _ => false,
            },
        }
    }
}

impl fmt::Display for NamespaceKeyCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestRevision { name } => write!(f, "latest revision of {name}"),
        }
    }
}

/// 書き込みで発火した待ち合わせの通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredListener {
    pub target: PrereqRef,
    pub value: NsValue,
}

#[derive(Debug, Clone)]
struct PendingListener {
    namespace: NamespaceId,
    /// 待っている側の格納ノード。可視性の判定に使う。
    origin: StorageRef,
    kind: ListenerKind,
    target: PrereqRef,
}

#[derive(Debug, Clone)]
enum ListenerKind {
    Exact(NsKey),
    Predicated(NamespaceKeyCriterion),
}

/// 名前空間への書き込みを待つリスナの表。
///
/// リスナは一度発火したら取り除かれる。発火順は登録順に従う。
/// 書き込み先の格納ノードから待ち手に値が見えるかどうかは呼び出し
/// 側が判定する。
#[derive(Debug, Default)]
pub struct NamespaceListeners {
    pending: Vec<PendingListener>,
}

impl NamespaceListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn await_key(
        &mut self,
        namespace: NamespaceId,
        origin: StorageRef,
        key: NsKey,
        target: PrereqRef,
    ) {
        self.pending.push(PendingListener {
            namespace,
            origin,
            kind: ListenerKind::Exact(key),
            target,
        });
    }

    pub fn await_criterion(
        &mut self,
        namespace: NamespaceId,
        origin: StorageRef,
        criterion: NamespaceKeyCriterion,
        target: PrereqRef,
    ) {
        self.pending.push(PendingListener {
            namespace,
            origin,
            kind: ListenerKind::Predicated(criterion),
            target,
        });
    }

    /// 1 回の書き込みに対して発火するリスナを取り出す。
    ///
    /// `visible` は「この書き込みが待ち手 origin から見えるか」を
    /// 書き込み先の振る舞いに即して答える。
    pub fn fire(
        &mut self,
        namespace: NamespaceId,
        key: &NsKey,
        value: &NsValue,
        visible: impl Fn(StorageRef) -> bool,
    ) -> Vec<FiredListener> {
        let mut fired = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            let listener = &self.pending[index];
            let hit = listener.namespace == namespace
                && visible(listener.origin)
                && match &listener.kind {
                    ListenerKind::Exact(wanted) => wanted == key,
                    ListenerKind::Predicated(criterion) => criterion.matches(key),
                };
            if hit {
                let listener = self.pending.remove(index);
                fired.push(FiredListener {
                    target: listener.target,
                    value: value.clone(),
                });
            } else {
                index += 1;
            }
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// 格納ノードの参照。読み書きの起点を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageRef {
    Global,
    Source(SourceId),
    Statement(StmtId),
}

/// ビルド全体で有効な機能集合。キー無しの設定値として置かれる。
pub const SUPPORTED_FEATURES: ParserNamespace<(), Arc<FeatureSet>> =
    ParserNamespace::new("supported-features");

/// モジュールごとに適用を許す逸脱元モジュールの表。
pub const MODULES_DEVIATED_BY: ParserNamespace<(), Arc<DeviationMap>> =
    ParserNamespace::new("modules-deviated-by");

/// 拡張が実行中に定義した文サポート。定義探索の第二段で引かれる。
pub const STATEMENT_SUPPORTS: ParserNamespace<QualifiedName, SupportHandle> =
    ParserNamespace::new("statement-supports");

/// リンク済みモジュール。キーは名前とリビジョンの組。リビジョン
/// 無しの別名キーも合わせて書かれる。
pub const MODULE: ParserNamespace<SourceKey, StmtId> = ParserNamespace::new("modules");

/// 名前からモジュールを引く読み出し窓。[`MODULE`] のリビジョン無し
/// キーへの変換で実現される。
pub const MODULE_BY_NAME: ParserNamespace<Unqualified, StmtId> =
    ParserNamespace::new("modules-by-name");

/// プレリンク段階で名前だけで登録されるモジュール。
pub const PRELINKAGE_MODULE: ParserNamespace<Unqualified, StmtId> =
    ParserNamespace::new("prelinkage-modules");

/// モジュール名から名前空間 URI への対応。
pub const MODULE_NAME_TO_URI: ParserNamespace<Unqualified, String> =
    ParserNamespace::new("module-name-to-uri");

/// この文が属するソースが import した接頭辞からモジュールへの対応。
pub const IMPORT_PREFIX_TO_MODULE: ParserNamespace<String, StmtId> =
    ParserNamespace::new("import-prefix-to-module");

/// このソースが import で取り込んだモジュール。正確なリビジョン
/// 指定の取り込みもここに記録される。
pub const IMPORTED_MODULE: ParserNamespace<SourceKey, StmtId> =
    ParserNamespace::new("imported-modules");

/// 自身の接頭辞と import の接頭辞を合わせた、ソース内で有効な
/// 接頭辞の表。
pub const PREFIX_TO_MODULE: ParserNamespace<String, StmtId> =
    ParserNamespace::new("prefix-to-module");

/// ルート文脈からモジュール識別子への対応。
pub const MODULE_CTX_TO_ID: ParserNamespace<StmtId, ModuleId> =
    ParserNamespace::new("module-namespaces");

/// ルート文脈からソースキーへの対応。
pub const MODULE_CTX_TO_SOURCE: ParserNamespace<StmtId, SourceKey> =
    ParserNamespace::new("module-sources");

/// 可視範囲内の grouping 定義。
pub const GROUPING: ParserNamespace<QualifiedName, StmtId> = ParserNamespace::new("groupings");

/// 可視範囲内の typedef 定義。
pub const TYPE: ParserNamespace<QualifiedName, StmtId> = ParserNamespace::new("types");

/// 宣言された機能。
pub const FEATURE: ParserNamespace<QualifiedName, StmtId> = ParserNamespace::new("features");

/// 宣言された拡張。
pub const EXTENSION: ParserNamespace<QualifiedName, StmtId> = ParserNamespace::new("extensions");

/// 親文脈ごとの、名前からデータノード文脈への対応。
pub const SCHEMA_TREE: ParserNamespace<QualifiedName, StmtId> =
    ParserNamespace::new("schema-tree");
