//! 文サポートの定義
//!
//! 各キーワードの意味はリアクタ本体ではなく [`StatementSupport`] の
//! 実装が与える。サポートは引数の構文、部分文の制約、コピー時の
//! 振る舞い、フェーズごとの推論の登録をまとめて担う。サポートの
//! 集合は [`StatementSupportBundle`] としてフェーズ単位で束ねられる。

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ReactorError, SchemaResult, SourceError};
use crate::model::{ArgumentValue, ModuleId, Revision, SourceRef, Status, Unqualified};

use super::context::StmtId;
use super::copy::CopyPolicy;
use super::global::BuildGlobalContext;
use super::namespace::{NamespaceBehaviour, NamespaceId, NamespaceRegistry, ParserNamespace};
use super::phase::ModelProcessingPhase;

/// 文サポートへの共有ハンドル。
pub type SupportHandle = Arc<dyn StatementSupport>;

/// 引数の構文種別。生の文字列から [`ArgumentValue`] への変換を決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    Identifier,
    /// `prefix:name` または `name`。接頭辞の解決は後のフェーズで行う。
    PrefixedName,
    Uri,
    Text,
    Revision,
    Boolean,
    Status,
    /// `/a/b` (絶対) または `a/b` (子孫) のパス。
    SchemaPath,
}

impl ArgumentKind {
    pub fn parse(self, raw: &str, at: &SourceRef) -> SchemaResult<ArgumentValue> {
        let invalid = |message: String| SourceError::InvalidArgument {
            message,
            at: at.clone(),
        };
        match self {
            Self::Identifier => Unqualified::try_new(raw)
                .map(ArgumentValue::Identifier)
                .map_err(|message| invalid(message).into()),
            Self::PrefixedName => parse_prefixed_name(raw)
                .map_err(|message| invalid(message).into()),
            Self::Uri => {
                if raw.is_empty() {
                    Err(invalid("URI 引数が空になっている".into()).into())
                } else {
                    Ok(ArgumentValue::Uri(raw.to_owned()))
                }
            }
            Self::Text => Ok(ArgumentValue::Str(raw.to_owned())),
            Self::Revision => Revision::try_new(raw)
                .map(ArgumentValue::Revision)
                .map_err(|message| invalid(message).into()),
            Self::Boolean => match raw {
                "true" => Ok(ArgumentValue::Bool(true)),
                "false" => Ok(ArgumentValue::Bool(false)),
                other => Err(invalid(format!("'{other}' は true か false でなければならない")).into()),
            },
            Self::Status => Status::try_parse(raw)
                .map(ArgumentValue::Status)
                .map_err(|message| invalid(message).into()),
            Self::SchemaPath => {
                let (absolute, body) = match raw.strip_prefix('/') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                if body.is_empty() {
                    return Err(invalid("スキーマパスに要素がない".into()).into());
                }
                let mut steps = Vec::new();
                for step in body.split('/') {
                    steps.push(parse_prefixed_name(step).map_err(&invalid)?);
                }
                Ok(ArgumentValue::SchemaPath { absolute, steps })
            }
        }
    }
}

fn parse_prefixed_name(raw: &str) -> Result<ArgumentValue, String> {
    let (prefix, local) = match raw.split_once(':') {
        Some((prefix, local)) => (Some(Unqualified::try_new(prefix)?), local),
        None => (None, raw),
    };
    Ok(ArgumentValue::UnresolvedQName {
        prefix,
        local: Unqualified::try_new(local)?,
    })
}

/// キーワードと引数構文の記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDefinition {
    keyword: String,
    argument: Option<ArgumentKind>,
}

impl StatementDefinition {
    pub fn new(keyword: &str, argument: Option<ArgumentKind>) -> Self {
        Self {
            keyword: keyword.to_owned(),
            argument,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn argument(&self) -> Option<ArgumentKind> {
        self.argument
    }
}

/// 1 キーワード分の意味定義。
///
/// 既定実装は「引数構文は記述子どおり、コピーは方針どおり、推論は
/// 何もしない」。各キーワードは必要なフックだけを上書きする。
pub trait StatementSupport: fmt::Debug {
    fn definition(&self) -> &StatementDefinition;

    fn copy_policy(&self) -> CopyPolicy;

    /// 生の引数文字列を型付き引数に変換する。
    fn parse_argument(&self, raw: Option<&str>, at: &SourceRef) -> SchemaResult<ArgumentValue> {
        match (self.definition().argument(), raw) {
            (None, None) => Ok(ArgumentValue::Empty),
            (None, Some(_)) => Err(SourceError::InvalidArgument {
                message: format!("{} は引数を取らない", self.definition().keyword()),
                at: at.clone(),
            }
            .into()),
            (Some(_), None) => Err(SourceError::InvalidArgument {
                message: format!("{} には引数が必要", self.definition().keyword()),
                at: at.clone(),
            }
            .into()),
            (Some(kind), Some(raw)) => kind.parse(raw, at),
        }
    }

    /// モジュールをまたぐコピーの際に引数を写し替える。
    fn adapt_argument(&self, argument: &ArgumentValue, _target: &ModuleId) -> ArgumentValue {
        argument.clone()
    }

    /// 引数の値によって意味が分かれる文のための特殊化。
    /// `None` なら共通のサポートをそのまま使う。
    fn specialize_for_argument(&self, _raw: Option<&str>) -> Option<SupportHandle> {
        None
    }

    /// 宣言済み部分文の個数制約。`None` なら検査しない。
    fn validator(&self) -> Option<&SubstatementValidator> {
        None
    }

    /// 子を受け入れる際に割り込ませる暗黙の親。choice の下の case など。
    fn implicit_child_wrapper(&self, _child: &StatementDefinition) -> Option<SupportHandle> {
        None
    }

    /// この文が機能ゲート (if-feature) かどうか。
    fn is_feature_guard(&self) -> bool {
        false
    }

    /// この文がスキーマ木に名前を登録するデータノードかどうか。
    fn is_schema_tree_member(&self) -> bool {
        false
    }

    /// 定義された場所でそのまま有効文になるかどうか。grouping の
    /// ような展開専用の定義は `false` を返し、有効ビューから外れる。
    fn is_effective_in_place(&self) -> bool {
        true
    }

    /// 文脈が木に加わった直後のフック。
    fn on_statement_added(&self, _rx: &mut BuildGlobalContext, _stmt: StmtId) -> SchemaResult<()> {
        Ok(())
    }

    /// 各フェーズで文の宣言が完了したときのフック。
    fn on_declared(
        &self,
        _phase: ModelProcessingPhase,
        _rx: &mut BuildGlobalContext,
        _stmt: StmtId,
    ) -> SchemaResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cardinality {
    min: u32,
    max: Option<u32>,
}

/// 宣言済み部分文の個数制約の表。
///
/// 接頭辞付きキーワード (拡張) は検査の対象外。表にない素の
/// キーワードは不正な部分文として報告される。
#[derive(Debug, Clone)]
pub struct SubstatementValidator {
    keyword: String,
    entries: IndexMap<String, Cardinality>,
}

impl SubstatementValidator {
    pub fn builder(keyword: &str) -> SubstatementValidatorBuilder {
        SubstatementValidatorBuilder {
            keyword: keyword.to_owned(),
            entries: IndexMap::new(),
        }
    }

    pub fn validate(&self, children: &[(String, SourceRef)], at: &SourceRef) -> SchemaResult<()> {
        let mut counts: IndexMap<&str, u32> = IndexMap::new();
        for (keyword, child_at) in children {
            if keyword.contains(':') {
                continue;
            }
            match self.entries.get(keyword.as_str()) {
                Some(_) => *counts.entry(keyword.as_str()).or_insert(0) += 1,
                None => {
                    return Err(SourceError::InvalidSubstatement {
                        keyword: keyword.clone(),
                        parent: self.keyword.clone(),
                        at: child_at.clone(),
                    }
                    .into())
                }
            }
        }
        for (keyword, cardinality) in &self.entries {
            let count = counts.get(keyword.as_str()).copied().unwrap_or(0);
            if count < cardinality.min {
                return Err(SourceError::MissingStatement {
                    keyword: keyword.clone(),
                    parent: self.keyword.clone(),
                    at: at.clone(),
                }
                .into());
            }
            if let Some(max) = cardinality.max {
                if count > max {
                    return Err(SourceError::InvalidArgument {
                        message: format!(
                            "{} の下の {} は {} 回まで ({} 回見つかった)",
                            self.keyword, keyword, max, count
                        ),
                        at: at.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

pub struct SubstatementValidatorBuilder {
    keyword: String,
    entries: IndexMap<String, Cardinality>,
}

impl SubstatementValidatorBuilder {
    pub fn mandatory(mut self, keyword: &str) -> Self {
        self.entries
            .insert(keyword.to_owned(), Cardinality { min: 1, max: Some(1) });
        self
    }

    pub fn optional(mut self, keyword: &str) -> Self {
        self.entries
            .insert(keyword.to_owned(), Cardinality { min: 0, max: Some(1) });
        self
    }

    pub fn any(mut self, keyword: &str) -> Self {
        self.entries
            .insert(keyword.to_owned(), Cardinality { min: 0, max: None });
        self
    }

    pub fn at_least(mut self, keyword: &str, min: u32) -> Self {
        self.entries
            .insert(keyword.to_owned(), Cardinality { min, max: None });
        self
    }

    pub fn build(self) -> SubstatementValidator {
        SubstatementValidator {
            keyword: self.keyword,
            entries: self.entries,
        }
    }
}

/// フェーズ単位に束ねた文サポートと名前空間の登録。
///
/// 束は親を持てる。キーワードの探索は自分の表を先に、次いで親を
/// たどる。名前空間の登録も親の分を含めて行われる。
#[derive(Debug, Default)]
pub struct StatementSupportBundle {
    parent: Option<Arc<StatementSupportBundle>>,
    supports: IndexMap<String, SupportHandle>,
    namespaces: Vec<(NamespaceId, NamespaceBehaviour)>,
}

impl StatementSupportBundle {
    pub fn builder() -> StatementSupportBundleBuilder {
        StatementSupportBundleBuilder {
            bundle: Self::default(),
        }
    }

    pub fn derived_from(parent: &Arc<StatementSupportBundle>) -> StatementSupportBundleBuilder {
        StatementSupportBundleBuilder {
            bundle: Self {
                parent: Some(Arc::clone(parent)),
                ..Self::default()
            },
        }
    }

    /// キーワードに対応するサポートを親の束まで遡って探す。
    pub fn support_for(&self, keyword: &str) -> Option<SupportHandle> {
        match self.supports.get(keyword) {
            Some(support) => Some(Arc::clone(support)),
            None => self.parent.as_ref()?.support_for(keyword),
        }
    }

    fn knows(&self, keyword: &str) -> bool {
        self.supports.contains_key(keyword)
            || self.parent.as_ref().is_some_and(|parent| parent.knows(keyword))
    }

    /// 親の分も含め、この束が持ち込む名前空間を登録する。
    pub fn register_namespaces(
        &self,
        registry: &mut NamespaceRegistry,
        since: ModelProcessingPhase,
    ) -> SchemaResult<()> {
        if let Some(parent) = &self.parent {
            parent.register_namespaces(registry, since)?;
        }
        for (id, behaviour) in &self.namespaces {
            registry.register(*id, behaviour.clone(), since)?;
        }
        Ok(())
    }
}

pub struct StatementSupportBundleBuilder {
    bundle: StatementSupportBundle,
}

impl StatementSupportBundleBuilder {
    pub fn add_support(mut self, support: SupportHandle) -> SchemaResult<Self> {
        let keyword = support.definition().keyword().to_owned();
        if self.bundle.knows(&keyword) {
            return Err(ReactorError::Internal {
                message: format!("文サポート {keyword} が二重に登録された"),
            }
            .into());
        }
        self.bundle.supports.insert(keyword, support);
        Ok(self)
    }

    pub fn add_namespace<K, V>(
        mut self,
        namespace: ParserNamespace<K, V>,
        behaviour: NamespaceBehaviour,
    ) -> Self {
        self.bundle.namespaces.push((namespace.id(), behaviour));
        self
    }

    pub fn build(self) -> Arc<StatementSupportBundle> {
        Arc::new(self.bundle)
    }
}
