//! 定義と参照の文のサポート
//!
//! extension と feature は大域の定義表へ、typedef は親の部分木から
//! 見える型表へ登録する。type と if-feature は登録済みの定義への
//! 参照で、解決できないものは完全宣言フェーズの静止時に推論失敗
//! として報告される。

use std::sync::Arc;

use crate::error::{SchemaResult, SourceError};
use crate::model::{ArgumentValue, SourceRef, Unqualified};
use crate::reactor::{
    inference_failure, ActionHandler, ArgumentKind, BuildGlobalContext, CopyPolicy,
    ModelProcessingPhase, Prerequisite, ResolvedPrereqs, StatementDefinition, StatementSupport,
    StmtId, StorageRef, SubstatementValidator, SupportHandle, EXTENSION, FEATURE,
    STATEMENT_SUPPORTS, TYPE,
};

use super::meta::MetaSupport;
use super::{reference_anchor, unknown_prefix};

/// `type` が検査なしで受け付ける組み込み型の名前。
const BUILTIN_TYPES: [&str; 12] = [
    "binary", "boolean", "empty", "int8", "int16", "int32", "int64", "string", "uint8", "uint16",
    "uint32", "uint64",
];

/// `extension`。新しいキーワードを定義し、以後の走査で接頭辞付きの
/// 文が解決できるように文サポートの表へも登録する。
#[derive(Debug)]
pub struct ExtensionSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl ExtensionSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("extension", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("extension")
                .optional("argument")
                .optional("description")
                .optional("reference")
                .optional("status")
                .build(),
        }
    }
}

impl Default for ExtensionSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for ExtensionSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ContextIndependent
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        match phase {
            ModelProcessingPhase::StatementDefinition => {
                let node = rx.statement(stmt);
                let Some(name) = node.argument().local_name().cloned() else {
                    return Ok(());
                };
                let at = node.location().clone();
                let Some(qname) = rx.resolve_qname(stmt, None, &name)? else {
                    return Ok(());
                };
                let takes_argument = rx.find_declared_substatement(stmt, "argument").is_some();
                if rx
                    .put_ns(StorageRef::Global, EXTENSION, qname.clone(), stmt)?
                    .is_some()
                {
                    return Err(SourceError::DuplicateDefinition {
                        kind: "extension".into(),
                        name: name.to_string(),
                        at,
                    }
                    .into());
                }
                let support: SupportHandle = Arc::new(ExtensionDefined {
                    definition: StatementDefinition::new(
                        name.as_str(),
                        takes_argument.then_some(ArgumentKind::Text),
                    ),
                });
                rx.put_ns(StorageRef::Global, STATEMENT_SUPPORTS, qname, support)?;
                Ok(())
            }
            ModelProcessingPhase::FullDeclaration => rx.validate_substatements(stmt),
            _ => Ok(()),
        }
    }
}

/// extension が定めた文のサポート。引数は定義側に `argument` が
/// 書かれているときだけ受け付ける自由文字列になる。
#[derive(Debug)]
struct ExtensionDefined {
    definition: StatementDefinition,
}

impl StatementSupport for ExtensionDefined {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ContextIndependent
    }
}

pub fn argument_support() -> MetaSupport {
    MetaSupport::new(
        "argument",
        Some(ArgumentKind::Identifier),
        CopyPolicy::ContextIndependent,
    )
}

/// `feature`。機能名を大域の機能表に登録する。
#[derive(Debug)]
pub struct FeatureSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl FeatureSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("feature", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("feature")
                .optional("description")
                .optional("reference")
                .optional("status")
                .build(),
        }
    }
}

impl Default for FeatureSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for FeatureSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ContextIndependent
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        match phase {
            ModelProcessingPhase::StatementDefinition => {
                let node = rx.statement(stmt);
                let Some(name) = node.argument().local_name().cloned() else {
                    return Ok(());
                };
                let at = node.location().clone();
                let Some(qname) = rx.resolve_qname(stmt, None, &name)? else {
                    return Ok(());
                };
                if rx
                    .put_ns(StorageRef::Global, FEATURE, qname, stmt)?
                    .is_some()
                {
                    return Err(SourceError::DuplicateDefinition {
                        kind: "feature".into(),
                        name: name.to_string(),
                        at,
                    }
                    .into());
                }
                Ok(())
            }
            ModelProcessingPhase::FullDeclaration => rx.validate_substatements(stmt),
            _ => Ok(()),
        }
    }
}

/// `typedef`。親の部分木から見える型の名前を定める。
#[derive(Debug)]
pub struct TypedefSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl TypedefSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("typedef", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("typedef")
                .mandatory("type")
                .optional("description")
                .optional("reference")
                .optional("status")
                .build(),
        }
    }
}

impl Default for TypedefSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for TypedefSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ExactReplica
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase != ModelProcessingPhase::FullDeclaration {
            return Ok(());
        }
        rx.validate_substatements(stmt)?;
        let node = rx.statement(stmt);
        let Some(name) = node.argument().local_name().cloned() else {
            return Ok(());
        };
        let at = node.location().clone();
        let Some(parent) = rx.parent_of(stmt) else {
            return Ok(());
        };
        let Some(qname) = rx.resolve_qname(stmt, None, &name)? else {
            return Ok(());
        };
        if rx
            .put_ns(StorageRef::Statement(parent), TYPE, qname, stmt)?
            .is_some()
        {
            return Err(SourceError::DuplicateDefinition {
                kind: "typedef".into(),
                name: name.to_string(),
                at,
            }
            .into());
        }
        Ok(())
    }
}

/// `type`。組み込み型の名前か、見えている typedef への参照。
#[derive(Debug)]
pub struct TypeSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl TypeSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("type", Some(ArgumentKind::PrefixedName)),
            validator: SubstatementValidator::builder("type").build(),
        }
    }
}

impl Default for TypeSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for TypeSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ExactReplica
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase != ModelProcessingPhase::FullDeclaration {
            return Ok(());
        }
        rx.validate_substatements(stmt)?;
        let node = rx.statement(stmt);
        let ArgumentValue::UnresolvedQName { prefix, local } = node.argument().clone() else {
            return Ok(());
        };
        if prefix.is_none() && BUILTIN_TYPES.contains(&local.as_str()) {
            return Ok(());
        }
        let at = node.location().clone();
        let qname = match rx.resolve_qname(stmt, prefix.as_ref().map(Unqualified::as_str), &local)? {
            Some(qname) => qname,
            None => return Err(unknown_prefix(&prefix, at)),
        };
        let Some(anchor) = reference_anchor(rx, stmt, prefix.as_ref())? else {
            return Err(unknown_prefix(&prefix, at));
        };
        let source = rx.source_of(stmt);
        let mut action = rx.new_inference_action(source, ModelProcessingPhase::FullDeclaration);
        action.requires_ns_item(TYPE, StorageRef::Statement(anchor), qname);
        action.apply(Box::new(TypeResolve { name: local, at }))?;
        Ok(())
    }
}

/// typedef の存在だけを確かめる動作。
#[derive(Debug)]
struct TypeResolve {
    name: Unqualified,
    at: SourceRef,
}

impl ActionHandler for TypeResolve {
    fn apply(
        &mut self,
        _rx: &mut BuildGlobalContext,
        _resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        _rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()> {
        Err(inference_failure(
            failed,
            &format!("typedef {} が見つからない", self.name),
            self.at.clone(),
        ))
    }
}

/// `if-feature`。文を機能の有無で選別するゲート。
#[derive(Debug)]
pub struct IfFeatureSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl IfFeatureSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("if-feature", Some(ArgumentKind::PrefixedName)),
            validator: SubstatementValidator::builder("if-feature").build(),
        }
    }
}

impl Default for IfFeatureSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for IfFeatureSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ContextIndependent
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_feature_guard(&self) -> bool {
        true
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase != ModelProcessingPhase::FullDeclaration {
            return Ok(());
        }
        rx.validate_substatements(stmt)?;
        let node = rx.statement(stmt);
        let ArgumentValue::UnresolvedQName { prefix, local } = node.argument().clone() else {
            return Ok(());
        };
        let at = node.location().clone();
        let qname = match rx.resolve_qname(stmt, prefix.as_ref().map(Unqualified::as_str), &local)? {
            Some(qname) => qname,
            None => return Err(unknown_prefix(&prefix, at)),
        };
        let source = rx.source_of(stmt);
        let mut action = rx.new_inference_action(source, ModelProcessingPhase::FullDeclaration);
        action.requires_ns_item(FEATURE, StorageRef::Global, qname);
        action.apply(Box::new(FeatureResolve { name: local, at }))?;
        Ok(())
    }
}

/// feature の定義の存在だけを確かめる動作。
#[derive(Debug)]
struct FeatureResolve {
    name: Unqualified,
    at: SourceRef,
}

impl ActionHandler for FeatureResolve {
    fn apply(
        &mut self,
        _rx: &mut BuildGlobalContext,
        _resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        _rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()> {
        Err(inference_failure(
            failed,
            &format!("feature {} が定義されていない", self.name),
            self.at.clone(),
        ))
    }
}
