//! grouping と uses のサポート
//!
//! grouping は展開専用の定義で、宣言された場所では有効文にならない。
//! uses は見えている grouping を親の部分木から探し、その子を自分の
//! 親へ写し取る。展開は二段の推論動作で行う。一段目は定義の出現を
//! 待って二段目を登録し、二段目は grouping 自身の完全宣言フェーズの
//! 完了を待ってから写し取る。grouping の中の uses や augment が開く
//! 変異はそのフェーズ完了を差し止めるので、入れ子の展開が済む前に
//! 外側が写し取ることはない。

use crate::error::{SchemaResult, SourceError};
use crate::model::{ArgumentValue, SourceRef, Unqualified};
use crate::reactor::{
    inference_failure, ActionHandler, ArgumentKind, BuildGlobalContext, CopyPolicy, CopyType,
    ModelProcessingPhase, Prerequisite, ResolvedPrereqs, SourceId, StatementDefinition,
    StatementSupport, StmtId, StorageRef, SubstatementValidator, GROUPING,
};

use super::{reference_anchor, unknown_prefix};

/// uses が写し取らない、grouping 自身の説明文のキーワード。
pub(super) const GROUPING_LOCAL_METADATA: [&str; 3] = ["description", "reference", "status"];

#[derive(Debug)]
pub struct GroupingSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl GroupingSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("grouping", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("grouping")
                .optional("description")
                .optional("reference")
                .optional("status")
                .any("typedef")
                .any("grouping")
                .any("container")
                .any("leaf")
                .any("choice")
                .any("uses")
                .any("augment")
                .build(),
        }
    }
}

impl Default for GroupingSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for GroupingSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::DeclaredCopy
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_effective_in_place(&self) -> bool {
        false
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
            .put_ns(StorageRef::Statement(parent), GROUPING, qname, stmt)?
            .is_some()
        {
            return Err(SourceError::DuplicateDefinition {
                kind: "grouping".into(),
                name: name.to_string(),
                at,
            }
            .into());
        }
        Ok(())
    }
}

/// `uses`。展開先は自分の親で、展開が済むまで親のフェーズ完了を
/// 差し止める。
#[derive(Debug)]
pub struct UsesSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl UsesSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("uses", Some(ArgumentKind::PrefixedName)),
            validator: SubstatementValidator::builder("uses")
                .any("if-feature")
                .optional("description")
                .optional("reference")
                .optional("status")
                .build(),
        }
    }
}

impl Default for UsesSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for UsesSupport {
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
        if !rx.is_supported(stmt)? {
            return Ok(());
        }
        let node = rx.statement(stmt);
        let ArgumentValue::UnresolvedQName { prefix, local } = node.argument().clone() else {
            return Ok(());
        };
        let at = node.location().clone();
        let Some(target) = rx.parent_of(stmt) else {
            return Ok(());
        };
        let qname = match rx.resolve_qname(stmt, prefix.as_ref().map(Unqualified::as_str), &local)? {
            Some(qname) => qname,
            None => return Err(unknown_prefix(&prefix, at)),
        };
        let Some(anchor) = reference_anchor(rx, stmt, prefix.as_ref())? else {
            return Err(unknown_prefix(&prefix, at));
        };
        let source = rx.source_of(stmt);
        let mut action = rx.new_inference_action(source, ModelProcessingPhase::FullDeclaration);
        action.requires_ns_item(GROUPING, StorageRef::Statement(anchor), qname);
        action.mutates(target, ModelProcessingPhase::FullDeclaration);
        action.apply(Box::new(UsesResolve {
            target,
            source,
            name: local,
            at,
        }))?;
        Ok(())
    }
}

/// 一段目。定義が見つかったら、その完全宣言を待つ二段目を登録する。
#[derive(Debug)]
struct UsesResolve {
    target: StmtId,
    source: SourceId,
    name: Unqualified,
    at: SourceRef,
}

impl ActionHandler for UsesResolve {
    fn apply(
        &mut self,
        rx: &mut BuildGlobalContext,
        resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        let grouping = resolved.stmt(0)?;
        let mut action =
            rx.new_inference_action(self.source, ModelProcessingPhase::FullDeclaration);
        action.requires_phase(grouping, ModelProcessingPhase::FullDeclaration);
        action.mutates(self.target, ModelProcessingPhase::FullDeclaration);
        action.apply(Box::new(UsesExpand {
            grouping,
            target: self.target,
            name: self.name.clone(),
            at: self.at.clone(),
        }))?;
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        _rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()> {
        Err(inference_failure(
            failed,
            &format!("grouping {} が見つからない", self.name),
            self.at.clone(),
        ))
    }
}

/// 二段目。完成した grouping の子を展開先へ写し取る。
#[derive(Debug)]
struct UsesExpand {
    grouping: StmtId,
    target: StmtId,
    name: Unqualified,
    at: SourceRef,
}

impl ActionHandler for UsesExpand {
    fn apply(
        &mut self,
        rx: &mut BuildGlobalContext,
        _resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        let declared = rx.declared_substatements(self.grouping).to_vec();
        for child in declared {
            if GROUPING_LOCAL_METADATA.contains(&rx.statement(child).keyword()) {
                continue;
            }
            if !rx.is_supported(child)? {
                continue;
            }
            if let Some(copied) = rx.child_copy_of(child, self.target, CopyType::AddedByUses)? {
                rx.attach_effective_child(self.target, copied)?;
            }
        }
        let effective = rx.effective_substatements(self.grouping).to_vec();
        for child in effective {
            if let Some(copied) = rx.child_copy_of(child, self.target, CopyType::AddedByUses)? {
                rx.attach_effective_child(self.target, copied)?;
            }
        }
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        _rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()> {
        Err(inference_failure(
            failed,
            &format!("grouping {} の展開を完了できない", self.name),
            self.at.clone(),
        ))
    }
}
