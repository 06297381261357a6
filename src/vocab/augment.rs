//! augment 文のサポート
//!
//! augment はスキーマ木のパスで対象を指し、そこへ自分の子を写し
//! 取る。対象は一度に引けるとは限らないので、パスの段ごとに
//! スキーマ木の登録を待つ推論動作を繋いでいく。各段は足場の文脈に
//! 変異を開くため、まだ増え得る部分木を外側が先に確定してしまう
//! ことはない。grouping の中に書かれた augment はプロトタイプの上で
//! 展開され、結果は uses の写し取りで運ばれる。

use crate::error::SchemaResult;
use crate::model::{ArgumentValue, QualifiedName, SourceRef, Unqualified};
use crate::reactor::{
    inference_failure, ActionHandler, ArgumentKind, BuildGlobalContext, CopyPolicy, CopyType,
    ModelProcessingPhase, Prerequisite, ResolvedPrereqs, SourceId, StatementDefinition,
    StatementSupport, StmtId, StorageRef, SubstatementValidator, SCHEMA_TREE,
};

use super::{reference_anchor, unknown_prefix};

#[derive(Debug)]
pub struct AugmentSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl AugmentSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("augment", Some(ArgumentKind::SchemaPath)),
            validator: SubstatementValidator::builder("augment")
                .any("if-feature")
                .optional("description")
                .optional("reference")
                .optional("status")
                .any("container")
                .any("leaf")
                .any("choice")
                .any("case")
                .build(),
        }
    }
}

impl Default for AugmentSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for AugmentSupport {
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
        if !rx.is_supported(stmt)? {
            return Ok(());
        }
        let node = rx.statement(stmt);
        let ArgumentValue::SchemaPath { absolute, steps } = node.argument().clone() else {
            return Ok(());
        };
        let at = node.location().clone();

        // 全段の名前を定義文脈で先に確定させる。接頭辞の誤りはここで
        // 即座に報告され、以後の待ち合わせは完全名だけで行われる。
        let mut path = Vec::with_capacity(steps.len());
        let mut first_prefix = None;
        for (index, step) in steps.iter().enumerate() {
            let ArgumentValue::UnresolvedQName { prefix, local } = step else {
                continue;
            };
            if index == 0 {
                first_prefix = prefix.clone();
            }
            match rx.resolve_qname(stmt, prefix.as_ref().map(Unqualified::as_str), local)? {
                Some(qname) => path.push(qname),
                None => return Err(unknown_prefix(prefix, at.clone())),
            }
        }
        if path.is_empty() {
            return Ok(());
        }

        let anchor = if absolute {
            match first_prefix {
                Some(prefix) => match reference_anchor(rx, stmt, Some(&prefix))? {
                    Some(anchor) => anchor,
                    None => return Err(unknown_prefix(&Some(prefix), at)),
                },
                None => rx.root_of(stmt),
            }
        } else {
            let Some(parent) = rx.parent_of(stmt) else {
                return Ok(());
            };
            parent
        };
        let copy_type = if inside_grouping(rx, stmt) {
            CopyType::AddedByUsesAugmentation
        } else {
            CopyType::AddedByAugmentation
        };
        let source = rx.source_of(stmt);
        register_step(
            rx,
            AugmentStep {
                augment: stmt,
                source,
                path,
                index: 0,
                copy_type,
                at,
            },
            anchor,
        )
    }
}

fn inside_grouping(rx: &BuildGlobalContext, stmt: StmtId) -> bool {
    let mut current = rx.parent_of(stmt);
    while let Some(id) = current {
        if rx.statement(id).keyword() == "grouping" {
            return true;
        }
        current = rx.parent_of(id);
    }
    false
}

fn register_step(
    rx: &mut BuildGlobalContext,
    step: AugmentStep,
    anchor: StmtId,
) -> SchemaResult<()> {
    let key = step.path[step.index].clone();
    let source = step.source;
    let mut action = rx.new_inference_action(source, ModelProcessingPhase::FullDeclaration);
    action.requires_ns_item(SCHEMA_TREE, StorageRef::Statement(anchor), key);
    action.mutates(anchor, ModelProcessingPhase::FullDeclaration);
    action.apply(Box::new(step))?;
    Ok(())
}

/// パスの 1 段分。最終段なら対象へ子を写し取り、途中段なら次の段を
/// 解決済みの文脈を足場にして登録する。
#[derive(Debug)]
struct AugmentStep {
    augment: StmtId,
    source: SourceId,
    path: Vec<QualifiedName>,
    index: usize,
    copy_type: CopyType,
    at: SourceRef,
}

impl ActionHandler for AugmentStep {
    fn apply(
        &mut self,
        rx: &mut BuildGlobalContext,
        resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        let target = resolved.stmt(0)?;
        if self.index + 1 < self.path.len() {
            return register_step(
                rx,
                AugmentStep {
                    augment: self.augment,
                    source: self.source,
                    path: self.path.clone(),
                    index: self.index + 1,
                    copy_type: self.copy_type,
                    at: self.at.clone(),
                },
                target,
            );
        }
        let declared = rx.declared_substatements(self.augment).to_vec();
        for child in declared {
            if !rx.statement(child).support().is_schema_tree_member() {
                continue;
            }
            if !rx.is_supported(child)? {
                continue;
            }
            if let Some(copied) = rx.copy_as_child_of(child, target, self.copy_type)? {
                rx.attach_effective_child(target, copied)?;
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
            &format!("augment の対象 {} が見つからない", self.path[self.index].local),
            self.at.clone(),
        ))
    }
}
