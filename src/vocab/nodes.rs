//! スキーマ木を構成するデータノードのサポート
//!
//! container/leaf/choice/case/rpc/input/output はどれもスキーマ木の
//! 一員で、親の文脈に名前を登録する。choice は case を介さず書かれた
//! データノードに暗黙の case を挟み、rpc は書かれなかった input と
//! output を作って繋ぐ。

use std::sync::Arc;

use crate::error::SchemaResult;
use crate::reactor::{
    ArgumentKind, BuildGlobalContext, CopyPolicy, ModelProcessingPhase, StatementDefinition,
    StatementSupport, StmtId, SubstatementValidator, SupportHandle,
};

/// 検査表だけが異なるデータノードの共通サポート。
#[derive(Debug)]
pub struct DataNodeSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl DataNodeSupport {
    fn new(keyword: &str, validator: SubstatementValidator) -> Self {
        Self {
            definition: StatementDefinition::new(keyword, Some(ArgumentKind::Identifier)),
            validator,
        }
    }
}

impl StatementSupport for DataNodeSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::DeclaredCopy
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_schema_tree_member(&self) -> bool {
        true
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase == ModelProcessingPhase::FullDeclaration {
            rx.validate_substatements(stmt)?;
        }
        Ok(())
    }
}

pub fn container_support() -> DataNodeSupport {
    DataNodeSupport::new(
        "container",
        SubstatementValidator::builder("container")
            .any("if-feature")
            .optional("config")
            .optional("status")
            .optional("description")
            .optional("reference")
            .any("typedef")
            .any("grouping")
            .any("container")
            .any("leaf")
            .any("choice")
            .any("uses")
            .build(),
    )
}

pub fn leaf_support() -> DataNodeSupport {
    DataNodeSupport::new(
        "leaf",
        SubstatementValidator::builder("leaf")
            .mandatory("type")
            .any("if-feature")
            .optional("config")
            .optional("mandatory")
            .optional("status")
            .optional("description")
            .optional("reference")
            .build(),
    )
}

pub fn case_support() -> DataNodeSupport {
    DataNodeSupport::new(
        "case",
        SubstatementValidator::builder("case")
            .any("if-feature")
            .optional("status")
            .optional("description")
            .optional("reference")
            .any("container")
            .any("leaf")
            .any("choice")
            .any("uses")
            .build(),
    )
}

/// `choice`。直下に書かれた container や leaf は、その名前を継いだ
/// 暗黙の case に包まれてから木に入る。
#[derive(Debug)]
pub struct ChoiceSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
    case: SupportHandle,
}

impl ChoiceSupport {
    pub fn new(case: SupportHandle) -> Self {
        Self {
            definition: StatementDefinition::new("choice", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("choice")
                .any("if-feature")
                .optional("config")
                .optional("mandatory")
                .optional("status")
                .optional("description")
                .optional("reference")
                .any("case")
                .any("container")
                .any("leaf")
                .build(),
            case,
        }
    }
}

impl StatementSupport for ChoiceSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::DeclaredCopy
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_schema_tree_member(&self) -> bool {
        true
    }

    fn implicit_child_wrapper(&self, child: &StatementDefinition) -> Option<SupportHandle> {
        match child.keyword() {
            "container" | "leaf" => Some(Arc::clone(&self.case)),
            _ => None,
        }
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase == ModelProcessingPhase::FullDeclaration {
            rx.validate_substatements(stmt)?;
        }
        Ok(())
    }
}

/// `input` と `output`。引数を持たず、キーワードが木の上の名前になる。
#[derive(Debug)]
pub struct OperationIoSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl OperationIoSupport {
    pub fn new(keyword: &str) -> Self {
        Self {
            definition: StatementDefinition::new(keyword, None),
            validator: SubstatementValidator::builder(keyword)
                .any("typedef")
                .any("grouping")
                .any("container")
                .any("leaf")
                .any("choice")
                .any("uses")
                .build(),
        }
    }
}

impl StatementSupport for OperationIoSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::DeclaredCopy
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_schema_tree_member(&self) -> bool {
        true
    }

    fn on_declared(
        &self,
        phase: ModelProcessingPhase,
        rx: &mut BuildGlobalContext,
        stmt: StmtId,
    ) -> SchemaResult<()> {
        if phase == ModelProcessingPhase::FullDeclaration {
            rx.validate_substatements(stmt)?;
        }
        Ok(())
    }
}

/// `rpc`。input と output が書かれていなければ作って繋ぐ。
#[derive(Debug)]
pub struct RpcSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
    input: SupportHandle,
    output: SupportHandle,
}

impl RpcSupport {
    pub fn new(input: SupportHandle, output: SupportHandle) -> Self {
        Self {
            definition: StatementDefinition::new("rpc", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("rpc")
                .any("if-feature")
                .optional("status")
                .optional("description")
                .optional("reference")
                .optional("input")
                .optional("output")
                .any("typedef")
                .any("grouping")
                .build(),
            input,
            output,
        }
    }
}

impl StatementSupport for RpcSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::DeclaredCopy
    }

    fn validator(&self) -> Option<&SubstatementValidator> {
        Some(&self.validator)
    }

    fn is_schema_tree_member(&self) -> bool {
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
        if rx.find_declared_substatement(stmt, "input").is_none() {
            rx.add_implicit_child(stmt, Arc::clone(&self.input))?;
        }
        if rx.find_declared_substatement(stmt, "output").is_none() {
            rx.add_implicit_child(stmt, Arc::clone(&self.output))?;
        }
        Ok(())
    }
}
