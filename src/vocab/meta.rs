//! 書式だけを検める文のサポート
//!
//! module ヘッダの namespace/prefix/revision や config のような
//! 値文は、引数を検めて子を制限する以上のことをしない。共通の
//! 実装に記述子と検査表を渡して使い回す。

use crate::error::{SchemaResult, SourceError};
use crate::model::{ArgumentValue, SourceRef};
use crate::reactor::{
    ArgumentKind, BuildGlobalContext, CopyPolicy, ModelProcessingPhase, StatementDefinition,
    StatementSupport, StmtId, SubstatementValidator,
};

/// 推論を持たない文の共通サポート。
///
/// 既定の検査表は子を一切許さない。
#[derive(Debug)]
pub struct MetaSupport {
    definition: StatementDefinition,
    policy: CopyPolicy,
    validator: SubstatementValidator,
}

impl MetaSupport {
    pub fn new(keyword: &str, argument: Option<ArgumentKind>, policy: CopyPolicy) -> Self {
        Self {
            definition: StatementDefinition::new(keyword, argument),
            policy,
            validator: SubstatementValidator::builder(keyword).build(),
        }
    }

    pub fn with_validator(mut self, validator: SubstatementValidator) -> Self {
        self.validator = validator;
        self
    }
}

impl StatementSupport for MetaSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        self.policy
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
        if phase == ModelProcessingPhase::FullDeclaration {
            rx.validate_substatements(stmt)?;
        }
        Ok(())
    }
}

/// 真偽値引数の文。引数の誤りは文の名前と許される値を挙げて報告する。
#[derive(Debug)]
pub struct FlagSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl FlagSupport {
    pub fn new(keyword: &str) -> Self {
        Self {
            definition: StatementDefinition::new(keyword, Some(ArgumentKind::Boolean)),
            validator: SubstatementValidator::builder(keyword).build(),
        }
    }
}

impl StatementSupport for FlagSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::ContextIndependent
    }

    fn parse_argument(&self, raw: Option<&str>, at: &SourceRef) -> SchemaResult<ArgumentValue> {
        match raw {
            Some("true") => Ok(ArgumentValue::Bool(true)),
            Some("false") => Ok(ArgumentValue::Bool(false)),
            Some(other) => Err(SourceError::InvalidArgument {
                message: format!(
                    "{} の引数 '{}' は true か false でなければならない",
                    self.definition.keyword(),
                    other
                ),
                at: at.clone(),
            }
            .into()),
            None => Err(SourceError::InvalidArgument {
                message: format!("{} には引数が必要", self.definition.keyword()),
                at: at.clone(),
            }
            .into()),
        }
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
        if phase == ModelProcessingPhase::FullDeclaration {
            rx.validate_substatements(stmt)?;
        }
        Ok(())
    }
}

pub fn namespace_support() -> MetaSupport {
    MetaSupport::new("namespace", Some(ArgumentKind::Uri), CopyPolicy::Reject)
}

pub fn prefix_support() -> MetaSupport {
    MetaSupport::new(
        "prefix",
        Some(ArgumentKind::Identifier),
        CopyPolicy::ContextIndependent,
    )
}

pub fn revision_support() -> MetaSupport {
    MetaSupport::new(
        "revision",
        Some(ArgumentKind::Revision),
        CopyPolicy::ContextIndependent,
    )
    .with_validator(
        SubstatementValidator::builder("revision")
            .optional("description")
            .optional("reference")
            .build(),
    )
}

pub fn revision_date_support() -> MetaSupport {
    MetaSupport::new(
        "revision-date",
        Some(ArgumentKind::Revision),
        CopyPolicy::ContextIndependent,
    )
}

pub fn status_support() -> MetaSupport {
    MetaSupport::new(
        "status",
        Some(ArgumentKind::Status),
        CopyPolicy::ContextIndependent,
    )
}

pub fn description_support() -> MetaSupport {
    MetaSupport::new(
        "description",
        Some(ArgumentKind::Text),
        CopyPolicy::ContextIndependent,
    )
}

pub fn reference_support() -> MetaSupport {
    MetaSupport::new(
        "reference",
        Some(ArgumentKind::Text),
        CopyPolicy::ContextIndependent,
    )
}

pub fn config_support() -> FlagSupport {
    FlagSupport::new("config")
}

pub fn mandatory_support() -> FlagSupport {
    FlagSupport::new("mandatory")
}
