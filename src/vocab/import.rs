//! import 文のサポート
//!
//! import は二段で解決される。プレリンクで取り込み先を要求して
//! ライブラリの読み込みを促し、リンクで確定したモジュール文脈に
//! 接頭辞を結び付ける。revision-date があれば正確な一致、無ければ
//! 互換モードに応じて最新リビジョンかリビジョン無しの登録を待つ。

use crate::error::{SchemaResult, SourceError};
use crate::model::{ArgumentValue, Revision, SourceKey, SourceRef, Unqualified};
use crate::reactor::{
    inference_failure, ActionHandler, ArgumentKind, BuildGlobalContext, CopyPolicy,
    ModelProcessingPhase, NamespaceKeyCriterion, ParserMode, Prerequisite, ResolvedPrereqs,
    SourceId, StatementDefinition, StatementSupport, StmtId, StorageRef, SubstatementValidator,
    IMPORTED_MODULE, IMPORT_PREFIX_TO_MODULE, MODULE, MODULE_NAME_TO_URI, PREFIX_TO_MODULE,
};

#[derive(Debug)]
pub struct ImportSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl ImportSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("import", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("import")
                .mandatory("prefix")
                .optional("revision-date")
                .optional("description")
                .optional("reference")
                .build(),
        }
    }
}

impl Default for ImportSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for ImportSupport {
    fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::Reject
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
            ModelProcessingPhase::SourcePreLinkage => discover(rx, stmt),
            ModelProcessingPhase::SourceLinkage => link(rx, stmt),
            ModelProcessingPhase::FullDeclaration => rx.validate_substatements(stmt),
            _ => Ok(()),
        }
    }
}

/// 取り込み先をソースの要求として記録し、名前の公開を待つ。
fn discover(rx: &mut BuildGlobalContext, stmt: StmtId) -> SchemaResult<()> {
    let node = rx.statement(stmt);
    let Some(name) = node.argument().local_name().cloned() else {
        return Ok(());
    };
    let at = node.location().clone();
    let revision = revision_date(rx, stmt);
    let source = rx.source_of(stmt);
    rx.add_required_source(source, SourceKey::new(name.clone(), revision));
    let mut action = rx.new_inference_action(source, ModelProcessingPhase::SourcePreLinkage);
    action.requires_ns_item(MODULE_NAME_TO_URI, StorageRef::Global, name.clone());
    action.apply(Box::new(ImportDiscovered { name, at }))?;
    Ok(())
}

/// リンク済みモジュールを待ち、取り込み表と接頭辞表を結線する。
fn link(rx: &mut BuildGlobalContext, stmt: StmtId) -> SchemaResult<()> {
    let node = rx.statement(stmt);
    let Some(name) = node.argument().local_name().cloned() else {
        return Ok(());
    };
    let at = node.location().clone();
    let revision = revision_date(rx, stmt);
    let source = rx.source_of(stmt);
    let mode = rx.parser_mode();
    let mut action = rx.new_inference_action(source, ModelProcessingPhase::SourceLinkage);
    match (&revision, mode) {
        (Some(date), _) => {
            action.requires_ns_item(
                MODULE,
                StorageRef::Global,
                SourceKey::new(name.clone(), Some(date.clone())),
            );
        }
        (None, ParserMode::Strict) => {
            action.requires_ns_item(MODULE, StorageRef::Global, SourceKey::new(name.clone(), None));
        }
        (None, ParserMode::Lenient) => {
            action.requires_ns_criterion(
                MODULE,
                StorageRef::Global,
                NamespaceKeyCriterion::LatestRevision { name: name.clone() },
            );
        }
    }
    action.apply(Box::new(ImportLink {
        import: stmt,
        source,
        name,
        revision,
        at,
    }))?;
    Ok(())
}

fn revision_date(rx: &BuildGlobalContext, stmt: StmtId) -> Option<Revision> {
    let child = rx.find_declared_substatement(stmt, "revision-date")?;
    match rx.statement(child).argument() {
        ArgumentValue::Revision(revision) => Some(revision.clone()),
        _ => None,
    }
}

/// プレリンクの存在確認。棄却されたら取り込み先そのものが無い。
#[derive(Debug)]
struct ImportDiscovered {
    name: Unqualified,
    at: SourceRef,
}

impl ActionHandler for ImportDiscovered {
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
            &format!("インポートされたモジュール {} が見つからない", self.name),
            self.at.clone(),
        ))
    }
}

/// リンクの本体。確定したモジュール文脈を接頭辞に結び付ける。
#[derive(Debug)]
struct ImportLink {
    import: StmtId,
    source: SourceId,
    name: Unqualified,
    revision: Option<Revision>,
    at: SourceRef,
}

impl ActionHandler for ImportLink {
    fn apply(
        &mut self,
        rx: &mut BuildGlobalContext,
        resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()> {
        let module_ctx = resolved.stmt(0)?;
        let Some(prefix_stmt) = rx.find_declared_substatement(self.import, "prefix") else {
            return Err(SourceError::MissingStatement {
                keyword: "prefix".into(),
                parent: "import".into(),
                at: self.at.clone(),
            }
            .into());
        };
        let prefix = match rx.statement(prefix_stmt).argument() {
            ArgumentValue::Identifier(prefix) => prefix.as_str().to_owned(),
            _ => return Ok(()),
        };
        let requested = SourceKey::new(self.name.clone(), self.revision.clone());
        rx.put_ns(
            StorageRef::Source(self.source),
            IMPORTED_MODULE,
            requested,
            module_ctx,
        )?;
        rx.put_ns(
            StorageRef::Source(self.source),
            IMPORT_PREFIX_TO_MODULE,
            prefix.clone(),
            module_ctx,
        )?;
        rx.put_ns(
            StorageRef::Source(self.source),
            PREFIX_TO_MODULE,
            prefix,
            module_ctx,
        )?;
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        _rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()> {
        let shown = match &self.revision {
            Some(revision) => format!("{} (リビジョン {revision})", self.name),
            None => self.name.to_string(),
        };
        Err(inference_failure(
            failed,
            &format!("モジュール {shown} をリンクできない"),
            self.at.clone(),
        ))
    }
}
