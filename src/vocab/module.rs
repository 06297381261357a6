//! モジュール文のサポート
//!
//! module はソースの根であり、フェーズごとに登録を重ねていく。
//! プレリンクでは名前だけを、リンクでは URI とリビジョンから成る
//! モジュール識別子と自身の接頭辞を登録し、以後の前方参照と
//! 接頭辞解決の土台になる。

use crate::error::SchemaResult;
use crate::model::{ArgumentValue, ModuleId, Revision};
use crate::reactor::{
    ArgumentKind, BuildGlobalContext, CopyPolicy, ModelProcessingPhase, StatementDefinition,
    StatementSupport, StmtId, StorageRef, SubstatementValidator, MODULE, MODULE_CTX_TO_ID,
    MODULE_CTX_TO_SOURCE, MODULE_NAME_TO_URI, PREFIX_TO_MODULE, PRELINKAGE_MODULE,
};

#[derive(Debug)]
pub struct ModuleSupport {
    definition: StatementDefinition,
    validator: SubstatementValidator,
}

impl ModuleSupport {
    pub fn new() -> Self {
        Self {
            definition: StatementDefinition::new("module", Some(ArgumentKind::Identifier)),
            validator: SubstatementValidator::builder("module")
                .mandatory("namespace")
                .mandatory("prefix")
                .any("revision")
                .any("import")
                .any("extension")
                .any("feature")
                .any("typedef")
                .any("grouping")
                .any("container")
                .any("leaf")
                .any("choice")
                .any("rpc")
                .any("uses")
                .any("augment")
                .optional("description")
                .optional("reference")
                .build(),
        }
    }
}

impl Default for ModuleSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSupport for ModuleSupport {
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
            ModelProcessingPhase::SourcePreLinkage => declare_prelinkage(rx, stmt),
            ModelProcessingPhase::SourceLinkage => declare_linkage(rx, stmt),
            ModelProcessingPhase::FullDeclaration => rx.validate_substatements(stmt),
            _ => Ok(()),
        }
    }
}

/// 名前と URI を大域表へ置き、他ソースの import 発見を満たす。
fn declare_prelinkage(rx: &mut BuildGlobalContext, stmt: StmtId) -> SchemaResult<()> {
    let Some(name) = rx.statement(stmt).argument().local_name().cloned() else {
        return Ok(());
    };
    rx.put_ns(StorageRef::Global, PRELINKAGE_MODULE, name.clone(), stmt)?;
    if let Some(uri) = module_uri(rx, stmt) {
        rx.put_ns(StorageRef::Global, MODULE_NAME_TO_URI, name, uri)?;
    }
    Ok(())
}

/// モジュール識別子を確定し、リンク表と自接頭辞を登録する。
fn declare_linkage(rx: &mut BuildGlobalContext, stmt: StmtId) -> SchemaResult<()> {
    let Some(uri) = module_uri(rx, stmt) else {
        // namespace の欠落は完全宣言フェーズの個数検査が報告する
        return Ok(());
    };
    let revision = latest_revision(rx, stmt);
    let module = ModuleId::new(uri, revision);
    let source = rx.source_of(stmt);
    let key = rx.source_key(source).clone();
    rx.put_ns(StorageRef::Global, MODULE, key.clone(), stmt)?;
    rx.put_ns(StorageRef::Global, MODULE_CTX_TO_ID, stmt, module)?;
    rx.put_ns(StorageRef::Global, MODULE_CTX_TO_SOURCE, stmt, key)?;
    if let Some(prefix) = own_prefix(rx, stmt) {
        rx.put_ns(StorageRef::Source(source), PREFIX_TO_MODULE, prefix, stmt)?;
    }
    Ok(())
}

fn module_uri(rx: &BuildGlobalContext, stmt: StmtId) -> Option<String> {
    let child = rx.find_declared_substatement(stmt, "namespace")?;
    match rx.statement(child).argument() {
        ArgumentValue::Uri(uri) => Some(uri.clone()),
        _ => None,
    }
}

fn latest_revision(rx: &BuildGlobalContext, stmt: StmtId) -> Option<Revision> {
    let mut latest: Option<Revision> = None;
    for &child in rx.declared_substatements(stmt) {
        let node = rx.statement(child);
        if node.keyword() != "revision" {
            continue;
        }
        if let ArgumentValue::Revision(revision) = node.argument() {
            if latest.as_ref() < Some(revision) {
                latest = Some(revision.clone());
            }
        }
    }
    latest
}

fn own_prefix(rx: &BuildGlobalContext, stmt: StmtId) -> Option<String> {
    let child = rx.find_declared_substatement(stmt, "prefix")?;
    match rx.statement(child).argument() {
        ArgumentValue::Identifier(prefix) => Some(prefix.as_str().to_owned()),
        _ => None,
    }
}
