//! 文の語彙
//!
//! リアクタに与える標準キーワードのサポート集です。束はフェーズ
//! ごとに段階的に増え、プレリンクはリンク関係の文だけを、定義
//! フェーズは extension と feature を、完全宣言フェーズが残りの
//! すべてを知ります。早いフェーズの束が知らないキーワードは走査で
//! 読み飛ばされ、後のフェーズで初めて文脈になります。

mod augment;
mod def;
mod grouping;
mod import;
mod meta;
mod module;
mod nodes;

use std::sync::Arc;

use crate::error::{SchemaError, SchemaResult, SourceError};
use crate::model::{SourceRef, Unqualified};
use crate::reactor::{
    BuildGlobalContext, KeyTransform, ModelProcessingPhase, NamespaceBehaviour, StatementReactor,
    StatementSupportBundle, StmtId, StorageRef, SupportHandle, EXTENSION, FEATURE, GROUPING,
    IMPORTED_MODULE, IMPORT_PREFIX_TO_MODULE, MODULE, MODULE_BY_NAME, MODULE_CTX_TO_ID,
    MODULE_CTX_TO_SOURCE, MODULE_NAME_TO_URI, PREFIX_TO_MODULE, PRELINKAGE_MODULE, SCHEMA_TREE,
    STATEMENT_SUPPORTS, TYPE,
};

pub use augment::AugmentSupport;
pub use def::{
    argument_support, ExtensionSupport, FeatureSupport, IfFeatureSupport, TypeSupport,
    TypedefSupport,
};
pub use grouping::{GroupingSupport, UsesSupport};
pub use import::ImportSupport;
pub use meta::{
    config_support, description_support, mandatory_support, namespace_support, prefix_support,
    reference_support, revision_date_support, revision_support, status_support, FlagSupport,
    MetaSupport,
};
pub use module::ModuleSupport;
pub use nodes::{
    case_support, container_support, leaf_support, ChoiceSupport, DataNodeSupport,
    OperationIoSupport, RpcSupport,
};

/// 標準語彙一式を束ねたリアクタを組み上げる。
pub fn standard_reactor() -> SchemaResult<StatementReactor> {
    let prelinkage = prelinkage_bundle()?;
    let linkage = StatementSupportBundle::derived_from(&prelinkage).build();
    let definition = definition_bundle(&linkage)?;
    let full = full_declaration_bundle(&definition)?;
    StatementReactor::builder()
        .bundle(ModelProcessingPhase::SourcePreLinkage, prelinkage)
        .bundle(ModelProcessingPhase::SourceLinkage, linkage)
        .bundle(ModelProcessingPhase::StatementDefinition, definition)
        .bundle(ModelProcessingPhase::FullDeclaration, full)
        .build()
}

fn prelinkage_bundle() -> SchemaResult<Arc<StatementSupportBundle>> {
    Ok(StatementSupportBundle::builder()
        .add_support(Arc::new(module::ModuleSupport::new()))?
        .add_support(Arc::new(import::ImportSupport::new()))?
        .add_support(Arc::new(meta::namespace_support()))?
        .add_support(Arc::new(meta::prefix_support()))?
        .add_support(Arc::new(meta::revision_support()))?
        .add_support(Arc::new(meta::revision_date_support()))?
        .add_namespace(PRELINKAGE_MODULE, NamespaceBehaviour::Global)
        .add_namespace(MODULE_NAME_TO_URI, NamespaceBehaviour::Global)
        .add_namespace(MODULE, NamespaceBehaviour::Global)
        .add_namespace(
            MODULE_BY_NAME,
            NamespaceBehaviour::Derived {
                backing: MODULE.id(),
                transform: KeyTransform::NameToAnyRevision,
            },
        )
        .add_namespace(IMPORTED_MODULE, NamespaceBehaviour::SourceLocal)
        .add_namespace(IMPORT_PREFIX_TO_MODULE, NamespaceBehaviour::SourceLocal)
        .add_namespace(PREFIX_TO_MODULE, NamespaceBehaviour::SourceLocal)
        .add_namespace(MODULE_CTX_TO_ID, NamespaceBehaviour::Global)
        .add_namespace(MODULE_CTX_TO_SOURCE, NamespaceBehaviour::Global)
        .build())
}

fn definition_bundle(
    parent: &Arc<StatementSupportBundle>,
) -> SchemaResult<Arc<StatementSupportBundle>> {
    Ok(StatementSupportBundle::derived_from(parent)
        .add_support(Arc::new(def::ExtensionSupport::new()))?
        .add_support(Arc::new(def::argument_support()))?
        .add_support(Arc::new(def::FeatureSupport::new()))?
        .add_namespace(EXTENSION, NamespaceBehaviour::Global)
        .add_namespace(FEATURE, NamespaceBehaviour::Global)
        .add_namespace(STATEMENT_SUPPORTS, NamespaceBehaviour::Global)
        .build())
}

fn full_declaration_bundle(
    parent: &Arc<StatementSupportBundle>,
) -> SchemaResult<Arc<StatementSupportBundle>> {
    let case: SupportHandle = Arc::new(nodes::case_support());
    let input: SupportHandle = Arc::new(nodes::OperationIoSupport::new("input"));
    let output: SupportHandle = Arc::new(nodes::OperationIoSupport::new("output"));
    Ok(StatementSupportBundle::derived_from(parent)
        .add_support(Arc::new(meta::description_support()))?
        .add_support(Arc::new(meta::reference_support()))?
        .add_support(Arc::new(meta::status_support()))?
        .add_support(Arc::new(meta::config_support()))?
        .add_support(Arc::new(meta::mandatory_support()))?
        .add_support(Arc::new(def::TypedefSupport::new()))?
        .add_support(Arc::new(def::TypeSupport::new()))?
        .add_support(Arc::new(def::IfFeatureSupport::new()))?
        .add_support(Arc::new(grouping::GroupingSupport::new()))?
        .add_support(Arc::new(grouping::UsesSupport::new()))?
        .add_support(Arc::new(augment::AugmentSupport::new()))?
        .add_support(Arc::new(nodes::container_support()))?
        .add_support(Arc::new(nodes::leaf_support()))?
        .add_support(Arc::clone(&case))?
        .add_support(Arc::new(nodes::ChoiceSupport::new(Arc::clone(&case))))?
        .add_support(Arc::new(nodes::RpcSupport::new(
            Arc::clone(&input),
            Arc::clone(&output),
        )))?
        .add_support(input)?
        .add_support(output)?
        .add_namespace(GROUPING, NamespaceBehaviour::TreeScoped)
        .add_namespace(TYPE, NamespaceBehaviour::TreeScoped)
        .add_namespace(SCHEMA_TREE, NamespaceBehaviour::StatementLocal)
        .build())
}

/// 接頭辞付き参照の探索の足場。無印なら参照した文自身を、接頭辞
/// 付きならその接頭辞が指すモジュールの根を返す。木範囲の定義表は
/// 部分木の中からしか見えないため、他モジュールの定義はそれを持つ
/// モジュールの根を起点に引く。
fn reference_anchor(
    rx: &mut BuildGlobalContext,
    stmt: StmtId,
    prefix: Option<&Unqualified>,
) -> SchemaResult<Option<StmtId>> {
    match prefix {
        None => Ok(Some(stmt)),
        Some(prefix) => {
            let source = rx.source_of(stmt);
            rx.get_ns(
                StorageRef::Source(source),
                PREFIX_TO_MODULE,
                prefix.as_str().to_owned(),
            )
        }
    }
}

fn unknown_prefix(prefix: &Option<Unqualified>, at: SourceRef) -> SchemaError {
    let shown = prefix.as_ref().map(Unqualified::as_str).unwrap_or("(無印)");
    SourceError::InvalidArgument {
        message: format!("接頭辞 {shown} を解決できない"),
        at,
    }
    .into()
}
