//! 文リアクタモジュール
//!
//! ソース群からスキーマモデルを組み立てる多相リアクタです。
//! ストリームから写した文脈木をフェーズごとに静止状態まで駆動し、
//! 語彙側のサポート実装が名前空間と推論動作を通じて互いの完了を
//! 待ち合わせます。

mod action;
mod context;
mod copy;
mod global;
mod namespace;
mod phase;
mod replication;
mod source;
mod support;
mod sweep;

// 公開API
pub use action::{ActionHandler, ActionRef, Prerequisite, ResolvedPrereqs, inference_failure};
pub use context::{StatementNode, StmtId, StmtShape};
pub use copy::{CopyHistory, CopyPolicy, CopyType, ReplicaPolicy};
pub use global::{BuildAction, BuildGlobalContext, ParserMode, StatementReactor, StatementReactorBuilder};
pub use namespace::{
    DeviationMap, KeyTransform, NamespaceBehaviour, NamespaceId, NamespaceKey,
    NamespaceKeyCriterion, NamespaceValue, NsKey, NsValue, ParserNamespace, StorageRef,
    EXTENSION, FEATURE, GROUPING, IMPORTED_MODULE, IMPORT_PREFIX_TO_MODULE, MODULE,
    MODULES_DEVIATED_BY, MODULE_BY_NAME, MODULE_CTX_TO_ID, MODULE_CTX_TO_SOURCE,
    MODULE_NAME_TO_URI, PREFIX_TO_MODULE, PRELINKAGE_MODULE, SCHEMA_TREE, STATEMENT_SUPPORTS,
    SUPPORTED_FEATURES, TYPE,
};
pub use phase::ModelProcessingPhase;
pub use source::{SourceId, StatementStreamSource, StatementWriter};
pub use support::{
    ArgumentKind, StatementDefinition, StatementSupport, StatementSupportBundle,
    StatementSupportBundleBuilder, SubstatementValidator, SubstatementValidatorBuilder,
    SupportHandle,
};
