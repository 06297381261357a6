//! 語彙テストの共通モジュール
//!
//! 語彙テストで使用する共通のヘルパー関数を定義する。

use std::sync::Arc;

use yunischema::error::{ReactorError, SchemaError, SourceError};
use yunischema::model::{EffectiveModel, EffectiveStatement, SourceKey, Unqualified};
use yunischema::reactor::{BuildAction, ModelProcessingPhase};
use yunischema::source::TextSource;
use yunischema::vocab::standard_reactor;

/// ソース群から実効モデルを組み立てるヘルパー関数
pub fn build_effective(sources: &[&str]) -> Result<EffectiveModel, SchemaError> {
    build_configured(sources, &[], |_| {})
}

/// ライブラリ付きで実効モデルを組み立てるヘルパー関数
pub fn build_with_libraries(
    sources: &[&str],
    libraries: &[&str],
) -> Result<EffectiveModel, SchemaError> {
    build_configured(sources, libraries, |_| {})
}

/// ビルドを設定してから駆動するヘルパー関数
pub fn build_configured(
    sources: &[&str],
    libraries: &[&str],
    configure: impl FnOnce(&mut BuildAction),
) -> Result<EffectiveModel, SchemaError> {
    let reactor = standard_reactor().expect("standard vocabulary should assemble");
    let mut build = reactor.new_build();
    for text in sources {
        build.add_source(Box::new(TextSource::parse(text)?));
    }
    for text in libraries {
        build.add_library_source(Box::new(TextSource::parse(text)?));
    }
    configure(&mut build);
    build.build_effective()
}

/// 組み立てに成功することを確認するヘルパー関数
pub fn assert_builds(sources: &[&str]) -> EffectiveModel {
    build_effective(sources).expect("Build should succeed")
}

/// 組み立てに失敗することを確認するヘルパー関数
pub fn assert_build_fails(sources: &[&str]) -> SchemaError {
    match build_effective(sources) {
        Ok(_) => panic!("Build should fail"),
        Err(error) => error,
    }
}

/// 名前でモジュールの実効ルートを取り出すヘルパー関数
pub fn effective_root<'a>(model: &'a EffectiveModel, name: &str) -> &'a Arc<EffectiveStatement> {
    let name = Unqualified::try_new(name).expect("valid module name");
    &model
        .find_module(&name)
        .expect("module should be present in the model")
        .effective
}

/// フェーズ集約エラーを分解するヘルパー関数
pub fn unresolved_parts(
    error: &SchemaError,
) -> (ModelProcessingPhase, &SourceKey, &SchemaError, &[SchemaError]) {
    let SchemaError::Reactor(ReactorError::SomeModifiersUnresolved {
        phase,
        source,
        cause,
        suppressed,
    }) = error
    else {
        panic!("Expected an aggregate phase failure, got: {error:?}");
    };
    (*phase, source, cause.as_ref(), suppressed.as_slice())
}

/// 集約エラーの原因から推論失敗の本文を取り出すヘルパー関数
pub fn inference_message(error: &SchemaError) -> &str {
    let (_, _, cause, _) = unresolved_parts(error);
    let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = cause else {
        panic!("Expected an inference failure, got: {cause:?}");
    };
    message
}

// サブモジュールの宣言
#[cfg(test)]
mod linkage_test;
#[cfg(test)]
mod grouping_test;
#[cfg(test)]
mod feature_test;
#[cfg(test)]
mod type_test;
#[cfg(test)]
mod node_test;
