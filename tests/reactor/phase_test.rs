//! フェーズ進行と失敗帰属のテスト

use super::*;

use yunischema::error::SourceError;
use yunischema::model::Revision;

// 解決できないインポートはプレリンクフェーズで止まる
#[test]
fn test_missing_import_fails_at_pre_linkage() {
    let error = assert_build_fails(&[r#"
        module a {
            namespace "urn:a";
            prefix a;
            import vanished {
                prefix v;
            }
        }
    "#]);
    let (phase, source, cause, suppressed) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::SourcePreLinkage);
    assert_eq!(source.name.as_str(), "a");
    assert!(suppressed.is_empty());
    let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = cause else {
        panic!("Expected an inference failure, got: {cause:?}");
    };
    assert!(message.contains("vanished"), "message was: {message}");
}

// 集約エラーの文言はフェーズ名とソース名を含む
#[test]
fn test_aggregate_error_names_phase_and_source() {
    let error = assert_build_fails(&[r#"
        module a {
            namespace "urn:a";
            prefix a;
            import vanished {
                prefix v;
            }
        }
    "#]);
    let SchemaError::Reactor(reactor_error) = &error else {
        panic!("Expected a reactor error, got: {error:?}");
    };
    let shown = reactor_error.to_string();
    assert!(shown.contains("source-pre-linkage"), "shown was: {shown}");
    assert!(shown.contains("a"), "shown was: {shown}");
}

// リビジョンの合わないインポートはリンクフェーズで止まる。名前だけで
// インポートする別のソースがライブラリを引き込むので、発見は済んで
// いてもリンクだけが失敗する。
#[test]
fn test_revision_mismatch_fails_at_linkage() {
    let wants_exact = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import lib {
                prefix l;
                revision-date 2024-01-15;
            }
        }
    "#;
    let wants_any = r#"
        module b {
            namespace "urn:b";
            prefix b;
            import lib {
                prefix l;
            }
        }
    "#;
    let library = r#"
        module lib {
            namespace "urn:lib";
            prefix lib;
            revision 2023-06-01;
        }
    "#;
    let error = build_with_libraries(&[wants_exact, wants_any], &[library])
        .err()
        .expect("Build should fail");
    let (phase, source, cause, suppressed) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::SourceLinkage);
    assert_eq!(source.name.as_str(), "a");
    assert!(suppressed.is_empty());
    let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = cause else {
        panic!("Expected an inference failure, got: {cause:?}");
    };
    assert!(message.contains("lib"), "message was: {message}");
    assert!(message.contains("2024-01-15"), "message was: {message}");
}

// 解決できない参照は完全宣言フェーズで止まる
#[test]
fn test_unresolved_reference_fails_at_full_declaration() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses nope;
            }
        }
    "#]);
    let (phase, source, _, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    assert_eq!(source.name.as_str(), "m");
}

// 失敗の帰属先はリビジョンまで含めたソースキー
#[test]
fn test_failure_attribution_carries_revision() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            revision 2024-01-15;
            leaf x {
                type missing;
            }
        }
    "#]);
    let (_, source, _, _) = unresolved_parts(&error);
    assert_eq!(source.name.as_str(), "m");
    assert_eq!(
        source.revision,
        Some(Revision::try_new("2024-01-15").unwrap())
    );
}

// 主ソースは投入順のままモデルに並ぶ。主ソース同士のインポートも
// ライブラリなしでリンクできる。
#[test]
fn test_modules_keep_submission_order() {
    let importer = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import b {
                prefix b;
            }
            leaf port {
                type b:port-number;
            }
        }
    "#;
    let imported = r#"
        module b {
            namespace "urn:b";
            prefix b;
            typedef port-number {
                type uint32;
            }
        }
    "#;
    let model = build_effective(&[importer, imported]).expect("Build should succeed");
    assert_eq!(model.modules.len(), 2);
    assert_eq!(model.modules[0].source.name.as_str(), "a");
    assert_eq!(model.modules[1].source.name.as_str(), "b");
    let leaf = effective_root(&model, "a")
        .find_first("leaf")
        .expect("leaf should survive to the effective view");
    assert_eq!(leaf.argument().local_name().map(Unqualified::as_str), Some("port"));
}

// 宣言モデルは完全宣言フェーズまでで止まり、展開も暗黙の子も含まない
#[test]
fn test_declared_model_shows_only_written_statements() {
    let declared = build_declared(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping g {
                leaf x {
                    type string;
                }
            }
            rpc ping {
            }
            container c {
                uses g;
            }
        }
    "#])
    .expect("Build should succeed");
    let name = Unqualified::try_new("m").unwrap();
    let root = &declared
        .find_module(&name)
        .expect("module should be present in the model")
        .declared;
    let rpc = root.find_first("rpc").expect("rpc should be declared");
    assert!(rpc.find_first("input").is_none());
    assert!(rpc.find_first("output").is_none());
    let container = root
        .find_first("container")
        .expect("container should be declared");
    assert!(container.find_first("uses").is_some());
    assert!(container.find_first("leaf").is_none());
    assert!(root.find_first("grouping").is_some());
}
