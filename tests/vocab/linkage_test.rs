//! import とライブラリ解決のテスト

use super::*;

use yunischema::error::SourceError;
use yunischema::reactor::ParserMode;

// import が要求したライブラリだけが取り込まれ、モデルには主ソース
// だけが並ぶ
#[test]
fn test_import_pulls_needed_library() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                prefix net;
            }
            leaf port {
                type net:port-number;
            }
        }
    "#;
    let needed = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            typedef port-number {
                type uint16;
            }
        }
    "#;
    let unrelated = r#"
        module unrelated {
            namespace "urn:unrelated";
            prefix u;
        }
    "#;
    let model =
        build_with_libraries(&[main], &[needed, unrelated]).expect("Build should succeed");
    assert_eq!(model.modules.len(), 1);
    assert_eq!(model.modules[0].source.name.as_str(), "app");
}

// revision-date の無い import は手持ちの最新リビジョンに繋がる
#[test]
fn test_latest_revision_selected_without_revision_date() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                prefix net;
            }
            leaf port {
                type net:port-number;
            }
        }
    "#;
    // 旧リビジョンには typedef が無いので、最新が選ばれない限り
    // 解決は失敗する
    let older = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2023-06-01;
        }
    "#;
    let newer = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2024-01-15;
            typedef port-number {
                type uint16;
            }
        }
    "#;
    build_with_libraries(&[main], &[older, newer]).expect("Build should succeed");
}

// revision-date 付きの import はそのリビジョンに繋がる
#[test]
fn test_revision_date_selects_exact_revision() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                prefix net;
                revision-date 2023-06-01;
            }
            leaf port {
                type net:legacy-port;
            }
        }
    "#;
    // 新リビジョンからは typedef が消えているので、指定どおり旧
    // リビジョンが選ばれない限り解決は失敗する
    let older = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2023-06-01;
            typedef legacy-port {
                type uint16;
            }
        }
    "#;
    let newer = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2024-01-15;
        }
    "#;
    build_with_libraries(&[main], &[older, newer]).expect("Build should succeed");
}

// 見つからないインポートはモジュール名ごと報告される
#[test]
fn test_missing_import_names_the_module() {
    let error = assert_build_fails(&[r#"
        module app {
            namespace "urn:app";
            prefix app;
            import vanished {
                prefix v;
            }
        }
    "#]);
    let message = inference_message(&error);
    assert!(
        message.contains("インポートされたモジュール vanished"),
        "message was: {message}"
    );
}

// 厳密モードではリビジョン無しの import はリビジョン付きモジュール
// に繋がらない
#[test]
fn test_strict_mode_requires_exact_identity() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                prefix net;
            }
        }
    "#;
    let revisioned = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2024-01-15;
        }
    "#;
    let strict = |build: &mut BuildAction| build.set_parser_mode(ParserMode::Strict);
    assert!(build_configured(&[main], &[revisioned], strict).is_err());

    let unrevisioned = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
        }
    "#;
    build_configured(&[main], &[unrevisioned], strict).expect("Build should succeed");
}

// prefix の無い import はリンク時に棄却される
#[test]
fn test_import_requires_prefix_substatement() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                revision-date 2024-01-15;
            }
        }
    "#;
    let library = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            revision 2024-01-15;
        }
    "#;
    let error = build_with_libraries(&[main], &[library])
        .err()
        .expect("Build should fail");
    let (phase, _, cause, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::SourceLinkage);
    let SchemaError::Source(SourceError::MissingStatement { keyword, parent, .. }) = cause else {
        panic!("Expected a missing statement error, got: {cause:?}");
    };
    assert_eq!(keyword, "prefix");
    assert_eq!(parent, "import");
}

// 既に読み込まれたソースと重複するライブラリは静かに捨てられる
#[test]
fn test_duplicate_library_slots_discarded() {
    let main = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import net-types {
                prefix net;
            }
            leaf port {
                type net:port-number;
            }
        }
    "#;
    let library = r#"
        module net-types {
            namespace "urn:net-types";
            prefix net;
            typedef port-number {
                type uint16;
            }
        }
    "#;
    let model =
        build_with_libraries(&[main], &[library, library]).expect("Build should succeed");
    assert_eq!(model.modules.len(), 1);
}
