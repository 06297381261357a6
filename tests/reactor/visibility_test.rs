//! 名前空間の可視範囲テスト
//!
//! 木範囲の定義表は定義を包む部分木の中だけで見え、
//! 大域の定義表はソースを越えて見えることを確認する。

use super::*;

use yunischema::error::SourceError;

// 文に付いた typedef はその部分木の中から見える
#[test]
fn test_typedef_visible_in_enclosing_subtree() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container net {
                typedef port {
                    type uint16;
                }
                container listen {
                    leaf port {
                        type port;
                    }
                }
            }
        }
    "#]);
}

// 兄弟の部分木に付いた typedef は見えない
#[test]
fn test_typedef_not_visible_to_siblings() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container defs {
                typedef port {
                    type uint16;
                }
            }
            container listen {
                leaf port {
                    type port;
                }
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = cause else {
        panic!("Expected an inference failure, got: {cause:?}");
    };
    assert!(message.contains("port"), "message was: {message}");
}

// モジュール直下の定義はどの深さからも見える
#[test]
fn test_module_level_definitions_visible_everywhere() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            typedef token {
                type string;
            }
            grouping credentials {
                leaf secret {
                    type token;
                }
            }
            container outer {
                container inner {
                    leaf key {
                        type token;
                    }
                }
            }
            rpc login {
                input {
                    uses credentials;
                }
            }
        }
    "#]);
}

// 兄弟の部分木に付いた grouping は見えない
#[test]
fn test_grouping_in_sibling_scope_not_visible() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container defs {
                grouping names {
                    leaf name {
                        type string;
                    }
                }
            }
            container users {
                uses names;
            }
        }
    "#]);
    let (phase, _, cause, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = cause else {
        panic!("Expected an inference failure, got: {cause:?}");
    };
    assert!(message.contains("names"), "message was: {message}");
}

// インポートした定義は接頭辞を付けたときだけ見える
#[test]
fn test_imported_definitions_require_prefix() {
    let imported = r#"
        module b {
            namespace "urn:b";
            prefix b;
            typedef port-number {
                type uint16;
            }
        }
    "#;
    let bare = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import b {
                prefix b;
            }
            leaf port {
                type port-number;
            }
        }
    "#;
    assert!(build_effective(&[bare, imported]).is_err());

    let prefixed = r#"
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
    build_effective(&[prefixed, imported]).expect("Build should succeed");
}

// 接頭辞付きの参照は相手モジュールの直下しか見ない
#[test]
fn test_only_top_level_definitions_visible_across_modules() {
    let imported = r#"
        module b {
            namespace "urn:b";
            prefix b;
            container defs {
                grouping names {
                    leaf name {
                        type string;
                    }
                }
            }
        }
    "#;
    let importer = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import b {
                prefix b;
            }
            container users {
                uses b:names;
            }
        }
    "#;
    let error = build_effective(&[importer, imported])
        .err()
        .expect("Build should fail");
    let (_, source, _, _) = unresolved_parts(&error);
    assert_eq!(source.name.as_str(), "a");
}

// feature の定義表は大域で、ソースを越えて見える
#[test]
fn test_feature_namespace_is_global() {
    let provider = r#"
        module b {
            namespace "urn:b";
            prefix b;
            feature telemetry;
        }
    "#;
    let consumer = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import b {
                prefix b;
            }
            leaf counters {
                type uint32;
                if-feature b:telemetry;
            }
        }
    "#;
    let model = build_effective(&[consumer, provider]).expect("Build should succeed");
    assert!(effective_root(&model, "a").find_first("leaf").is_some());
}

// 宣言されていない接頭辞は待たずにその場で報告される
#[test]
fn test_unknown_prefix_reported_without_waiting() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses lib:names;
            }
        }
    "#]);
    let (phase, _, cause, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    let SchemaError::Source(SourceError::InvalidArgument { message, .. }) = cause else {
        panic!("Expected an invalid argument error, got: {cause:?}");
    };
    assert!(message.contains("接頭辞 lib"), "message was: {message}");
}
