//! 組み込み型と typedef のテスト

use super::*;

use test_case::test_case;
use yunischema::error::SourceError;

#[test_case("binary")]
#[test_case("boolean")]
#[test_case("empty")]
#[test_case("int8")]
#[test_case("int16")]
#[test_case("int32")]
#[test_case("int64")]
#[test_case("string")]
#[test_case("uint8")]
#[test_case("uint16")]
#[test_case("uint32")]
#[test_case("uint64")]
fn test_builtin_type_resolves(builtin: &str) {
    let source = format!(
        r#"
        module m {{
            namespace "urn:m";
            prefix m;
            leaf value {{
                type {builtin};
            }}
        }}
        "#
    );
    build_effective(&[&source]).expect("Build should succeed");
}

// 組み込みに無い名前は typedef として解決される必要がある
#[test]
fn test_unknown_type_name_needs_a_typedef() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf value {
                type decimal64;
            }
        }
    "#]);
    let message = inference_message(&error);
    assert!(
        message.contains("typedef decimal64"),
        "message was: {message}"
    );
}

// typedef は別の typedef を下敷きにできる
#[test]
fn test_typedef_chains_resolve() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            typedef metres {
                type uint32;
            }
            typedef distance {
                type metres;
            }
            leaf span {
                type distance;
            }
        }
    "#]);
}

// 同じ場所に同じ名前の typedef は置けない
#[test]
fn test_duplicate_typedef_in_scope() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            typedef port {
                type uint16;
            }
            typedef port {
                type uint32;
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::DuplicateDefinition { kind, name, .. }) = cause else {
        panic!("Expected a duplicate definition error, got: {cause:?}");
    };
    assert_eq!(kind, "typedef");
    assert_eq!(name, "port");
}

// 別の部分木なら同じ名前の typedef を持てる
#[test]
fn test_same_typedef_name_in_nested_scope() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            typedef port {
                type uint16;
            }
            container wide {
                typedef port {
                    type uint32;
                }
                leaf listen {
                    type port;
                }
            }
            leaf default-port {
                type port;
            }
        }
    "#]);
}

// typedef には type が必須
#[test]
fn test_typedef_requires_type_child() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            typedef hollow {
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::MissingStatement { keyword, parent, .. }) = cause else {
        panic!("Expected a missing statement error, got: {cause:?}");
    };
    assert_eq!(keyword, "type");
    assert_eq!(parent, "typedef");
}

// インポート先の typedef は接頭辞越しに解決される
#[test]
fn test_imported_typedef_resolves_through_prefix() {
    let provider = r#"
        module units {
            namespace "urn:units";
            prefix units;
            typedef percent {
                type uint8;
            }
        }
    "#;
    let consumer = r#"
        module app {
            namespace "urn:app";
            prefix app;
            import units {
                prefix u;
            }
            leaf load {
                type u:percent;
            }
        }
    "#;
    build_effective(&[consumer, provider]).expect("Build should succeed");
}
