//! grouping と uses のテスト

use super::*;

use yunischema::error::SourceError;

// grouping の説明系メタデータは展開先へ写されない
#[test]
fn test_grouping_metadata_stays_behind() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                description "An address and a port.";
                reference "Design notes, section 4.";
                status current;
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint;
            }
        }
    "#]);
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    assert!(container.find_first("leaf").is_some());
    assert!(container.find_first("description").is_none());
    assert!(container.find_first("reference").is_none());
    assert!(container.find_first("status").is_none());
}

// 見つからない grouping は名前ごと報告される
#[test]
fn test_missing_grouping_names_it() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses vanished-group;
            }
        }
    "#]);
    let message = inference_message(&error);
    assert!(
        message.contains("grouping vanished-group"),
        "message was: {message}"
    );
}

// uses の下に置けるのはメタデータ系の文だけ
#[test]
fn test_uses_allows_only_metadata_children() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint {
                    leaf extra {
                        type string;
                    }
                }
            }
        }
    "#]);
    let (phase, _, cause, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    let SchemaError::Source(SourceError::InvalidSubstatement { keyword, parent, .. }) = cause
    else {
        panic!("Expected an invalid substatement error, got: {cause:?}");
    };
    assert_eq!(keyword, "leaf");
    assert_eq!(parent, "uses");
}

// uses はメタデータ系の子なら受け付ける
#[test]
fn test_uses_accepts_metadata_children() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature fast-path;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint {
                    if-feature fast-path;
                    description "Wired in from the shared endpoint.";
                }
            }
        }
    "#]);
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    assert!(container.find_first("leaf").is_some());
}

// 同じ場所に同じ名前の grouping は置けない
#[test]
fn test_duplicate_grouping_rejected() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            grouping endpoint {
                leaf port {
                    type uint16;
                }
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::DuplicateDefinition { kind, name, .. }) = cause else {
        panic!("Expected a duplicate definition error, got: {cause:?}");
    };
    assert_eq!(kind, "grouping");
    assert_eq!(name, "endpoint");
}

// 兄弟の部分木なら同じ名前の grouping を持てる
#[test]
fn test_sibling_scopes_hold_same_grouping_name() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container ipv4 {
                grouping endpoint {
                    leaf address {
                        type string;
                    }
                }
                uses endpoint;
            }
            container ipv6 {
                grouping endpoint {
                    leaf address {
                        type string;
                    }
                }
                uses endpoint;
            }
        }
    "#]);
}
