//! データノードと暗黙の子のテスト

use super::*;

use yunischema::error::SourceError;
use yunischema::model::ArgumentValue;

// choice 直下の裸のデータノードは暗黙の case に包まれる。包みは
// 両方のビューに現れ、書かれていないので宣言ビューへの対応は持たない。
#[test]
fn test_choice_wraps_bare_nodes_in_implicit_cases() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container conn {
                choice transport {
                    leaf tcp {
                        type empty;
                    }
                    leaf udp {
                        type empty;
                    }
                    case custom {
                        leaf raw {
                            type string;
                        }
                    }
                }
            }
        }
    "#]);
    let name = Unqualified::try_new("m").unwrap();
    let module = model.find_module(&name).expect("module should be present");

    let choice = module
        .effective
        .find_first("container")
        .and_then(|conn| conn.find_first("choice"))
        .expect("choice should be effective");
    assert!(choice.find_first("leaf").is_none());
    let cases: Vec<_> = choice.find_all("case").collect();
    assert_eq!(cases.len(), 3);

    let tcp = &cases[0];
    assert_eq!(tcp.argument().local_name().map(Unqualified::as_str), Some("tcp"));
    assert!(tcp.declared.is_none());
    assert!(tcp.find_first("leaf").is_some());

    let custom = cases
        .iter()
        .find(|case| case.argument().local_name().map(Unqualified::as_str) == Some("custom"))
        .expect("written case should keep its name");
    assert!(custom.declared.is_some());

    let declared_choice = module
        .declared
        .find_first("container")
        .and_then(|conn| conn.find_first("choice"))
        .expect("choice should be declared");
    assert!(declared_choice.find_first("leaf").is_none());
    let declared_cases = declared_choice
        .substatements()
        .iter()
        .filter(|sub| sub.keyword() == "case")
        .count();
    assert_eq!(declared_cases, 3);
}

// rpc は書かれていない input と output を実効ビューに補う
#[test]
fn test_rpc_gains_implicit_io() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            rpc ping {
            }
        }
    "#]);
    let rpc = effective_root(&model, "m")
        .find_first("rpc")
        .expect("rpc should be effective");
    let input = rpc.find_first("input").expect("implicit input");
    let output = rpc.find_first("output").expect("implicit output");
    assert!(input.declared.is_none());
    assert!(output.declared.is_none());
    assert_eq!(input.argument(), &ArgumentValue::Empty);
    assert_eq!(output.argument(), &ArgumentValue::Empty);
}

// 書かれた input はそのまま残り、output だけが補われる
#[test]
fn test_rpc_keeps_written_input() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            rpc fetch {
                input {
                    leaf query {
                        type string;
                    }
                }
            }
        }
    "#]);
    let rpc = effective_root(&model, "m")
        .find_first("rpc")
        .expect("rpc should be effective");
    assert_eq!(rpc.find_all("input").count(), 1);
    let input = rpc.find_first("input").expect("written input");
    assert!(input.declared.is_some());
    assert!(input.find_first("leaf").is_some());
    let output = rpc.find_first("output").expect("implicit output");
    assert!(output.declared.is_none());
}

// 真理値文は true と false 以外を文の名前ごと棄却する
#[test]
fn test_flag_rejects_non_boolean_argument() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf mtu {
                type uint32;
                config maybe;
            }
        }
    "#]);
    let (phase, _, cause, _) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    let SchemaError::Source(SourceError::InvalidArgument { message, .. }) = cause else {
        panic!("Expected an invalid argument error, got: {cause:?}");
    };
    assert!(message.contains("config"), "message was: {message}");
    assert!(message.contains("'maybe'"), "message was: {message}");
    assert!(message.contains("true か false"), "message was: {message}");
}

// 真理値文の引数は Bool として残る
#[test]
fn test_flag_arguments_become_booleans() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf mtu {
                type uint32;
                config false;
                mandatory true;
            }
        }
    "#]);
    let leaf = effective_root(&model, "m")
        .find_first("leaf")
        .expect("leaf should be effective");
    let config = leaf.find_first("config").expect("config child");
    assert_eq!(config.argument().as_bool(), Some(false));
    let mandatory = leaf.find_first("mandatory").expect("mandatory child");
    assert_eq!(mandatory.argument().as_bool(), Some(true));
}

// 同じ親の下に同じ名前のデータノードは置けない
#[test]
fn test_duplicate_node_names_under_one_parent() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container server {
                leaf address {
                    type string;
                }
                leaf address {
                    type string;
                }
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::DuplicateDefinition { kind, name, .. }) = cause else {
        panic!("Expected a duplicate definition error, got: {cause:?}");
    };
    assert_eq!(kind, "data node");
    assert!(name.contains("address"), "name was: {name}");
}

// 親が違えば同じ名前のデータノードを持てる
#[test]
fn test_same_node_name_under_different_parents() {
    assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container primary {
                leaf address {
                    type string;
                }
            }
            container secondary {
                leaf address {
                    type string;
                }
            }
        }
    "#]);
}

// leaf には type が必須
#[test]
fn test_leaf_requires_type() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf bare {
            }
        }
    "#]);
    let (_, _, cause, _) = unresolved_parts(&error);
    let SchemaError::Source(SourceError::MissingStatement { keyword, parent, .. }) = cause else {
        panic!("Expected a missing statement error, got: {cause:?}");
    };
    assert_eq!(keyword, "type");
    assert_eq!(parent, "leaf");
}
