//! 前方参照テスト
//!
//! 定義が参照より後に現れても、静止と再開の繰り返しで
//! 解決されることを確認する。

use super::*;

// uses が grouping より先に書かれていても展開される
#[test]
fn test_uses_before_grouping_definition() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses endpoint;
            }
            grouping endpoint {
                leaf host {
                    type string;
                }
            }
        }
    "#]);
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    let leaf = container
        .find_first("leaf")
        .expect("expansion should reach the container");
    assert_eq!(leaf.argument().local_name().map(Unqualified::as_str), Some("host"));
}

// type が typedef より先に書かれていても解決される
#[test]
fn test_type_before_typedef_definition() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf retries {
                type attempt-count;
            }
            typedef attempt-count {
                type uint8;
            }
        }
    "#]);
    let leaf = effective_root(&model, "m")
        .find_first("leaf")
        .expect("leaf should be effective");
    assert_eq!(leaf.argument().local_name().map(Unqualified::as_str), Some("retries"));
}

// augment が対象より先に書かれていても適用される
#[test]
fn test_augment_before_target_definition() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            augment /m:settings {
                leaf timeout {
                    type uint32;
                }
            }
            container settings {
            }
        }
    "#]);
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    let leaf = container
        .find_first("leaf")
        .expect("augmentation should reach the container");
    assert_eq!(leaf.argument().local_name().map(Unqualified::as_str), Some("timeout"));
}

// インポートする側を先に投入してもリンクできる
#[test]
fn test_importer_submitted_before_imported() {
    let importer = r#"
        module a {
            namespace "urn:a";
            prefix a;
            import b {
                prefix b;
            }
            container c {
                uses b:names;
            }
        }
    "#;
    let imported = r#"
        module b {
            namespace "urn:b";
            prefix b;
            grouping names {
                leaf name {
                    type string;
                }
            }
        }
    "#;
    let model = build_effective(&[importer, imported]).expect("Build should succeed");
    let container = effective_root(&model, "a")
        .find_first("container")
        .expect("container should be effective");
    assert!(container.find_first("leaf").is_some());
}

// grouping の中の uses は、使う側の展開より先に解決し切る
#[test]
fn test_nested_uses_resolve_before_outer_expansion() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping outer {
                uses inner;
            }
            grouping inner {
                leaf depth {
                    type uint8;
                }
            }
            container c {
                uses outer;
            }
        }
    "#]);
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    let leaf = container
        .find_first("leaf")
        .expect("nested expansion should reach the container");
    assert_eq!(leaf.argument().local_name().map(Unqualified::as_str), Some("depth"));
}
