//! feature と if-feature のテスト

use super::*;

use yunischema::model::{FeatureSet, ModuleId, QualifiedName};

fn feature(uri: &str, name: &str) -> QualifiedName {
    QualifiedName::new(
        ModuleId::new(uri, None),
        Unqualified::try_new(name).expect("valid feature name"),
    )
}

// 機能集合を与えなければ全機能が有効
#[test]
fn test_all_features_enabled_by_default() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature telemetry;
            leaf counters {
                type uint32;
                if-feature telemetry;
            }
        }
    "#]);
    assert!(effective_root(&model, "m").find_first("leaf").is_some());
}

// if-feature は定義されている feature しか指せない
#[test]
fn test_missing_feature_definition_fails() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            leaf counters {
                type uint32;
                if-feature vanished;
            }
        }
    "#]);
    let message = inference_message(&error);
    assert!(
        message.contains("feature vanished"),
        "message was: {message}"
    );
}

// 空の機能集合はゲートされた文を実効ビューから落とす。宣言ビュー
// には残る。
#[test]
fn test_empty_feature_set_disables_gated_statements() {
    let source = r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature telemetry;
            leaf counters {
                type uint32;
                if-feature telemetry;
            }
            leaf name {
                type string;
            }
        }
    "#;
    let model = build_configured(&[source], &[], |build| {
        build
            .set_supported_features(Some(FeatureSet::new()))
            .unwrap()
    })
    .expect("Build should succeed");
    let name = Unqualified::try_new("m").unwrap();
    let module = model.find_module(&name).expect("module should be present");

    let mut effective_leaves = module.effective.find_all("leaf");
    let survivor = effective_leaves.next().expect("ungated leaf should stay");
    assert_eq!(survivor.argument().local_name().map(Unqualified::as_str), Some("name"));
    assert!(effective_leaves.next().is_none());

    let declared_leaves: Vec<&str> = module
        .declared
        .substatements()
        .iter()
        .filter(|sub| sub.keyword() == "leaf")
        .filter_map(|sub| sub.argument().local_name())
        .map(Unqualified::as_str)
        .collect();
    assert_eq!(declared_leaves, ["counters", "name"]);
}

// 集合に入っている機能だけが文を残す
#[test]
fn test_enabled_features_keep_their_statements() {
    let source = r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature telemetry;
            feature debug;
            leaf counters {
                type uint32;
                if-feature telemetry;
            }
            leaf trace-log {
                type string;
                if-feature debug;
            }
        }
    "#;
    let enabled: FeatureSet = [feature("urn:m", "telemetry")].into_iter().collect();
    let model = build_configured(&[source], &[], |build| {
        build.set_supported_features(Some(enabled)).unwrap()
    })
    .expect("Build should succeed");
    let root = effective_root(&model, "m");
    let kept: Vec<&str> = root
        .find_all("leaf")
        .filter_map(|leaf| leaf.argument().local_name())
        .map(Unqualified::as_str)
        .collect();
    assert_eq!(kept, ["counters"]);
}

// ゲートされた uses は展開ごと止まる
#[test]
fn test_disabled_feature_blocks_uses_expansion() {
    let source = r#"
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
                }
            }
        }
    "#;
    let model = build_configured(&[source], &[], |build| {
        build
            .set_supported_features(Some(FeatureSet::new()))
            .unwrap()
    })
    .expect("Build should succeed");
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    assert!(container.find_first("uses").is_none());
    assert!(container.find_first("leaf").is_none());
}

// 部分木ごとゲートされる
#[test]
fn test_feature_gate_drops_whole_subtree() {
    let source = r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature extras;
            container optional-extras {
                if-feature extras;
                leaf knob {
                    type string;
                }
            }
            container base {
            }
        }
    "#;
    let model = build_configured(&[source], &[], |build| {
        build
            .set_supported_features(Some(FeatureSet::new()))
            .unwrap()
    })
    .expect("Build should succeed");
    let root = effective_root(&model, "m");
    let mut containers = root.find_all("container");
    let base = containers.next().expect("ungated container should stay");
    assert_eq!(base.argument().local_name().map(Unqualified::as_str), Some("base"));
    assert!(containers.next().is_none());
}

// grouping の中のゲートされた子は写し取りから除かれる
#[test]
fn test_gated_grouping_child_not_copied() {
    let source = r#"
        module m {
            namespace "urn:m";
            prefix m;
            feature with-port;
            grouping endpoint {
                leaf address {
                    type string;
                }
                leaf port {
                    type uint16;
                    if-feature with-port;
                }
            }
            container server {
                uses endpoint;
            }
        }
    "#;
    let model = build_configured(&[source], &[], |build| {
        build
            .set_supported_features(Some(FeatureSet::new()))
            .unwrap()
    })
    .expect("Build should succeed");
    let container = effective_root(&model, "m")
        .find_first("container")
        .expect("container should be effective");
    let copied: Vec<&str> = container
        .find_all("leaf")
        .filter_map(|leaf| leaf.argument().local_name())
        .map(Unqualified::as_str)
        .collect();
    assert_eq!(copied, ["address"]);
}
