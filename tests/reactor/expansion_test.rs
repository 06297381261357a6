//! 複製と展開のテスト
//!
//! uses の展開が二つのビューへどう現れるか、複製が宣言ビューと
//! 実効ビューをどこまで共有するかを確認する。

use super::*;

fn count_statements(stmt: &Arc<yunischema::model::EffectiveStatement>) -> usize {
    1 + stmt
        .substatements()
        .iter()
        .map(count_statements)
        .sum::<usize>()
}

// uses の展開は実効ビューにだけ現れ、grouping は実効ビューから外れる
#[test]
fn test_uses_expansion_shapes_both_views() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint;
            }
        }
    "#]);
    let name = Unqualified::try_new("m").unwrap();
    let module = model.find_module(&name).expect("module should be present");

    let effective_container = module
        .effective
        .find_first("container")
        .expect("container should be effective");
    assert!(effective_container.find_first("uses").is_some());
    let copied = effective_container
        .find_first("leaf")
        .expect("expansion should add the leaf");
    assert_eq!(copied.argument().local_name().map(Unqualified::as_str), Some("address"));
    assert!(module.effective.find_first("grouping").is_none());

    let declared_container = module
        .declared
        .find_first("container")
        .expect("container should be declared");
    assert!(declared_container.find_first("uses").is_some());
    assert!(declared_container.find_first("leaf").is_none());
    assert!(module.declared.find_first("grouping").is_some());
}

// 複製は元の文と宣言ビューを共有する
#[test]
fn test_copies_share_the_declared_view() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint;
            }
        }
    "#]);
    let name = Unqualified::try_new("m").unwrap();
    let module = model.find_module(&name).expect("module should be present");

    let original = module
        .declared
        .find_first("grouping")
        .and_then(|grouping| grouping.find_first("leaf"))
        .expect("grouping should declare the leaf");
    let copied = module
        .effective
        .find_first("container")
        .and_then(|container| container.find_first("leaf"))
        .expect("expansion should add the leaf");
    let copied_declared = copied
        .declared
        .as_ref()
        .expect("copies keep the declared view of the original");
    assert!(Arc::ptr_eq(copied_declared, original));
}

// 同じ grouping を二回使うと、複製は別の文になるが共有できる
// ビューは共有される
#[test]
fn test_two_uses_share_views_between_copies() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container north {
                uses endpoint;
            }
            container south {
                uses endpoint;
            }
        }
    "#]);
    let root = effective_root(&model, "m");
    let mut containers = root.find_all("container");
    let north = containers.next().expect("first container");
    let south = containers.next().expect("second container");
    let north_leaf = north.find_first("leaf").expect("first copy");
    let south_leaf = south.find_first("leaf").expect("second copy");

    // 複製同士は別の実効文
    assert!(!Arc::ptr_eq(north_leaf, south_leaf));
    // 宣言ビューは元のものを指す
    assert!(Arc::ptr_eq(
        north_leaf.declared.as_ref().unwrap(),
        south_leaf.declared.as_ref().unwrap()
    ));
    // type の実効ビューも複製間で共有される
    let north_type = north_leaf.find_first("type").expect("type child");
    let south_type = south_leaf.find_first("type").expect("type child");
    assert!(Arc::ptr_eq(north_type, south_type));
}

// 複製は定義元の位置情報を持ったまま使う側の木に入る
#[test]
fn test_copies_keep_their_origin_location() {
    let provider = r#"
        module a {
            namespace "urn:a";
            prefix a;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
        }
    "#;
    let consumer = r#"
        module b {
            namespace "urn:b";
            prefix b;
            import a {
                prefix a;
            }
            container server {
                uses a:endpoint;
            }
        }
    "#;
    let model = build_effective(&[consumer, provider]).expect("Build should succeed");
    let copied = effective_root(&model, "b")
        .find_first("container")
        .and_then(|container| container.find_first("leaf"))
        .expect("expansion should add the leaf");
    assert_eq!(copied.view.location.source.name.as_str(), "a");
}

// 組み立て後に作業文脈が回収されてもビューは完全なまま残る
#[test]
fn test_views_survive_context_reclaim() {
    let model = assert_builds(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            grouping endpoint {
                leaf address {
                    type string;
                }
            }
            container server {
                uses endpoint;
                container backlog {
                    leaf depth {
                        type uint32;
                    }
                }
            }
        }
    "#]);
    let root = effective_root(&model, "m");
    assert_eq!(root.keyword(), "module");
    // module, namespace, prefix, server, uses, backlog, depth と
    // その type, 複製された address とその type で 10 文
    assert_eq!(count_statements(root), 10);
}
