//! 静止時の棄却と失敗集約のテスト
//!
//! 静止しても満たされない要求はまとめて棄却され、最初の失敗が
//! 原因、残りが抑制分として一つの集約エラーに畳まれる。

use super::*;

use yunischema::error::SourceError;

fn failure_messages(cause: &SchemaError, suppressed: &[SchemaError]) -> Vec<String> {
    std::iter::once(cause)
        .chain(suppressed.iter())
        .map(|error| {
            let SchemaError::Source(SourceError::InferenceFailed { message, .. }) = error else {
                panic!("Expected an inference failure, got: {error:?}");
            };
            message.clone()
        })
        .collect()
}

// 同じソースの未解決は一回の静止でまとめて報告される
#[test]
fn test_all_unresolved_references_reported_together() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses first-missing;
                uses second-missing;
            }
        }
    "#]);
    let (phase, source, cause, suppressed) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    assert_eq!(source.name.as_str(), "m");
    assert_eq!(suppressed.len(), 1);
    let messages = failure_messages(cause, suppressed);
    assert!(messages.iter().any(|m| m.contains("first-missing")));
    assert!(messages.iter().any(|m| m.contains("second-missing")));
}

// 複数ソースが失敗したら、先に投入されたソースが原因になる
#[test]
fn test_first_submitted_source_becomes_cause() {
    let first = r#"
        module a {
            namespace "urn:a";
            prefix a;
            container c {
                uses gone;
            }
        }
    "#;
    let second = r#"
        module b {
            namespace "urn:b";
            prefix b;
            leaf x {
                type gone;
            }
        }
    "#;
    let error = build_effective(&[first, second])
        .err()
        .expect("Build should fail");
    let (_, source, cause, suppressed) = unresolved_parts(&error);
    assert_eq!(source.name.as_str(), "a");
    assert_eq!(suppressed.len(), 1);
    let messages = failure_messages(cause, suppressed);
    assert!(messages.iter().any(|m| m.contains("gone") && m.contains("grouping")));
    assert!(messages.iter().any(|m| m.contains("gone") && m.contains("typedef")));
}

// 失敗したソースがあっても健全なソースは完了する
#[test]
fn test_valid_sources_complete_despite_rejection() {
    let broken = r#"
        module a {
            namespace "urn:a";
            prefix a;
            container c {
                uses gone;
            }
        }
    "#;
    let healthy = r#"
        module b {
            namespace "urn:b";
            prefix b;
            leaf x {
                type string;
            }
        }
    "#;
    let error = build_effective(&[broken, healthy])
        .err()
        .expect("Build should fail");
    let (phase, source, _, suppressed) = unresolved_parts(&error);
    assert_eq!(phase, ModelProcessingPhase::FullDeclaration);
    assert_eq!(source.name.as_str(), "a");
    assert!(suppressed.is_empty());
}

// 一つのソースに種類の違う失敗が混ざっても全部拾われる
#[test]
fn test_mixed_failure_kinds_in_one_source() {
    let error = assert_build_fails(&[r#"
        module m {
            namespace "urn:m";
            prefix m;
            container c {
                uses missing-group;
                leaf x {
                    type missing-type;
                }
            }
        }
    "#]);
    let (_, _, cause, suppressed) = unresolved_parts(&error);
    assert_eq!(suppressed.len(), 1);
    let messages = failure_messages(cause, suppressed);
    assert!(messages.iter().any(|m| m.contains("missing-group")));
    assert!(messages.iter().any(|m| m.contains("missing-type")));
}
