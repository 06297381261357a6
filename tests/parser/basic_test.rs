//! 文の入れ子と終端の構文解析テスト

use super::*;
use yunischema::model::{Keyword, Span};

#[test]
fn test_semicolon_terminated_statement() {
    // セミコロンで終わる単文のテスト
    let root = assert_parses("module m;");

    assert_eq!(root.keyword, Keyword::Plain("module".to_string()));
    assert_eq!(root.raw_argument.as_deref(), Some("m"));
    assert!(root.children.is_empty());
    assert_eq!(root.span, Span::new(0, 9));
}

#[test]
fn test_empty_block() {
    // 空のブロックは子文なしの文になる
    let root = assert_parses("module m { }");

    assert_eq!(root.raw_argument.as_deref(), Some("m"));
    assert!(root.children.is_empty());
    assert_eq!(root.span, Span::new(0, 12));
}

#[test]
fn test_nested_statements() {
    // 入れ子構造のテスト
    let source = r#"
    module m {
        namespace "urn:m";
        prefix m;
        container c {
            leaf x {
                type string;
            }
        }
    }
    "#;
    let root = assert_parses(source);

    assert_eq!(root.keyword, Keyword::Plain("module".to_string()));
    assert_eq!(root.children.len(), 3);

    let container = &root.children[2];
    assert_eq!(container.keyword, Keyword::Plain("container".to_string()));
    assert_eq!(container.raw_argument.as_deref(), Some("c"));

    let leaf = &container.children[0];
    assert_eq!(leaf.raw_argument.as_deref(), Some("x"));
    let type_stmt = &leaf.children[0];
    assert_eq!(type_stmt.keyword, Keyword::Plain("type".to_string()));
    assert_eq!(type_stmt.raw_argument.as_deref(), Some("string"));
}

#[test]
fn test_children_keep_source_order() {
    // 子文はソースの出現順を保つ
    let root = assert_parses("module m { leaf a; leaf b; container c { } leaf d; }");

    let names: Vec<_> = root
        .children
        .iter()
        .map(|child| child.raw_argument.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_statement_without_argument() {
    // input/output のような無引数の文
    let root = assert_parses("module m { rpc r { input { leaf a; } output; } }");

    let rpc = &root.children[0];
    let input = &rpc.children[0];
    assert_eq!(input.keyword, Keyword::Plain("input".to_string()));
    assert_eq!(input.raw_argument, None);
    assert_eq!(input.arg_span, None);
    let output = &rpc.children[1];
    assert_eq!(output.raw_argument, None);
}

#[test]
fn test_prefixed_keyword() {
    // prefix:name 形式のキーワード
    let root = assert_parses(r#"module m { ext:note "hello"; }"#);

    assert_eq!(
        root.children[0].keyword,
        Keyword::Prefixed {
            prefix: "ext".to_string(),
            name: "note".to_string(),
        }
    );
    assert_eq!(root.children[0].raw_argument.as_deref(), Some("hello"));
}

#[test]
fn test_spans_locate_statements_in_source() {
    // 文のスパンはキーワードの先頭から終端記号の直後まで
    let source = "module m { leaf x; }";
    let root = assert_parses(source);

    assert_eq!(root.span, Span::new(0, source.len()));
    let leaf = &root.children[0];
    assert_eq!(leaf.span, Span::new(11, 18));
    assert_eq!(&source[leaf.span.start..leaf.span.end], "leaf x;");
    assert_eq!(root.arg_span, Some(Span::new(7, 8)));
}

#[test]
fn test_children_named_filters_by_keyword() {
    // children_named は素キーワードの一致だけを順に返す
    let root = assert_parses(
        "module m { revision 2024-01-15; leaf x; revision 2023-06-01; }",
    );

    let revisions: Vec<_> = root
        .children_named("revision")
        .map(|child| child.raw_argument.as_deref().unwrap())
        .collect();
    assert_eq!(revisions, vec!["2024-01-15", "2023-06-01"]);
}
