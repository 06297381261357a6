//! 引数リテラルの構文解析テスト

use super::*;

#[test]
fn test_word_argument() {
    // 引用符なしの語を引数として受け取る
    let root = assert_parses("leaf counter;");
    assert_eq!(root.raw_argument.as_deref(), Some("counter"));
}

#[test]
fn test_date_and_number_words() {
    // 日付や数字も語として引数になる
    let root = assert_parses("module m { revision 2024-01-15; leaf if0; }");

    assert_eq!(
        root.children[0].raw_argument.as_deref(),
        Some("2024-01-15")
    );
    assert_eq!(root.children[1].raw_argument.as_deref(), Some("if0"));
}

#[test]
fn test_string_argument_unescapes() {
    // 文字列リテラルのエスケープ処理
    let root = assert_parses(r#"module m { description "a \"note\"\nwith\ttabs\\"; }"#);

    assert_eq!(
        root.children[0].raw_argument.as_deref(),
        Some("a \"note\"\nwith\ttabs\\")
    );
}

#[test]
fn test_unknown_escape_is_preserved() {
    // 未知のエスケープはそのまま残る
    let root = assert_parses(r#"description "back\qslash";"#);
    assert_eq!(root.raw_argument.as_deref(), Some("back\\qslash"));
}

#[test]
fn test_empty_string_argument() {
    // 空文字列も引数として有効
    let root = assert_parses(r#"description "";"#);
    assert_eq!(root.raw_argument.as_deref(), Some(""));
}

#[test]
fn test_string_keeps_internal_spacing() {
    let root = assert_parses(r#"description "two  spaces and / a slash";"#);
    assert_eq!(
        root.raw_argument.as_deref(),
        Some("two  spaces and / a slash")
    );
}

#[test]
fn test_path_argument_keeps_raw_text() {
    // スキーマパスは語とスラッシュの連続を元の断片のまま保持する
    let root = assert_parses("module m { augment /m:top/m:inner { leaf y; } }");

    let augment = &root.children[0];
    assert_eq!(augment.raw_argument.as_deref(), Some("/m:top/m:inner"));
    assert_eq!(augment.children[0].raw_argument.as_deref(), Some("y"));
}

#[test]
fn test_comments_do_not_join_argument_runs() {
    // コメントを挟んでも引数は正しく切り出される
    let root = assert_parses("module m { uses /* why */ g; }");
    assert_eq!(root.children[0].raw_argument.as_deref(), Some("g"));
}
