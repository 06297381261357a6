//! 構文エラーの報告テスト

use super::*;
use yunischema::model::Span;

#[test]
fn test_missing_terminator() {
    // 終端記号のない文はエラー
    let error = assert_parse_error("module m { leaf x }");

    let ParserError::UnexpectedToken {
        expected, found, ..
    } = error
    else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(expected, "';'または'{'");
    assert_eq!(found, "'}'");
}

#[test]
fn test_unclosed_block() {
    // 閉じられていないブロックはEOFエラー
    let error = assert_parse_error("module m { leaf x;");
    assert!(matches!(error, ParserError::UnexpectedEof { .. }));
}

#[test]
fn test_empty_input() {
    let error = assert_parse_error("");

    let ParserError::UnexpectedEof { expected, .. } = error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(expected, "キーワード");
}

#[test]
fn test_trailing_tokens_after_root() {
    // ルート文の後に余分なトークンがあるとエラー
    let error = assert_parse_error("module m; extra;");

    let ParserError::InvalidSyntax { message, span } = error else {
        panic!("unexpected error: {error:?}");
    };
    assert!(message.contains("余って"));
    // スパンは余分なトークンを指す
    assert_eq!(span, Span::new(10, 15));
}

#[test]
fn test_keyword_with_empty_prefix() {
    // コロンの片側が空のキーワードは不正
    let error = assert_parse_error("module m { :leaf x; }");
    assert!(matches!(error, ParserError::InvalidSyntax { .. }));

    let error = assert_parse_error("module m { leaf: x; }");
    assert!(matches!(error, ParserError::InvalidSyntax { .. }));
}

#[test]
fn test_block_needs_keyword_first() {
    // ブロック内の先頭が記号ならキーワード待ちのエラー
    let error = assert_parse_error("module m { ; }");

    let ParserError::UnexpectedToken { expected, .. } = error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(expected, "キーワード");
}

#[test]
fn test_string_is_not_a_keyword() {
    let error = assert_parse_error(r#""module" m;"#);
    assert!(matches!(error, ParserError::UnexpectedToken { .. }));
}

#[test]
fn test_second_string_argument_is_rejected() {
    // 引数の文字列はひとつだけ
    let error = assert_parse_error(r#"description "a" "b";"#);

    let ParserError::UnexpectedToken { expected, .. } = error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(expected, "';'または'{'");
}
