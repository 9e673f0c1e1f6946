//! Lexical and syntactic failure modes.

mod common;

use orchid::{ErrorKind, lex, parse};
use pretty_assertions::assert_eq;

#[test]
fn unterminated_string() {
    let err = lex("x := \"abc").unwrap_err();
    assert_eq!(err.kind, ErrorKind::LexError);
}

#[test]
fn newline_inside_single_line_string() {
    let err = lex("x := \"ab\ncd\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::LexError);
    assert_eq!(err.pos.unwrap().line, 1);
}

#[test]
fn dedent_to_unknown_level() {
    let err = lex("if x:\n        a := 1\n   b := 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::LexError);
    assert!(err.message.contains("indentation"));
}

#[test]
fn unexpected_character() {
    let err = lex("x := 1 ~ 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::LexError);
}

#[test]
fn double_walrus() {
    let err = parse("x := := 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(err.pos.is_some());
}

#[test]
fn missing_colon_after_if() {
    let err = parse("if x\n    y := 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[test]
fn missing_block_body() {
    let err = parse("if x:\ny := 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[test]
fn unterminated_atomic_block() {
    let err = parse("###\nx := 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(err.message.contains("###"));
}

#[test]
fn mixed_fork_branches() {
    let err = parse("fork:\n    a: 1\n    2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[test]
fn try_without_arms() {
    let err = parse("try:\n    x := 1\ny := 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[test]
fn unterminated_interpolation() {
    let err = parse("x := \"${name\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[test]
fn errors_render_kind_and_position() {
    let err = parse("x := := 2\n").unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("ParseError:"), "{text}");
    assert!(text.contains("line 1"), "{text}");
}

#[test]
fn relexing_lexer_output_is_stable() {
    // Lex → parse, and parse of identical source, agree on the AST.
    let source = "x := 1\nif x:\n    y := x + 1\n";
    let first = parse(source).unwrap();
    let second = parse(source).unwrap();
    assert_eq!(first, second);
}
