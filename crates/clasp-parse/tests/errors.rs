use clasp_parse::{parse_str, SyntaxError};

#[test]
fn unsupported_character() {
    let err = parse_str("(.+ 1 \u{7f}2)").expect_err("should reject");
    assert!(matches!(err, SyntaxError::Lex { .. }));
    assert!(err.to_string().contains("unsupported character"), "got: {err}");
}

#[test]
fn empty_sequence_rejected() {
    let err = parse_str("{}").expect_err("should reject");
    assert!(matches!(err, SyntaxError::Parse { .. }));
    assert!(err.to_string().contains("zero-length sequence"), "got: {err}");
}

#[test]
fn trailing_tokens_rejected() {
    let err = parse_str("1 2").expect_err("should reject");
    assert!(err.to_string().contains("redundant token(s)"), "got: {err}");
}

#[test]
fn unclosed_paren_rejected() {
    let err = parse_str("(.+ 1 2").expect_err("should reject");
    assert!(matches!(err, SyntaxError::Parse { .. }));
}

#[test]
fn stray_closing_paren_rejected() {
    let err = parse_str(")").expect_err("should reject");
    assert!(err.to_string().contains("unexpected token"), "got: {err}");
}

#[test]
fn empty_input_rejected() {
    let err = parse_str("").expect_err("should reject");
    assert!(err.to_string().contains("incomplete token stream"), "got: {err}");
}

#[test]
fn lambda_requires_param_list() {
    let err = parse_str("lambda x x").expect_err("should reject");
    assert!(matches!(err, SyntaxError::Parse { .. }));
}

#[test]
fn at_requires_identifier() {
    let err = parse_str("@ 1 x").expect_err("should reject");
    assert!(err.to_string().contains("expected identifier"), "got: {err}");
}

#[test]
fn error_display_carries_kind_and_location() {
    let err = parse_str("{}").expect_err("should reject");
    let msg = err.to_string();
    assert!(msg.starts_with("[parser error (SourceLocation 1 1)]"), "got: {msg}");

    let err = parse_str("\"oops").expect_err("should reject");
    let msg = err.to_string();
    assert!(msg.starts_with("[lexer error (SourceLocation 1 1)]"), "got: {msg}");
}
