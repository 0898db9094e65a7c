mod common;

use flavent::lexer::lex;
use flavent::token::TokenKind;

#[test]
fn indent_dedent_basic() {
    let src = "sector main:\n  on Event.Start -> do:\n    stop()\n\nrun()\n";
    let toks = lex("test.flv", src).unwrap();
    let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
    assert!(kinds.contains(&TokenKind::Indent));
    assert!(kinds.contains(&TokenKind::Dedent));
    assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn nested_block_comment_ignored() {
    let src = "sector main:\n  /* a /* nested */ b */\n  on Event.Start -> do:\n    stop()\n\nrun()\n";
    let toks = lex("test.flv", src).unwrap();
    assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn tab_in_indentation_fails_at_tab_position() {
    let src = "fn f() -> Int = 1\n\tlet x = 2\n";
    let err = lex("test.flv", src).unwrap_err();
    assert!(err.message.contains("Tab is not allowed"));
    assert_eq!(&src[err.span.start..err.span.start + 1], "\t");
}

#[test]
fn tab_inside_string_is_rejected() {
    let err = lex("test.flv", "const s = \"a\tb\"\n").unwrap_err();
    assert!(err.message.contains("Tab is not allowed"));
}

#[test]
fn unexpected_indent_is_reported() {
    let src = "fn f() -> Int = 1\n   fn g() -> Int = 2\n";
    let err = lex("test.flv", src).unwrap_err();
    assert!(err.message.contains("unexpected indent"), "{}", err.message);
}

#[test]
fn unaligned_dedent_is_reported() {
    let src = "fn f() -> Int = do:\n    if true:\n        return 1\n  return 2\n";
    let err = lex("test.flv", src).unwrap_err();
    assert!(err.message.contains("unaligned dedent"), "{}", err.message);
}

#[test]
fn blank_and_comment_lines_do_not_dedent() {
    let src = "fn f() -> Int = do:\n    let x = 1\n\n    // comment only\n    return x\n";
    let toks = lex("test.flv", src).unwrap();
    let dedents = toks.iter().filter(|t| t.kind == TokenKind::Dedent).count();
    assert_eq!(dedents, 1);
}

#[test]
fn newlines_inside_brackets_are_ignored() {
    let src = "fn f(\n    x: Int,\n    y: Int\n) -> Int = x\n";
    let toks = lex("test.flv", src).unwrap();
    assert!(!toks
        .iter()
        .any(|t| t.kind == TokenKind::Indent || t.kind == TokenKind::Dedent));
}

#[test]
fn numeric_literals_normalize_to_decimal() {
    let toks = lex("test.flv", "const a = 0x10\nconst b = 0o17\nconst c = 0b101\nconst d = 1_000\n")
        .unwrap();
    let ints: Vec<&str> = toks
        .iter()
        .filter(|t| t.kind == TokenKind::Int)
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(ints, vec!["16", "15", "5", "1000"]);
}

#[test]
fn float_requires_fractional_digits() {
    let toks = lex("test.flv", "const a = 1.5\nconst b = 2 .\n").unwrap();
    assert!(toks.iter().any(|t| t.kind == TokenKind::Float && t.text == "1.5"));
    // `2 .` lexes as INT DOT, not a float.
    assert!(toks.iter().any(|t| t.kind == TokenKind::Dot));
}

#[test]
fn bad_underscore_placement_is_rejected() {
    for src in ["const a = 1__0\n", "const a = 1_\n"] {
        let err = lex("test.flv", src).unwrap_err();
        assert!(err.message.contains("Invalid numeric literal"), "{}", src);
    }
}

#[test]
fn string_escapes_decode() {
    let toks = lex("test.flv", "const s = \"a\\n\\t\\x41\\\\\"\n").unwrap();
    let s = toks.iter().find(|t| t.kind == TokenKind::Str).unwrap();
    assert_eq!(s.text, "a\n\tA\\");
}

#[test]
fn unknown_escape_passes_through_verbatim() {
    let toks = lex("test.flv", "const re = \"\\d+\"\n").unwrap();
    let s = toks.iter().find(|t| t.kind == TokenKind::Str).unwrap();
    assert_eq!(s.text, "\\d+");
}

#[test]
fn unterminated_string_is_reported() {
    let err = lex("test.flv", "const s = \"abc\n").unwrap_err();
    assert!(err.message.contains("Unterminated string literal"));
}

#[test]
fn bad_hex_escape_is_reported() {
    let err = lex("test.flv", "const s = \"\\xZZ\"\n").unwrap_err();
    assert!(err.message.contains("Invalid hex escape"));
}

#[test]
fn bytes_literal_rejects_wide_chars() {
    let err = lex("test.flv", "const b = b\"caf\u{e9}\u{1F600}\"\n").unwrap_err();
    assert!(err.message.contains("byte-range"));
}

#[test]
fn token_spans_lie_within_source() {
    let src = "fn add(a: Int, b: Int) -> Int = a + b\nconst k = add(1, 2)\n";
    let toks = lex("test.flv", src).unwrap();
    for t in &toks {
        assert!(t.span.start <= t.span.end);
        assert!(t.span.end <= src.len() + 1); // trailing newline normalization
    }
}
