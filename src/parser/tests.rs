use crate::ast;
use crate::lexer::lex;
use crate::parser::parse_program;

fn parse(src: &str) -> ast::Program {
    parse_program(lex("test.flv", src).expect("lex")).expect("parse")
}

#[test]
fn pipe_collects_stages_below_binary() {
    let prog = parse("fn f(x: Int) -> Int = x\nconst y = 1 + 2 |> f\n");
    let decl = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Const(c) => Some(c),
            _ => None,
        })
        .expect("const decl");
    match &decl.value {
        ast::Expr::Pipe(p) => {
            assert!(matches!(*p.head, ast::Expr::Binary(_)));
            assert_eq!(p.stages.len(), 1);
        }
        other => panic!("expected pipe expr, got {:?}", other),
    }
}

#[test]
fn missing_expression_reports_expected() {
    let err = parse_program(lex("test.flv", "fn f() -> Int =\n").unwrap()).unwrap_err();
    assert!(err.message.contains("Expected"), "{}", err.message);
}

#[test]
fn single_line_block_is_rejected() {
    let err = parse_program(lex("test.flv", "fn f() -> Int = do: 1\n").unwrap()).unwrap_err();
    assert!(
        err.message.contains("single-line blocks are not supported"),
        "{}",
        err.message
    );
}

#[test]
fn uppercase_nullary_pattern_is_constructor() {
    let prog = parse(
        "fn f(x: Int) -> Int = match x:\n  None -> 0\n  v -> v\n",
    );
    let fd = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Fn(f) => Some(f),
            _ => None,
        })
        .expect("fn decl");
    let body = match &fd.body {
        ast::FnBody::Expr(e) => e,
        _ => panic!("expected expr body"),
    };
    let m = match body {
        ast::Expr::Match(m) => m,
        other => panic!("expected match, got {:?}", other),
    };
    assert!(matches!(m.arms[0].pat, ast::Pattern::Ctor(_)));
    assert!(matches!(m.arms[1].pat, ast::Pattern::Var(_)));
}

#[test]
fn assignment_at_sector_scope_has_hint() {
    let src = "sector s:\n  x = 1\n";
    let err = parse_program(lex("test.flv", src).unwrap()).unwrap_err();
    assert!(err.message.contains("assignment at sector scope"), "{}", err.message);
}
