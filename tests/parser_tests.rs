mod common;

use flavent::ast;
use flavent::lexer::lex;
use flavent::parser::parse_program;
use flavent::DiagnosticKind;

fn parse(src: &str) -> Result<ast::Program, flavent::Diagnostic> {
    parse_program(lex("test.flv", src)?)
}

#[test]
fn missing_fn_body_reports_expected_expression() {
    let err = parse("fn f() -> Int =\n").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Parse);
    assert!(err.message.contains("Expected"), "{}", err.message);
}

#[test]
fn missing_close_paren_has_hint() {
    let err = parse("fn f() -> Int = g(1\n").unwrap_err();
    assert!(err.message.contains("missing ')'"), "{}", err.message);
}

#[test]
fn run_must_be_last() {
    let err = parse("run()\nfn f() -> Int = 1\n").unwrap_err();
    assert!(err.message.contains("run() must be the last item"), "{}", err.message);
}

#[test]
fn flvtest_syntax_at_top_level_has_hint() {
    let err = parse("test \"adds\" -> do:\n  stop()\n").unwrap_err();
    assert!(err.message.contains("flvtest"), "{}", err.message);
}

#[test]
fn match_arm_without_pattern_is_rejected() {
    let err = parse("fn f(x: Bool) -> Int = match x:\n  -> 1\n").unwrap_err();
    assert!(
        err.message.contains("Expected match arm pattern"),
        "{}",
        err.message
    );
}

#[test]
fn match_arm_without_body_is_rejected() {
    let err = parse("fn f(x: Bool) -> Int = match x:\n  true ->\n").unwrap_err();
    assert!(
        err.message.contains("Expected match arm body"),
        "{}",
        err.message
    );
}

#[test]
fn operator_precedence_groups_as_specified() {
    let prog = parse("const x = 1 + 2 * 3 == 7 and true\n").unwrap();
    let decl = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Const(c) => Some(c),
            _ => None,
        })
        .unwrap();
    // and(==(+(1, *(2, 3)), 7), true)
    let ast::Expr::Binary(and) = &decl.value else {
        panic!("top is and");
    };
    assert_eq!(and.op, "and");
    let ast::Expr::Binary(eq) = and.left.as_ref() else {
        panic!("left of and is ==");
    };
    assert_eq!(eq.op, "==");
    let ast::Expr::Binary(plus) = eq.left.as_ref() else {
        panic!("left of == is +");
    };
    assert_eq!(plus.op, "+");
    let ast::Expr::Binary(mul) = plus.right.as_ref() else {
        panic!("right of + is *");
    };
    assert_eq!(mul.op, "*");
}

#[test]
fn unary_binds_tighter_than_binary() {
    let prog = parse("const x = -1 + 2\n").unwrap();
    let decl = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Const(c) => Some(c),
            _ => None,
        })
        .unwrap();
    let ast::Expr::Binary(plus) = &decl.value else {
        panic!("top is +");
    };
    assert!(matches!(plus.left.as_ref(), ast::Expr::Unary(_)));
}

#[test]
fn call_args_parse_all_four_kinds() {
    let prog = parse("const x = f(1, name = 2, *xs, **kw)\n").unwrap();
    let decl = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Const(c) => Some(c),
            _ => None,
        })
        .unwrap();
    let ast::Expr::Call(call) = &decl.value else {
        panic!("call expected");
    };
    assert!(matches!(call.args[0], ast::CallArg::Pos { .. }));
    assert!(matches!(call.args[1], ast::CallArg::Kw { .. }));
    assert!(matches!(call.args[2], ast::CallArg::Star { .. }));
    assert!(matches!(call.args[3], ast::CallArg::StarStar { .. }));
}

#[test]
fn sum_type_and_alias_disambiguate() {
    let prog = parse("type Shape = Circle(Int) | Square(Int)\ntype Id = Int\n").unwrap();
    let mut kinds = prog.items.iter().filter_map(|it| match it {
        ast::Item::Type(td) => Some(&td.rhs),
        _ => None,
    });
    assert!(matches!(kinds.next(), Some(ast::TypeRhs::Sum(_))));
    assert!(matches!(kinds.next(), Some(ast::TypeRhs::Alias(_))));
}

#[test]
fn resolve_rule_reassembles_mixin_conflict() {
    let src = "resolve mixin-conflict:\n  prefer A v1 over B v2\n\nrun()\n";
    let prog = parse(src).unwrap();
    let rule = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::ResolveMixin(r) => Some(&r.rules[0]),
            _ => None,
        })
        .unwrap();
    assert_eq!(rule.prefer.name.dotted(), "A");
    assert_eq!(rule.prefer.version, 1);
    assert_eq!(rule.over.name.dotted(), "B");
    assert_eq!(rule.over.version, 2);
}

#[test]
fn hook_options_accept_negative_priorities() {
    let src = "mixin A v1 into sector S:\n  hook head fn foo(x: Int) with(id = \"h\", priority = -5) = 0\n\nrun()\n";
    let prog = parse(src).unwrap();
    let md = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Mixin(md) => Some(md),
            _ => None,
        })
        .unwrap();
    let ast::MixinItem::Hook(hk) = &md.items[0] else {
        panic!("hook expected");
    };
    assert_eq!(hk.opts.get("priority").map(String::as_str), Some("-5"));
}

#[test]
fn need_attributes_parse() {
    let src = "need (cache = \"1h\", cacheFail = \"drop\") token = fetch()\nfn fetch() -> Str = \"t\"\n\nrun()\n";
    let prog = parse(src).unwrap();
    let nd = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Need(nd) => Some(nd),
            _ => None,
        })
        .unwrap();
    let attrs = nd.attrs.as_ref().unwrap();
    assert_eq!(attrs.cache.as_deref(), Some("1h"));
    assert_eq!(attrs.cache_fail.as_deref(), Some("drop"));
}

#[test]
fn handler_accepts_binder_and_when_guard() {
    let src = "type Event.N = { n: Int }\n\nsector main:\n  on Event.N as e when e.n > 0 -> stop_it()\n\nrun()\n";
    let prog = parse(src).unwrap();
    let sector = prog
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Sector(sd) => Some(sd),
            _ => None,
        })
        .unwrap();
    let ast::SectorItem::Handler(h) = &sector.items[0] else {
        panic!("handler expected");
    };
    assert_eq!(h.binder.as_ref().unwrap().name, "e");
    assert!(h.when.is_some());
}
