mod common;

use common::{find_fn, lower_src, strip_spans};
use flavent::hir;

#[test]
fn pipe_lowers_to_the_same_hir_as_nested_calls() {
    let piped = "fn f(x: Int) -> Int = x\nfn g(x: Int) -> Int = x\nfn h(x: Int) -> Int = x |> f |> g\n";
    let nested = "fn f(x: Int) -> Int = x\nfn g(x: Int) -> Int = x\nfn h(x: Int) -> Int = g(f(x))\n";
    let (_, hir_a) = lower_src(piped).unwrap();
    let (_, hir_b) = lower_src(nested).unwrap();
    let ja = strip_spans(serde_json::to_value(&hir_a).unwrap());
    let jb = strip_spans(serde_json::to_value(&hir_b).unwrap());
    assert_eq!(ja, jb);
}

#[test]
fn pipe_stage_call_appends_piped_value_first() {
    let src = "fn f(x: Int, y: Int) -> Int = x\nfn h(x: Int) -> Int = x |> f(2)\n";
    let (res, hir) = lower_src(src).unwrap();
    let h = find_fn(&res, &hir, "h").unwrap();
    let hir::Stmt::Return(hir::Expr::Call(call), _) = &h.body.stmts[0] else {
        panic!("expected return of call");
    };
    assert_eq!(call.args.len(), 2);
    // First positional is the piped value.
    let hir::CallArg::Pos { value, .. } = &call.args[0] else {
        panic!("positional expected");
    };
    assert!(matches!(value, hir::Expr::Var { .. }));
}

#[test]
fn try_suffix_in_result_fn_expands_to_match() {
    let src = "fn foo() -> Result[Int, Str] = Ok(1)\nfn bar() -> Result[Int, Str] = foo()?\n";
    let (res, hir) = lower_src(src).unwrap();
    let bar = find_fn(&res, &hir, "bar").unwrap();
    let m = bar
        .body
        .stmts
        .iter()
        .find_map(|st| match st {
            hir::Stmt::Match(m) => Some(m),
            _ => None,
        })
        .expect("try-suffix produces a match statement");
    assert_eq!(m.arms.len(), 2);
    // The Err arm rebuilds Err(binder) and returns it.
    let err_arm = &m.arms[1];
    let hir::Pattern::Ctor { args, .. } = &err_arm.pat else {
        panic!("ctor pattern expected");
    };
    let binder = match args.as_deref() {
        Some([hir::Pattern::Var { sym, .. }]) => *sym,
        other => panic!("single binder expected, got {:?}", other),
    };
    let hir::Stmt::Return(hir::Expr::Call(call), _) = &err_arm.body.stmts[0] else {
        panic!("Err arm must return");
    };
    let hir::CallArg::Pos { value: hir::Expr::Var { sym, .. }, .. } = &call.args[0] else {
        panic!("Err payload must be the binder");
    };
    assert_eq!(*sym, binder);
}

#[test]
fn try_suffix_in_option_fn_propagates_none() {
    let src = "fn foo() -> Option[Int] = Some(1)\nfn bar() -> Option[Int] = foo()?\n";
    let (res, hir) = lower_src(src).unwrap();
    let bar = find_fn(&res, &hir, "bar").unwrap();
    let m = bar
        .body
        .stmts
        .iter()
        .find_map(|st| match st {
            hir::Stmt::Match(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(m.arms.len(), 2);
    assert!(matches!(m.arms[1].body.stmts[0], hir::Stmt::Return(_, _)));
}

#[test]
fn try_suffix_in_handler_aborts() {
    let src = "type Event.X = {}\nfn foo() -> Result[Int, Str] = Ok(1)\n\non Event.X -> do:\n  let x = foo()?\n  stop()\n\nrun()\n";
    let (_, hir) = lower_src(src).unwrap();
    let sec = &hir.sectors[0];
    let h = &sec.handlers[0];
    let m = h
        .body
        .stmts
        .iter()
        .find_map(|st| match st {
            hir::Stmt::Match(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert!(m.arms[1]
        .body
        .stmts
        .iter()
        .any(|st| matches!(st, hir::Stmt::AbortHandler(_, _))));
}

#[test]
fn try_suffix_without_boundary_is_rejected() {
    let src = "fn foo() -> Result[Int, Str] = Ok(1)\nfn bar() -> Int = do:\n  let x = foo()?\n  return x\n";
    let err = lower_src(src).unwrap_err();
    assert!(
        err.message.contains("TrySuffix not allowed here"),
        "{}",
        err.message
    );
}

#[test]
fn pipe_head_with_try_suffix_is_rejected() {
    let src = "fn f(x: Int) -> Int = x\nfn foo() -> Result[Int, Str] = Ok(1)\nfn bar() -> Result[Int, Str] = do:\n  let y = foo()? |> f\n  return Ok(y)\n";
    let err = lower_src(src).unwrap_err();
    assert!(
        err.message.contains("Pipe head cannot contain try-suffix"),
        "{}",
        err.message
    );
}

#[test]
fn match_with_block_arm_hoists_to_statement() {
    let src = "type Event.X = {}\n\nsector main:\n  on Event.X -> do:\n    let r = match true:\n      true -> do:\n        yield()\n        2\n      _ -> 3\n    stop()\n\nrun()\n";
    let (_, hir) = lower_src(src).unwrap();
    let sec = &hir.sectors[0];
    let h = &sec.handlers[0];
    let m = h
        .body
        .stmts
        .iter()
        .find_map(|st| match st {
            hir::Stmt::Match(m) => Some(m),
            _ => None,
        })
        .expect("block arm forces statement match");
    assert_eq!(m.arms.len(), 2);
    // Each arm's last statement writes the synthesized result variable.
    for arm in &m.arms {
        assert!(matches!(
            arm.body.stmts.last(),
            Some(hir::Stmt::Assign(_))
        ));
    }
}

#[test]
fn proceed_outside_weaving_is_rejected() {
    let src = "fn f(x: Int) -> Int = proceed(x)\n";
    let err = lower_src(src).unwrap_err();
    assert!(
        err.message
            .contains("proceed() cannot appear outside mixin weaving"),
        "{}",
        err.message
    );
}

#[test]
fn top_level_initializer_with_sugar_is_rejected() {
    let src = "fn foo() -> Result[Int, Str] = Ok(1)\nlet x = match true:\n  true -> do:\n    1\n  _ -> 2\n";
    let err = lower_src(src).unwrap_err();
    assert!(
        err.message.contains("Top-level initializer"),
        "{}",
        err.message
    );
}

#[test]
fn hir_spans_stay_within_source() {
    let src = "type Event.X = {}\n\nfn f(x: Int) -> Int = x + 1\n\nsector main:\n  on Event.X -> do:\n    let y = f(2)\n    stop()\n\nrun()\n";
    let (_, hir) = lower_src(src).unwrap();
    let value = serde_json::to_value(&hir).unwrap();
    check_spans(&value, src.len());
}

fn check_spans(v: &serde_json::Value, len: usize) {
    match v {
        serde_json::Value::Object(map) => {
            if let (Some(file), Some(start), Some(end)) =
                (map.get("file"), map.get("start"), map.get("end"))
            {
                if file.as_str() == Some("test.flv") {
                    let start = start.as_u64().unwrap() as usize;
                    let end = end.as_u64().unwrap() as usize;
                    assert!(start <= end);
                    assert!(end <= len, "span end {} beyond source {}", end, len);
                }
            }
            for v in map.values() {
                check_spans(v, len);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                check_spans(v, len);
            }
        }
        _ => {}
    }
}
