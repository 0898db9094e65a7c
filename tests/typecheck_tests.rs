mod common;

use common::analyze_src;
use flavent::DiagnosticKind;

#[test]
fn pure_fn_and_sector_rpc_check() {
    let src = "sector db:
  fn ping() -> Int = 1

sector web:
  fn go() -> Unit = do:
    let x = rpc db.ping()
    call db.ping()
    stop()

run()
";
    analyze_src(src).unwrap();
}

#[test]
fn direct_cross_sector_call_is_rejected() {
    let src = "sector db:
  let dummy = 0

fn@db ping() -> Int = 1

sector web:
  fn go() -> Unit = do:
    let x = ping()
    stop()

run()
";
    let err = analyze_src(src).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Effect);
    assert!(
        err.message.contains("direct cross-sector call"),
        "{}",
        err.message
    );
}

#[test]
fn top_level_effectful_initializer_is_rejected() {
    let src = "sector s:
  fn ping() -> Int = 1

let x = rpc s.ping()
run()
";
    let err = analyze_src(src).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Effect);
}

#[test]
fn rpc_outside_sector_is_rejected() {
    let src = "sector s:
  fn ping() -> Int = 1

fn pure_fn() -> Int = rpc s.ping()
run()
";
    let err = analyze_src(src).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Effect);
}

#[test]
fn await_outside_sector_is_rejected() {
    let src = "type Event.X = {}

fn wait_it() -> Event.X = await Event.X
run()
";
    let err = analyze_src(src).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Effect);
    assert!(err.message.contains("await outside sector"), "{}", err.message);
}

#[test]
fn emit_requires_event_type() {
    let src = "type Event.X = {}
type Plain = { n: Int }

sector main:
  on Event.X -> do:
    emit { n = 1 }
    stop()

run()
";
    // A record literal with no event expectation is not an Event.* type.
    let err = analyze_src(src).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
    assert!(err.message.contains("emit expects Event.*"), "{}", err.message);
}

#[test]
fn pipe_over_binary_head_checks_to_int() {
    let src = "fn f(x: Int) -> Int = x\nconst y = 1 + 2 |> f\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn numeric_promotion_mixes_int_and_float() {
    analyze_src("fn f() -> Float = 1 + 2.5\n\nrun()\n").unwrap();
    analyze_src("fn g() -> Int = 7 / 2\n\nrun()\n").unwrap();
    let err = analyze_src("fn h() -> Int = 1 + 2.5\n\nrun()\n").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
}

#[test]
fn logical_operators_require_bool() {
    let err = analyze_src("fn f() -> Bool = 1 and true\n\nrun()\n").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
}

#[test]
fn comparison_yields_bool() {
    analyze_src("fn f(a: Int, b: Int) -> Bool = a <= b\n\nrun()\n").unwrap();
}

#[test]
fn record_literal_checks_fields_against_declaration() {
    let base = "type Point = { x: Int, y: Int }\n";
    analyze_src(&format!(
        "{}fn mk() -> Point = {{ x = 1, y = 2 }}\n\nrun()\n",
        base
    ))
    .unwrap();

    let unknown = analyze_src(&format!(
        "{}fn mk() -> Point = {{ x = 1, z = 2 }}\n\nrun()\n",
        base
    ))
    .unwrap_err();
    assert!(unknown.message.contains("unknown record field"), "{}", unknown.message);

    let missing = analyze_src(&format!(
        "{}fn mk() -> Point = {{ x = 1 }}\n\nrun()\n",
        base
    ))
    .unwrap_err();
    assert!(missing.message.contains("missing record field"), "{}", missing.message);
}

#[test]
fn member_access_reads_declared_field_type() {
    let src = "type Point = { x: Int, y: Int }\nfn get_x(p: Point) -> Int = p.x\n\nrun()\n";
    analyze_src(src).unwrap();
    let err = analyze_src(
        "type Point = { x: Int }\nfn get_z(p: Point) -> Int = p.z\n\nrun()\n",
    )
    .unwrap_err();
    assert!(err.message.contains("unknown record field"), "{}", err.message);
}

#[test]
fn record_fields_propagate_through_metavariables() {
    // The literal's type is a metavariable carrying field constraints until
    // the return unifies it with Point.
    let src = "type Point = { x: Int, y: Int }\nfn mk() -> Point = do:\n  let q = { x = 1, y = 2 }\n  let n = q.x\n  return q\n\nrun()\n";
    analyze_src(src).unwrap();

    let bad = "type Point = { x: Int, y: Int }\nfn mk() -> Point = do:\n  let q = { x = 1, z = 2 }\n  return q\n\nrun()\n";
    let err = analyze_src(bad).unwrap_err();
    assert!(err.message.contains("unknown record field"), "{}", err.message);
}

#[test]
fn keyword_arguments_bind_parameters() {
    let src = "fn add(a: Int, b: Int) -> Int = a + b\nfn call_it() -> Int = add(1, b = 2)\n\nrun()\n";
    analyze_src(src).unwrap();

    let dup = "fn add(a: Int, b: Int) -> Int = a + b\nfn call_it() -> Int = add(1, a = 2)\n\nrun()\n";
    let err = analyze_src(dup).unwrap_err();
    assert!(err.message.contains("duplicate keyword"), "{}", err.message);

    let unknown = "fn add(a: Int, b: Int) -> Int = a + b\nfn call_it() -> Int = add(1, c = 2)\n\nrun()\n";
    let err = analyze_src(unknown).unwrap_err();
    assert!(err.message.contains("unknown keyword"), "{}", err.message);
}

#[test]
fn missing_argument_is_reported() {
    let src = "fn add(a: Int, b: Int) -> Int = a + b\nfn call_it() -> Int = add(1)\n\nrun()\n";
    let err = analyze_src(src).unwrap_err();
    assert!(err.message.contains("missing argument"), "{}", err.message);
}

#[test]
fn varargs_accept_extra_positionals() {
    let src = "fn gather(first: Int, *rest: List[Int]) -> Int = first\nfn call_it() -> Int = gather(1, 2, 3)\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn extra_positionals_without_varargs_fail() {
    let src = "fn one(a: Int) -> Int = a\nfn call_it() -> Int = one(1, 2)\n\nrun()\n";
    let err = analyze_src(src).unwrap_err();
    assert!(err.message.contains("arity mismatch"), "{}", err.message);
}

#[test]
fn ok_err_build_result_skeletons() {
    analyze_src("fn f() -> Result[Int, Str] = Ok(1)\n\nrun()\n").unwrap();
    analyze_src("fn f() -> Result[Int, Str] = Err(\"no\")\n\nrun()\n").unwrap();
    let err = analyze_src("fn f() -> Result[Int, Str] = Ok(\"x\")\n\nrun()\n").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
}

#[test]
fn nullary_none_takes_expected_option_type() {
    analyze_src("fn f() -> Option[Int] = None\n\nrun()\n").unwrap();
}

#[test]
fn generic_fn_instantiates_per_call() {
    let src = "use std.option\n\nfn f() -> Int = std.option.unwrapOr(None, 0)\nfn g() -> Str = std.option.unwrapOr(Some(\"x\"), \"y\")\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn match_arms_unify_to_one_type() {
    let src = "fn f(o: Option[Int]) -> Int = match o:\n  Some(v) -> v\n  None -> 0\n\nrun()\n";
    analyze_src(src).unwrap();

    let bad = "fn f(o: Option[Int]) -> Int = match o:\n  Some(v) -> v\n  None -> \"zero\"\n\nrun()\n";
    let err = analyze_src(bad).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
}

#[test]
fn handler_with_binder_sees_event_type() {
    let src = "type Event.Msg = { n: Int }\n\nsector main:\n  on Event.Msg as m -> do:\n    let v = m.n\n    stop()\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn sector_let_is_assignable_from_handler() {
    let src = "type Event.X = {}\n\nsector main:\n  let count = 0\n  on Event.X -> do:\n    count = count + 1\n    stop()\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn end_to_end_stop_handler_scenario() {
    let src = "type Event.X = {}\n\nsector main:\n  on Event.X -> do:\n    stop()\n\nrun()\n";
    let analysis = analyze_src(src).unwrap();
    assert!(analysis.hir.run);
    let main = &analysis.hir.sectors[0];
    assert_eq!(main.handlers.len(), 1);
    assert!(matches!(
        main.handlers[0].body.stmts.as_slice(),
        [flavent::hir::Stmt::Stop(_)]
    ));
}

#[test]
fn type_alias_expands_during_unification() {
    let src = "type Id = Int\nfn f(x: Id) -> Int = x\nfn g() -> Id = 41 + 1\n\nrun()\n";
    analyze_src(src).unwrap();
}

#[test]
fn cyclic_type_alias_is_reported() {
    let src = "type A = B\ntype B = A\nfn f(x: A) -> Int = 1\nfn g() -> A = f(1)\n\nrun()\n";
    let err = analyze_src(src).unwrap_err();
    assert!(err.message.contains("cyclic type alias"), "{}", err.message);
}
