mod common;

use common::{resolve_no_stdlib, strip_spans};
use flavent::ast;
use flavent::mixin::HookStatus;

fn sector_fn_names(res: &flavent::Resolution, sector: &str) -> Vec<String> {
    for it in &res.program.items {
        if let ast::Item::Sector(sd) = it {
            if sd.name.name == sector {
                return sd
                    .items
                    .iter()
                    .filter_map(|si| match si {
                        ast::SectorItem::Fn(fd) => Some(fd.name.name.clone()),
                        _ => None,
                    })
                    .collect();
            }
        }
    }
    Vec::new()
}

#[test]
fn around_conflict_resolved_by_prefer_rule() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  around fn foo(x: Int) -> Int:
    return proceed(x)

mixin B v1 into sector S:
  around fn foo(x: Int) -> Int:
    return proceed(x)

resolve mixin-conflict:
  prefer A v1 over B v1

use mixin A v1
use mixin B v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    // Both arounds weave; each produced a renamed original.
    let names = sector_fn_names(&res, "S");
    assert_eq!(names.iter().filter(|n| n.as_str() == "foo").count(), 1);
    assert_eq!(names.iter().filter(|n| n.contains("_orig")).count(), 2);
}

#[test]
fn around_signature_mismatch_is_an_error() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  around fn foo(x: Str) -> Int:
    return proceed(x)

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("param type mismatch"),
        "{}",
        err.message
    );
}

#[test]
fn proceed_rewrites_inside_if_and_for_blocks() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  around fn foo(x: Int) -> Int:
    if true:
      return proceed(x)
    else:
      for y in (1, 2):
        proceed(y)
      return proceed(x)

use mixin A v1
run()
";
    resolve_no_stdlib(src).unwrap();
}

#[test]
fn unknown_mixin_is_an_error() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

use mixin Missing v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(err.message.contains("Unknown mixin: Missing@v1"), "{}", err.message);
}

#[test]
fn ambiguous_add_conflict_requires_resolve_rule() {
    let src = "sector S:
  let x = 0

mixin A v1 into sector S:
  fn f() -> Int = 1

mixin B v1 into sector S:
  fn f() -> Int = 2

use mixin A v1
use mixin B v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("Ambiguous mixin conflict"),
        "{}",
        err.message
    );
}

#[test]
fn add_conflict_resolved_by_prefer_takes_preferred_body() {
    let src = "sector S:
  let x = 0

mixin A v1 into sector S:
  fn f() -> Int = 1

mixin B v1 into sector S:
  fn f() -> Int = 2

resolve mixin-conflict:
  prefer A v1 over B v1

use mixin A v1
use mixin B v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    // Sector S contains f with A's body.
    let mut found = false;
    for it in &res.program.items {
        if let ast::Item::Sector(sd) = it {
            for si in &sd.items {
                if let ast::SectorItem::Fn(fd) = si {
                    if fd.name.name == "f" {
                        found = true;
                        let ast::FnBody::Expr(ast::Expr::Lit(lit)) = &fd.body else {
                            panic!("expected literal body");
                        };
                        assert_eq!(lit.lit, ast::Lit::Int("1".into()));
                    }
                }
            }
        }
    }
    assert!(found, "woven sector should contain f");
}

#[test]
fn add_conflicting_with_existing_fn_is_an_error() {
    let src = "sector S:
  fn f() -> Int = 0

mixin A v1 into sector S:
  fn f() -> Int = 1

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("conflict with existing fn S.f"),
        "{}",
        err.message
    );
}

#[test]
fn self_preference_rule_is_rejected() {
    let src = "sector S:
  let x = 0

mixin A v1 into sector S:
  fn f() -> Int = 1

resolve mixin-conflict:
  prefer A v1 over A v1

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("prefer and over are the same mixin"),
        "{}",
        err.message
    );
}

#[test]
fn hook_plan_records_active_hooks_with_depth() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h1\") = 0
  hook tail fn foo(x: Int) with(id = \"t1\") = 0

use mixin A v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    let plan = &res.mixin_hook_plan;
    assert_eq!(plan.len(), 2);
    for row in plan {
        assert_eq!(row.status, HookStatus::Active);
        assert_eq!(row.owner, "S");
        assert_eq!(row.target, "S.foo");
        assert!(row.depth.is_some());
    }
    assert!(plan.iter().any(|r| r.hook_id == "h1" && r.point == "head"));
    assert!(plan.iter().any(|r| r.hook_id == "t1" && r.point == "tail"));
}

#[test]
fn duplicate_hook_id_with_drop_policy_drops_both() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", conflict = \"drop\") = 0

mixin B v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", conflict = \"drop\") = 0

use mixin A v1
use mixin B v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    let dropped: Vec<_> = res
        .mixin_hook_plan
        .iter()
        .filter(|r| r.status == HookStatus::Dropped)
        .collect();
    assert_eq!(dropped.len(), 2);
    for row in dropped {
        assert_eq!(row.drop_reason.as_deref(), Some("duplicate_drop"));
    }
}

#[test]
fn duplicate_hook_id_with_error_policy_fails() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\") = 0

mixin B v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\") = 0

use mixin A v1
use mixin B v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("Duplicate hook id in same target: h"),
        "{}",
        err.message
    );
}

#[test]
fn unknown_dependency_drops_hook_when_not_strict() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", depends = \"ghost\", strict = false) = 0

use mixin A v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    let row = &res.mixin_hook_plan[0];
    assert_eq!(row.status, HookStatus::Dropped);
    assert_eq!(row.drop_reason.as_deref(), Some("unknown_dependency:ghost"));
}

#[test]
fn unknown_dependency_fails_in_strict_mode() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", depends = \"ghost\") = 0

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("Unknown hook dependency: ghost"),
        "{}",
        err.message
    );
}

#[test]
fn locator_mismatch_drops_in_non_strict_mode() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", at = \"anchor:other\", strict = false) = 0

use mixin A v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();
    let row = res
        .mixin_hook_plan
        .iter()
        .find(|r| r.hook_id == "h")
        .unwrap();
    assert_eq!(row.status, HookStatus::Dropped);
    assert_eq!(row.drop_reason.as_deref(), Some("locator_mismatch"));
}

#[test]
fn unknown_hook_option_is_rejected() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) with(id = \"h\", wat = \"x\") = 0

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(err.message.contains("Unknown hook option: wat"), "{}", err.message);
}

#[test]
fn cancelable_head_hook_requires_option_return() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  hook head fn foo(x: Int) -> Int with(id = \"h\", cancelable = true) = 0

use mixin A v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("requires return type Option[T]"),
        "{}",
        err.message
    );
}

#[test]
fn type_mixin_adds_fields_and_methods() {
    let src = "type Point = { x: Int, y: Int }

mixin Geo v1 into type Point:
  z: Int
  fn norm(self: Point) -> Int = self.x

fn use_it(p: Point) -> Int = Point.norm(p)

use mixin Geo v1
run()
";
    let res = resolve_no_stdlib(src).unwrap();

    let td = res
        .program
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Type(td) if td.name.dotted() == "Point" => Some(td),
            _ => None,
        })
        .unwrap();
    let ast::TypeRhs::Record(rec) = &td.rhs else {
        panic!("record expected");
    };
    let field_names: Vec<&str> = rec.fields.iter().map(|f| f.name.name.as_str()).collect();
    assert_eq!(field_names, vec!["x", "y", "z"]);

    // The method became a synthesized top-level fn and the call site was
    // rewritten to reference it.
    let synth = res.program.items.iter().any(|it| {
        matches!(it, ast::Item::Fn(fd) if fd.name.name == "__method__Point__norm")
    });
    assert!(synth);
    let caller = res
        .program
        .items
        .iter()
        .find_map(|it| match it {
            ast::Item::Fn(fd) if fd.name.name == "use_it" => Some(fd),
            _ => None,
        })
        .unwrap();
    let ast::FnBody::Expr(ast::Expr::Call(call)) = &caller.body else {
        panic!("call body expected");
    };
    let ast::Expr::Var(callee) = call.callee.as_ref() else {
        panic!("rewritten callee expected");
    };
    assert_eq!(callee.name, "__method__Point__norm");
}

#[test]
fn type_mixin_duplicate_field_is_an_error() {
    let src = "type Point = { x: Int }

mixin Geo v1 into type Point:
  x: Int

use mixin Geo v1
run()
";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("adds field that already exists"),
        "{}",
        err.message
    );
}

#[test]
fn weaving_is_deterministic_across_runs() {
    let src = "sector S:
  fn foo(x: Int) -> Int = x

mixin A v1 into sector S:
  around fn foo(x: Int) -> Int:
    return proceed(x)

mixin B v1 into sector S:
  around fn foo(x: Int) -> Int:
    return proceed(x)

resolve mixin-conflict:
  prefer A v1 over B v1

use mixin A v1
use mixin B v1
run()
";
    let a = resolve_no_stdlib(src).unwrap();
    let b = resolve_no_stdlib(src).unwrap();
    let ja = strip_spans(serde_json::to_value(&a.program).unwrap());
    let jb = strip_spans(serde_json::to_value(&b.program).unwrap());
    assert_eq!(
        serde_json::to_string(&ja).unwrap(),
        serde_json::to_string(&jb).unwrap()
    );
}
