mod common;

use common::{lower_src, resolve_no_stdlib, resolve_src};
use flavent::lexer::lex;
use flavent::parser::parse_program;
use flavent::resolve::resolve_program;
use flavent::symbols::SymbolKind;
use flavent::{AnalyzeOptions, ModuleCache};

#[test]
fn minimal_program_resolves_with_main_sector() {
    let src = "type Event.Start = {}\n\nfn solve(input: Str) -> Str = input\n\nsector main:\n  on Event.Start -> do:\n    stop()\n\nrun()\n";
    let res = resolve_src(src).unwrap();
    assert!(!res.symbols.is_empty());
    assert!(res
        .symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Sector && s.name == "main"));
}

#[test]
fn top_level_handler_synthesizes_main() {
    let src = "type Event.X = {}\n\non Event.X -> do:\n  stop()\n\nrun()\n";
    let res = resolve_src(src).unwrap();
    assert!(res
        .symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Sector && s.name == "main"));
}

#[test]
fn name_not_found_is_reported() {
    let err = resolve_src("fn f(x: Int) = y\n").unwrap_err();
    assert!(err.message.contains("NameNotFound"), "{}", err.message);
}

#[test]
fn symbol_ids_are_dense_and_unique() {
    let src = "type Event.X = {}\n\nfn f(x: Int) -> Int = x\n\nsector main:\n  on Event.X -> do:\n    stop()\n\nrun()\n";
    let res = resolve_src(src).unwrap();
    for (i, s) in res.symbols.iter().enumerate() {
        assert_eq!(s.id.raw() as usize, i + 1);
    }
}

#[test]
fn duplicate_import_allows_namespaced_disambiguation() {
    let src = "use std.option\nuse std.result\n\nfn f() -> Int = std.option.unwrapOr(None, 0)\nfn g() -> Int = std.result.unwrapOrErr(Ok(1), 0)\n\nrun()\n";
    let res = resolve_no_stdlib(src).unwrap();
    assert!(!res.symbols.is_empty());
}

#[test]
fn ambiguous_unqualified_use_errors_at_use_site() {
    let src = "use testns.a\nuse testns.b\n\nfn f() -> Int = foo()\n\nrun()\n";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(err.message.contains("NameAmbiguity"), "{}", err.message);
}

#[test]
fn module_own_definition_wins_over_imported_duplicate() {
    // Both testns modules define foo; each module's own use sites resolve.
    let src = "use testns.a\nuse testns.b\n\nrun()\n";
    let res = resolve_no_stdlib(src).unwrap();
    let foos: Vec<_> = res
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Fn && s.name == "foo")
        .collect();
    assert_eq!(foos.len(), 2);
}

#[test]
fn default_discard_allows_repeated_underscore() {
    let src = "fn f() -> Int = do:\n  let _ = 1\n  let _ = 2\n  return 0\n\nrun()\n";
    resolve_no_stdlib(src).unwrap();
}

#[test]
fn discard_binding_cannot_be_referenced() {
    let src = "fn f() -> Int = do:\n  let _ = 1\n  return _\n\nrun()\n";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(err.message.contains("NameNotFound: _"), "{}", err.message);
}

#[test]
fn flvdiscard_config_overrides_default() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("flvdiscard"), "drop\n").unwrap();

    let ok_src = "fn f() -> Int = do:\n  let drop = 1\n  let drop = 2\n  return 0\n\nrun()\n";
    let ok_path = tmp.path().join("main_ok.flv");
    let prog = parse_program(lex(&ok_path.to_string_lossy(), ok_src).unwrap()).unwrap();
    let opts = AnalyzeOptions {
        use_stdlib: false,
        module_roots: vec![tmp.path().to_path_buf()],
    };
    resolve_program(prog, &opts, &mut ModuleCache::new()).unwrap();

    // With `_` no longer in the discard set, repeated `_` collides.
    let bad_src = "fn f() -> Int = do:\n  let _ = 1\n  let _ = 2\n  return 0\n\nrun()\n";
    let bad_path = tmp.path().join("main_bad.flv");
    let prog = parse_program(lex(&bad_path.to_string_lossy(), bad_src).unwrap()).unwrap();
    let err = resolve_program(prog, &opts, &mut ModuleCache::new()).unwrap_err();
    assert!(
        err.message.contains("Duplicate name in same scope: _"),
        "{}",
        err.message
    );
}

#[test]
fn same_file_duplicate_definition_is_rejected() {
    let src = "fn f() -> Int = 1\nfn f() -> Int = 2\n";
    let err = resolve_no_stdlib(src).unwrap_err();
    assert!(
        err.message.contains("Duplicate name in same scope: f"),
        "{}",
        err.message
    );
}

#[test]
fn direct_bridge_python_use_is_rejected() {
    let err = resolve_src("use _bridge_python\n\nrun()\n").unwrap_err();
    assert!(
        err.message
            .contains("Direct use of _bridge_python is not allowed"),
        "{}",
        err.message
    );
}

#[test]
fn module_roots_load_vendor_module() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    std::fs::create_dir_all(root.join("src")).unwrap();
    let dep = root.join("vendor").join("depmod");
    std::fs::create_dir_all(&dep).unwrap();
    std::fs::write(dep.join("__init__.flv"), "fn answer() -> Int = 42\n").unwrap();

    let src = "use depmod\n\ntype Event.X = {}\n\nsector main:\n  on Event.X -> do:\n    let _a = answer()\n    stop()\n\nrun()\n";
    let path = root.join("src").join("main.flv");
    let prog = parse_program(lex(&path.to_string_lossy(), src).unwrap()).unwrap();
    let opts = AnalyzeOptions {
        use_stdlib: true,
        module_roots: vec![root.join("src"), root.join("vendor"), root.clone()],
    };
    let res = resolve_program(prog, &opts, &mut ModuleCache::new()).unwrap();
    assert!(res.symbols.iter().any(|s| s.name == "answer"));
}

#[test]
fn missing_module_errors_at_use_site() {
    let err = resolve_src("use no.such.module\n\nrun()\n").unwrap_err();
    assert!(err.message.contains("no.such.module"), "{}", err.message);
}

#[test]
fn cyclic_modules_report_the_full_path() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("alpha.flv"), "use beta\n\nfn fa() -> Int = 1\n").unwrap();
    std::fs::write(tmp.path().join("beta.flv"), "use alpha\n\nfn fb() -> Int = 2\n").unwrap();

    let src = "use alpha\n\nrun()\n";
    let path = tmp.path().join("main.flv");
    let prog = parse_program(lex(&path.to_string_lossy(), src).unwrap()).unwrap();
    let opts = AnalyzeOptions {
        use_stdlib: false,
        module_roots: vec![tmp.path().to_path_buf()],
    };
    let err = resolve_program(prog, &opts, &mut ModuleCache::new()).unwrap_err();
    assert!(err.message.contains("Cyclic use"), "{}", err.message);
    assert!(err.message.contains("alpha -> beta -> alpha"), "{}", err.message);
}

#[test]
fn pattern_alias_may_not_bind_variables() {
    let src = "pattern P = Some(v)\n\nrun()\n";
    let err = resolve_src(src).unwrap_err();
    assert!(
        err.message.contains("pattern alias cannot bind variables"),
        "{}",
        err.message
    );
}

#[test]
fn handler_symbol_comes_from_resolution() {
    let src = "type Event.X = {}\n\non Event.X -> do:\n  stop()\n\nrun()\n";
    let (res, hir) = lower_src(src).unwrap();
    let sec = &hir.sectors[0];
    let h = &sec.handlers[0];
    let handler_syms: Vec<_> = res
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Handler)
        .collect();
    assert_eq!(handler_syms.len(), 1);
    assert_eq!(h.sym, handler_syms[0].id);
}

#[test]
fn rpc_requires_fn_owned_by_sector() {
    let src = "sector db:\n  fn ping() -> Int = 1\n\nsector web:\n  fn go() -> Int = rpc db.nope()\n\nrun()\n";
    let err = resolve_src(src).unwrap_err();
    assert!(err.message.contains("NameNotFound: nope"), "{}", err.message);
}

#[test]
fn unknown_sector_in_rpc_is_reported() {
    let src = "sector web:\n  fn go() -> Int = rpc ghost.ping()\n\nrun()\n";
    let err = resolve_src(src).unwrap_err();
    assert!(err.message.contains("Unknown sector: ghost"), "{}", err.message);
}
