//! Shared helpers for the integration tests.

#![allow(dead_code)]

use flavent::hir;
use flavent::lexer::lex;
use flavent::lower::lower_resolved;
use flavent::parser::parse_program;
use flavent::resolve::resolve_program;
use flavent::{analyze, Analysis, AnalyzeOptions, Diagnostic, ModuleCache, Resolution};

pub fn analyze_src(src: &str) -> Result<Analysis, Diagnostic> {
    analyze(
        "test.flv",
        src,
        &AnalyzeOptions::default(),
        &mut ModuleCache::new(),
    )
}

pub fn resolve_src(src: &str) -> Result<Resolution, Diagnostic> {
    let prog = parse_program(lex("test.flv", src)?)?;
    resolve_program(prog, &AnalyzeOptions::default(), &mut ModuleCache::new())
}

pub fn resolve_no_stdlib(src: &str) -> Result<Resolution, Diagnostic> {
    let prog = parse_program(lex("test.flv", src)?)?;
    let opts = AnalyzeOptions {
        use_stdlib: false,
        module_roots: Vec::new(),
    };
    resolve_program(prog, &opts, &mut ModuleCache::new())
}

pub fn lower_src(src: &str) -> Result<(Resolution, hir::Program), Diagnostic> {
    let res = resolve_src(src)?;
    let hir = lower_resolved(&res)?;
    Ok((res, hir))
}

/// Function declaration for a named symbol, searching top-level and sector
/// functions.
pub fn find_fn<'p>(
    res: &Resolution,
    hir: &'p hir::Program,
    name: &str,
) -> Option<&'p hir::FnDecl> {
    let all = hir
        .fns
        .iter()
        .chain(hir.sectors.iter().flat_map(|s| s.fns.iter()));
    for f in all {
        if res.symbols.get(f.sym).name == name {
            return Some(f);
        }
    }
    None
}

/// Serialized JSON with every span nulled out, for structural comparisons.
/// Spans appear both as `span` fields and as bare tuple elements, so any
/// object shaped like a span is replaced wherever it sits.
pub fn strip_spans(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let span_keys = ["file", "start", "end", "line", "col"];
            if map.len() == span_keys.len() && span_keys.iter().all(|k| map.contains_key(*k)) {
                return serde_json::Value::Null;
            }
            let out: serde_json::Map<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, strip_spans(v)))
                .collect();
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(strip_spans).collect())
        }
        other => other,
    }
}
