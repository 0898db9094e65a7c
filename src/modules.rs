//! Module loading and `use` expansion.
//!
//! `use a.b.c` resolves to `a/b/c.flv` or the package file
//! `a/b/c/__init__.flv`, first against the embedded stdlib and then against
//! the configured project roots (callers pass `src`, `vendor`, project root
//! in that order). Loaded modules have their own `use` graph expanded
//! depth-first with cycle detection; the flattened items land ahead of the
//! importing program's own items.
//!
//! The stdlib ships inside the binary. Its files are addressed with virtual
//! `stdlib/...` paths, which is also how the resolver recognizes
//! stdlib-internal code (the `_bridge_python` gate and namespaced member
//! references).

use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::lexer::lex;
use crate::parser::parse_program;
use crate::span::Span;
use include_dir::{include_dir, Dir};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

static STDLIB_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/stdlib");

/// Prefix of the virtual paths given to embedded stdlib sources.
pub const STDLIB_ROOT: &str = "stdlib";

/// Process-wide parse cache: the prelude plus per-qualified-name modules.
/// Idempotent (equal inputs give equal ASTs); hand tests a fresh one.
#[derive(Default)]
pub struct ModuleCache {
    prelude: Option<ast::Program>,
    modules: HashMap<String, ast::Program>,
}

impl ModuleCache {
    pub fn new() -> Self {
        ModuleCache::default()
    }
}

/// Relative stdlib path for a module qualified name, if the module exists
/// in the embedded tree. `std.option` maps to `std/option.flv`, packages to
/// `std/option/__init__.flv`.
fn stdlib_rel_path(qname: &str) -> Option<String> {
    let base = qname.replace('.', "/");
    let file = format!("{}.flv", base);
    if STDLIB_DIR.get_file(&file).is_some() {
        return Some(file);
    }
    let pkg = format!("{}/__init__.flv", base);
    if STDLIB_DIR.get_file(&pkg).is_some() {
        return Some(pkg);
    }
    None
}

/// Virtual source path (`stdlib/std/option.flv`) for an embedded module.
/// Used by the resolver to recognize namespaced stdlib references.
pub fn stdlib_virtual_path(qname: &str) -> Option<String> {
    stdlib_rel_path(qname).map(|rel| format!("{}/{}", STDLIB_ROOT, rel))
}

/// True for source paths that belong to the shipped stdlib.
pub fn is_stdlib_file(file: &str) -> bool {
    let norm = file.replace('\\', "/");
    norm.starts_with("stdlib/") || norm.contains("/stdlib/")
}

fn parse_source(file: &str, text: &str) -> Result<ast::Program, Diagnostic> {
    parse_program(lex(file, text)?)
}

fn find_in_roots(qname: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    let parts: Vec<&str> = qname.split('.').collect();
    for root in roots {
        let mut base = root.clone();
        for p in &parts {
            base.push(p);
        }
        let mod_path = base.with_extension("flv");
        if mod_path.is_file() {
            return Some(mod_path);
        }
        let pkg_path = base.join("__init__.flv");
        if pkg_path.is_file() {
            return Some(pkg_path);
        }
    }
    None
}

/// Load the prelude AST (embedded `stdlib/prelude.flv`), parsing it once
/// per cache.
pub fn load_prelude(cache: &mut ModuleCache, fallback_span: &Span) -> Result<ast::Program, Diagnostic> {
    if let Some(prog) = &cache.prelude {
        return Ok(prog.clone());
    }
    let file = STDLIB_DIR
        .get_file("prelude.flv")
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| Diagnostic::resolve("Missing stdlib/prelude.flv", fallback_span.clone()))?;
    let prog = parse_source(&format!("{}/prelude.flv", STDLIB_ROOT), file)?;
    cache.prelude = Some(prog.clone());
    Ok(prog)
}

fn load_module(
    qname: &str,
    span: &Span,
    module_roots: &[PathBuf],
    cache: &mut ModuleCache,
) -> Result<ast::Program, Diagnostic> {
    if let Some(prog) = cache.modules.get(qname) {
        return Ok(prog.clone());
    }

    if let Some(rel) = stdlib_rel_path(qname) {
        let text = STDLIB_DIR
            .get_file(&rel)
            .and_then(|f| f.contents_utf8())
            .ok_or_else(|| {
                Diagnostic::resolve(format!("Missing stdlib module: {}", qname), span.clone())
            })?;
        let prog = parse_source(&format!("{}/{}", STDLIB_ROOT, rel), text)?;
        cache.modules.insert(qname.to_string(), prog.clone());
        return Ok(prog);
    }

    if let Some(path) = find_in_roots(qname, module_roots) {
        let text = std::fs::read_to_string(&path).map_err(|_| {
            Diagnostic::resolve(format!("Missing module: {}", qname), span.clone())
        })?;
        let prog = parse_source(&path.to_string_lossy(), &text)?;
        cache.modules.insert(qname.to_string(), prog.clone());
        return Ok(prog);
    }

    Err(Diagnostic::resolve(
        format!("Missing module: {}", qname),
        span.clone(),
    ))
}

/// Expand every `use` into the program, depth-first. When the prelude was
/// already spliced ahead of the program, `prelude` is pre-marked visited so
/// stdlib modules importing it do not duplicate its definitions.
pub fn expand_uses(
    prog: ast::Program,
    module_roots: &[PathBuf],
    cache: &mut ModuleCache,
    prelude_spliced: bool,
) -> Result<ast::Program, Diagnostic> {
    struct Expander<'a> {
        visited: HashSet<String>,
        stack: Vec<String>,
        out_items: Vec<ast::Item>,
        module_roots: &'a [PathBuf],
        cache: &'a mut ModuleCache,
    }

    impl<'a> Expander<'a> {
        fn visit(&mut self, qname: &str, span: &Span) -> Result<(), Diagnostic> {
            if self.visited.contains(qname) {
                return Ok(());
            }
            if self.stack.iter().any(|s| s == qname) {
                let mut path = self.stack.clone();
                path.push(qname.to_string());
                return Err(Diagnostic::resolve(
                    format!("Cyclic use: {}", path.join(" -> ")),
                    span.clone(),
                ));
            }
            self.stack.push(qname.to_string());
            let mprog = load_module(qname, span, self.module_roots, self.cache)?;
            for it in &mprog.items {
                if let ast::Item::Use(u) = it {
                    self.visit(&u.name.dotted(), &u.span)?;
                }
            }
            for it in mprog.items {
                if matches!(it, ast::Item::Use(_)) {
                    continue;
                }
                self.out_items.push(it);
            }
            self.stack.pop();
            self.visited.insert(qname.to_string());
            Ok(())
        }
    }

    let mut exp = Expander {
        visited: HashSet::new(),
        stack: Vec::new(),
        out_items: Vec::new(),
        module_roots,
        cache,
    };
    if prelude_spliced {
        exp.visited.insert("prelude".to_string());
    }

    for it in &prog.items {
        if let ast::Item::Use(u) = it {
            let qname = u.name.dotted();
            // `_bridge_python` is an internal capability boundary; user
            // programs must not import it directly.
            if qname == "_bridge_python" && !is_stdlib_file(&u.span.file) {
                return Err(Diagnostic::resolve(
                    "Direct use of _bridge_python is not allowed",
                    u.span.clone(),
                ));
            }
            exp.visit(&qname, &u.span)?;
        }
    }

    let out_items = exp.out_items;
    let kept: Vec<ast::Item> = prog
        .items
        .into_iter()
        .filter(|it| !matches!(it, ast::Item::Use(_)))
        .collect();
    if out_items.is_empty() {
        return Ok(ast::Program {
            items: kept,
            run: prog.run,
            span: prog.span,
        });
    }
    let mut items = out_items;
    items.extend(kept);
    Ok(ast::Program {
        items,
        run: prog.run,
        span: prog.span,
    })
}

/// Nearest `flvdiscard` configuration for a source file, walking ancestor
/// directories. Default discard set is `{_}`.
pub fn load_discard_names(file: &str) -> HashSet<String> {
    let mut defaults = HashSet::new();
    defaults.insert("_".to_string());

    let path = Path::new(file);
    let mut cur: Option<&Path> = if path.is_dir() { Some(path) } else { path.parent() };
    let mut config: Option<PathBuf> = None;
    while let Some(dir) = cur {
        let cand = dir.join("flvdiscard");
        if cand.is_file() {
            config = Some(cand);
            break;
        }
        cur = dir.parent();
    }
    let Some(config) = config else {
        return defaults;
    };
    let Ok(raw) = std::fs::read_to_string(&config) else {
        return defaults;
    };

    let mut names = HashSet::new();
    for line in raw.lines() {
        let clean = line.split('#').next().unwrap_or("").trim();
        if clean.is_empty() {
            continue;
        }
        for tok in clean.replace(',', " ").split_whitespace() {
            if is_identifier(tok) {
                names.insert(tok.to_string());
            }
        }
    }
    if names.is_empty() {
        defaults
    } else {
        names
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_paths_resolve_modules_and_packages() {
        assert_eq!(
            stdlib_virtual_path("std.option").as_deref(),
            Some("stdlib/std/option.flv")
        );
        assert!(stdlib_virtual_path("no.such.module").is_none());
    }

    #[test]
    fn stdlib_file_detection() {
        assert!(is_stdlib_file("stdlib/std/option.flv"));
        assert!(is_stdlib_file("/opt/x/stdlib/prelude.flv"));
        assert!(!is_stdlib_file("src/main.flv"));
    }
}
