//! Flavent front-end.
//!
//! Static front-end for the `.flv` event language: programs declare
//! algebraic data types, pure functions and *sectors* (single-threaded
//! cooperative tasks that communicate by emitting and awaiting typed events
//! and by rpc/call across sector boundaries). The front-end turns source
//! text into a fully resolved, type-and-effect-checked HIR for later
//! execution or code generation.
//!
//! Pipeline: lex → parse → prelude splice → `use` expansion → mixin weave →
//! resolve → lower → type/effect check. Each stage fails fast with a single
//! [`Diagnostic`]. The whole pipeline is a pure function over its inputs;
//! the only shared state is the [`ModuleCache`] of parsed stdlib modules,
//! which callers may share per process or create fresh per test.
//!
//! ```no_run
//! use flavent::{analyze, AnalyzeOptions, ModuleCache};
//!
//! let src = "type Event.Start = {}\n\non Event.Start -> do:\n    stop()\n\nrun()\n";
//! let mut cache = ModuleCache::new();
//! let analysis = analyze("main.flv", src, &AnalyzeOptions::default(), &mut cache)?;
//! assert!(analysis.hir.run);
//! # Ok::<(), flavent::Diagnostic>(())
//! ```

pub mod ast;
pub mod diagnostics;
pub mod hir;
pub mod lexer;
pub mod lower;
pub mod mixin;
pub mod modules;
pub mod parser;
pub mod resolve;
pub mod span;
pub mod style;
pub mod symbols;
pub mod token;
pub mod typecheck;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use modules::ModuleCache;
pub use resolve::{AnalyzeOptions, Resolution};
pub use span::Span;

use serde::Serialize;

/// Resolution plus the checked HIR; what tooling consumes.
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub resolution: Resolution,
    pub hir: hir::Program,
}

/// Run the full front-end over one source file.
pub fn analyze(
    source_path: &str,
    source_text: &str,
    opts: &AnalyzeOptions,
    cache: &mut ModuleCache,
) -> Result<Analysis, Diagnostic> {
    let tokens = lexer::lex(source_path, source_text)?;
    let program = parser::parse_program(tokens)?;
    let resolution = resolve::resolve_program(program, opts, cache)?;
    let hir = lower::lower_resolved(&resolution)?;
    typecheck::check_program(&hir, &resolution)?;
    Ok(Analysis { resolution, hir })
}
