//! Mixin weaving.
//!
//! Runs on the flattened AST before name resolution. `use mixin` statements
//! select declared mixins; `resolve mixin-conflict` rules build a preference
//! relation; the used set is topologically ordered and woven in reverse so
//! the preferred mixin ends up outermost. Weaving rewrites sector functions
//! (and synthesized type methods) by renaming the current body to a fresh
//! `__mixin_..._orig` function and substituting `proceed(...)` in the
//! wrapper with a call to it.
//!
//! Every surviving or dropped hook leaves a row in the hook plan so tooling
//! can surface what was applied where and why something fell out.

use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::span::Span;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Sector,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookOrigin {
    Around,
    Hook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Error,
    Prefer,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    Active,
    Dropped,
}

/// One row of the mixin hook plan.
#[derive(Debug, Clone, Serialize)]
pub struct HookPlanRow {
    pub owner_kind: OwnerKind,
    pub owner: String,
    pub target: String,
    pub hook_id: String,
    pub point: &'static str,
    pub origin: HookOrigin,
    pub conflict_policy: ConflictPolicy,
    pub mixin_key: String,
    pub priority: i64,
    pub depends: Vec<String>,
    pub at: Option<String>,
    pub depth: Option<usize>,
    pub status: HookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
}

pub fn mixin_key(name: &ast::QualifiedName, version: u32) -> String {
    format!("{}@v{}", name.dotted(), version)
}

fn safe_name(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn synth_method_name(tname: &str, mname: &str) -> String {
    format!("__method__{}__{}", tname.replace('.', "_"), mname)
}

// ---------------- type-ref comparison ----------------

fn type_ref_strip_paren(t: &ast::TypeRef) -> &ast::TypeRef {
    let mut cur = t;
    while let ast::TypeRef::Paren(inner, _) = cur {
        cur = inner;
    }
    cur
}

fn type_ref_eq(a: Option<&ast::TypeRef>, b: Option<&ast::TypeRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            let a = type_ref_strip_paren(a);
            let b = type_ref_strip_paren(b);
            match (a, b) {
                (ast::TypeRef::Name(an), ast::TypeRef::Name(bn)) => {
                    if an.name.dotted() != bn.name.dotted() {
                        return false;
                    }
                    match (&an.args, &bn.args) {
                        (None, None) => true,
                        (Some(xs), Some(ys)) => {
                            xs.len() == ys.len()
                                && xs
                                    .iter()
                                    .zip(ys.iter())
                                    .all(|(x, y)| type_ref_eq(Some(x), Some(y)))
                        }
                        _ => false,
                    }
                }
                _ => false,
            }
        }
        _ => false,
    }
}

/// Inner type of `Option[T]` (or a qualified `*.Option[T]`).
fn option_inner_type(t: Option<&ast::TypeRef>) -> Option<&ast::TypeRef> {
    let core = type_ref_strip_paren(t?);
    let ast::TypeRef::Name(name) = core else {
        return None;
    };
    let qn = name.name.dotted();
    if qn != "Option" && !qn.ends_with(".Option") {
        return None;
    }
    match &name.args {
        Some(args) if args.len() == 1 => Some(&args[0]),
        _ => None,
    }
}

// ---------------- proceed rewriting ----------------

fn mk_var(name: &str, span: &Span) -> ast::Expr {
    ast::Expr::Var(ast::Ident::new(name, span.clone()))
}

fn mk_call(name: &str, args: Vec<ast::Expr>, span: &Span) -> ast::Expr {
    ast::Expr::Call(ast::CallExpr {
        callee: Box::new(mk_var(name, span)),
        args: args
            .into_iter()
            .map(|a| ast::CallArg::Pos {
                value: a,
                span: span.clone(),
            })
            .collect(),
        span: span.clone(),
    })
}

fn rewrite_proceed_expr(e: ast::Expr, callee: &ast::Ident) -> ast::Expr {
    match e {
        ast::Expr::Proceed(p) => {
            let span = p.span;
            let args = p
                .args
                .into_iter()
                .map(|a| ast::CallArg::Pos {
                    value: rewrite_proceed_expr(a, callee),
                    span: span.clone(),
                })
                .collect();
            ast::Expr::Call(ast::CallExpr {
                callee: Box::new(ast::Expr::Var(callee.renumbered())),
                args,
                span,
            })
        }
        ast::Expr::Call(c) => {
            let args = c
                .args
                .into_iter()
                .map(|a| match a {
                    ast::CallArg::Pos { value, span } => ast::CallArg::Pos {
                        value: rewrite_proceed_expr(value, callee),
                        span,
                    },
                    ast::CallArg::Star { value, span } => ast::CallArg::Star {
                        value: rewrite_proceed_expr(value, callee),
                        span,
                    },
                    ast::CallArg::Kw { name, value, span } => ast::CallArg::Kw {
                        name,
                        value: rewrite_proceed_expr(value, callee),
                        span,
                    },
                    ast::CallArg::StarStar { value, span } => ast::CallArg::StarStar {
                        value: rewrite_proceed_expr(value, callee),
                        span,
                    },
                })
                .collect();
            ast::Expr::Call(ast::CallExpr {
                callee: Box::new(rewrite_proceed_expr(*c.callee, callee)),
                args,
                span: c.span,
            })
        }
        ast::Expr::Member(m) => ast::Expr::Member(ast::MemberExpr {
            object: Box::new(rewrite_proceed_expr(*m.object, callee)),
            field: m.field,
            span: m.span,
        }),
        ast::Expr::Index(ix) => ast::Expr::Index(ast::IndexExpr {
            object: Box::new(rewrite_proceed_expr(*ix.object, callee)),
            index: Box::new(rewrite_proceed_expr(*ix.index, callee)),
            span: ix.span,
        }),
        ast::Expr::Unary(u) => ast::Expr::Unary(ast::UnaryExpr {
            op: u.op,
            expr: Box::new(rewrite_proceed_expr(*u.expr, callee)),
            span: u.span,
        }),
        ast::Expr::Binary(b) => ast::Expr::Binary(ast::BinaryExpr {
            op: b.op,
            left: Box::new(rewrite_proceed_expr(*b.left, callee)),
            right: Box::new(rewrite_proceed_expr(*b.right, callee)),
            span: b.span,
        }),
        ast::Expr::Pipe(p) => ast::Expr::Pipe(ast::PipeExpr {
            head: Box::new(rewrite_proceed_expr(*p.head, callee)),
            stages: p
                .stages
                .into_iter()
                .map(|s| rewrite_proceed_expr(s, callee))
                .collect(),
            span: p.span,
        }),
        ast::Expr::Tuple(t) => ast::Expr::Tuple(ast::TupleLit {
            items: t
                .items
                .into_iter()
                .map(|x| rewrite_proceed_expr(x, callee))
                .collect(),
            span: t.span,
        }),
        ast::Expr::Record(r) => ast::Expr::Record(ast::RecordLit {
            items: r
                .items
                .into_iter()
                .map(|i| ast::RecordItem {
                    key: i.key,
                    value: rewrite_proceed_expr(i.value, callee),
                    span: i.span,
                })
                .collect(),
            span: r.span,
        }),
        ast::Expr::Match(m) => ast::Expr::Match(ast::MatchExpr {
            scrutinee: Box::new(rewrite_proceed_expr(*m.scrutinee, callee)),
            arms: m
                .arms
                .into_iter()
                .map(|a| ast::MatchArm {
                    pat: a.pat,
                    body: match a.body {
                        ast::MatchArmBody::Expr(e) => {
                            ast::MatchArmBody::Expr(rewrite_proceed_expr(e, callee))
                        }
                        other => other,
                    },
                    span: a.span,
                })
                .collect(),
            span: m.span,
        }),
        ast::Expr::TrySuffix(t) => ast::Expr::TrySuffix(ast::TrySuffixExpr {
            inner: Box::new(rewrite_proceed_expr(*t.inner, callee)),
            span: t.span,
        }),
        ast::Expr::Rpc(r) => ast::Expr::Rpc(ast::SectorCallExpr {
            sector: r.sector,
            fn_name: r.fn_name,
            args: r
                .args
                .into_iter()
                .map(|a| rewrite_proceed_expr(a, callee))
                .collect(),
            span: r.span,
        }),
        ast::Expr::CallSector(r) => ast::Expr::CallSector(ast::SectorCallExpr {
            sector: r.sector,
            fn_name: r.fn_name,
            args: r
                .args
                .into_iter()
                .map(|a| rewrite_proceed_expr(a, callee))
                .collect(),
            span: r.span,
        }),
        other => other,
    }
}

fn rewrite_proceed_stmt(st: ast::Stmt, callee: &ast::Ident) -> ast::Stmt {
    match st {
        ast::Stmt::Let(l) => ast::Stmt::Let(ast::LetStmt {
            name: l.name,
            value: rewrite_proceed_expr(l.value, callee),
            span: l.span,
        }),
        ast::Stmt::Assign(a) => ast::Stmt::Assign(ast::AssignStmt {
            target: a.target,
            op: a.op,
            value: rewrite_proceed_expr(a.value, callee),
            span: a.span,
        }),
        ast::Stmt::Return(e, span) => ast::Stmt::Return(rewrite_proceed_expr(e, callee), span),
        ast::Stmt::Emit(e, span) => ast::Stmt::Emit(rewrite_proceed_expr(e, callee), span),
        ast::Stmt::Expr(e, span) => ast::Stmt::Expr(rewrite_proceed_expr(e, callee), span),
        ast::Stmt::If(i) => ast::Stmt::If(ast::IfStmt {
            cond: rewrite_proceed_expr(i.cond, callee),
            then_block: rewrite_proceed_block(i.then_block, callee),
            else_block: i.else_block.map(|b| rewrite_proceed_block(b, callee)),
            span: i.span,
        }),
        ast::Stmt::For(f) => ast::Stmt::For(ast::ForStmt {
            binder: f.binder,
            iterable: rewrite_proceed_expr(f.iterable, callee),
            body: rewrite_proceed_block(f.body, callee),
            span: f.span,
        }),
        other => other,
    }
}

fn rewrite_proceed_block(b: ast::Block, callee: &ast::Ident) -> ast::Block {
    ast::Block {
        stmts: b
            .stmts
            .into_iter()
            .map(|s| rewrite_proceed_stmt(s, callee))
            .collect(),
        span: b.span,
    }
}

fn rewrite_proceed_body(body: ast::FnBody, callee: &ast::Ident) -> ast::FnBody {
    match body {
        ast::FnBody::Expr(e) => ast::FnBody::Expr(rewrite_proceed_expr(e, callee)),
        ast::FnBody::Do(b, span) => ast::FnBody::Do(rewrite_proceed_block(b, callee), span),
    }
}

fn contains_proceed_expr(e: &ast::Expr) -> bool {
    match e {
        ast::Expr::Proceed(_) => true,
        ast::Expr::Call(c) => {
            contains_proceed_expr(&c.callee)
                || c.args.iter().any(|a| contains_proceed_expr(a.value()))
        }
        ast::Expr::Member(m) => contains_proceed_expr(&m.object),
        ast::Expr::Index(ix) => {
            contains_proceed_expr(&ix.object) || contains_proceed_expr(&ix.index)
        }
        ast::Expr::Unary(u) => contains_proceed_expr(&u.expr),
        ast::Expr::Binary(b) => contains_proceed_expr(&b.left) || contains_proceed_expr(&b.right),
        ast::Expr::Pipe(p) => {
            contains_proceed_expr(&p.head) || p.stages.iter().any(contains_proceed_expr)
        }
        ast::Expr::Tuple(t) => t.items.iter().any(contains_proceed_expr),
        ast::Expr::Record(r) => r.items.iter().any(|i| contains_proceed_expr(&i.value)),
        ast::Expr::Match(m) => {
            contains_proceed_expr(&m.scrutinee)
                || m.arms.iter().any(|a| match &a.body {
                    ast::MatchArmBody::Expr(e) => contains_proceed_expr(e),
                    ast::MatchArmBody::Do(_, _) => false,
                })
        }
        ast::Expr::TrySuffix(t) => contains_proceed_expr(&t.inner),
        ast::Expr::Rpc(r) | ast::Expr::CallSector(r) => {
            r.args.iter().any(contains_proceed_expr)
        }
        _ => false,
    }
}

fn contains_proceed_stmt(st: &ast::Stmt) -> bool {
    match st {
        ast::Stmt::Let(l) => contains_proceed_expr(&l.value),
        ast::Stmt::Assign(a) => contains_proceed_expr(&a.value),
        ast::Stmt::Return(e, _) | ast::Stmt::Emit(e, _) | ast::Stmt::Expr(e, _) => {
            contains_proceed_expr(e)
        }
        ast::Stmt::If(i) => {
            contains_proceed_expr(&i.cond)
                || contains_proceed_block(&i.then_block)
                || i.else_block
                    .as_ref()
                    .map(contains_proceed_block)
                    .unwrap_or(false)
        }
        ast::Stmt::For(f) => {
            contains_proceed_expr(&f.iterable) || contains_proceed_block(&f.body)
        }
        _ => false,
    }
}

fn contains_proceed_block(b: &ast::Block) -> bool {
    b.stmts.iter().any(contains_proceed_stmt)
}

fn ensure_no_proceed(body: &ast::FnBody, span: &Span) -> Result<(), Diagnostic> {
    let found = match body {
        ast::FnBody::Expr(e) => contains_proceed_expr(e),
        ast::FnBody::Do(b, _) => contains_proceed_block(b),
    };
    if found {
        return Err(Diagnostic::resolve(
            "proceed() appears in an unsupported position in mixin weaving",
            span.clone(),
        ));
    }
    Ok(())
}

fn body_to_block(body: ast::FnBody) -> ast::Block {
    match body {
        ast::FnBody::Do(block, _) => block,
        ast::FnBody::Expr(e) => {
            let span = e.span().clone();
            ast::Block {
                stmts: vec![ast::Stmt::Return(e, span.clone())],
                span,
            }
        }
    }
}

fn clone_params(ps: &[ast::ParamDecl]) -> Vec<ast::ParamDecl> {
    ps.iter()
        .map(|p| ast::ParamDecl {
            name: p.name.renumbered(),
            ty: p.ty.clone(),
            kind: p.kind,
            span: p.span.clone(),
        })
        .collect()
}

// ---------------- hook option parsing ----------------

fn parse_int_opt(s: Option<&String>, default: i64, span: &Span, key: &str) -> Result<i64, Diagnostic> {
    match s {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse::<i64>().map_err(|_| {
            Diagnostic::resolve(
                format!("Invalid hook option `{}` int value: '{}'", key, v),
                span.clone(),
            )
        }),
    }
}

fn parse_bool_opt(
    s: Option<&String>,
    default: bool,
    span: &Span,
    key: &str,
) -> Result<bool, Diagnostic> {
    match s.map(|v| v.as_str()) {
        None | Some("") => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(v) => Err(Diagnostic::resolve(
            format!("Invalid hook option `{}` bool value: '{}'", key, v),
            span.clone(),
        )),
    }
}

fn split_csv(s: Option<&String>) -> Vec<String> {
    s.map(|v| {
        v.split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

// ---------------- around/hook specs ----------------

#[derive(Debug, Clone)]
struct AroundSpec {
    uid: usize,
    mixin_key: String,
    around: ast::MixinAround,
    point: ast::HookPoint,
    origin: HookOrigin,
    conflict_policy: ConflictPolicy,
    strict_mode: bool,
    hook_id: String,
    priority: i64,
    depends: Vec<String>,
    at: Option<String>,
    span: Span,
}

fn validate_locator(
    locator: Option<&String>,
    target: &ast::FnDecl,
    owner_name: &str,
    hook_id: &str,
    span: &Span,
    anchor_aliases: Option<&HashSet<String>>,
) -> Result<(), Diagnostic> {
    let Some(text) = locator else { return Ok(()) };
    if text.is_empty() {
        return Ok(());
    }

    let mut line_part: Option<usize> = None;
    let mut anchor_part: Option<String> = None;
    if let Some(rest) = text.strip_prefix("line:") {
        let mut rest = rest;
        if let Some((a, b)) = rest.split_once('#') {
            rest = a;
            anchor_part = Some(b.to_string());
        }
        line_part = Some(rest.parse::<usize>().map_err(|_| {
            Diagnostic::resolve(
                format!("Invalid hook locator line in `at`: '{}'", text),
                span.clone(),
            )
        })?);
    } else if let Some(a) = text.strip_prefix("anchor:") {
        anchor_part = Some(a.to_string());
    } else if let Some(a) = text.strip_prefix("name:") {
        anchor_part = Some(a.to_string());
    } else {
        anchor_part = Some(text.clone());
    }

    if let Some(expected_line) = line_part {
        if target.span.line != expected_line {
            return Err(Diagnostic::resolve(
                format!(
                    "Hook locator mismatch for {}: expected line {}, got {} on {}.{}",
                    hook_id, expected_line, target.span.line, owner_name, target.name.name
                ),
                span.clone(),
            ));
        }
    }
    if let Some(anchor) = anchor_part {
        if !anchor.is_empty() {
            let mut ok = anchor == target.name.name;
            if let Some(aliases) = anchor_aliases {
                ok = ok || aliases.contains(&anchor);
            }
            if !ok {
                return Err(Diagnostic::resolve(
                    format!(
                        "Hook locator mismatch for {}: expected anchor '{}', got '{}'",
                        hook_id, anchor, target.name.name
                    ),
                    span.clone(),
                ));
            }
        }
    }
    Ok(())
}

/// Per-point conflict resolution and dependency ordering.
///
/// Returns the surviving specs in execution order plus the dropped specs
/// with their reasons.
fn resolve_specs(
    specs: Vec<AroundSpec>,
) -> Result<(Vec<AroundSpec>, Vec<(AroundSpec, String)>), Diagnostic> {
    if specs.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let order_idx: HashMap<usize, usize> =
        specs.iter().enumerate().map(|(i, sp)| (sp.uid, i)).collect();

    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<AroundSpec>> = HashMap::new();
    for sp in specs {
        if !groups.contains_key(&sp.hook_id) {
            group_order.push(sp.hook_id.clone());
        }
        groups.entry(sp.hook_id.clone()).or_default().push(sp);
    }

    let mut selected: Vec<AroundSpec> = Vec::new();
    let mut dropped: Vec<(AroundSpec, String)> = Vec::new();
    for hook_id in &group_order {
        let group = groups.remove(hook_id).unwrap_or_default();
        if group.len() == 1 {
            selected.extend(group);
            continue;
        }
        if group.iter().any(|sp| sp.conflict_policy == ConflictPolicy::Error) {
            return Err(Diagnostic::resolve(
                format!("Duplicate hook id in same target: {}", hook_id),
                group[0].span.clone(),
            ));
        }
        let mut prefer: Vec<AroundSpec> = group
            .iter()
            .filter(|sp| sp.conflict_policy == ConflictPolicy::Prefer)
            .cloned()
            .collect();
        if !prefer.is_empty() {
            prefer.sort_by_key(|sp| (-sp.priority, order_idx[&sp.uid]));
            selected.push(prefer.remove(0));
            continue;
        }
        // All `drop`: every candidate for this id is removed.
        for sp in group {
            dropped.push((sp, "duplicate_drop".to_string()));
        }
    }

    if selected.is_empty() {
        return Ok((Vec::new(), dropped));
    }

    // Drop (or reject, in strict mode) hooks whose dependencies are gone,
    // iterating to a fixed point since each removal can orphan more.
    loop {
        let by_id: HashSet<String> = selected.iter().map(|sp| sp.hook_id.clone()).collect();
        let mut kept: Vec<AroundSpec> = Vec::new();
        let mut removed = false;
        for sp in selected {
            let missing: Vec<&String> =
                sp.depends.iter().filter(|d| !by_id.contains(*d)).collect();
            if missing.is_empty() {
                kept.push(sp);
                continue;
            }
            if sp.strict_mode {
                return Err(Diagnostic::resolve(
                    format!(
                        "Unknown hook dependency: {} (needed by {})",
                        missing[0], sp.hook_id
                    ),
                    sp.span.clone(),
                ));
            }
            let reason = format!("unknown_dependency:{}", missing[0]);
            dropped.push((sp, reason));
            removed = true;
        }
        selected = kept;
        if !removed {
            break;
        }
        if selected.is_empty() {
            return Ok((Vec::new(), dropped));
        }
    }

    // Kahn ordering over the dependency edges; ties break on priority then
    // declaration order then id.
    let sel_order: HashMap<String, usize> = selected
        .iter()
        .enumerate()
        .map(|(i, sp)| (sp.hook_id.clone(), i))
        .collect();
    let by_id: HashMap<String, AroundSpec> = selected
        .iter()
        .map(|sp| (sp.hook_id.clone(), sp.clone()))
        .collect();

    let mut edges: HashMap<String, HashSet<String>> = selected
        .iter()
        .map(|sp| (sp.hook_id.clone(), HashSet::new()))
        .collect();
    let mut indeg: HashMap<String, usize> = selected
        .iter()
        .map(|sp| (sp.hook_id.clone(), 0))
        .collect();
    for sp in &selected {
        for dep in &sp.depends {
            let outs = edges.get_mut(dep).expect("dep survived fixed point");
            if outs.insert(sp.hook_id.clone()) {
                *indeg.get_mut(&sp.hook_id).unwrap() += 1;
            }
        }
    }

    let mut ready: Vec<String> = selected
        .iter()
        .filter(|sp| indeg[&sp.hook_id] == 0)
        .map(|sp| sp.hook_id.clone())
        .collect();
    let mut out: Vec<AroundSpec> = Vec::new();
    while !ready.is_empty() {
        ready.sort_by(|a, b| {
            let ka = (-by_id[a].priority, sel_order[a], a.clone());
            let kb = (-by_id[b].priority, sel_order[b], b.clone());
            ka.cmp(&kb)
        });
        let hid = ready.remove(0);
        out.push(by_id[&hid].clone());
        let mut nexts: Vec<String> = edges[&hid].iter().cloned().collect();
        nexts.sort();
        for nxt in nexts {
            let d = indeg.get_mut(&nxt).unwrap();
            *d -= 1;
            if *d == 0 {
                ready.push(nxt);
            }
        }
    }

    if out.len() != selected.len() {
        return Err(Diagnostic::resolve(
            "Cyclic hook dependencies in mixin call stack resolver",
            selected[0].span.clone(),
        ));
    }
    Ok((out, dropped))
}

// ---------------- function hosts ----------------

/// Collection of function declarations the weaver can query and rewrite.
/// Sector weaving works on sector items, type weaving on a plain list of
/// synthesized methods.
trait FnHost {
    fn find(&self, name: &str) -> Option<&ast::FnDecl>;
    fn replace(&mut self, name: &str, fd: ast::FnDecl);
    fn push_fn(&mut self, fd: ast::FnDecl);
}

impl FnHost for Vec<ast::SectorItem> {
    fn find(&self, name: &str) -> Option<&ast::FnDecl> {
        self.iter().find_map(|it| match it {
            ast::SectorItem::Fn(fd) if fd.name.name == name => Some(fd),
            _ => None,
        })
    }

    fn replace(&mut self, name: &str, fd: ast::FnDecl) {
        for it in self.iter_mut() {
            if let ast::SectorItem::Fn(cur) = it {
                if cur.name.name == name {
                    *it = ast::SectorItem::Fn(fd);
                    return;
                }
            }
        }
    }

    fn push_fn(&mut self, fd: ast::FnDecl) {
        self.push(ast::SectorItem::Fn(fd));
    }
}

impl FnHost for Vec<ast::FnDecl> {
    fn find(&self, name: &str) -> Option<&ast::FnDecl> {
        self.iter().find(|fd| fd.name.name == name)
    }

    fn replace(&mut self, name: &str, fd: ast::FnDecl) {
        for cur in self.iter_mut() {
            if cur.name.name == name {
                *cur = fd;
                return;
            }
        }
    }

    fn push_fn(&mut self, fd: ast::FnDecl) {
        self.push(fd);
    }
}

/// Ordered multimap from target function name to its specs.
#[derive(Default)]
struct SpecsByFn {
    order: Vec<String>,
    map: HashMap<String, Vec<AroundSpec>>,
}

impl SpecsByFn {
    fn push(&mut self, fname: &str, spec: AroundSpec) {
        if !self.map.contains_key(fname) {
            self.order.push(fname.to_string());
        }
        self.map.entry(fname.to_string()).or_default().push(spec);
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------- the weaver ----------------

struct Weaver {
    mixins: HashMap<String, ast::MixinDecl>,
    prefer_over: HashMap<String, HashSet<String>>,
    hook_plan: Vec<HookPlanRow>,
    next_uid: usize,
    /// `(type-key, method) -> synthesized function name` for call rewriting.
    method_fns: HashMap<(String, String), String>,
}

pub fn apply_mixins(
    prog: ast::Program,
) -> Result<(ast::Program, Vec<HookPlanRow>), Diagnostic> {
    let mut mixins: HashMap<String, ast::MixinDecl> = HashMap::new();
    let mut uses: Vec<ast::UseMixinStmt> = Vec::new();
    let mut resolves: Vec<ast::ResolveMixinStmt> = Vec::new();
    let mut sector_names: Vec<String> = Vec::new();
    let mut type_names: Vec<String> = Vec::new();

    for it in &prog.items {
        match it {
            ast::Item::Mixin(md) => {
                mixins.insert(mixin_key(&md.name, md.version), md.clone());
            }
            ast::Item::UseMixin(u) => uses.push(u.clone()),
            ast::Item::ResolveMixin(r) => resolves.push(r.clone()),
            ast::Item::Sector(sd) => sector_names.push(sd.name.name.clone()),
            ast::Item::Type(td) => type_names.push(td.name.dotted()),
            _ => {}
        }
    }

    if uses.is_empty() {
        return Ok((prog, Vec::new()));
    }

    let mut prefer_over: HashMap<String, HashSet<String>> = HashMap::new();
    for rm in &resolves {
        for r in &rm.rules {
            let a = mixin_key(&r.prefer.name, r.prefer.version);
            let b = mixin_key(&r.over.name, r.over.version);
            if a == b {
                return Err(Diagnostic::resolve(
                    format!(
                        "Invalid mixin-conflict rule: prefer and over are the same mixin ({})",
                        a
                    ),
                    r.span.clone(),
                ));
            }
            prefer_over.entry(a).or_default().insert(b);
        }
    }

    let mut weaver = Weaver {
        mixins,
        prefer_over,
        hook_plan: Vec::new(),
        next_uid: 0,
        method_fns: HashMap::new(),
    };

    let mut used_keys: Vec<String> = Vec::new();
    for u in &uses {
        let key = mixin_key(&u.name, u.version);
        if !weaver.mixins.contains_key(&key) {
            return Err(Diagnostic::resolve(
                format!("Unknown mixin: {}", key),
                u.span.clone(),
            ));
        }
        used_keys.push(key);
    }

    // apply_order lists preferred mixins first; weaving walks it in reverse
    // so the preferred mixin wraps outermost.
    let apply_order = weaver.topo_sort(&used_keys, &uses[0].span)?;
    let weave_order: Vec<String> = apply_order.into_iter().rev().collect();

    let mut sector_to_mixins: HashMap<String, Vec<String>> = sector_names
        .iter()
        .map(|n| (n.clone(), Vec::new()))
        .collect();
    let mut type_to_mixins: HashMap<String, Vec<String>> = type_names
        .iter()
        .map(|n| (n.clone(), Vec::new()))
        .collect();

    for key in &weave_order {
        let md = &weaver.mixins[key];
        match &md.target {
            ast::MixinTarget::Sector(name) => {
                let Some(list) = sector_to_mixins.get_mut(&name.name) else {
                    return Err(Diagnostic::resolve(
                        format!("Mixin {} targets unknown sector: {}", key, name.name),
                        name.span.clone(),
                    ));
                };
                list.push(key.clone());
            }
            ast::MixinTarget::Type(qn) => {
                let tname = qn.dotted();
                let Some(list) = type_to_mixins.get_mut(&tname) else {
                    return Err(Diagnostic::resolve(
                        format!("Mixin {} targets unknown type: {}", key, tname),
                        qn.span.clone(),
                    ));
                };
                list.push(key.clone());
            }
        }
    }

    let mut new_sectors: HashMap<String, ast::SectorDecl> = HashMap::new();
    let mut new_types: HashMap<String, ast::TypeDecl> = HashMap::new();
    let mut new_top_fns: Vec<ast::FnDecl> = Vec::new();
    let mut new_patterns: Vec<ast::PatternDecl> = Vec::new();

    for it in &prog.items {
        match it {
            ast::Item::Sector(sd) => {
                let keys = sector_to_mixins
                    .get(&sd.name.name)
                    .cloned()
                    .unwrap_or_default();
                if keys.is_empty() {
                    continue;
                }
                let woven = weaver.apply_to_sector(sd.clone(), &keys)?;
                new_sectors.insert(sd.name.name.clone(), woven);
            }
            ast::Item::Type(td) => {
                let tname = td.name.dotted();
                let keys = type_to_mixins.get(&tname).cloned().unwrap_or_default();
                if keys.is_empty() {
                    continue;
                }
                let woven = weaver.apply_to_type(
                    td.clone(),
                    &keys,
                    &mut new_top_fns,
                    &mut new_patterns,
                )?;
                new_types.insert(tname, woven);
            }
            _ => {}
        }
    }

    // Rebuild: mixin declarations disappear, woven sectors/types replace the
    // originals, synthesized methods and patterns land at the end.
    let mut new_items: Vec<ast::Item> = Vec::new();
    for it in prog.items {
        match it {
            ast::Item::Sector(sd) => {
                let woven = new_sectors.remove(&sd.name.name);
                new_items.push(ast::Item::Sector(woven.unwrap_or(sd)));
            }
            ast::Item::Type(td) => {
                let woven = new_types.remove(&td.name.dotted());
                new_items.push(ast::Item::Type(woven.unwrap_or(td)));
            }
            ast::Item::Mixin(_) | ast::Item::UseMixin(_) | ast::Item::ResolveMixin(_) => {}
            other => new_items.push(other),
        }
    }
    new_items.extend(new_patterns.into_iter().map(ast::Item::Pattern));
    new_items.extend(new_top_fns.into_iter().map(ast::Item::Fn));

    // Rewrite `Type.method(obj, ...)` calls into the synthesized functions.
    let rewritten: Vec<ast::Item> = new_items
        .into_iter()
        .map(|it| match it {
            ast::Item::Fn(fd) => ast::Item::Fn(weaver.rewrite_method_calls_fn(fd)),
            ast::Item::Sector(sd) => {
                let items = sd
                    .items
                    .into_iter()
                    .map(|si| match si {
                        ast::SectorItem::Fn(fd) => {
                            ast::SectorItem::Fn(weaver.rewrite_method_calls_fn(fd))
                        }
                        other => other,
                    })
                    .collect();
                ast::Item::Sector(ast::SectorDecl {
                    name: sd.name,
                    items,
                    span: sd.span,
                })
            }
            other => other,
        })
        .collect();

    Ok((
        ast::Program {
            items: rewritten,
            run: prog.run,
            span: prog.span,
        },
        weaver.hook_plan,
    ))
}

impl Weaver {
    fn fresh_uid(&mut self) -> usize {
        self.next_uid += 1;
        self.next_uid
    }

    fn is_preferred(&self, a: &str, b: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![a];
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if let Some(nexts) = self.prefer_over.get(cur) {
                for nxt in nexts {
                    if nxt == b {
                        return true;
                    }
                    stack.push(nxt);
                }
            }
        }
        false
    }

    /// Unique candidate preferred over every other, or an error asking for
    /// explicit resolve rules.
    fn choose_preferred_idx<T>(
        &self,
        cands: &[(String, T)],
        span: &Span,
    ) -> Result<usize, Diagnostic> {
        for (i, (k, _)) in cands.iter().enumerate() {
            let wins = cands
                .iter()
                .all(|(k2, _)| k2 == k || self.is_preferred(k, k2));
            if wins {
                return Ok(i);
            }
        }
        let names: Vec<&str> = cands.iter().map(|(k, _)| k.as_str()).collect();
        Err(Diagnostic::resolve(
            format!(
                "Ambiguous mixin conflict: {}. Add resolve mixin-conflict prefer/over rules.",
                names.join(", ")
            ),
            span.clone(),
        ))
    }

    /// Stable topological sort over the preference graph restricted to the
    /// used set; input order is preserved where no edge forces otherwise.
    fn topo_sort(&self, keys: &[String], span: &Span) -> Result<Vec<String>, Diagnostic> {
        let keys_set: HashSet<String> = keys.iter().cloned().collect();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for k in keys {
            let mut outs: Vec<String> = self
                .prefer_over
                .get(k)
                .map(|s| {
                    s.iter()
                        .filter(|x| keys_set.contains(x.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            outs.sort();
            edges.insert(k.clone(), outs);
        }
        let mut indeg: HashMap<String, usize> = keys.iter().map(|k| (k.clone(), 0)).collect();
        for k in keys {
            for v in &edges[k] {
                if let Some(d) = indeg.get_mut(v) {
                    *d += 1;
                }
            }
        }
        let mut queue: Vec<String> = keys.iter().filter(|k| indeg[k.as_str()] == 0).cloned().collect();
        let mut out: Vec<String> = Vec::new();
        while !queue.is_empty() {
            let k = queue.remove(0);
            for v in edges[&k].clone() {
                let d = indeg.get_mut(&v).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push(v);
                }
            }
            out.push(k);
        }
        if out.len() != keys.len() {
            return Err(Diagnostic::resolve(
                "Cyclic mixin preference rules",
                span.clone(),
            ));
        }
        Ok(out)
    }

    fn plan_row(
        &self,
        sp: &AroundSpec,
        owner_kind: OwnerKind,
        owner_name: &str,
        target_name: &str,
        depth: Option<usize>,
        status: HookStatus,
        drop_reason: Option<String>,
    ) -> HookPlanRow {
        HookPlanRow {
            owner_kind,
            owner: owner_name.to_string(),
            target: format!("{}.{}", owner_name, target_name),
            hook_id: sp.hook_id.clone(),
            point: sp.point.label(),
            origin: sp.origin,
            conflict_policy: sp.conflict_policy,
            mixin_key: sp.mixin_key.clone(),
            priority: sp.priority,
            depends: sp.depends.clone(),
            at: sp.at.clone(),
            depth,
            status,
            drop_reason,
        }
    }

    /// Weave the resolved around/hook stack into its target functions.
    fn apply_around_specs<H: FnHost>(
        &mut self,
        items: &mut H,
        around_by_fn: SpecsByFn,
        owner_name: &str,
        owner_kind: OwnerKind,
        anchor_alias_by_fn: &HashMap<String, HashSet<String>>,
        display_target_by_fn: &HashMap<String, String>,
    ) -> Result<(), Diagnostic> {
        let owner_safe = safe_name(owner_name);
        let mut around_ordered: Vec<AroundSpec> = Vec::new();
        let mut depth_by_uid: HashMap<usize, usize> = HashMap::new();
        let mut target_by_uid: HashMap<usize, String> = HashMap::new();
        let mut active_rows: Vec<(usize, HookPlanRow)> = Vec::new();

        let SpecsByFn { order, mut map } = around_by_fn;
        for fname in &order {
            let specs = map.remove(fname).unwrap_or_default();
            let mut heads = Vec::new();
            let mut invokes = Vec::new();
            let mut tails = Vec::new();
            for sp in specs {
                match sp.point {
                    ast::HookPoint::Head => heads.push(sp),
                    ast::HookPoint::Invoke => invokes.push(sp),
                    ast::HookPoint::Tail => tails.push(sp),
                }
            }
            let (ordered_head, dropped_head) = resolve_specs(heads)?;
            let (ordered_invoke, dropped_invoke) = resolve_specs(invokes)?;
            let (ordered_tail, dropped_tail) = resolve_specs(tails)?;
            let display_target = display_target_by_fn
                .get(fname)
                .cloned()
                .unwrap_or_else(|| fname.clone());
            for (sp, reason) in dropped_head
                .into_iter()
                .chain(dropped_invoke)
                .chain(dropped_tail)
            {
                let row = self.plan_row(
                    &sp,
                    owner_kind,
                    owner_name,
                    &display_target,
                    None,
                    HookStatus::Dropped,
                    Some(reason),
                );
                self.hook_plan.push(row);
            }
            // Outer stack: heads, then invokes, then tails. Tail hooks run
            // after proceed, so their stack order is reversed.
            let outer_stack: Vec<AroundSpec> = ordered_head
                .into_iter()
                .chain(ordered_invoke)
                .chain(ordered_tail.into_iter().rev())
                .collect();
            for (depth, sp) in outer_stack.iter().enumerate() {
                depth_by_uid.insert(sp.uid, depth);
                target_by_uid.insert(sp.uid, display_target.clone());
                let row = self.plan_row(
                    sp,
                    owner_kind,
                    owner_name,
                    &display_target,
                    Some(depth),
                    HookStatus::Active,
                    None,
                );
                active_rows.push((sp.uid, row));
            }
            around_ordered.extend(outer_stack.into_iter().rev());
        }

        for (weave_idx, spec) in around_ordered.into_iter().enumerate() {
            let weave_idx = weave_idx + 1;
            let key = &spec.mixin_key;
            let ar = &spec.around;
            let fname = ar.sig.name.name.clone();
            let target = match items.find(&fname) {
                Some(t) => t.clone(),
                None => {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} around-target fn not found: {}.{}",
                            key, owner_name, fname
                        ),
                        ar.span.clone(),
                    ));
                }
            };

            let target_name = target_by_uid
                .get(&spec.uid)
                .cloned()
                .unwrap_or_else(|| fname.clone());
            let depth = depth_by_uid.get(&spec.uid).copied();
            if let Err(exc) = validate_locator(
                spec.at.as_ref(),
                &target,
                owner_name,
                &spec.hook_id,
                &spec.span,
                anchor_alias_by_fn.get(&fname),
            ) {
                if !spec.strict_mode && exc.message.starts_with("Hook locator mismatch") {
                    active_rows.retain(|(uid, _)| *uid != spec.uid);
                    let row = self.plan_row(
                        &spec,
                        owner_kind,
                        owner_name,
                        &target_name,
                        depth,
                        HookStatus::Dropped,
                        Some("locator_mismatch".to_string()),
                    );
                    self.hook_plan.push(row);
                    continue;
                }
                return Err(exc);
            }

            if ar.sig.params.len() != target.params.len() {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} around signature arity mismatch for {}.{}",
                        key, owner_name, fname
                    ),
                    ar.span.clone(),
                ));
            }
            for (ap, tp) in ar.sig.params.iter().zip(target.params.iter()) {
                if !type_ref_eq(Some(&ap.ty), Some(&tp.ty)) {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} around signature param type mismatch for {}.{}",
                            key, owner_name, fname
                        ),
                        ap.span.clone(),
                    ));
                }
            }
            if ar.sig.ret_type.is_some()
                && !type_ref_eq(ar.sig.ret_type.as_ref(), target.ret_type.as_ref())
            {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} around signature return type mismatch for {}.{}",
                        key, owner_name, fname
                    ),
                    ar.sig.span.clone(),
                ));
            }

            let orig_name = ast::Ident::new(
                format!(
                    "__mixin_{}_{}_{}_{}_orig",
                    key.replace('.', "_").replace('@', "_"),
                    owner_safe,
                    fname,
                    weave_idx
                ),
                target.name.span.clone(),
            );
            let orig = ast::FnDecl {
                name: orig_name.clone(),
                sector_qual: None,
                type_params: target.type_params.clone(),
                params: clone_params(&target.params),
                ret_type: target.ret_type.clone(),
                body: target.body.clone(),
                span: target.span.clone(),
            };
            items.push_fn(orig);

            let wrapper_span = ar.block.span.clone();
            let new_body = rewrite_proceed_body(
                ast::FnBody::Do(ar.block.clone(), wrapper_span),
                &orig_name,
            );
            ensure_no_proceed(&new_body, &ar.span)?;
            let new_target = ast::FnDecl {
                name: target.name.renumbered(),
                sector_qual: target.sector_qual.clone(),
                type_params: target.type_params.clone(),
                params: clone_params(&target.params),
                ret_type: target.ret_type.clone(),
                body: new_body,
                span: target.span.clone(),
            };
            items.replace(&fname, new_target);
        }

        self.hook_plan.extend(active_rows.into_iter().map(|(_, row)| row));
        Ok(())
    }

    /// Shared head/tail hook synthesis: install the hook body as a helper
    /// function and wrap the target with the point-specific glue.
    #[allow(clippy::too_many_arguments)]
    fn build_point_hook_spec<H: FnHost>(
        &mut self,
        key: &str,
        hk: &ast::MixinHook,
        target: &ast::FnDecl,
        owner_name: &str,
        msg_target: &str,
        wrapper_fn_name: &str,
        items: &mut H,
        hook_id: String,
        priority: i64,
        depends: Vec<String>,
        at: Option<String>,
        cancelable: bool,
        return_dep: &str,
        conflict_policy: ConflictPolicy,
        strict_mode: bool,
        const_values: Vec<String>,
        hook_counter: usize,
    ) -> Result<AroundSpec, Diagnostic> {
        let span = &hk.span;
        let extra_ret = if hk.point == ast::HookPoint::Tail
            && (return_dep == "use_return" || return_dep == "replace_return")
        {
            1
        } else {
            0
        };
        let expected_n = target.params.len() + extra_ret + const_values.len();
        if hk.sig.params.len() != expected_n {
            return Err(Diagnostic::resolve(
                format!(
                    "Mixin {} hook {} signature arity mismatch for {}: expected {}",
                    key,
                    hk.point.label(),
                    msg_target,
                    expected_n
                ),
                span.clone(),
            ));
        }
        if hk.point == ast::HookPoint::Head && return_dep != "none" {
            return Err(Diagnostic::resolve(
                "hook head does not support returnDep",
                span.clone(),
            ));
        }
        if hk.point == ast::HookPoint::Tail && cancelable {
            return Err(Diagnostic::resolve(
                "hook tail does not support cancelable",
                span.clone(),
            ));
        }
        if hk.point == ast::HookPoint::Head && cancelable {
            let inner = option_inner_type(hk.sig.ret_type.as_ref());
            let Some(inner) = inner else {
                return Err(Diagnostic::resolve(
                    "hook head cancelable=true requires return type Option[T]",
                    hk.sig.span.clone(),
                ));
            };
            if target.ret_type.is_some() && !type_ref_eq(Some(inner), target.ret_type.as_ref()) {
                return Err(Diagnostic::resolve(
                    "hook head cancelable=true Option[T] must match target return type",
                    hk.sig.span.clone(),
                ));
            }
        }
        if hk.point == ast::HookPoint::Tail
            && (return_dep == "use_return" || return_dep == "replace_return")
        {
            let prev_ret_param = &hk.sig.params[target.params.len()];
            if target.ret_type.is_some()
                && !type_ref_eq(Some(&prev_ret_param.ty), target.ret_type.as_ref())
            {
                return Err(Diagnostic::resolve(
                    "hook tail returnDep requires extra return parameter type matching target return type",
                    prev_ret_param.span.clone(),
                ));
            }
            if return_dep == "replace_return"
                && hk.sig.ret_type.is_some()
                && target.ret_type.is_some()
                && !type_ref_eq(hk.sig.ret_type.as_ref(), target.ret_type.as_ref())
            {
                return Err(Diagnostic::resolve(
                    "hook tail returnDep=replace_return requires hook return type matching target return type",
                    hk.sig.span.clone(),
                ));
            }
        }

        let helper_name = format!(
            "__hook_{}_{}_{}_{}_impl",
            safe_name(key),
            safe_name(owner_name),
            safe_name(&hk.sig.name.name),
            hook_counter
        );
        let helper_fn = ast::FnDecl {
            name: ast::Ident::new(helper_name.clone(), hk.sig.name.span.clone()),
            sector_qual: None,
            type_params: None,
            params: clone_params(&hk.sig.params),
            ret_type: hk.sig.ret_type.clone(),
            body: hk.body.clone(),
            span: hk.span.clone(),
        };
        items.push_fn(helper_fn);

        let arg_exprs: Vec<ast::Expr> = target
            .params
            .iter()
            .map(|p| mk_var(&p.name.name, span))
            .collect();
        let proceed_expr = ast::Expr::Proceed(ast::ProceedExpr {
            args: arg_exprs.clone(),
            span: span.clone(),
        });
        let mut helper_call_args: Vec<ast::Expr> = arg_exprs;
        if extra_ret == 1 {
            helper_call_args.push(mk_var("__hook_prev", span));
        }
        for raw in &const_values {
            helper_call_args.push(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Str(raw.clone()),
                span: span.clone(),
            }));
        }
        let helper_call = mk_call(&helper_name, helper_call_args, span);

        let wrapper_block = if hk.point == ast::HookPoint::Head {
            if cancelable {
                let ret_match = ast::Expr::Match(ast::MatchExpr {
                    scrutinee: Box::new(mk_var("__hook_choice", span)),
                    arms: vec![
                        ast::MatchArm {
                            pat: ast::Pattern::Ctor(ast::PCtor {
                                name: ast::QualifiedName::single("Some", span.clone()),
                                args: Some(vec![ast::Pattern::Var(ast::Ident::new(
                                    "v",
                                    span.clone(),
                                ))]),
                                span: span.clone(),
                            }),
                            body: ast::MatchArmBody::Expr(mk_var("v", span)),
                            span: span.clone(),
                        },
                        ast::MatchArm {
                            pat: ast::Pattern::Ctor(ast::PCtor {
                                name: ast::QualifiedName::single("None", span.clone()),
                                args: None,
                                span: span.clone(),
                            }),
                            body: ast::MatchArmBody::Expr(proceed_expr),
                            span: span.clone(),
                        },
                    ],
                    span: span.clone(),
                });
                ast::Block {
                    stmts: vec![
                        ast::Stmt::Let(ast::LetStmt {
                            name: ast::Ident::new("__hook_choice", span.clone()),
                            value: helper_call,
                            span: span.clone(),
                        }),
                        ast::Stmt::Return(ret_match, span.clone()),
                    ],
                    span: span.clone(),
                }
            } else {
                ast::Block {
                    stmts: vec![
                        ast::Stmt::Expr(helper_call, span.clone()),
                        ast::Stmt::Return(proceed_expr, span.clone()),
                    ],
                    span: span.clone(),
                }
            }
        } else {
            let mut stmts: Vec<ast::Stmt> = vec![ast::Stmt::Let(ast::LetStmt {
                name: ast::Ident::new("__hook_prev", span.clone()),
                value: proceed_expr,
                span: span.clone(),
            })];
            if return_dep == "replace_return" {
                stmts.push(ast::Stmt::Return(helper_call, span.clone()));
            } else {
                stmts.push(ast::Stmt::Expr(helper_call, span.clone()));
                stmts.push(ast::Stmt::Return(mk_var("__hook_prev", span), span.clone()));
            }
            ast::Block {
                stmts,
                span: span.clone(),
            }
        };

        let around_sig = ast::FnSignature {
            name: ast::Ident::new(wrapper_fn_name, hk.sig.name.span.clone()),
            params: clone_params(&target.params),
            ret_type: target.ret_type.clone(),
            span: hk.sig.span.clone(),
        };
        Ok(AroundSpec {
            uid: self.fresh_uid(),
            mixin_key: key.to_string(),
            around: ast::MixinAround {
                sig: around_sig,
                block: wrapper_block,
                span: hk.span.clone(),
            },
            point: hk.point,
            origin: HookOrigin::Hook,
            conflict_policy,
            strict_mode,
            hook_id,
            priority,
            depends,
            at,
            span: hk.span.clone(),
        })
    }

    fn apply_to_sector(
        &mut self,
        sd: ast::SectorDecl,
        mixin_keys: &[String],
    ) -> Result<ast::SectorDecl, Diagnostic> {
        let mut items = sd.items;

        let mut add_order: Vec<String> = Vec::new();
        let mut add_cands: HashMap<String, Vec<(String, ast::MixinFnAdd)>> = HashMap::new();
        let mut raw_arounds: Vec<(String, ast::MixinAround)> = Vec::new();
        let mut raw_hooks: Vec<(String, ast::MixinHook)> = Vec::new();
        for key in mixin_keys {
            let md = &self.mixins[key];
            for mi in &md.items {
                match mi {
                    ast::MixinItem::FnAdd(add) => {
                        let fname = add.sig.name.name.clone();
                        if !add_cands.contains_key(&fname) {
                            add_order.push(fname.clone());
                        }
                        add_cands
                            .entry(fname)
                            .or_default()
                            .push((key.clone(), add.clone()));
                    }
                    ast::MixinItem::Around(ar) => raw_arounds.push((key.clone(), ar.clone())),
                    ast::MixinItem::Hook(hk) => raw_hooks.push((key.clone(), hk.clone())),
                    _ => {}
                }
            }
        }

        for fname in &add_order {
            let cands = add_cands.remove(fname).unwrap_or_default();
            if items.find(fname).is_some() {
                let keys: Vec<&str> = cands.iter().map(|(k, _)| k.as_str()).collect();
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin adds conflict with existing fn {}.{}: {}",
                        sd.name.name,
                        fname,
                        keys.join(", ")
                    ),
                    cands[0].1.span.clone(),
                ));
            }
            let idx = if cands.len() == 1 {
                0
            } else {
                self.choose_preferred_idx(&cands, &cands[0].1.span)?
            };
            let (_, add) = cands.into_iter().nth(idx).unwrap();
            let fd = ast::FnDecl {
                name: add.sig.name.renumbered(),
                sector_qual: None,
                type_params: None,
                params: add.sig.params.clone(),
                ret_type: add.sig.ret_type.clone(),
                body: add.body.clone(),
                span: add.span.clone(),
            };
            items.push_fn(fd);
        }

        let mut around_by_fn = SpecsByFn::default();
        let mut hook_counter = 0usize;

        for (key, ar) in raw_arounds {
            hook_counter += 1;
            let hook_id = format!(
                "{}__invoke__{}__{}",
                safe_name(&key),
                ar.sig.name.name,
                hook_counter
            );
            let fname = ar.sig.name.name.clone();
            let spec = AroundSpec {
                uid: self.fresh_uid(),
                mixin_key: key,
                around: ar.clone(),
                point: ast::HookPoint::Invoke,
                origin: HookOrigin::Around,
                conflict_policy: ConflictPolicy::Error,
                strict_mode: true,
                hook_id,
                priority: 0,
                depends: Vec::new(),
                at: None,
                span: ar.span.clone(),
            };
            around_by_fn.push(&fname, spec);
        }

        for (key, hk) in raw_hooks {
            let fname = hk.sig.name.name.clone();
            let target = match items.find(&fname) {
                Some(t) => t.clone(),
                None => {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook target fn not found: {}.{}",
                            key, sd.name.name, fname
                        ),
                        hk.span.clone(),
                    ));
                }
            };

            if hk.sig.params.len() < target.params.len() {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} hook signature arity mismatch for {}.{}",
                        key, sd.name.name, fname
                    ),
                    hk.span.clone(),
                ));
            }
            for (ap, tp) in hk.sig.params.iter().zip(target.params.iter()) {
                if !type_ref_eq(Some(&ap.ty), Some(&tp.ty)) {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook signature param type mismatch for {}.{}",
                            key, sd.name.name, fname
                        ),
                        ap.span.clone(),
                    ));
                }
            }

            let opts = self.parse_hook_opts(&key, &hk, &mut hook_counter)?;
            let msg_target = format!("{}.{}", sd.name.name, fname);

            if hk.point == ast::HookPoint::Invoke {
                if !opts.const_values.is_empty() {
                    return Err(Diagnostic::resolve(
                        "hook invoke does not support const parameters",
                        hk.span.clone(),
                    ));
                }
                if hk.sig.params.len() != target.params.len() {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook invoke arity mismatch for {}",
                            key, msg_target
                        ),
                        hk.span.clone(),
                    ));
                }
                if hk.sig.ret_type.is_some()
                    && !type_ref_eq(hk.sig.ret_type.as_ref(), target.ret_type.as_ref())
                {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook invoke return type mismatch for {}",
                            key, msg_target
                        ),
                        hk.sig.span.clone(),
                    ));
                }
                let around = ast::MixinAround {
                    sig: hk.sig.clone(),
                    block: body_to_block(hk.body.clone()),
                    span: hk.span.clone(),
                };
                let spec = AroundSpec {
                    uid: self.fresh_uid(),
                    mixin_key: key.clone(),
                    around,
                    point: ast::HookPoint::Invoke,
                    origin: HookOrigin::Hook,
                    conflict_policy: opts.conflict_policy,
                    strict_mode: opts.strict_mode,
                    hook_id: opts.hook_id,
                    priority: opts.priority,
                    depends: opts.depends,
                    at: opts.at,
                    span: hk.span.clone(),
                };
                around_by_fn.push(&fname, spec);
                continue;
            }

            let spec = self.build_point_hook_spec(
                &key,
                &hk,
                &target,
                &sd.name.name,
                &msg_target,
                &fname,
                &mut items,
                opts.hook_id,
                opts.priority,
                opts.depends,
                opts.at,
                opts.cancelable,
                &opts.return_dep,
                opts.conflict_policy,
                opts.strict_mode,
                opts.const_values,
                opts.counter,
            )?;
            around_by_fn.push(&fname, spec);
        }

        if !around_by_fn.is_empty() {
            self.apply_around_specs(
                &mut items,
                around_by_fn,
                &sd.name.name,
                OwnerKind::Sector,
                &HashMap::new(),
                &HashMap::new(),
            )?;
        }

        Ok(ast::SectorDecl {
            name: sd.name,
            items,
            span: sd.span,
        })
    }

    fn apply_to_type(
        &mut self,
        td: ast::TypeDecl,
        mixin_keys: &[String],
        new_top_fns: &mut Vec<ast::FnDecl>,
        new_patterns: &mut Vec<ast::PatternDecl>,
    ) -> Result<ast::TypeDecl, Diagnostic> {
        let type_name = td.name.dotted();
        let ast::TypeRhs::Record(record) = &td.rhs else {
            return Err(Diagnostic::resolve(
                format!("Type mixin only supports record types: {}", type_name),
                td.span.clone(),
            ));
        };
        // Call sites name single-segment types by their bare identifier.
        let type_method_key = if td.name.parts.len() == 1 {
            td.name.parts[0].name.clone()
        } else {
            type_name.clone()
        };

        let mut existing_fields: HashSet<String> =
            record.fields.iter().map(|f| f.name.name.clone()).collect();

        let mut field_order: Vec<String> = Vec::new();
        let mut field_cands: HashMap<String, Vec<(String, ast::MixinFieldAdd)>> = HashMap::new();
        let mut method_order: Vec<String> = Vec::new();
        let mut method_cands: HashMap<String, Vec<(String, ast::MixinFnAdd)>> = HashMap::new();
        let mut pat_order: Vec<String> = Vec::new();
        let mut pat_cands: HashMap<String, Vec<(String, ast::PatternDecl)>> = HashMap::new();
        let mut raw_arounds: Vec<(String, ast::MixinAround)> = Vec::new();
        let mut raw_hooks: Vec<(String, ast::MixinHook)> = Vec::new();

        for key in mixin_keys {
            let md = &self.mixins[key];
            for mi in &md.items {
                match mi {
                    ast::MixinItem::FieldAdd(fa) => {
                        let n = fa.name.name.clone();
                        if !field_cands.contains_key(&n) {
                            field_order.push(n.clone());
                        }
                        field_cands.entry(n).or_default().push((key.clone(), fa.clone()));
                    }
                    ast::MixinItem::FnAdd(add) => {
                        let n = add.sig.name.name.clone();
                        if !method_cands.contains_key(&n) {
                            method_order.push(n.clone());
                        }
                        method_cands
                            .entry(n)
                            .or_default()
                            .push((key.clone(), add.clone()));
                    }
                    ast::MixinItem::Pattern(pd) => {
                        let n = pd.name.dotted();
                        if !pat_cands.contains_key(&n) {
                            pat_order.push(n.clone());
                        }
                        pat_cands.entry(n).or_default().push((key.clone(), pd.clone()));
                    }
                    ast::MixinItem::Around(ar) => raw_arounds.push((key.clone(), ar.clone())),
                    ast::MixinItem::Hook(hk) => raw_hooks.push((key.clone(), hk.clone())),
                }
            }
        }

        let mut new_fields = record.fields.clone();
        for fname in &field_order {
            let cands = field_cands.remove(fname).unwrap_or_default();
            if existing_fields.contains(fname) {
                let keys: Vec<&str> = cands.iter().map(|(k, _)| k.as_str()).collect();
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin adds field that already exists: {}.{} ({})",
                        type_name,
                        fname,
                        keys.join(", ")
                    ),
                    cands[0].1.span.clone(),
                ));
            }
            let idx = if cands.len() == 1 {
                0
            } else {
                self.choose_preferred_idx(&cands, &cands[0].1.span)?
            };
            let (_, add) = cands.into_iter().nth(idx).unwrap();
            let span = add.name.span.merge(add.ty.span());
            new_fields.push(ast::FieldDecl {
                name: add.name,
                ty: add.ty,
                span,
            });
            existing_fields.insert(fname.clone());
        }

        // Methods become top-level functions taking `self` first; call
        // sites `Type.method(obj, ...)` are rewritten afterwards.
        let mut method_name_to_synth: HashMap<String, String> = HashMap::new();
        let mut method_name_by_synth: HashMap<String, String> = HashMap::new();
        let mut method_by_public_name: HashMap<String, ast::FnDecl> = HashMap::new();
        let mut method_anchor_alias: HashMap<String, HashSet<String>> = HashMap::new();
        let mut method_items: Vec<ast::FnDecl> = Vec::new();
        for mname in &method_order {
            let cands = method_cands.remove(mname).unwrap_or_default();
            let idx = if cands.len() == 1 {
                0
            } else {
                self.choose_preferred_idx(&cands, &cands[0].1.span)?
            };
            let (key, add) = cands.into_iter().nth(idx).unwrap();
            let Some(p0) = add.sig.params.first() else {
                return Err(Diagnostic::resolve(
                    format!("Mixin {} method must have self param", key),
                    add.span.clone(),
                ));
            };
            if p0.name.name != "self" {
                return Err(Diagnostic::resolve(
                    format!("Mixin {} method first param must be self", key),
                    p0.span.clone(),
                ));
            }
            let self_ty_ok = match type_ref_strip_paren(&p0.ty) {
                ast::TypeRef::Name(n) => n.name.dotted() == type_name,
                _ => false,
            };
            if !self_ty_ok {
                return Err(Diagnostic::resolve(
                    format!("Mixin {} method self type mismatch", key),
                    p0.span.clone(),
                ));
            }

            let synth = synth_method_name(&type_name, mname);
            self.method_fns
                .insert((type_method_key.clone(), mname.clone()), synth.clone());
            method_name_to_synth.insert(mname.clone(), synth.clone());
            method_name_by_synth.insert(synth.clone(), mname.clone());
            method_anchor_alias
                .insert(synth.clone(), HashSet::from([mname.clone()]));
            let method_item = ast::FnDecl {
                name: ast::Ident::new(synth, add.sig.name.span.clone()),
                sector_qual: None,
                type_params: None,
                params: add.sig.params.clone(),
                ret_type: add.sig.ret_type.clone(),
                body: add.body.clone(),
                span: add.span.clone(),
            };
            method_items.push(method_item.clone());
            method_by_public_name.insert(mname.clone(), method_item);
        }

        let mut around_by_fn = SpecsByFn::default();
        let mut hook_counter = 0usize;

        for (key, ar) in raw_arounds {
            let method_name = ar.sig.name.name.clone();
            let Some(synth_name) = method_name_to_synth.get(&method_name).cloned() else {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} around target method not found: {}.{}",
                        key, type_name, method_name
                    ),
                    ar.span.clone(),
                ));
            };
            hook_counter += 1;
            let hook_id = format!(
                "{}__invoke__{}__{}",
                safe_name(&key),
                method_name,
                hook_counter
            );
            let around_sig = ast::FnSignature {
                name: ast::Ident::new(synth_name.clone(), ar.sig.name.span.clone()),
                params: ar.sig.params.clone(),
                ret_type: ar.sig.ret_type.clone(),
                span: ar.sig.span.clone(),
            };
            let spec = AroundSpec {
                uid: self.fresh_uid(),
                mixin_key: key,
                around: ast::MixinAround {
                    sig: around_sig,
                    block: ar.block.clone(),
                    span: ar.span.clone(),
                },
                point: ast::HookPoint::Invoke,
                origin: HookOrigin::Around,
                conflict_policy: ConflictPolicy::Error,
                strict_mode: true,
                hook_id,
                priority: 0,
                depends: Vec::new(),
                at: None,
                span: ar.span.clone(),
            };
            around_by_fn.push(&synth_name, spec);
        }

        for (key, hk) in raw_hooks {
            let method_name = hk.sig.name.name.clone();
            let synth_name = method_name_to_synth.get(&method_name).cloned();
            let target = method_by_public_name.get(&method_name).cloned();
            let (Some(synth_name), Some(target)) = (synth_name, target) else {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} hook target method not found: {}.{}",
                        key, type_name, method_name
                    ),
                    hk.span.clone(),
                ));
            };

            if hk.sig.params.len() < target.params.len() {
                return Err(Diagnostic::resolve(
                    format!(
                        "Mixin {} hook signature arity mismatch for {}.{}",
                        key, type_name, method_name
                    ),
                    hk.span.clone(),
                ));
            }
            for (ap, tp) in hk.sig.params.iter().zip(target.params.iter()) {
                if !type_ref_eq(Some(&ap.ty), Some(&tp.ty)) {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook signature param type mismatch for {}.{}",
                            key, type_name, method_name
                        ),
                        ap.span.clone(),
                    ));
                }
            }

            let opts = self.parse_hook_opts(&key, &hk, &mut hook_counter)?;
            let msg_target = format!("{}.{}", type_name, method_name);

            if hk.point == ast::HookPoint::Invoke {
                if !opts.const_values.is_empty() {
                    return Err(Diagnostic::resolve(
                        "hook invoke does not support const parameters",
                        hk.span.clone(),
                    ));
                }
                if hk.sig.params.len() != target.params.len() {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook invoke arity mismatch for {}",
                            key, msg_target
                        ),
                        hk.span.clone(),
                    ));
                }
                if hk.sig.ret_type.is_some()
                    && !type_ref_eq(hk.sig.ret_type.as_ref(), target.ret_type.as_ref())
                {
                    return Err(Diagnostic::resolve(
                        format!(
                            "Mixin {} hook invoke return type mismatch for {}",
                            key, msg_target
                        ),
                        hk.sig.span.clone(),
                    ));
                }
                let around_sig = ast::FnSignature {
                    name: ast::Ident::new(synth_name.clone(), hk.sig.name.span.clone()),
                    params: clone_params(&target.params),
                    ret_type: target.ret_type.clone(),
                    span: hk.sig.span.clone(),
                };
                let spec = AroundSpec {
                    uid: self.fresh_uid(),
                    mixin_key: key.clone(),
                    around: ast::MixinAround {
                        sig: around_sig,
                        block: body_to_block(hk.body.clone()),
                        span: hk.span.clone(),
                    },
                    point: ast::HookPoint::Invoke,
                    origin: HookOrigin::Hook,
                    conflict_policy: opts.conflict_policy,
                    strict_mode: opts.strict_mode,
                    hook_id: opts.hook_id,
                    priority: opts.priority,
                    depends: opts.depends,
                    at: opts.at,
                    span: hk.span.clone(),
                };
                around_by_fn.push(&synth_name, spec);
                continue;
            }

            let spec = self.build_point_hook_spec(
                &key,
                &hk,
                &target,
                &type_name,
                &msg_target,
                &synth_name,
                &mut method_items,
                opts.hook_id,
                opts.priority,
                opts.depends,
                opts.at,
                opts.cancelable,
                &opts.return_dep,
                opts.conflict_policy,
                opts.strict_mode,
                opts.const_values,
                opts.counter,
            )?;
            around_by_fn.push(&synth_name, spec);
        }

        if !around_by_fn.is_empty() {
            self.apply_around_specs(
                &mut method_items,
                around_by_fn,
                &type_name,
                OwnerKind::Type,
                &method_anchor_alias,
                &method_name_by_synth,
            )?;
        }
        new_top_fns.extend(method_items);

        for pname in &pat_order {
            let cands = pat_cands.remove(pname).unwrap_or_default();
            let idx = if cands.len() == 1 {
                0
            } else {
                self.choose_preferred_idx(&cands, &cands[0].1.span)?
            };
            let (_, pd) = cands.into_iter().nth(idx).unwrap();
            new_patterns.push(pd);
        }

        let rhs_span = record.span.clone();
        Ok(ast::TypeDecl {
            name: td.name,
            params: td.params,
            rhs: ast::TypeRhs::Record(ast::RecordType {
                fields: new_fields,
                span: rhs_span,
            }),
            span: td.span,
        })
    }

    fn parse_hook_opts(
        &mut self,
        key: &str,
        hk: &ast::MixinHook,
        hook_counter: &mut usize,
    ) -> Result<HookOpts, Diagnostic> {
        let opts = &hk.opts;
        const ALLOWED: [&str; 11] = [
            "id",
            "priority",
            "depends",
            "at",
            "cancelable",
            "returnDep",
            "const",
            "constParams",
            "constArgs",
            "conflict",
            "strict",
        ];
        let unknown: Vec<&String> = opts
            .keys()
            .filter(|k| !ALLOWED.contains(&k.as_str()))
            .collect();
        if let Some(first) = unknown.first() {
            return Err(Diagnostic::resolve(
                format!("Unknown hook option: {}", first),
                hk.span.clone(),
            ));
        }
        if hk.point != ast::HookPoint::Head && opts.contains_key("cancelable") {
            return Err(Diagnostic::resolve(
                format!("hook {} does not support cancelable", hk.point.label()),
                hk.span.clone(),
            ));
        }
        if hk.point != ast::HookPoint::Tail && opts.contains_key("returnDep") {
            return Err(Diagnostic::resolve(
                format!("hook {} does not support returnDep", hk.point.label()),
                hk.span.clone(),
            ));
        }
        if hk.point == ast::HookPoint::Invoke
            && (opts.contains_key("const")
                || opts.contains_key("constParams")
                || opts.contains_key("constArgs"))
        {
            return Err(Diagnostic::resolve(
                "hook invoke does not support const parameters",
                hk.span.clone(),
            ));
        }

        let priority = parse_int_opt(opts.get("priority"), 0, &hk.span, "priority")?;
        let hook_id = match opts.get("id") {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!(
                "{}__{}__{}__{}",
                safe_name(key),
                hk.point.label(),
                hk.sig.name.name,
                hook_counter
            ),
        };
        // The generated id uses the pre-increment counter; the helper
        // function name (for head/tail hooks) uses the post-increment one.
        *hook_counter += 1;
        let counter = *hook_counter;
        let depends = split_csv(opts.get("depends"));
        let at = opts.get("at").cloned();
        let cancelable = parse_bool_opt(opts.get("cancelable"), false, &hk.span, "cancelable")?;
        let return_dep = opts
            .get("returnDep")
            .cloned()
            .unwrap_or_else(|| "none".to_string());
        if !matches!(return_dep.as_str(), "none" | "use_return" | "replace_return") {
            return Err(Diagnostic::resolve(
                "hook returnDep must be one of: none, use_return, replace_return",
                hk.span.clone(),
            ));
        }
        let conflict_policy = match opts.get("conflict").map(|s| s.as_str()) {
            None => ConflictPolicy::Error,
            Some("error") => ConflictPolicy::Error,
            Some("prefer") => ConflictPolicy::Prefer,
            Some("drop") => ConflictPolicy::Drop,
            Some(_) => {
                return Err(Diagnostic::resolve(
                    "hook conflict must be one of: error, prefer, drop",
                    hk.span.clone(),
                ));
            }
        };
        let strict_mode = parse_bool_opt(opts.get("strict"), true, &hk.span, "strict")?;
        let mut const_values = split_csv(opts.get("const"));
        const_values.extend(split_csv(opts.get("constParams")));
        const_values.extend(split_csv(opts.get("constArgs")));

        Ok(HookOpts {
            hook_id,
            priority,
            depends,
            at,
            cancelable,
            return_dep,
            conflict_policy,
            strict_mode,
            const_values,
            counter,
        })
    }

    fn rewrite_method_calls_fn(&self, fd: ast::FnDecl) -> ast::FnDecl {
        let body = match fd.body {
            ast::FnBody::Expr(e) => ast::FnBody::Expr(self.rewrite_method_calls_expr(e)),
            ast::FnBody::Do(b, span) => {
                ast::FnBody::Do(self.rewrite_method_calls_block(b), span)
            }
        };
        ast::FnDecl { body, ..fd }
    }

    fn rewrite_method_calls_block(&self, b: ast::Block) -> ast::Block {
        ast::Block {
            stmts: b
                .stmts
                .into_iter()
                .map(|s| self.rewrite_method_calls_stmt(s))
                .collect(),
            span: b.span,
        }
    }

    fn rewrite_method_calls_stmt(&self, st: ast::Stmt) -> ast::Stmt {
        match st {
            ast::Stmt::Let(l) => ast::Stmt::Let(ast::LetStmt {
                name: l.name,
                value: self.rewrite_method_calls_expr(l.value),
                span: l.span,
            }),
            ast::Stmt::Assign(a) => ast::Stmt::Assign(ast::AssignStmt {
                target: a.target,
                op: a.op,
                value: self.rewrite_method_calls_expr(a.value),
                span: a.span,
            }),
            ast::Stmt::Return(e, span) => {
                ast::Stmt::Return(self.rewrite_method_calls_expr(e), span)
            }
            ast::Stmt::Emit(e, span) => ast::Stmt::Emit(self.rewrite_method_calls_expr(e), span),
            ast::Stmt::Expr(e, span) => ast::Stmt::Expr(self.rewrite_method_calls_expr(e), span),
            ast::Stmt::If(i) => ast::Stmt::If(ast::IfStmt {
                cond: self.rewrite_method_calls_expr(i.cond),
                then_block: self.rewrite_method_calls_block(i.then_block),
                else_block: i.else_block.map(|b| self.rewrite_method_calls_block(b)),
                span: i.span,
            }),
            ast::Stmt::For(f) => ast::Stmt::For(ast::ForStmt {
                binder: f.binder,
                iterable: self.rewrite_method_calls_expr(f.iterable),
                body: self.rewrite_method_calls_block(f.body),
                span: f.span,
            }),
            other => other,
        }
    }

    fn rewrite_method_calls_expr(&self, e: ast::Expr) -> ast::Expr {
        match e {
            ast::Expr::Call(c) => {
                if let ast::Expr::Member(m) = c.callee.as_ref() {
                    if let ast::Expr::Var(obj) = m.object.as_ref() {
                        let lookup = (obj.name.clone(), m.field.name.clone());
                        if let Some(synth) = self.method_fns.get(&lookup) {
                            let ident = ast::Ident::new(synth, m.field.span.clone());
                            let args = c
                                .args
                                .into_iter()
                                .map(|a| self.rewrite_method_calls_arg(a))
                                .collect();
                            return ast::Expr::Call(ast::CallExpr {
                                callee: Box::new(ast::Expr::Var(ident)),
                                args,
                                span: c.span,
                            });
                        }
                    }
                }
                let args = c
                    .args
                    .into_iter()
                    .map(|a| self.rewrite_method_calls_arg(a))
                    .collect();
                ast::Expr::Call(ast::CallExpr {
                    callee: Box::new(self.rewrite_method_calls_expr(*c.callee)),
                    args,
                    span: c.span,
                })
            }
            ast::Expr::Member(m) => ast::Expr::Member(ast::MemberExpr {
                object: Box::new(self.rewrite_method_calls_expr(*m.object)),
                field: m.field,
                span: m.span,
            }),
            ast::Expr::Index(ix) => ast::Expr::Index(ast::IndexExpr {
                object: Box::new(self.rewrite_method_calls_expr(*ix.object)),
                index: Box::new(self.rewrite_method_calls_expr(*ix.index)),
                span: ix.span,
            }),
            ast::Expr::Unary(u) => ast::Expr::Unary(ast::UnaryExpr {
                op: u.op,
                expr: Box::new(self.rewrite_method_calls_expr(*u.expr)),
                span: u.span,
            }),
            ast::Expr::Binary(b) => ast::Expr::Binary(ast::BinaryExpr {
                op: b.op,
                left: Box::new(self.rewrite_method_calls_expr(*b.left)),
                right: Box::new(self.rewrite_method_calls_expr(*b.right)),
                span: b.span,
            }),
            ast::Expr::Pipe(p) => ast::Expr::Pipe(ast::PipeExpr {
                head: Box::new(self.rewrite_method_calls_expr(*p.head)),
                stages: p
                    .stages
                    .into_iter()
                    .map(|s| self.rewrite_method_calls_expr(s))
                    .collect(),
                span: p.span,
            }),
            ast::Expr::Tuple(t) => ast::Expr::Tuple(ast::TupleLit {
                items: t
                    .items
                    .into_iter()
                    .map(|x| self.rewrite_method_calls_expr(x))
                    .collect(),
                span: t.span,
            }),
            ast::Expr::Record(r) => ast::Expr::Record(ast::RecordLit {
                items: r
                    .items
                    .into_iter()
                    .map(|i| ast::RecordItem {
                        key: i.key,
                        value: self.rewrite_method_calls_expr(i.value),
                        span: i.span,
                    })
                    .collect(),
                span: r.span,
            }),
            ast::Expr::Match(m) => ast::Expr::Match(ast::MatchExpr {
                scrutinee: Box::new(self.rewrite_method_calls_expr(*m.scrutinee)),
                arms: m
                    .arms
                    .into_iter()
                    .map(|a| ast::MatchArm {
                        pat: a.pat,
                        body: match a.body {
                            ast::MatchArmBody::Expr(e) => {
                                ast::MatchArmBody::Expr(self.rewrite_method_calls_expr(e))
                            }
                            other => other,
                        },
                        span: a.span,
                    })
                    .collect(),
                span: m.span,
            }),
            ast::Expr::TrySuffix(t) => ast::Expr::TrySuffix(ast::TrySuffixExpr {
                inner: Box::new(self.rewrite_method_calls_expr(*t.inner)),
                span: t.span,
            }),
            other => other,
        }
    }

    fn rewrite_method_calls_arg(&self, a: ast::CallArg) -> ast::CallArg {
        match a {
            ast::CallArg::Pos { value, span } => ast::CallArg::Pos {
                value: self.rewrite_method_calls_expr(value),
                span,
            },
            ast::CallArg::Star { value, span } => ast::CallArg::Star {
                value: self.rewrite_method_calls_expr(value),
                span,
            },
            ast::CallArg::Kw { name, value, span } => ast::CallArg::Kw {
                name,
                value: self.rewrite_method_calls_expr(value),
                span,
            },
            ast::CallArg::StarStar { value, span } => ast::CallArg::StarStar {
                value: self.rewrite_method_calls_expr(value),
                span,
            },
        }
    }
}

struct HookOpts {
    hook_id: String,
    priority: i64,
    depends: Vec<String>,
    at: Option<String>,
    cancelable: bool,
    return_dep: String,
    conflict_policy: ConflictPolicy,
    strict_mode: bool,
    const_values: Vec<String>,
    counter: usize,
}
