//! AST to HIR lowering.
//!
//! Mechanical desugaring over the resolved program: identifiers become
//! symbols, pipes become call chains with the piped value as the first
//! positional argument, try-suffix becomes an explicit two-arm match that
//! propagates `Err`/`None` (or aborts the handler), and match expressions
//! with block arms are hoisted into a statement match writing a fresh
//! result variable. Synthesized temporaries take symbol ids past the end of
//! the symbol table; they exist only in the HIR.

use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::hir;
use crate::resolve::{expand_pattern_alias, Resolution};
use crate::span::Span;
use crate::symbols::{SymbolId, SymbolKind, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TryMode {
    Forbid,
    Result,
    Option,
    Handler,
}

pub fn lower_resolved(res: &Resolution) -> Result<hir::Program, Diagnostic> {
    let mut type_by_name: HashMap<String, TypeId> = HashMap::new();
    let mut ctor_by_name: HashMap<String, SymbolId> = HashMap::new();
    for s in res.symbols.iter() {
        match s.kind {
            SymbolKind::Type => {
                type_by_name.entry(s.name.clone()).or_insert(s.id);
            }
            SymbolKind::Ctor => {
                ctor_by_name.entry(s.name.clone()).or_insert(s.id);
            }
            _ => {}
        }
    }

    let mut lw = Lowerer {
        res,
        type_by_name,
        ctor_by_name,
        next_sym: res.symbols.len() as u32 + 1,
        in_handler: false,
        try_mode: TryMode::Forbid,
    };

    let mut types: Vec<hir::TypeDecl> = Vec::new();
    let mut consts: Vec<hir::ValueDecl> = Vec::new();
    let mut globals: Vec<hir::ValueDecl> = Vec::new();
    let mut needs: Vec<hir::ValueDecl> = Vec::new();

    let mut sector_order: Vec<SymbolId> = Vec::new();
    let mut sectors_by_sym: HashMap<SymbolId, hir::SectorDecl> = HashMap::new();

    let mut top_handlers: Vec<&ast::OnHandler> = Vec::new();
    let mut sector_asts: Vec<&ast::SectorDecl> = Vec::new();
    let mut top_fns: Vec<&ast::FnDecl> = Vec::new();

    for it in &res.program.items {
        match it {
            ast::Item::Type(td) => types.push(lw.lower_type_decl(td)?),
            ast::Item::Const(cd) => {
                consts.push(lw.lower_value_decl(&cd.name, &cd.value, &cd.span)?)
            }
            ast::Item::Let(ld) => {
                globals.push(lw.lower_value_decl(&ld.name, &ld.value, &ld.span)?)
            }
            ast::Item::Need(nd) => {
                needs.push(lw.lower_value_decl(&nd.name, &nd.value, &nd.span)?)
            }
            ast::Item::Sector(sd) => sector_asts.push(sd),
            ast::Item::Handler(h) => top_handlers.push(h),
            ast::Item::Fn(fd) => top_fns.push(fd),
            // Patterns and any residual mixin machinery have no HIR form.
            _ => {}
        }
    }

    for sd in sector_asts {
        let sec = lw.lower_sector(sd)?;
        sector_order.push(sec.sym);
        sectors_by_sym.insert(sec.sym, sec);
    }

    if !top_handlers.is_empty() {
        let main_sector = res
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Sector && s.name == "main")
            .map(|s| s.id);
        let Some(main_sector) = main_sector else {
            return Err(Diagnostic::lower(
                "Missing main sector symbol",
                res.program.span.clone(),
            ));
        };

        if !sectors_by_sym.contains_key(&main_sector) {
            sector_order.push(main_sector);
            sectors_by_sym.insert(
                main_sector,
                hir::SectorDecl {
                    sym: main_sector,
                    fns: Vec::new(),
                    handlers: Vec::new(),
                    lets: Vec::new(),
                    needs: Vec::new(),
                    span: res.program.span.clone(),
                },
            );
        }
        for h in top_handlers {
            let handler = lw.lower_handler(h)?;
            sectors_by_sym
                .get_mut(&main_sector)
                .expect("main sector installed above")
                .handlers
                .push(handler);
        }
    }

    let mut program_fns: Vec<hir::FnDecl> = Vec::new();
    for fd in top_fns {
        let fn_sym = lw.sym_of_ident(&fd.name)?;
        let owner = res.symbols.get(fn_sym).data.sector;
        let hfn = lw.lower_fn(fd, owner)?;
        match owner {
            Some(owner) => {
                if !sectors_by_sym.contains_key(&owner) {
                    sector_order.push(owner);
                    sectors_by_sym.insert(
                        owner,
                        hir::SectorDecl {
                            sym: owner,
                            fns: Vec::new(),
                            handlers: Vec::new(),
                            lets: Vec::new(),
                            needs: Vec::new(),
                            span: fd.span.clone(),
                        },
                    );
                }
                sectors_by_sym
                    .get_mut(&owner)
                    .expect("sector installed above")
                    .fns
                    .push(hfn);
            }
            None => program_fns.push(hfn),
        }
    }

    let sectors: Vec<hir::SectorDecl> = sector_order
        .into_iter()
        .filter_map(|sym| sectors_by_sym.remove(&sym))
        .collect();

    Ok(hir::Program {
        types,
        consts,
        globals,
        needs,
        fns: program_fns,
        sectors,
        run: res.program.run.is_some(),
        span: res.program.span.clone(),
    })
}

struct Lowerer<'a> {
    res: &'a Resolution,
    type_by_name: HashMap<String, TypeId>,
    ctor_by_name: HashMap<String, SymbolId>,
    next_sym: u32,
    in_handler: bool,
    try_mode: TryMode,
}

type Lowered = (Vec<hir::Stmt>, hir::Expr);

impl<'a> Lowerer<'a> {
    fn fresh_sym(&mut self) -> SymbolId {
        let sid = SymbolId::from_raw(self.next_sym);
        self.next_sym += 1;
        sid
    }

    fn sym_of_ident(&self, ident: &ast::Ident) -> Result<SymbolId, Diagnostic> {
        self.res
            .ident_to_symbol
            .get(&ident.id)
            .copied()
            .ok_or_else(|| {
                Diagnostic::resolve(
                    format!("Unresolved identifier: {}", ident.name),
                    ident.span.clone(),
                )
            })
    }

    fn type_of_qname(&self, qn: &ast::QualifiedName) -> Result<TypeId, Diagnostic> {
        if let Some(&tid) = self.res.typename_to_symbol.get(&qn.id) {
            return Ok(tid);
        }
        let name = qn.dotted();
        self.type_by_name.get(&name).copied().ok_or_else(|| {
            Diagnostic::resolve(format!("Unknown type: {}", name), qn.span.clone())
        })
    }

    fn ctor_of_name(&self, name: &str, span: &Span) -> Result<SymbolId, Diagnostic> {
        self.ctor_by_name.get(name).copied().ok_or_else(|| {
            Diagnostic::lower(format!("Unknown ctor: {}", name), span.clone())
        })
    }

    fn var(&self, sym: SymbolId, span: &Span) -> hir::Expr {
        hir::Expr::Var {
            sym,
            span: span.clone(),
        }
    }

    // ---------------- declarations ----------------

    fn lower_type_decl(&mut self, td: &ast::TypeDecl) -> Result<hir::TypeDecl, Diagnostic> {
        let sym = self.type_of_qname(&td.name)?;
        let rhs = match &td.rhs {
            ast::TypeRhs::Alias(target) => hir::TypeRhs::Alias {
                target: self.lower_type_ref(target)?,
                span: target.span().clone(),
            },
            ast::TypeRhs::Record(rec) => {
                let mut fields = Vec::new();
                for f in &rec.fields {
                    fields.push(hir::FieldDecl {
                        name: f.name.name.clone(),
                        ty: self.lower_type_ref(&f.ty)?,
                        span: f.span.clone(),
                    });
                }
                hir::TypeRhs::Record {
                    fields,
                    span: rec.span.clone(),
                }
            }
            ast::TypeRhs::Sum(sum) => {
                let mut variants = Vec::new();
                for v in &sum.variants {
                    let ctor = match self.ctor_by_name.get(&v.name.name).copied() {
                        Some(c) => c,
                        None => {
                            // User-shadowed constructor name: fall back to a
                            // table scan, then to a fresh id.
                            let scan = self
                                .res
                                .symbols
                                .iter()
                                .find(|s| s.kind == SymbolKind::Ctor && s.name == v.name.name)
                                .map(|s| s.id);
                            match scan {
                                Some(c) => c,
                                None => self.fresh_sym(),
                            }
                        }
                    };
                    let payload = match &v.payload {
                        Some(ts) if !ts.is_empty() => {
                            let mut out = Vec::new();
                            for t in ts {
                                out.push(self.lower_type_ref(t)?);
                            }
                            Some(out)
                        }
                        _ => None,
                    };
                    variants.push(hir::VariantDecl {
                        ctor,
                        payload,
                        span: v.span.clone(),
                    });
                }
                hir::TypeRhs::Sum {
                    variants,
                    span: sum.span.clone(),
                }
            }
        };
        Ok(hir::TypeDecl {
            sym,
            rhs,
            span: td.span.clone(),
        })
    }

    fn lower_type_ref(&mut self, tr: &ast::TypeRef) -> Result<hir::TypeRef, Diagnostic> {
        match tr {
            ast::TypeRef::Paren(inner, _) => self.lower_type_ref(inner),
            ast::TypeRef::Name(tn) => {
                let base = self.type_of_qname(&tn.name)?;
                match &tn.args {
                    Some(args) if !args.is_empty() => {
                        let mut out = Vec::new();
                        for a in args {
                            out.push(self.lower_type_ref(a)?);
                        }
                        Ok(hir::TypeRef::App {
                            base,
                            args: out,
                            span: tn.span.clone(),
                        })
                    }
                    _ => Ok(hir::TypeRef::Name {
                        id: base,
                        span: tn.span.clone(),
                    }),
                }
            }
        }
    }

    fn lower_value_decl(
        &mut self,
        name: &ast::Ident,
        value: &ast::Expr,
        span: &Span,
    ) -> Result<hir::ValueDecl, Diagnostic> {
        let sym = self.sym_of_ident(name)?;
        let (stmts, expr) = self.lower_expr(value)?;
        if !stmts.is_empty() {
            return Err(Diagnostic::lower(
                "Top-level initializer cannot contain control-flow sugar",
                span.clone(),
            ));
        }
        Ok(hir::ValueDecl {
            sym,
            expr,
            span: span.clone(),
        })
    }

    fn lower_sector(&mut self, sd: &ast::SectorDecl) -> Result<hir::SectorDecl, Diagnostic> {
        let sym = self.sym_of_ident(&sd.name)?;
        let mut lets = Vec::new();
        let mut needs = Vec::new();
        let mut fns = Vec::new();
        let mut handlers = Vec::new();

        for it in &sd.items {
            match it {
                ast::SectorItem::Let(ld) => {
                    lets.push(self.lower_value_decl(&ld.name, &ld.value, &ld.span)?)
                }
                ast::SectorItem::Need(nd) => {
                    needs.push(self.lower_value_decl(&nd.name, &nd.value, &nd.span)?)
                }
                ast::SectorItem::Fn(fd) => fns.push(self.lower_fn(fd, Some(sym))?),
                ast::SectorItem::Handler(h) => handlers.push(self.lower_handler(h)?),
            }
        }

        Ok(hir::SectorDecl {
            sym,
            fns,
            handlers,
            lets,
            needs,
            span: sd.span.clone(),
        })
    }

    fn lower_handler(&mut self, h: &ast::OnHandler) -> Result<hir::HandlerDecl, Diagnostic> {
        let handler_sym = match self.res.handler_to_symbol.get(&h.id).copied() {
            Some(s) => s,
            None => self.fresh_sym(),
        };

        let event_type = self.type_of_qname(h.event.name())?;

        let binder = match &h.binder {
            Some(b) => Some(self.sym_of_ident(b)?),
            None => None,
        };

        let saved = (self.in_handler, self.try_mode);
        self.in_handler = true;
        self.try_mode = TryMode::Handler;

        let result = (|| {
            let when = match &h.when {
                Some(w) => {
                    let (stmts, expr) = self.lower_expr(w)?;
                    if !stmts.is_empty() {
                        return Err(Diagnostic::lower(
                            "when guard cannot contain try-suffix",
                            w.span().clone(),
                        ));
                    }
                    Some(expr)
                }
                None => None,
            };

            let body = match &h.body {
                ast::HandlerBody::Expr(e) => {
                    let (mut stmts, expr) = self.lower_expr(e)?;
                    let espan = e.span().clone();
                    stmts.push(hir::Stmt::Expr(expr, espan));
                    hir::Block {
                        stmts,
                        span: h.span.clone(),
                    }
                }
                ast::HandlerBody::Do(block, _) => self.lower_block(block)?,
            };

            Ok(hir::HandlerDecl {
                sym: handler_sym,
                event_type,
                binder,
                when,
                body,
                span: h.span.clone(),
            })
        })();

        self.in_handler = saved.0;
        self.try_mode = saved.1;
        result
    }

    fn lower_fn(
        &mut self,
        fd: &ast::FnDecl,
        owner_sector: Option<SymbolId>,
    ) -> Result<hir::FnDecl, Diagnostic> {
        let sym = self.sym_of_ident(&fd.name)?;

        // Try-suffix propagation mode follows the declared return type head.
        let mode = match &fd.ret_type {
            Some(ast::TypeRef::Name(tn)) => match tn.name.dotted().as_str() {
                "Result" => TryMode::Result,
                "Option" => TryMode::Option,
                _ => TryMode::Forbid,
            },
            _ => TryMode::Forbid,
        };

        let saved = (self.in_handler, self.try_mode);
        self.in_handler = false;
        self.try_mode = mode;

        let result = (|| {
            let mut params = Vec::new();
            for p in &fd.params {
                params.push(hir::Param {
                    sym: self.sym_of_ident(&p.name)?,
                    ty: self.lower_type_ref(&p.ty)?,
                    kind: match p.kind {
                        ast::ParamKind::Normal => hir::ParamKind::Normal,
                        ast::ParamKind::Varargs => hir::ParamKind::Varargs,
                        ast::ParamKind::Varkw => hir::ParamKind::Varkw,
                    },
                    span: p.span.clone(),
                });
            }
            let ret_type = match &fd.ret_type {
                Some(t) => Some(self.lower_type_ref(t)?),
                None => None,
            };

            let body = match &fd.body {
                ast::FnBody::Expr(e) => {
                    let (mut stmts, expr) = self.lower_expr(e)?;
                    let espan = e.span().clone();
                    stmts.push(hir::Stmt::Return(expr, espan));
                    hir::Block {
                        stmts,
                        span: fd.body.span().clone(),
                    }
                }
                ast::FnBody::Do(block, _) => self.lower_block(block)?,
            };

            Ok(hir::FnDecl {
                sym,
                owner_sector,
                params,
                ret_type,
                body,
                span: fd.span.clone(),
            })
        })();

        self.in_handler = saved.0;
        self.try_mode = saved.1;
        result
    }

    // ---------------- statements ----------------

    fn lower_block(&mut self, b: &ast::Block) -> Result<hir::Block, Diagnostic> {
        let mut out: Vec<hir::Stmt> = Vec::new();
        for st in &b.stmts {
            out.extend(self.lower_stmt(st)?);
        }
        Ok(hir::Block {
            stmts: out,
            span: b.span.clone(),
        })
    }

    fn lower_stmt(&mut self, st: &ast::Stmt) -> Result<Vec<hir::Stmt>, Diagnostic> {
        match st {
            ast::Stmt::Let(l) => {
                let sym = self.sym_of_ident(&l.name)?;
                let (mut pre, expr) = self.lower_expr(&l.value)?;
                pre.push(hir::Stmt::Let(hir::LetStmt {
                    sym,
                    expr,
                    span: l.span.clone(),
                }));
                Ok(pre)
            }
            ast::Stmt::Assign(a) => {
                let (mut pre, lv) = self.lower_lvalue(&a.target)?;
                let (pre2, expr) = self.lower_expr(&a.value)?;
                pre.extend(pre2);
                pre.push(hir::Stmt::Assign(hir::AssignStmt {
                    target: lv,
                    op: a.op,
                    expr,
                    span: a.span.clone(),
                }));
                Ok(pre)
            }
            ast::Stmt::Emit(e, span) => {
                let (mut pre, expr) = self.lower_expr(e)?;
                pre.push(hir::Stmt::Emit(expr, span.clone()));
                Ok(pre)
            }
            ast::Stmt::Return(e, span) => {
                let (mut pre, expr) = self.lower_expr(e)?;
                pre.push(hir::Stmt::Return(expr, span.clone()));
                Ok(pre)
            }
            ast::Stmt::Expr(e, span) => {
                let (mut pre, expr) = self.lower_expr(e)?;
                pre.push(hir::Stmt::Expr(expr, span.clone()));
                Ok(pre)
            }
            ast::Stmt::Stop(span) => Ok(vec![hir::Stmt::Stop(span.clone())]),
            ast::Stmt::Yield(span) => Ok(vec![hir::Stmt::Yield(span.clone())]),
            ast::Stmt::If(i) => {
                let (mut pre, cond) = self.lower_expr(&i.cond)?;
                let then_block = self.lower_block(&i.then_block)?;
                let else_block = match &i.else_block {
                    Some(b) => Some(self.lower_block(b)?),
                    None => None,
                };
                pre.push(hir::Stmt::If(hir::IfStmt {
                    cond,
                    then_block,
                    else_block,
                    span: i.span.clone(),
                }));
                Ok(pre)
            }
            ast::Stmt::For(f) => {
                let (mut pre, iterable) = self.lower_expr(&f.iterable)?;
                let binder = self.sym_of_ident(&f.binder)?;
                let body = self.lower_block(&f.body)?;
                pre.push(hir::Stmt::For(hir::ForStmt {
                    binder,
                    iterable,
                    body,
                    span: f.span.clone(),
                }));
                Ok(pre)
            }
        }
    }

    fn lower_lvalue(
        &mut self,
        lv: &ast::LValue,
    ) -> Result<(Vec<hir::Stmt>, hir::LValue), Diagnostic> {
        match lv {
            ast::LValue::Var(ident) => Ok((
                Vec::new(),
                hir::LValue::Var {
                    sym: self.sym_of_ident(ident)?,
                    span: ident.span.clone(),
                },
            )),
            ast::LValue::Member { object, field, span } => {
                let (pre, obj) = self.lower_expr(object)?;
                Ok((
                    pre,
                    hir::LValue::Member {
                        object: Box::new(obj),
                        field: field.name.clone(),
                        span: span.clone(),
                    },
                ))
            }
            ast::LValue::Index { object, index, span } => {
                let (mut pre, obj) = self.lower_expr(object)?;
                let (pre2, idx) = self.lower_expr(index)?;
                pre.extend(pre2);
                Ok((
                    pre,
                    hir::LValue::Index {
                        object: Box::new(obj),
                        index: Box::new(idx),
                        span: span.clone(),
                    },
                ))
            }
        }
    }

    // ---------------- expressions ----------------

    fn lower_expr(&mut self, e: &ast::Expr) -> Result<Lowered, Diagnostic> {
        match e {
            ast::Expr::Lit(l) => Ok((
                Vec::new(),
                hir::Expr::Lit(hir::Literal {
                    lit: l.lit.clone(),
                    span: l.span.clone(),
                }),
            )),
            ast::Expr::Var(ident) => {
                let sym = self.sym_of_ident(ident)?;
                Ok((Vec::new(), self.var(sym, &ident.span)))
            }
            ast::Expr::Record(r) => {
                let mut pre = Vec::new();
                let mut items = Vec::new();
                for it in &r.items {
                    let (p, v) = self.lower_expr(&it.value)?;
                    pre.extend(p);
                    items.push(hir::RecordItem {
                        key: it.key.name.clone(),
                        value: v,
                        span: it.span.clone(),
                    });
                }
                Ok((
                    pre,
                    hir::Expr::Record(hir::RecordLit {
                        items,
                        span: r.span.clone(),
                    }),
                ))
            }
            ast::Expr::Tuple(t) => {
                let mut pre = Vec::new();
                let mut items = Vec::new();
                for it in &t.items {
                    let (p, v) = self.lower_expr(it)?;
                    pre.extend(p);
                    items.push(v);
                }
                Ok((
                    pre,
                    hir::Expr::Tuple(hir::TupleLit {
                        items,
                        span: t.span.clone(),
                    }),
                ))
            }
            ast::Expr::Call(c) => {
                let (mut pre, callee) = self.lower_expr(&c.callee)?;
                let mut args = Vec::new();
                for a in &c.args {
                    match a {
                        ast::CallArg::Pos { value, span } => {
                            let (p, v) = self.lower_expr(value)?;
                            pre.extend(p);
                            args.push(hir::CallArg::Pos {
                                value: v,
                                span: span.clone(),
                            });
                        }
                        ast::CallArg::Star { value, span } => {
                            let (p, v) = self.lower_expr(value)?;
                            pre.extend(p);
                            args.push(hir::CallArg::Star {
                                value: v,
                                span: span.clone(),
                            });
                        }
                        ast::CallArg::Kw { name, value, span } => {
                            let (p, v) = self.lower_expr(value)?;
                            pre.extend(p);
                            args.push(hir::CallArg::Kw {
                                name: name.name.clone(),
                                value: v,
                                span: span.clone(),
                            });
                        }
                        ast::CallArg::StarStar { value, span } => {
                            let (p, v) = self.lower_expr(value)?;
                            pre.extend(p);
                            args.push(hir::CallArg::StarStar {
                                value: v,
                                span: span.clone(),
                            });
                        }
                    }
                }
                Ok((
                    pre,
                    hir::Expr::Call(hir::CallExpr {
                        callee: Box::new(callee),
                        args,
                        span: c.span.clone(),
                    }),
                ))
            }
            ast::Expr::Member(m) => {
                // A field bound by the resolver is a namespaced reference
                // (std.option.unwrapOr), not record member access.
                if let Some(&sym) = self.res.ident_to_symbol.get(&m.field.id) {
                    return Ok((Vec::new(), self.var(sym, &m.field.span)));
                }
                let (pre, obj) = self.lower_expr(&m.object)?;
                Ok((
                    pre,
                    hir::Expr::Member(hir::MemberExpr {
                        object: Box::new(obj),
                        field: m.field.name.clone(),
                        span: m.span.clone(),
                    }),
                ))
            }
            ast::Expr::Index(ix) => {
                let (mut pre, obj) = self.lower_expr(&ix.object)?;
                let (pre2, idx) = self.lower_expr(&ix.index)?;
                pre.extend(pre2);
                Ok((
                    pre,
                    hir::Expr::Index(hir::IndexExpr {
                        object: Box::new(obj),
                        index: Box::new(idx),
                        span: ix.span.clone(),
                    }),
                ))
            }
            ast::Expr::Unary(u) => {
                let (pre, inner) = self.lower_expr(&u.expr)?;
                Ok((
                    pre,
                    hir::Expr::Unary(hir::UnaryExpr {
                        op: u.op.clone(),
                        expr: Box::new(inner),
                        span: u.span.clone(),
                    }),
                ))
            }
            ast::Expr::Binary(b) => {
                let (mut pre, left) = self.lower_expr(&b.left)?;
                let (pre2, right) = self.lower_expr(&b.right)?;
                pre.extend(pre2);
                Ok((
                    pre,
                    hir::Expr::Binary(hir::BinaryExpr {
                        op: b.op.clone(),
                        left: Box::new(left),
                        right: Box::new(right),
                        span: b.span.clone(),
                    }),
                ))
            }
            ast::Expr::Pipe(p) => {
                let (pre, head) = self.lower_expr(&p.head)?;
                if !pre.is_empty() {
                    return Err(Diagnostic::lower(
                        "Pipe head cannot contain try-suffix",
                        p.span.clone(),
                    ));
                }
                let mut cur = head;
                for stage in &p.stages {
                    cur = self.lower_pipe_stage(cur, stage)?;
                }
                Ok((Vec::new(), cur))
            }
            ast::Expr::Match(m) => self.lower_match(m),
            ast::Expr::Await(a) => {
                let type_id = self.type_of_qname(&a.event_type)?;
                Ok((
                    Vec::new(),
                    hir::Expr::AwaitEvent {
                        type_id,
                        span: a.span.clone(),
                    },
                ))
            }
            ast::Expr::Rpc(rc) => self.lower_sector_call(rc, true),
            ast::Expr::CallSector(rc) => self.lower_sector_call(rc, false),
            ast::Expr::TrySuffix(t) => self.lower_try_suffix(t),
            ast::Expr::Proceed(p) => Err(Diagnostic::lower(
                "proceed() cannot appear outside mixin weaving",
                p.span.clone(),
            )),
        }
    }

    fn lower_sector_call(
        &mut self,
        rc: &ast::SectorCallExpr,
        await_result: bool,
    ) -> Result<Lowered, Diagnostic> {
        let sector = self.sym_of_ident(&rc.sector)?;
        let target = self.sym_of_ident(&rc.fn_name)?;
        let mut pre = Vec::new();
        let mut args = Vec::new();
        for a in &rc.args {
            let (p, v) = self.lower_expr(a)?;
            pre.extend(p);
            args.push(v);
        }
        Ok((
            pre,
            hir::Expr::RpcCall(hir::RpcCallExpr {
                sector,
                target,
                args,
                await_result,
                span: rc.span.clone(),
            }),
        ))
    }

    fn lower_match(&mut self, m: &ast::MatchExpr) -> Result<Lowered, Diagnostic> {
        let (pre_scrut, scrut) = self.lower_expr(&m.scrutinee)?;

        let any_block = m
            .arms
            .iter()
            .any(|a| matches!(a.body, ast::MatchArmBody::Do(_, _)));
        let mut any_sugar = false;
        let mut arms_expr: Vec<hir::MatchArmExpr> = Vec::new();
        if !any_block {
            for arm in &m.arms {
                let ast::MatchArmBody::Expr(body) = &arm.body else {
                    unreachable!("no block arms on this path");
                };
                let (p, b) = self.lower_expr(body)?;
                if !p.is_empty() {
                    any_sugar = true;
                    break;
                }
                arms_expr.push(hir::MatchArmExpr {
                    pat: self.lower_pattern(&arm.pat)?,
                    body: b,
                    span: arm.span.clone(),
                });
            }
            if !any_sugar {
                return Ok((
                    pre_scrut,
                    hir::Expr::Match(hir::MatchExpr {
                        scrutinee: Box::new(scrut),
                        arms: arms_expr,
                        span: m.span.clone(),
                    }),
                ));
            }
        }

        // Block arms (or sugar inside an arm) force the statement form:
        //   let tmp = <scrut>
        //   let res = undef
        //   match tmp: pat -> { ...; res = <value> }
        // ...and the expression reads `res` back.
        let span = &m.span;
        let tmp = self.fresh_sym();
        let res_sym = self.fresh_sym();

        let mut out: Vec<hir::Stmt> = pre_scrut;
        out.push(hir::Stmt::Let(hir::LetStmt {
            sym: tmp,
            expr: scrut,
            span: span.clone(),
        }));
        out.push(hir::Stmt::Let(hir::LetStmt {
            sym: res_sym,
            expr: hir::Expr::Undef { span: span.clone() },
            span: span.clone(),
        }));

        let mut arms_stmt: Vec<hir::MatchArmStmt> = Vec::new();
        for arm in &m.arms {
            let blk = match &arm.body {
                ast::MatchArmBody::Do(block, _) => {
                    let mut blk = self.lower_block(block)?;
                    // The trailing expression statement, if any, becomes the
                    // arm's result.
                    if let Some(hir::Stmt::Expr(_, _)) = blk.stmts.last() {
                        let Some(hir::Stmt::Expr(last, last_span)) = blk.stmts.pop() else {
                            unreachable!();
                        };
                        blk.stmts.push(hir::Stmt::Assign(hir::AssignStmt {
                            target: hir::LValue::Var {
                                sym: res_sym,
                                span: last_span.clone(),
                            },
                            op: ast::AssignOp::Set,
                            expr: last,
                            span: last_span,
                        }));
                    }
                    blk
                }
                ast::MatchArmBody::Expr(body) => {
                    let (mut pre_arm, expr) = self.lower_expr(body)?;
                    pre_arm.push(hir::Stmt::Assign(hir::AssignStmt {
                        target: hir::LValue::Var {
                            sym: res_sym,
                            span: arm.span.clone(),
                        },
                        op: ast::AssignOp::Set,
                        expr,
                        span: arm.span.clone(),
                    }));
                    hir::Block {
                        stmts: pre_arm,
                        span: arm.span.clone(),
                    }
                }
            };
            arms_stmt.push(hir::MatchArmStmt {
                pat: self.lower_pattern(&arm.pat)?,
                body: blk,
                span: arm.span.clone(),
            });
        }

        out.push(hir::Stmt::Match(hir::MatchStmt {
            scrutinee: self.var(tmp, span),
            arms: arms_stmt,
            span: span.clone(),
        }));
        Ok((out, self.var(res_sym, span)))
    }

    fn lower_pipe_stage(
        &mut self,
        prev: hir::Expr,
        stage: &ast::Expr,
    ) -> Result<hir::Expr, Diagnostic> {
        match stage {
            ast::Expr::Var(ident) => {
                let sym = self.sym_of_ident(ident)?;
                let callee = self.var(sym, &ident.span);
                Ok(hir::Expr::Call(hir::CallExpr {
                    callee: Box::new(callee),
                    args: vec![hir::CallArg::Pos {
                        value: prev,
                        span: ident.span.clone(),
                    }],
                    span: ident.span.clone(),
                }))
            }
            ast::Expr::Member(_) => {
                let (pre, m) = self.lower_expr(stage)?;
                if !pre.is_empty() {
                    return Err(Diagnostic::lower(
                        "Pipe stage cannot contain try-suffix",
                        stage.span().clone(),
                    ));
                }
                Ok(hir::Expr::Call(hir::CallExpr {
                    callee: Box::new(m),
                    args: vec![hir::CallArg::Pos {
                        value: prev,
                        span: stage.span().clone(),
                    }],
                    span: stage.span().clone(),
                }))
            }
            ast::Expr::Call(c) => {
                let (pre, callee) = self.lower_expr(&c.callee)?;
                if !pre.is_empty() {
                    return Err(Diagnostic::lower(
                        "Pipe stage callee cannot contain try-suffix",
                        c.span.clone(),
                    ));
                }
                let mut args: Vec<hir::CallArg> = vec![hir::CallArg::Pos {
                    value: prev,
                    span: c.span.clone(),
                }];
                for a in &c.args {
                    let (ap, av) = self.lower_expr(a.value())?;
                    if !ap.is_empty() {
                        return Err(Diagnostic::lower(
                            "Pipe stage args cannot contain try-suffix",
                            a.span().clone(),
                        ));
                    }
                    args.push(match a {
                        ast::CallArg::Pos { span, .. } => hir::CallArg::Pos {
                            value: av,
                            span: span.clone(),
                        },
                        ast::CallArg::Star { span, .. } => hir::CallArg::Star {
                            value: av,
                            span: span.clone(),
                        },
                        ast::CallArg::Kw { name, span, .. } => hir::CallArg::Kw {
                            name: name.name.clone(),
                            value: av,
                            span: span.clone(),
                        },
                        ast::CallArg::StarStar { span, .. } => hir::CallArg::StarStar {
                            value: av,
                            span: span.clone(),
                        },
                    });
                }
                Ok(hir::Expr::Call(hir::CallExpr {
                    callee: Box::new(callee),
                    args,
                    span: c.span.clone(),
                }))
            }
            _ => Err(Diagnostic::lower(
                "PipeStageError",
                stage.span().clone(),
            )),
        }
    }

    fn lower_try_suffix(&mut self, e: &ast::TrySuffixExpr) -> Result<Lowered, Diagnostic> {
        if self.try_mode == TryMode::Forbid {
            return Err(Diagnostic::lower(
                "TrySuffix not allowed here (unknown propagation boundary)",
                e.span.clone(),
            ));
        }

        let (pre, inner) = self.lower_expr(&e.inner)?;
        let span = &e.span;

        let tmp = self.fresh_sym();
        let res_sym = self.fresh_sym();

        let mut stmts: Vec<hir::Stmt> = pre;
        stmts.push(hir::Stmt::Let(hir::LetStmt {
            sym: tmp,
            expr: inner,
            span: span.clone(),
        }));
        stmts.push(hir::Stmt::Let(hir::LetStmt {
            sym: res_sym,
            expr: hir::Expr::Undef { span: span.clone() },
            span: span.clone(),
        }));

        let assign_res = |sym: SymbolId, value: hir::Expr| {
            hir::Stmt::Assign(hir::AssignStmt {
                target: hir::LValue::Var {
                    sym,
                    span: span.clone(),
                },
                op: ast::AssignOp::Set,
                expr: value,
                span: span.clone(),
            })
        };

        match self.try_mode {
            TryMode::Option => {
                let some_ctor = self.ctor_of_name("Some", span)?;
                let none_ctor = self.ctor_of_name("None", span)?;
                let v_sym = self.fresh_sym();

                let some_arm = hir::MatchArmStmt {
                    pat: hir::Pattern::Ctor {
                        ctor: some_ctor,
                        args: Some(vec![hir::Pattern::Var {
                            sym: v_sym,
                            span: span.clone(),
                        }]),
                        span: span.clone(),
                    },
                    body: hir::Block {
                        stmts: vec![assign_res(res_sym, self.var(v_sym, span))],
                        span: span.clone(),
                    },
                    span: span.clone(),
                };

                let none_value = hir::Expr::Call(hir::CallExpr {
                    callee: Box::new(self.var(none_ctor, span)),
                    args: Vec::new(),
                    span: span.clone(),
                });
                let none_arm = hir::MatchArmStmt {
                    pat: hir::Pattern::Ctor {
                        ctor: none_ctor,
                        args: None,
                        span: span.clone(),
                    },
                    body: hir::Block {
                        stmts: vec![hir::Stmt::Return(none_value, span.clone())],
                        span: span.clone(),
                    },
                    span: span.clone(),
                };

                stmts.push(hir::Stmt::Match(hir::MatchStmt {
                    scrutinee: self.var(tmp, span),
                    arms: vec![some_arm, none_arm],
                    span: span.clone(),
                }));
            }
            TryMode::Result | TryMode::Handler => {
                let ok_ctor = self.ctor_of_name("Ok", span)?;
                let err_ctor = self.ctor_of_name("Err", span)?;
                let v_sym = self.fresh_sym();
                let e_sym = self.fresh_sym();

                let ok_arm = hir::MatchArmStmt {
                    pat: hir::Pattern::Ctor {
                        ctor: ok_ctor,
                        args: Some(vec![hir::Pattern::Var {
                            sym: v_sym,
                            span: span.clone(),
                        }]),
                        span: span.clone(),
                    },
                    body: hir::Block {
                        stmts: vec![assign_res(res_sym, self.var(v_sym, span))],
                        span: span.clone(),
                    },
                    span: span.clone(),
                };

                let err_body = if self.try_mode == TryMode::Result {
                    let err_expr = hir::Expr::Call(hir::CallExpr {
                        callee: Box::new(self.var(err_ctor, span)),
                        args: vec![hir::CallArg::Pos {
                            value: self.var(e_sym, span),
                            span: span.clone(),
                        }],
                        span: span.clone(),
                    });
                    vec![hir::Stmt::Return(err_expr, span.clone())]
                } else {
                    vec![hir::Stmt::AbortHandler(
                        Some(self.var(e_sym, span)),
                        span.clone(),
                    )]
                };
                let err_arm = hir::MatchArmStmt {
                    pat: hir::Pattern::Ctor {
                        ctor: err_ctor,
                        args: Some(vec![hir::Pattern::Var {
                            sym: e_sym,
                            span: span.clone(),
                        }]),
                        span: span.clone(),
                    },
                    body: hir::Block {
                        stmts: err_body,
                        span: span.clone(),
                    },
                    span: span.clone(),
                };

                stmts.push(hir::Stmt::Match(hir::MatchStmt {
                    scrutinee: self.var(tmp, span),
                    arms: vec![ok_arm, err_arm],
                    span: span.clone(),
                }));
            }
            TryMode::Forbid => unreachable!("checked above"),
        }

        Ok((stmts, self.var(res_sym, span)))
    }

    fn lower_pattern(&mut self, p: &ast::Pattern) -> Result<hir::Pattern, Diagnostic> {
        match p {
            ast::Pattern::Wildcard(span) => Ok(hir::Pattern::Wildcard(span.clone())),
            ast::Pattern::Bool(v, span) => Ok(hir::Pattern::Bool(*v, span.clone())),
            ast::Pattern::Var(ident) => Ok(hir::Pattern::Var {
                sym: self.sym_of_ident(ident)?,
                span: ident.span.clone(),
            }),
            ast::Pattern::Ctor(ctor) => {
                let name = ctor.name.dotted();

                if ctor.args.is_none() && self.res.pattern_aliases.contains_key(&name) {
                    let expanded =
                        expand_pattern_alias(&name, &self.res.pattern_aliases, &ctor.span)
                            .map_err(|d| {
                                Diagnostic::lower(d.message, d.span)
                            })?;
                    return self.lower_pattern(&expanded);
                }

                let sym = match self.ctor_by_name.get(&name).copied() {
                    Some(s) => Some(s),
                    // Qualified constructors may be referenced by their
                    // final segment.
                    None => self
                        .ctor_by_name
                        .get(&ctor.name.parts[ctor.name.parts.len() - 1].name)
                        .copied(),
                };
                let Some(sym) = sym else {
                    return Err(Diagnostic::lower(
                        format!("Unknown constructor: {}", name),
                        ctor.span.clone(),
                    ));
                };
                let args = match &ctor.args {
                    Some(list) if !list.is_empty() => {
                        let mut out = Vec::new();
                        for a in list {
                            out.push(self.lower_pattern(a)?);
                        }
                        Some(out)
                    }
                    _ => None,
                };
                Ok(hir::Pattern::Ctor {
                    ctor: sym,
                    args,
                    span: ctor.span.clone(),
                })
            }
        }
    }
}
