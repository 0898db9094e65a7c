//! Bidirectional type and effect checking over the HIR.
//!
//! Types are constructors (`Con`), applications (`App`), tuples,
//! generalized type parameters (`Gen`, one per declared type parameter) and
//! unification metavariables (`Meta`). Meta bindings live in a side table
//! with path compression; record-field constraints accumulated against a
//! meta live in a second table and are reconciled when the meta meets a
//! concrete record head. Schemes are instantiated per call site by
//! replacing every `Gen` with a fresh meta; generalization is implicit per
//! top-level declaration.
//!
//! Effects are two-level: every expression is `pure` or `sector(S)`.
//! Joining two different sectors in one expression is an error, as is any
//! sector effect reaching a pure context. The checker is read-only over
//! the HIR and fails fast at the first offending span.

use crate::diagnostics::Diagnostic;
use crate::hir;
use crate::resolve::Resolution;
use crate::span::Span;
use crate::symbols::{Symbol, SymbolId, SymbolKind, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Ty {
    Con(TypeId),
    App(TypeId, Vec<Ty>),
    Tuple(Vec<Ty>),
    /// Generalized type parameter, identified by its parameter symbol.
    Gen(SymbolId),
    Meta(u32),
    /// A function value; the signature lives in `fn_sig`.
    Fn(SymbolId),
    /// A constructor value, callable.
    Ctor(SymbolId),
    /// Result of an index expression; opaque to unification.
    Index(Box<Ty>, Box<Ty>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Pure,
    Sector(SymbolId),
}

pub fn check_program(hir: &hir::Program, res: &Resolution) -> Result<(), Diagnostic> {
    let mut checker = Checker::new(hir, res);

    // Top-level const/let initializers must be pure; needs may do anything.
    for vd in hir.consts.iter().chain(hir.globals.iter()) {
        let (t, eff) = checker.infer_expr(&vd.expr, None)?;
        if eff != Effect::Pure {
            return Err(Diagnostic::effect(
                "top-level initializer must be pure",
                vd.span.clone(),
            ));
        }
        checker.global_env.insert(vd.sym, t);
    }
    for vd in &hir.needs {
        let (t, _) = checker.infer_expr(&vd.expr, None)?;
        checker.global_env.insert(vd.sym, t);
    }

    checker.snapshot_base();

    for fun in &hir.fns {
        checker.check_fn(fun, None)?;
    }

    for sec in &hir.sectors {
        // Sector `let`s live in sector state and are assignable from
        // handlers; record them in the global environment.
        for vd in &sec.lets {
            let (t, eff) = checker.infer_expr(&vd.expr, None)?;
            if eff != Effect::Pure {
                return Err(Diagnostic::effect(
                    "sector let initializer must be pure",
                    vd.span.clone(),
                ));
            }
            checker.global_env.insert(vd.sym, t);
        }
        for fun in &sec.fns {
            checker.check_fn(fun, Some(sec.sym))?;
        }
        for h in &sec.handlers {
            checker.check_handler(h, sec.sym)?;
        }
    }
    Ok(())
}

struct Checker<'a> {
    res: &'a Resolution,
    type_name_by_id: HashMap<TypeId, String>,
    type_id_by_name: HashMap<String, TypeId>,
    type_alias: HashMap<TypeId, (Vec<SymbolId>, Ty)>,
    fn_sig: HashMap<SymbolId, (Vec<Ty>, Ty)>,
    fn_param_meta: HashMap<SymbolId, Vec<(SymbolId, hir::ParamKind, Ty)>>,
    fn_tparams: HashMap<SymbolId, Vec<SymbolId>>,
    fn_effect: HashMap<SymbolId, Option<SymbolId>>,
    ctor_sig: HashMap<SymbolId, (Vec<SymbolId>, Vec<Ty>, Ty)>,
    record_fields: HashMap<TypeId, HashMap<String, Ty>>,

    next_meta: u32,
    current_sector: Option<SymbolId>,

    env: HashMap<SymbolId, Ty>,
    global_env: HashMap<SymbolId, Ty>,
    meta_bindings: HashMap<u32, Ty>,
    meta_record_fields: HashMap<u32, HashMap<String, Ty>>,

    // State captured after the top-level pass; each function and handler
    // body starts from this snapshot with its own metas and bindings.
    base_next_meta: u32,
    base_meta_record_fields: HashMap<u32, HashMap<String, Ty>>,
}

impl<'a> Checker<'a> {
    fn new(hir: &hir::Program, res: &'a Resolution) -> Self {
        let mut type_name_by_id = HashMap::new();
        let mut type_id_by_name = HashMap::new();
        for s in res.symbols.iter() {
            if s.kind == SymbolKind::Type {
                type_name_by_id.insert(s.id, s.name.clone());
                type_id_by_name.insert(s.name.clone(), s.id);
            }
        }

        let mut type_alias = HashMap::new();
        let mut ctor_sig = HashMap::new();
        let mut record_fields = HashMap::new();
        for td in &hir.types {
            let tps = table_tparams(res, td.sym);
            match &td.rhs {
                hir::TypeRhs::Alias { target, .. } => {
                    type_alias.insert(
                        td.sym,
                        (tps.clone(), lower_type_some(target, &tps)),
                    );
                }
                hir::TypeRhs::Sum { variants, .. } => {
                    let ret = if tps.is_empty() {
                        Ty::Con(td.sym)
                    } else {
                        Ty::App(td.sym, tps.iter().map(|&p| Ty::Gen(p)).collect())
                    };
                    for v in variants {
                        let pts: Vec<Ty> = v
                            .payload
                            .as_deref()
                            .unwrap_or(&[])
                            .iter()
                            .map(|t| lower_type_some(t, &tps))
                            .collect();
                        ctor_sig.insert(v.ctor, (tps.clone(), pts, ret.clone()));
                    }
                }
                hir::TypeRhs::Record { fields, .. } => {
                    let mut map = HashMap::new();
                    for f in fields {
                        map.insert(
                            f.name.clone(),
                            lower_type_some(&f.ty, &tps),
                        );
                    }
                    record_fields.insert(td.sym, map);
                }
            }
        }

        let mut fn_sig = HashMap::new();
        let mut fn_param_meta = HashMap::new();
        let mut fn_tparams = HashMap::new();
        let mut fn_effect = HashMap::new();

        let all_fns = hir
            .fns
            .iter()
            .map(|f| (f, f.owner_sector))
            .chain(
                hir.sectors
                    .iter()
                    .flat_map(|sec| sec.fns.iter().map(move |f| (f, Some(sec.sym)))),
            );
        for (fun, owner) in all_fns {
            let tps = table_tparams(res, fun.sym);
            if !tps.is_empty() {
                fn_tparams.insert(fun.sym, tps.clone());
            }
            let pts: Vec<Ty> = fun
                .params
                .iter()
                .map(|p| lower_type_some(&p.ty, &tps))
                .collect();
            let ret = lower_type_opt(&type_id_by_name, fun.ret_type.as_ref(), &tps);
            fn_sig.insert(fun.sym, (pts, ret));
            fn_param_meta.insert(
                fun.sym,
                fun.params
                    .iter()
                    .map(|p| {
                        (
                            p.sym,
                            p.kind,
                            lower_type_some(&p.ty, &tps),
                        )
                    })
                    .collect::<Vec<_>>(),
            );
            let eff = owner.or_else(|| table_sector(res, fun.sym));
            fn_effect.insert(fun.sym, eff);
        }

        Checker {
            res,
            type_name_by_id,
            type_id_by_name,
            type_alias,
            fn_sig,
            fn_param_meta,
            fn_tparams,
            fn_effect,
            ctor_sig,
            record_fields,
            next_meta: 1,
            current_sector: None,
            env: HashMap::new(),
            global_env: HashMap::new(),
            meta_bindings: HashMap::new(),
            meta_record_fields: HashMap::new(),
            base_next_meta: 1,
            base_meta_record_fields: HashMap::new(),
        }
    }

    fn snapshot_base(&mut self) {
        self.base_next_meta = self.next_meta;
        self.base_meta_record_fields = self.meta_record_fields.clone();
    }

    /// Safe symbol access: lowering synthesizes ids past the table for
    /// temporaries, and 0 is the fallback id for missing builtins.
    fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        if id.raw() == 0 || (id.raw() as usize) > self.res.symbols.len() {
            None
        } else {
            Some(self.res.symbols.get(id))
        }
    }

    fn builtin(&self, name: &str) -> TypeId {
        self.type_id_by_name
            .get(name)
            .copied()
            .unwrap_or(SymbolId::from_raw(0))
    }

    fn fresh_meta(&mut self) -> Ty {
        let m = self.next_meta;
        self.next_meta += 1;
        Ty::Meta(m)
    }

    fn enter_body(&mut self, sector: Option<SymbolId>) {
        self.env.clear();
        self.meta_bindings.clear();
        self.meta_record_fields = self.base_meta_record_fields.clone();
        self.next_meta = self.base_next_meta;
        self.current_sector = sector;
    }

    fn fn_owner_effect(&self, fn_sym: SymbolId, owner: Option<SymbolId>) -> Option<SymbolId> {
        owner.or_else(|| self.symbol(fn_sym).and_then(|s| s.data.sector))
    }

    fn check_fn(
        &mut self,
        fun: &hir::FnDecl,
        owner_sector: Option<SymbolId>,
    ) -> Result<(), Diagnostic> {
        let expected = self.fn_owner_effect(fun.sym, owner_sector);
        let tps = self.fn_tparams.get(&fun.sym).cloned().unwrap_or_default();

        self.enter_body(owner_sector);
        for p in &fun.params {
            let t = lower_type_some(&p.ty, &tps);
            self.env.insert(p.sym, t);
        }

        let expected_ret = lower_type_opt(&self.type_id_by_name, fun.ret_type.as_ref(), &tps);
        let eff = self.check_block(&fun.body, &expected_ret, false)?;

        match expected {
            None => {
                if eff != Effect::Pure {
                    return Err(Diagnostic::effect(
                        "pure function body has effects",
                        fun.span.clone(),
                    ));
                }
            }
            Some(sector) => {
                if let Effect::Sector(s) = eff {
                    if s != sector {
                        return Err(Diagnostic::effect(
                            "function body mixes sectors",
                            fun.span.clone(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_handler(
        &mut self,
        h: &hir::HandlerDecl,
        owner_sector: SymbolId,
    ) -> Result<(), Diagnostic> {
        self.enter_body(Some(owner_sector));
        if let Some(binder) = h.binder {
            self.env.insert(binder, Ty::Con(h.event_type));
        }
        if let Some(when) = &h.when {
            self.infer_expr(when, Some(&Ty::Con(self.builtin("Bool"))))?;
        }
        let unit = Ty::Con(self.builtin("Unit"));
        self.check_block(&h.body, &unit, true)?;
        Ok(())
    }

    fn check_block(
        &mut self,
        b: &hir::Block,
        expected_ret: &Ty,
        in_handler: bool,
    ) -> Result<Effect, Diagnostic> {
        let mut eff = Effect::Pure;
        for st in &b.stmts {
            let se = self.check_stmt(st, expected_ret, in_handler)?;
            eff = join_effect(eff, se, st.span())?;
        }
        Ok(eff)
    }

    fn check_stmt(
        &mut self,
        st: &hir::Stmt,
        expected_ret: &Ty,
        in_handler: bool,
    ) -> Result<Effect, Diagnostic> {
        match st {
            hir::Stmt::Let(l) => {
                let (t, e) = self.infer_expr(&l.expr, None)?;
                self.env.insert(l.sym, t);
                Ok(e)
            }
            hir::Stmt::Assign(a) => {
                let mut t_lhs: Option<Ty> = None;
                if let hir::LValue::Var { sym, .. } = &a.target {
                    t_lhs = self
                        .env
                        .get(sym)
                        .cloned()
                        .or_else(|| self.global_env.get(sym).cloned());
                    if t_lhs.is_none() {
                        return Err(Diagnostic::type_error(
                            "assign to unknown var",
                            a.span.clone(),
                        ));
                    }
                }
                let (t_rhs, e_rhs) = self.infer_expr(&a.expr, t_lhs.as_ref())?;
                if let Some(t_lhs) = t_lhs {
                    self.unify(&t_lhs, &t_rhs, &a.span)?;
                }
                Ok(e_rhs)
            }
            hir::Stmt::Emit(e, span) => {
                let Some(sector) = self.current_sector else {
                    return Err(Diagnostic::effect("emit outside sector", span.clone()));
                };
                let (t, _) = self.infer_expr(e, None)?;
                if !self.is_event_type(&t) {
                    return Err(Diagnostic::type_error(
                        "emit expects Event.* type",
                        span.clone(),
                    ));
                }
                Ok(Effect::Sector(sector))
            }
            hir::Stmt::Return(e, span) => {
                let (t, eff) = self.infer_expr(e, Some(expected_ret))?;
                self.unify(expected_ret, &t, span)?;
                Ok(eff)
            }
            hir::Stmt::AbortHandler(cause, span) => {
                if !in_handler {
                    return Err(Diagnostic::effect(
                        "abort_handler outside handler",
                        span.clone(),
                    ));
                }
                if let Some(cause) = cause {
                    self.infer_expr(cause, None)?;
                }
                Ok(Effect::Sector(
                    self.current_sector.unwrap_or(SymbolId::from_raw(0)),
                ))
            }
            hir::Stmt::Stop(span) | hir::Stmt::Yield(span) => {
                let Some(sector) = self.current_sector else {
                    return Err(Diagnostic::effect(
                        "stop/yield outside sector",
                        span.clone(),
                    ));
                };
                Ok(Effect::Sector(sector))
            }
            hir::Stmt::Expr(e, _) => {
                let (_, eff) = self.infer_expr(e, None)?;
                Ok(eff)
            }
            hir::Stmt::If(i) => {
                let bool_t = Ty::Con(self.builtin("Bool"));
                let (t_cond, e_cond) = self.infer_expr(&i.cond, Some(&bool_t))?;
                self.unify(&bool_t, &t_cond, &i.span)?;
                let e_then = self.check_block(&i.then_block, expected_ret, in_handler)?;
                let e_else = match &i.else_block {
                    Some(b) => self.check_block(b, expected_ret, in_handler)?,
                    None => Effect::Pure,
                };
                let joined = join_effect(e_cond, e_then, &i.span)?;
                join_effect(joined, e_else, &i.span)
            }
            hir::Stmt::For(f) => {
                if self.current_sector.is_none() {
                    return Err(Diagnostic::effect("for outside sector", f.span.clone()));
                }
                let (_, e_it) = self.infer_expr(&f.iterable, None)?;
                let binder_t = self.fresh_meta();
                self.env.insert(f.binder, binder_t);
                let e_body = self.check_block(&f.body, expected_ret, in_handler)?;
                join_effect(e_it, e_body, &f.span)
            }
            hir::Stmt::Match(m) => {
                let (t_scrut, e_scrut) = self.infer_expr(&m.scrutinee, None)?;
                let mut e_all = e_scrut;
                for arm in &m.arms {
                    let saved = self.env.clone();
                    self.bind_pattern(&arm.pat, &t_scrut, &arm.span)?;
                    let e_arm = self.check_block(&arm.body, expected_ret, in_handler)?;
                    e_all = join_effect(e_all, e_arm, &arm.span)?;
                    self.env = saved;
                }
                Ok(e_all)
            }
        }
    }

    // ---------------- expressions ----------------

    fn infer_expr(
        &mut self,
        e: &hir::Expr,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        match e {
            hir::Expr::Undef { .. } => Ok((self.fresh_meta(), Effect::Pure)),

            hir::Expr::Lit(l) => Ok((self.lit_type(l), Effect::Pure)),

            hir::Expr::Var { sym, span } => self.infer_var(*sym, span, expected),

            hir::Expr::Call(c) => self.infer_call(c, expected),

            hir::Expr::RpcCall(rc) => {
                let Some(sector) = self.current_sector else {
                    return Err(Diagnostic::effect("rpc/call outside sector", rc.span.clone()));
                };
                let Some((arg_types, ret)) = self.fn_sig.get(&rc.target).cloned() else {
                    return Err(Diagnostic::type_error("unknown rpc target", rc.span.clone()));
                };
                if arg_types.len() != rc.args.len() {
                    return Err(Diagnostic::type_error("arity mismatch", rc.span.clone()));
                }
                let mut eff = Effect::Sector(sector);
                for (a, pt) in rc.args.iter().zip(arg_types.iter()) {
                    let (at, ae) = self.infer_expr(a, Some(pt))?;
                    self.unify(pt, &at, a.span())?;
                    eff = join_effect(eff, ae, a.span())?;
                }
                if !rc.await_result {
                    return Ok((Ty::Con(self.builtin("Unit")), eff));
                }
                Ok((ret, eff))
            }

            hir::Expr::AwaitEvent { type_id, span } => {
                let Some(sector) = self.current_sector else {
                    return Err(Diagnostic::effect("await outside sector", span.clone()));
                };
                Ok((Ty::Con(*type_id), Effect::Sector(sector)))
            }

            hir::Expr::Member(m) => self.infer_member(m, expected),

            hir::Expr::Index(ix) => {
                let (ot, oe) = self.infer_expr(&ix.object, None)?;
                let (it, ie) = self.infer_expr(&ix.index, None)?;
                Ok((
                    Ty::Index(Box::new(ot), Box::new(it)),
                    join_effect(oe, ie, &ix.span)?,
                ))
            }

            hir::Expr::Unary(u) => self.infer_expr(&u.expr, None),

            hir::Expr::Binary(b) => self.infer_binary(b),

            hir::Expr::Tuple(t) => {
                let mut eff = Effect::Pure;
                if t.items.is_empty() {
                    return Ok((Ty::Con(self.builtin("Unit")), eff));
                }
                let mut ts: Vec<Ty> = Vec::new();
                for it in &t.items {
                    let (ty, te) = self.infer_expr(it, None)?;
                    ts.push(ty);
                    eff = join_effect(eff, te, it.span())?;
                }
                Ok((Ty::Tuple(ts), eff))
            }

            hir::Expr::Record(r) => self.infer_record(r, expected),

            hir::Expr::Match(m) => {
                let (t_scrut, e_scrut) = self.infer_expr(&m.scrutinee, None)?;
                let out_t = self.fresh_meta();
                let mut e_all = e_scrut;
                for arm in &m.arms {
                    let saved = self.env.clone();
                    self.bind_pattern(&arm.pat, &t_scrut, &arm.span)?;
                    let (bt, be) = self.infer_expr(&arm.body, Some(&out_t))?;
                    self.unify(&out_t, &bt, &arm.span)?;
                    e_all = join_effect(e_all, be, &arm.span)?;
                    self.env = saved;
                }
                Ok((out_t, e_all))
            }
        }
    }

    fn infer_var(
        &mut self,
        sym: SymbolId,
        span: &Span,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        if let Some(t) = self.env.get(&sym) {
            return Ok((t.clone(), Effect::Pure));
        }
        if let Some(t) = self.global_env.get(&sym) {
            return Ok((t.clone(), Effect::Pure));
        }

        let (kind, name) = match self.symbol(sym) {
            Some(s) => (s.kind, s.name.clone()),
            None => {
                return Err(Diagnostic::type_error("unknown symbol", span.clone()));
            }
        };
        match kind {
            SymbolKind::Fn => Ok((Ty::Fn(sym), Effect::Pure)),
            SymbolKind::Ctor => {
                if let Some(expected) = expected {
                    // Contextual: a nullary constructor may stand as a value
                    // of its sum type, e.g. `fn nil[T]() -> List[T] = Nil`.
                    if let Some((_, pts0, rt0)) = self.ctor_sig.get(&sym).cloned() {
                        if pts0.is_empty() {
                            let rt = self.instantiate(&rt0);
                            self.unify(expected, &rt, span)?;
                            return Ok((rt, Effect::Pure));
                        }
                    }
                }
                if name == "None" {
                    if let Some(expected) = expected {
                        let t_opt = match self.prune(expected.clone()) {
                            Ty::Meta(mid) => {
                                let bound = self.option_type(span)?;
                                self.meta_bindings.insert(mid, bound.clone());
                                bound
                            }
                            other => other,
                        };
                        if !self.is_option_type(&t_opt) {
                            return Err(Diagnostic::type_error(
                                "None must construct Option",
                                span.clone(),
                            ));
                        }
                        return Ok((t_opt, Effect::Pure));
                    }
                }
                Ok((Ty::Ctor(sym), Effect::Pure))
            }
            SymbolKind::Var | SymbolKind::Const | SymbolKind::Need => {
                let m = self.fresh_meta();
                self.global_env.insert(sym, m.clone());
                Ok((m, Effect::Pure))
            }
            _ => Err(Diagnostic::type_error("unsupported var usage", span.clone())),
        }
    }

    fn infer_member(
        &mut self,
        m: &hir::MemberExpr,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        let (ot, oe) = self.infer_expr(&m.object, None)?;
        let otp = self.prune(ot);

        let (tid, subst) = match &otp {
            Ty::Con(tid) => (Some(*tid), HashMap::new()),
            Ty::App(tid, args) => {
                let mut subst = HashMap::new();
                if let Some(sym) = self.symbol(*tid) {
                    for (pid, arg) in sym.data.type_param_ids.iter().zip(args.iter()) {
                        subst.insert(*pid, arg.clone());
                    }
                }
                (Some(*tid), subst)
            }
            _ => (None, HashMap::new()),
        };

        if let Some(tid) = tid {
            if let Some(fields) = self.record_fields.get(&tid) {
                let Some(ft0) = fields.get(&m.field).cloned() else {
                    return Err(Diagnostic::type_error(
                        "unknown record field",
                        m.span.clone(),
                    ));
                };
                let ft = if subst.is_empty() {
                    ft0
                } else {
                    self.subst_gens(&ft0, &subst)
                };
                if let Some(expected) = expected {
                    self.unify(expected, &ft, &m.span)?;
                }
                return Ok((ft, oe));
            }
        }

        if let Ty::Meta(mid) = otp {
            let ft = self.constrain_record_field(mid, &m.field, expected, &m.span)?;
            return Ok((ft, oe));
        }
        Ok((self.fresh_meta(), oe))
    }

    fn infer_binary(&mut self, b: &hir::BinaryExpr) -> Result<(Ty, Effect), Diagnostic> {
        let (lt, le) = self.infer_expr(&b.left, None)?;
        let (rt, re) = self.infer_expr(&b.right, None)?;
        let eff = join_effect(le, re, &b.span)?;

        let int_id = self.builtin("Int");
        let float_id = self.builtin("Float");
        let bool_t = Ty::Con(self.builtin("Bool"));

        let lt0 = self.prune(lt.clone());
        let rt0 = self.prune(rt.clone());
        let is_con = |t: &Ty, id: TypeId| matches!(t, Ty::Con(x) if *x == id);

        // Numeric promotion: Int and Float mix in arithmetic, yielding Float.
        if matches!(b.op.as_str(), "+" | "-" | "*" | "/") {
            let promoted = (is_con(&lt0, int_id) && is_con(&rt0, float_id))
                || (is_con(&lt0, float_id) && is_con(&rt0, int_id));
            if promoted {
                return Ok((Ty::Con(float_id), eff));
            }
        }

        self.unify(&lt, &rt, &b.span)?;

        if matches!(b.op.as_str(), "==" | "!=" | "<" | "<=" | ">" | ">=") {
            return Ok((bool_t, eff));
        }
        if matches!(b.op.as_str(), "and" | "or") {
            self.unify(&lt, &bool_t, b.left.span())?;
            self.unify(&rt, &bool_t, b.right.span())?;
            return Ok((bool_t, eff));
        }
        Ok((lt, eff))
    }

    fn infer_record(
        &mut self,
        r: &hir::RecordLit,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        let mut eff = Effect::Pure;
        let exp = match expected {
            Some(t) => {
                let p = self.prune(t.clone());
                if matches!(p, Ty::Meta(_)) {
                    None
                } else {
                    Some(p)
                }
            }
            None => None,
        };

        if let Some(exp) = &exp {
            let (tid, subst) = match exp {
                Ty::Con(tid) if self.record_fields.contains_key(tid) => {
                    (Some(*tid), HashMap::new())
                }
                Ty::App(tid, args) if self.record_fields.contains_key(tid) => {
                    let mut subst = HashMap::new();
                    if let Some(sym) = self.symbol(*tid) {
                        for (pid, arg) in sym.data.type_param_ids.iter().zip(args.iter()) {
                            subst.insert(*pid, arg.clone());
                        }
                    }
                    (Some(*tid), subst)
                }
                _ => (None, HashMap::new()),
            };

            if let Some(tid) = tid {
                let fields0 = self.record_fields[&tid].clone();
                let fields: HashMap<String, Ty> = fields0
                    .into_iter()
                    .map(|(k, v)| {
                        let v = if subst.is_empty() {
                            v
                        } else {
                            self.subst_gens(&v, &subst)
                        };
                        (k, v)
                    })
                    .collect();
                let mut seen: usize = 0;
                for it in &r.items {
                    let Some(ft) = fields.get(&it.key).cloned() else {
                        return Err(Diagnostic::type_error(
                            "unknown record field",
                            it.span.clone(),
                        ));
                    };
                    let (vt, ve) = self.infer_expr(&it.value, Some(&ft))?;
                    self.unify(&ft, &vt, &it.span)?;
                    eff = join_effect(eff, ve, &it.span)?;
                    seen += 1;
                }
                if seen != fields.len() {
                    return Err(Diagnostic::type_error(
                        "missing record field",
                        r.span.clone(),
                    ));
                }
                return Ok((exp.clone(), eff));
            }
        }

        let m = self.fresh_meta();
        let mid = match &m {
            Ty::Meta(x) => *x,
            _ => unreachable!(),
        };
        for it in &r.items {
            let (vt, ve) = self.infer_expr(&it.value, None)?;
            self.constrain_record_field(mid, &it.key, Some(&vt), &it.span)?;
            eff = join_effect(eff, ve, &it.span)?;
        }
        Ok((m, eff))
    }

    fn infer_call(
        &mut self,
        e: &hir::CallExpr,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        let (callee_t, callee_e) = self.infer_expr(&e.callee, None)?;

        if let Ty::Fn(fn_sym) = callee_t {
            return self.infer_fn_call(fn_sym, e, callee_e);
        }
        if let Ty::Ctor(ctor_sym) = callee_t {
            return self.infer_ctor_call(ctor_sym, e, expected);
        }
        Err(Diagnostic::type_error(
            "call expects function or constructor",
            e.span.clone(),
        ))
    }

    fn infer_fn_call(
        &mut self,
        fn_sym: SymbolId,
        e: &hir::CallExpr,
        callee_e: Effect,
    ) -> Result<(Ty, Effect), Diagnostic> {
        let Some((_, mut ret)) = self.fn_sig.get(&fn_sym).cloned() else {
            return Err(Diagnostic::type_error("unknown function", e.span.clone()));
        };
        let mut meta0 = self.fn_param_meta.get(&fn_sym).cloned().unwrap_or_default();
        if self.fn_tparams.contains_key(&fn_sym) {
            ret = self.instantiate(&ret);
            meta0 = meta0
                .into_iter()
                .map(|(psym, kind, pt)| {
                    let pt = self.instantiate(&pt);
                    (psym, kind, pt)
                })
                .collect();
        }

        // Parameter table: fixed params in order, plus optional varargs and
        // varkw catch-alls.
        let mut fixed: Vec<(String, Ty, Span)> = Vec::new();
        let mut varargs: Option<(Ty, Span)> = None;
        let mut varkw: Option<(Ty, Span)> = None;
        for (psym, kind, pt) in &meta0 {
            let (name, psp) = match self.symbol(*psym) {
                Some(s) => (s.name.clone(), s.span.clone()),
                None => (String::new(), e.span.clone()),
            };
            match kind {
                hir::ParamKind::Varargs => varargs = Some((pt.clone(), psp)),
                hir::ParamKind::Varkw => varkw = Some((pt.clone(), psp)),
                hir::ParamKind::Normal => fixed.push((name, pt.clone(), psp)),
            }
        }

        if let Some(Some(fn_eff)) = self.fn_effect.get(&fn_sym).copied() {
            match self.current_sector {
                None => {
                    return Err(Diagnostic::effect(
                        "calling sector function from pure context",
                        e.span.clone(),
                    ));
                }
                Some(cur) if cur != fn_eff => {
                    return Err(Diagnostic::effect(
                        "direct cross-sector call; use rpc/call",
                        e.span.clone(),
                    ));
                }
                Some(_) => {}
            }
        }

        // Split call arguments; keyword, star and double-star arguments end
        // the positional section.
        let mut pos: Vec<(&hir::Expr, &Span)> = Vec::new();
        let mut kws: Vec<(&str, &hir::Expr, &Span)> = Vec::new();
        let mut star: Option<(&hir::Expr, &Span)> = None;
        let mut starstar: Option<(&hir::Expr, &Span)> = None;
        let mut saw_kw = false;

        for a in &e.args {
            match a {
                hir::CallArg::Pos { value, span } => {
                    if saw_kw {
                        return Err(Diagnostic::type_error(
                            "positional argument after keyword",
                            span.clone(),
                        ));
                    }
                    pos.push((value, span));
                }
                hir::CallArg::Kw { name, value, span } => {
                    saw_kw = true;
                    kws.push((name.as_str(), value, span));
                }
                hir::CallArg::Star { value, span } => {
                    if star.is_some() || saw_kw {
                        return Err(Diagnostic::type_error(
                            "invalid *args position",
                            span.clone(),
                        ));
                    }
                    saw_kw = true;
                    star = Some((value, span));
                }
                hir::CallArg::StarStar { value, span } => {
                    if starstar.is_some() {
                        return Err(Diagnostic::type_error(
                            "duplicate **kwargs",
                            span.clone(),
                        ));
                    }
                    saw_kw = true;
                    starstar = Some((value, span));
                }
            }
        }

        let mut eff = callee_e;

        // Bind the leading fixed parameters from positional arguments.
        let mut provided: HashMap<String, bool> = HashMap::new();
        let mut i = 0usize;
        for (nm, pt, _psp) in &fixed {
            if i < pos.len() {
                let (ex, sp) = pos[i];
                let (at, ae) = self.infer_expr(ex, Some(pt))?;
                self.unify(pt, &at, sp)?;
                eff = join_effect(eff, ae, sp)?;
                provided.insert(nm.clone(), true);
                i += 1;
            } else {
                provided.insert(nm.clone(), false);
            }
        }

        // Extra positional arguments feed the varargs parameter; when it is
        // typed List[T], each extra unifies against T.
        if i < pos.len() {
            let Some((vt, _)) = &varargs else {
                return Err(Diagnostic::type_error("arity mismatch", e.span.clone()));
            };
            let list_id = self.type_id_by_name.get("List").copied();
            let vt0 = self.prune(vt.clone());
            let elem_t: Option<Ty> = match (&vt0, list_id) {
                (Ty::App(base, args), Some(list_id)) if *base == list_id && args.len() == 1 => {
                    Some(args[0].clone())
                }
                _ => None,
            };
            let vt = vt.clone();
            for &(ex, sp) in pos.iter().skip(i) {
                let expect_t = elem_t.clone().unwrap_or_else(|| vt.clone());
                let (at, ae) = self.infer_expr(ex, Some(&expect_t))?;
                self.unify(&expect_t, &at, sp)?;
                eff = join_effect(eff, ae, sp)?;
            }
        }

        // Keyword arguments match a fixed parameter or fall into the varkw
        // parameter (unifying against V when it is typed Map[K, V]).
        let fixed_map: HashMap<&str, &Ty> =
            fixed.iter().map(|(nm, pt, _)| (nm.as_str(), pt)).collect();
        for &(nm, ex, sp) in &kws {
            if let Some(&pt) = fixed_map.get(nm) {
                if provided.get(nm).copied().unwrap_or(false) {
                    return Err(Diagnostic::type_error("duplicate keyword", sp.clone()));
                }
                let pt = pt.clone();
                let (at, ae) = self.infer_expr(ex, Some(&pt))?;
                self.unify(&pt, &at, sp)?;
                eff = join_effect(eff, ae, sp)?;
                provided.insert(nm.to_string(), true);
            } else {
                let Some((kt, _)) = &varkw else {
                    return Err(Diagnostic::type_error("unknown keyword", sp.clone()));
                };
                let map_id = self.type_id_by_name.get("Map").copied();
                let kt0 = self.prune(kt.clone());
                let vt = match (&kt0, map_id) {
                    (Ty::App(base, args), Some(map_id)) if *base == map_id && args.len() == 2 => {
                        args[1].clone()
                    }
                    _ => kt.clone(),
                };
                let (at, ae) = self.infer_expr(ex, Some(&vt))?;
                self.unify(&vt, &at, sp)?;
                eff = join_effect(eff, ae, sp)?;
            }
        }

        for (nm, _pt, psp) in &fixed {
            if !provided.get(nm).copied().unwrap_or(false) {
                return Err(Diagnostic::type_error("missing argument", psp.clone()));
            }
        }

        if let Some((ex, sp)) = star {
            let Some((vt, _)) = &varargs else {
                return Err(Diagnostic::type_error("unexpected *args", sp.clone()));
            };
            let vt = vt.clone();
            let (at, ae) = self.infer_expr(ex, Some(&vt))?;
            self.unify(&vt, &at, sp)?;
            eff = join_effect(eff, ae, sp)?;
        }

        if let Some((ex, sp)) = starstar {
            let Some((kt, _)) = &varkw else {
                return Err(Diagnostic::type_error("unexpected **kwargs", sp.clone()));
            };
            let kt = kt.clone();
            let (at, ae) = self.infer_expr(ex, Some(&kt))?;
            self.unify(&kt, &at, sp)?;
            eff = join_effect(eff, ae, sp)?;
        }

        Ok((ret, eff))
    }

    fn infer_ctor_call(
        &mut self,
        ctor_sym: SymbolId,
        e: &hir::CallExpr,
        expected: Option<&Ty>,
    ) -> Result<(Ty, Effect), Diagnostic> {
        let name = self
            .symbol(ctor_sym)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        let mut pos_args: Vec<(&hir::Expr, &Span)> = Vec::new();
        for a in &e.args {
            match a {
                hir::CallArg::Pos { value, span } => pos_args.push((value, span)),
                _ => {
                    return Err(Diagnostic::type_error(
                        "constructor call expects positional args only",
                        a.span().clone(),
                    ));
                }
            }
        }

        // Ok/Err and Some/None fabricate Result/Option skeletons when no
        // expectation is available.
        if name == "Ok" || name == "Err" {
            let t_res = match expected {
                None => self.result_type(&e.span)?,
                Some(t) => self.prune(t.clone()),
            };
            let t_res = match t_res {
                Ty::Meta(mid) => {
                    let bound = self.result_type(&e.span)?;
                    self.meta_bindings.insert(mid, bound.clone());
                    bound
                }
                other => other,
            };
            if !self.is_result_type(&t_res) {
                return Err(Diagnostic::type_error(
                    "Ok/Err must construct Result",
                    e.span.clone(),
                ));
            }
            let Ty::App(_, args) = &t_res else { unreachable!() };
            let (t_ok, t_err) = (args[0].clone(), args[1].clone());
            let slot = if name == "Ok" { t_ok } else { t_err };
            if pos_args.len() != 1 {
                return Err(Diagnostic::type_error(
                    format!("{} expects 1 arg", name),
                    e.span.clone(),
                ));
            }
            let (at, ae) = self.infer_expr(pos_args[0].0, Some(&slot))?;
            self.unify(&slot, &at, pos_args[0].1)?;
            return Ok((t_res, ae));
        }

        if name == "Some" || name == "None" {
            let t_opt = match expected {
                None => self.option_type(&e.span)?,
                Some(t) => self.prune(t.clone()),
            };
            let t_opt = match t_opt {
                Ty::Meta(mid) => {
                    let bound = self.option_type(&e.span)?;
                    self.meta_bindings.insert(mid, bound.clone());
                    bound
                }
                other => other,
            };
            if !self.is_option_type(&t_opt) {
                return Err(Diagnostic::type_error(
                    "Some/None must construct Option",
                    e.span.clone(),
                ));
            }
            let Ty::App(_, args) = &t_opt else { unreachable!() };
            let t_inner = args[0].clone();
            if name == "None" {
                if !pos_args.is_empty() {
                    return Err(Diagnostic::type_error(
                        "None expects 0 args",
                        e.span.clone(),
                    ));
                }
                return Ok((t_opt, Effect::Pure));
            }
            if pos_args.len() != 1 {
                return Err(Diagnostic::type_error(
                    "Some expects 1 arg",
                    e.span.clone(),
                ));
            }
            let (at, ae) = self.infer_expr(pos_args[0].0, Some(&t_inner))?;
            self.unify(&t_inner, &at, pos_args[0].1)?;
            return Ok((t_opt, ae));
        }

        let Some((_, pts0, rt0)) = self.ctor_sig.get(&ctor_sym).cloned() else {
            return Err(Diagnostic::type_error(
                "unknown constructor",
                e.span.clone(),
            ));
        };

        let pts: Vec<Ty> = pts0.iter().map(|p| self.instantiate(p)).collect();
        let rt = self.instantiate(&rt0);

        if let Some(expected) = expected {
            self.unify(expected, &rt, &e.span)?;
        }

        if pts.len() != pos_args.len() {
            return Err(Diagnostic::type_error("arity mismatch", e.span.clone()));
        }

        let mut eff = Effect::Pure;
        for (&(a, sp), pt) in pos_args.iter().zip(pts.iter()) {
            let (at, ae) = self.infer_expr(a, Some(pt))?;
            self.unify(pt, &at, sp)?;
            eff = join_effect(eff, ae, sp)?;
        }
        Ok((rt, eff))
    }

    // ---------------- patterns ----------------

    fn bind_pattern(&mut self, pat: &hir::Pattern, scrut_t: &Ty, span: &Span) -> Result<(), Diagnostic> {
        match pat {
            hir::Pattern::Wildcard(_) => Ok(()),
            hir::Pattern::Bool(_, _) => {
                let bool_t = Ty::Con(self.builtin("Bool"));
                self.unify(&bool_t, scrut_t, span)
            }
            hir::Pattern::Var { sym, .. } => {
                self.env.insert(*sym, scrut_t.clone());
                Ok(())
            }
            hir::Pattern::Ctor { ctor, args, .. } => {
                let Some((_, pts0, rt0)) = self.ctor_sig.get(ctor).cloned() else {
                    return Ok(());
                };
                let pts: Vec<Ty> = pts0.iter().map(|p| self.instantiate(p)).collect();
                let rt = self.instantiate(&rt0);
                self.unify(scrut_t, &rt, span)?;

                let empty: Vec<hir::Pattern> = Vec::new();
                let args = args.as_ref().unwrap_or(&empty);
                if args.len() != pts.len() {
                    return Err(Diagnostic::type_error("arity mismatch", span.clone()));
                }
                for (ap, pt) in args.iter().zip(pts.iter()) {
                    self.bind_pattern(ap, pt, span)?;
                }
                Ok(())
            }
        }
    }

    // ---------------- type machinery ----------------

    fn lit_type(&self, l: &hir::Literal) -> Ty {
        use crate::ast::Lit;
        let name = match &l.lit {
            Lit::Int(_) => "Int",
            Lit::Float(_) => "Float",
            Lit::Bool(_) => "Bool",
            Lit::Str(_) => "Str",
            Lit::Bytes(_) => "Bytes",
        };
        Ty::Con(self.builtin(name))
    }

    fn is_event_type(&mut self, t: &Ty) -> bool {
        let t = self.prune(t.clone());
        if let Ty::Con(tid) = t {
            if let Some(name) = self.type_name_by_id.get(&tid) {
                return name.starts_with("Event.");
            }
        }
        false
    }

    fn result_type(&mut self, span: &Span) -> Result<Ty, Diagnostic> {
        let Some(&base) = self.type_id_by_name.get("Result") else {
            return Err(Diagnostic::type_error(
                "missing builtin Result",
                span.clone(),
            ));
        };
        let a = self.fresh_meta();
        let b = self.fresh_meta();
        Ok(Ty::App(base, vec![a, b]))
    }

    fn option_type(&mut self, span: &Span) -> Result<Ty, Diagnostic> {
        let Some(&base) = self.type_id_by_name.get("Option") else {
            return Err(Diagnostic::type_error(
                "missing builtin Option",
                span.clone(),
            ));
        };
        let a = self.fresh_meta();
        Ok(Ty::App(base, vec![a]))
    }

    fn is_result_type(&mut self, t: &Ty) -> bool {
        let t = self.prune(t.clone());
        matches!(&t, Ty::App(base, args)
            if Some(base) == self.type_id_by_name.get("Result") && args.len() == 2)
    }

    fn is_option_type(&mut self, t: &Ty) -> bool {
        let t = self.prune(t.clone());
        matches!(&t, Ty::App(base, args)
            if Some(base) == self.type_id_by_name.get("Option") && args.len() == 1)
    }

    /// Replace every Gen with a fresh meta, one meta per parameter.
    fn instantiate(&mut self, t: &Ty) -> Ty {
        let mut subst: HashMap<SymbolId, Ty> = HashMap::new();
        self.instantiate_go(t, &mut subst)
    }

    fn instantiate_go(&mut self, t: &Ty, subst: &mut HashMap<SymbolId, Ty>) -> Ty {
        let t = self.prune(t.clone());
        match t {
            Ty::Gen(id) => subst
                .entry(id)
                .or_insert_with(|| {
                    let m = self.next_meta;
                    self.next_meta += 1;
                    Ty::Meta(m)
                })
                .clone(),
            Ty::App(base, args) => Ty::App(
                base,
                args.iter().map(|a| self.instantiate_go(a, subst)).collect(),
            ),
            Ty::Tuple(items) => Ty::Tuple(
                items
                    .iter()
                    .map(|a| self.instantiate_go(a, subst))
                    .collect(),
            ),
            other => other,
        }
    }

    fn subst_gens(&mut self, t: &Ty, subst: &HashMap<SymbolId, Ty>) -> Ty {
        let t = self.prune(t.clone());
        match t {
            Ty::Gen(id) => subst.get(&id).cloned().unwrap_or(Ty::Gen(id)),
            Ty::App(base, args) => Ty::App(
                base,
                args.iter().map(|a| self.subst_gens(a, subst)).collect(),
            ),
            Ty::Tuple(items) => Ty::Tuple(
                items.iter().map(|a| self.subst_gens(a, subst)).collect(),
            ),
            other => other,
        }
    }

    fn prune(&mut self, t: Ty) -> Ty {
        if let Ty::Meta(mid) = t {
            if let Some(bound) = self.meta_bindings.get(&mid).cloned() {
                let pr = self.prune(bound);
                self.meta_bindings.insert(mid, pr.clone());
                return pr;
            }
        }
        t
    }

    /// Install or merge a record-field constraint on an unbound meta.
    fn constrain_record_field(
        &mut self,
        mid: u32,
        field: &str,
        expected: Option<&Ty>,
        span: &Span,
    ) -> Result<Ty, Diagnostic> {
        let existing = self
            .meta_record_fields
            .get(&mid)
            .and_then(|m| m.get(field))
            .cloned();
        match existing {
            None => {
                let ft = match expected {
                    Some(t) => t.clone(),
                    None => self.fresh_meta(),
                };
                self.meta_record_fields
                    .entry(mid)
                    .or_default()
                    .insert(field.to_string(), ft.clone());
                Ok(ft)
            }
            Some(ft) => {
                if let Some(expected) = expected {
                    self.unify(&ft, expected, span)?;
                }
                Ok(ft)
            }
        }
    }

    fn merge_meta_record_fields(
        &mut self,
        src: u32,
        dst: u32,
        span: &Span,
    ) -> Result<(), Diagnostic> {
        let Some(a) = self.meta_record_fields.remove(&src) else {
            return Ok(());
        };
        for (k, v) in a {
            let existing = self
                .meta_record_fields
                .get(&dst)
                .and_then(|m| m.get(&k))
                .cloned();
            match existing {
                Some(b) => self.unify(&b, &v, span)?,
                None => {
                    self.meta_record_fields
                        .entry(dst)
                        .or_default()
                        .insert(k, v);
                }
            }
        }
        Ok(())
    }

    /// When a constrained meta unifies with a concrete type, fold the
    /// accumulated field constraints into the declared fields.
    fn apply_meta_record_constraints(
        &mut self,
        mid: u32,
        t: &Ty,
        span: &Span,
    ) -> Result<(), Diagnostic> {
        if self
            .meta_record_fields
            .get(&mid)
            .map(|m| m.is_empty())
            .unwrap_or(true)
        {
            return Ok(());
        }
        let t = self.prune(t.clone());
        if let Ty::Meta(other) = t {
            return self.merge_meta_record_fields(mid, other, span);
        }
        let (tid, subst) = match &t {
            Ty::Con(tid) => (*tid, HashMap::new()),
            Ty::App(tid, args) => {
                let mut subst = HashMap::new();
                if let Some(sym) = self.symbol(*tid) {
                    for (pid, arg) in sym.data.type_param_ids.iter().zip(args.iter()) {
                        subst.insert(*pid, arg.clone());
                    }
                }
                (*tid, subst)
            }
            _ => return Err(Diagnostic::type_error("type mismatch", span.clone())),
        };
        let Some(decl0) = self.record_fields.get(&tid).cloned() else {
            return Err(Diagnostic::type_error("type mismatch", span.clone()));
        };
        let decl: HashMap<String, Ty> = decl0
            .into_iter()
            .map(|(k, v)| {
                let v = if subst.is_empty() {
                    v
                } else {
                    self.subst_gens(&v, &subst)
                };
                (k, v)
            })
            .collect();

        let fields = self.meta_record_fields.remove(&mid).unwrap_or_default();
        for (k, v) in fields {
            let Some(ft) = decl.get(&k).cloned() else {
                return Err(Diagnostic::type_error(
                    "unknown record field",
                    span.clone(),
                ));
            };
            self.unify(&ft, &v, span)?;
        }
        Ok(())
    }

    /// Expand type aliases at the head of a type, with cycle detection.
    fn expand_type_alias(&mut self, t: Ty, span: &Span) -> Result<Ty, Diagnostic> {
        let mut seen: Vec<TypeId> = Vec::new();
        let mut cur = self.prune(t);
        loop {
            let tid = match &cur {
                Ty::Con(tid) => *tid,
                Ty::App(tid, _) => *tid,
                _ => return Ok(cur),
            };
            let Some((tps, target)) = self.type_alias.get(&tid).cloned() else {
                return Ok(cur);
            };
            if seen.contains(&tid) {
                return Err(Diagnostic::type_error("cyclic type alias", span.clone()));
            }
            seen.push(tid);
            let mut subst: HashMap<SymbolId, Ty> = HashMap::new();
            if !tps.is_empty() {
                let Ty::App(_, args) = &cur else {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                };
                if args.len() != tps.len() {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                }
                for (pid, arg) in tps.iter().zip(args.iter()) {
                    subst.insert(*pid, arg.clone());
                }
            }
            cur = self.subst_gens(&target, &subst);
            cur = self.prune(cur);
        }
    }

    fn unify(&mut self, a: &Ty, b: &Ty, span: &Span) -> Result<(), Diagnostic> {
        let a = self.prune(a.clone());
        let b = self.prune(b.clone());

        // Normalize through type aliases (e.g. Map[K, V] = List[Pair[K, V]]).
        let a = self.expand_type_alias(a, span)?;
        let b = self.expand_type_alias(b, span)?;
        if a == b {
            return Ok(());
        }
        if let Ty::Meta(mid) = a {
            self.apply_meta_record_constraints(mid, &b, span)?;
            self.meta_bindings.insert(mid, b);
            return Ok(());
        }
        if let Ty::Meta(mid) = b {
            self.apply_meta_record_constraints(mid, &a, span)?;
            self.meta_bindings.insert(mid, a);
            return Ok(());
        }

        match (&a, &b) {
            (Ty::Gen(x), Ty::Gen(y)) => {
                if x != y {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                }
                Ok(())
            }
            (Ty::Gen(_), _) | (_, Ty::Gen(_)) => {
                Err(Diagnostic::type_error("type mismatch", span.clone()))
            }
            (Ty::Con(x), Ty::Con(y)) => {
                if x != y {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                }
                Ok(())
            }
            (Ty::App(xb, xargs), Ty::App(yb, yargs)) => {
                if xb != yb || xargs.len() != yargs.len() {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                }
                for (x, y) in xargs.clone().iter().zip(yargs.clone().iter()) {
                    self.unify(x, y, span)?;
                }
                Ok(())
            }
            (Ty::Tuple(xs), Ty::Tuple(ys)) => {
                if xs.len() != ys.len() {
                    return Err(Diagnostic::type_error("type mismatch", span.clone()));
                }
                for (x, y) in xs.clone().iter().zip(ys.clone().iter()) {
                    self.unify(x, y, span)?;
                }
                Ok(())
            }
            _ => Err(Diagnostic::type_error("type mismatch", span.clone())),
        }
    }
}

fn join_effect(a: Effect, b: Effect, span: &Span) -> Result<Effect, Diagnostic> {
    match (a, b) {
        (Effect::Pure, other) => Ok(other),
        (other, Effect::Pure) => Ok(other),
        (Effect::Sector(x), Effect::Sector(y)) => {
            if x == y {
                Ok(a)
            } else {
                Err(Diagnostic::effect(
                    "mixed sectors in one expression",
                    span.clone(),
                ))
            }
        }
    }
}

fn table_tparams(res: &Resolution, id: SymbolId) -> Vec<SymbolId> {
    if id.raw() == 0 || (id.raw() as usize) > res.symbols.len() {
        return Vec::new();
    }
    res.symbols.get(id).data.type_param_ids.clone()
}

fn table_sector(res: &Resolution, id: SymbolId) -> Option<SymbolId> {
    if id.raw() == 0 || (id.raw() as usize) > res.symbols.len() {
        return None;
    }
    res.symbols.get(id).data.sector
}

fn lower_type_some(tr: &hir::TypeRef, tparams: &[SymbolId]) -> Ty {
    match tr {
        hir::TypeRef::App { base, args, .. } => Ty::App(
            *base,
            args.iter()
                .map(|a| lower_type_some(a, tparams))
                .collect(),
        ),
        hir::TypeRef::Name { id, .. } => {
            if tparams.contains(id) {
                Ty::Gen(*id)
            } else {
                Ty::Con(*id)
            }
        }
    }
}

fn lower_type_opt(
    type_id_by_name: &HashMap<String, TypeId>,
    tr: Option<&hir::TypeRef>,
    tparams: &[SymbolId],
) -> Ty {
    match tr {
        Some(tr) => lower_type_some(tr, tparams),
        None => Ty::Con(
            type_id_by_name
                .get("Unit")
                .copied()
                .unwrap_or(SymbolId::from_raw(0)),
        ),
    }
}
