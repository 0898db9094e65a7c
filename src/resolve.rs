//! Name resolution.
//!
//! Runs after module expansion and mixin weaving, in two sub-passes:
//! pass A walks top-level items and installs symbols (builtin types first,
//! sum-type constructors into `values`, sectors with their own child scope,
//! a synthetic `main` sector when top-level handlers exist without one);
//! pass B resolves every use site, records pattern aliases and binds
//! identifiers to symbols through the `NodeId` side tables.
//!
//! Shadowing across nested scopes is allowed. Within one scope a name may
//! be bound more than once only when the bindings come from different
//! source files (`use` flattening); same-file duplicates are rejected.
//! Use sites of a multi-bound name pick the same-file candidate when
//! exactly one exists, and fail with NameAmbiguity otherwise.

use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::mixin::{apply_mixins, HookPlanRow};
use crate::modules::{
    expand_uses, load_discard_names, load_prelude, stdlib_virtual_path, ModuleCache,
};
use crate::span::Span;
use crate::symbols::{
    Namespace, ScopeArena, ScopeId, SymbolData, SymbolId, SymbolKind, SymbolTable,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// How `analyze` locates modules and whether the prelude is spliced in.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub use_stdlib: bool,
    pub module_roots: Vec<PathBuf>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            use_stdlib: true,
            module_roots: Vec::new(),
        }
    }
}

/// Output of resolution: the (possibly rewritten) program plus the symbol
/// table and the node-to-symbol side tables. The side tables key on
/// process-local node identities and are skipped during serialization.
#[derive(Debug, Serialize)]
pub struct Resolution {
    pub program: ast::Program,
    pub symbols: SymbolTable,
    #[serde(skip)]
    pub ident_to_symbol: HashMap<ast::NodeId, SymbolId>,
    #[serde(skip)]
    pub typename_to_symbol: HashMap<ast::NodeId, SymbolId>,
    #[serde(skip)]
    pub handler_to_symbol: HashMap<ast::NodeId, SymbolId>,
    pub pattern_aliases: HashMap<String, ast::Pattern>,
    pub mixin_hook_plan: Vec<HookPlanRow>,
}

pub fn resolve_program(
    prog: ast::Program,
    opts: &AnalyzeOptions,
    cache: &mut ModuleCache,
) -> Result<Resolution, Diagnostic> {
    let mut prog = prog;
    let mut prelude_spliced = false;
    let file_norm = prog.span.file.replace('\\', "/");
    // The prelude must not include itself when the compiler is pointed at
    // stdlib/prelude.flv directly.
    if opts.use_stdlib && !file_norm.ends_with("stdlib/prelude.flv") {
        let prelude = load_prelude(cache, &prog.span)?;
        let mut items = prelude.items;
        items.append(&mut prog.items);
        prog = ast::Program {
            items,
            run: prog.run,
            span: prog.span,
        };
        prelude_spliced = true;
    }

    let prog = expand_uses(prog, &opts.module_roots, cache, prelude_spliced)?;
    let (prog, mixin_hook_plan) = apply_mixins(prog)?;

    let file = prog.span.file.clone();
    let mut scopes = ScopeArena::new();
    let global = scopes.root();
    let mut resolver = Resolver {
        file: file.clone(),
        discard_names: load_discard_names(&file),
        symbols: SymbolTable::new(),
        scopes,
        global,
        sector_scopes: HashMap::new(),
        ident_to_symbol: HashMap::new(),
        typename_to_symbol: HashMap::new(),
        handler_to_symbol: HashMap::new(),
        pattern_aliases: HashMap::new(),
    };

    resolver.install_builtins();
    resolver.collect_decls(&prog)?;
    resolver.resolve_uses(&prog)?;

    Ok(Resolution {
        program: prog,
        symbols: resolver.symbols,
        ident_to_symbol: resolver.ident_to_symbol,
        typename_to_symbol: resolver.typename_to_symbol,
        handler_to_symbol: resolver.handler_to_symbol,
        pattern_aliases: resolver.pattern_aliases,
        mixin_hook_plan,
    })
}

struct Resolver {
    file: Arc<str>,
    discard_names: HashSet<String>,
    symbols: SymbolTable,
    scopes: ScopeArena,
    global: ScopeId,
    sector_scopes: HashMap<SymbolId, ScopeId>,
    ident_to_symbol: HashMap<ast::NodeId, SymbolId>,
    typename_to_symbol: HashMap<ast::NodeId, SymbolId>,
    handler_to_symbol: HashMap<ast::NodeId, SymbolId>,
    pattern_aliases: HashMap<String, ast::Pattern>,
}

const BUILTIN_TYPES: [&str; 6] = ["Unit", "Int", "Float", "Bool", "Str", "Bytes"];

impl Resolver {
    fn install_builtins(&mut self) {
        let span = Span::new(self.file.clone(), 0, 0, 1, 1);
        for name in BUILTIN_TYPES {
            let sid = self.symbols.fresh(
                SymbolKind::Type,
                name,
                span.clone(),
                None,
                SymbolData::default(),
            );
            self.scopes.define(self.global, Namespace::Types, name, sid);
        }
    }

    // ---------------- pass A: declarations ----------------

    fn collect_decls(&mut self, prog: &ast::Program) -> Result<(), Diagnostic> {
        let has_top_on = prog
            .items
            .iter()
            .any(|it| matches!(it, ast::Item::Handler(_)));
        let mut main_sector_id: Option<SymbolId> = None;

        for it in &prog.items {
            if let ast::Item::Sector(sd) = it {
                if sd.name.name == "main" {
                    main_sector_id = Some(self.define_sector(sd)?);
                }
            }
        }

        if has_top_on && main_sector_id.is_none() {
            let sid = self.symbols.fresh(
                SymbolKind::Sector,
                "main",
                prog.span.clone(),
                None,
                SymbolData::default(),
            );
            self.scopes.define(self.global, Namespace::Sectors, "main", sid);
            let scope = self.scopes.child(self.global);
            self.sector_scopes.insert(sid, scope);
            main_sector_id = Some(sid);
        }

        for it in &prog.items {
            match it {
                ast::Item::Type(td) => {
                    self.define_type(td)?;
                }
                ast::Item::Const(cd) => {
                    self.define_value(&cd.name, SymbolKind::Const)?;
                }
                ast::Item::Let(ld) => {
                    self.define_value(&ld.name, SymbolKind::Var)?;
                }
                ast::Item::Need(nd) => {
                    self.define_value(&nd.name, SymbolKind::Need)?;
                }
                ast::Item::Fn(fd) => {
                    self.define_fn(fd, None)?;
                }
                ast::Item::Pattern(_) => {
                    // Pattern aliases do not define symbols; pass B records
                    // and validates them.
                }
                ast::Item::Use(_) => {}
                ast::Item::Mixin(md) => {
                    self.define_mixin(md)?;
                }
                ast::Item::UseMixin(_) | ast::Item::ResolveMixin(_) => {}
                ast::Item::Sector(sd) => {
                    if sd.name.name != "main" || main_sector_id.is_none() {
                        self.define_sector(sd)?;
                    }
                }
                ast::Item::Handler(h) => {
                    if let Some(main) = main_sector_id {
                        self.define_handler(h, main);
                    }
                }
            }
        }
        Ok(())
    }

    fn define_type(&mut self, td: &ast::TypeDecl) -> Result<SymbolId, Diagnostic> {
        let name = td.name.dotted();
        if !self
            .scopes
            .lookup(self.global, Namespace::Types, &name)
            .is_empty()
        {
            return Err(Diagnostic::resolve(
                format!("Duplicate type: {}", name),
                td.span.clone(),
            ));
        }
        let sid = self.symbols.fresh(
            SymbolKind::Type,
            &name,
            td.span.clone(),
            None,
            SymbolData::default(),
        );
        self.scopes.define(self.global, Namespace::Types, &name, sid);
        self.typename_to_symbol.insert(td.name.id, sid);

        if let ast::TypeRhs::Sum(sum) = &td.rhs {
            for v in &sum.variants {
                let ctor_name = &v.name.name;
                if self
                    .scopes
                    .lookup(self.global, Namespace::Values, ctor_name)
                    .is_empty()
                {
                    let ctor_id = self.symbols.fresh(
                        SymbolKind::Ctor,
                        ctor_name,
                        v.span.clone(),
                        Some(sid),
                        SymbolData::default(),
                    );
                    self.scopes
                        .define(self.global, Namespace::Values, ctor_name, ctor_id);
                }
            }
        }
        Ok(sid)
    }

    fn define_sector(&mut self, sd: &ast::SectorDecl) -> Result<SymbolId, Diagnostic> {
        let name = &sd.name.name;
        if !self
            .scopes
            .lookup(self.global, Namespace::Sectors, name)
            .is_empty()
        {
            return Err(Diagnostic::resolve(
                format!("Duplicate sector: {}", name),
                sd.span.clone(),
            ));
        }
        let sid = self.symbols.fresh(
            SymbolKind::Sector,
            name,
            sd.span.clone(),
            None,
            SymbolData::default(),
        );
        self.scopes.define(self.global, Namespace::Sectors, name, sid);
        self.ident_to_symbol.insert(sd.name.id, sid);

        let scope = self.scopes.child(self.global);
        self.sector_scopes.insert(sid, scope);

        for item in &sd.items {
            match item {
                ast::SectorItem::Let(ld) => {
                    self.define_in_scope(scope, &ld.name, SymbolKind::Var, Some(sid))?;
                }
                ast::SectorItem::Need(nd) => {
                    self.define_in_scope(scope, &nd.name, SymbolKind::Need, Some(sid))?;
                }
                ast::SectorItem::Fn(fd) => {
                    self.define_fn(fd, Some(sid))?;
                }
                ast::SectorItem::Handler(h) => {
                    self.define_handler(h, sid);
                }
            }
        }
        Ok(sid)
    }

    fn define_mixin(&mut self, md: &ast::MixinDecl) -> Result<SymbolId, Diagnostic> {
        let key = format!("{}@v{}", md.name.dotted(), md.version);
        if !self
            .scopes
            .lookup(self.global, Namespace::Mixins, &key)
            .is_empty()
        {
            return Err(Diagnostic::resolve(
                format!("Duplicate mixin: {}", key),
                md.span.clone(),
            ));
        }
        let sid = self.symbols.fresh(
            SymbolKind::Mixin,
            &key,
            md.span.clone(),
            None,
            SymbolData::default(),
        );
        self.scopes.define(self.global, Namespace::Mixins, &key, sid);
        Ok(sid)
    }

    fn define_handler(&mut self, h: &ast::OnHandler, owner: SymbolId) -> SymbolId {
        let name = format!("handler@{}:{}", h.span.start, h.span.end);
        let sid = self.symbols.fresh(
            SymbolKind::Handler,
            name,
            h.span.clone(),
            Some(owner),
            SymbolData::default(),
        );
        self.handler_to_symbol.insert(h.id, sid);
        sid
    }

    fn define_value(&mut self, ident: &ast::Ident, kind: SymbolKind) -> Result<SymbolId, Diagnostic> {
        self.define_in_scope(self.global, ident, kind, None)
    }

    fn define_in_scope(
        &mut self,
        scope: ScopeId,
        ident: &ast::Ident,
        kind: SymbolKind,
        owner: Option<SymbolId>,
    ) -> Result<SymbolId, Diagnostic> {
        let name = &ident.name;
        if kind == SymbolKind::Var && self.discard_names.contains(name) {
            let sid = self.symbols.fresh(
                kind,
                name,
                ident.span.clone(),
                owner,
                SymbolData {
                    discard: true,
                    ..SymbolData::default()
                },
            );
            self.ident_to_symbol.insert(ident.id, sid);
            return Ok(sid);
        }

        // Duplicates may come from `use` expansion, which is allowed and
        // disambiguated at use sites; a same-file duplicate is a genuine
        // double definition.
        let existing = self.scopes.local(scope, Namespace::Values, name);
        if !existing.is_empty() {
            let same_file = existing
                .iter()
                .any(|sid| self.symbols.get(*sid).span.file == ident.span.file);
            if same_file {
                return Err(Diagnostic::resolve(
                    format!("Duplicate name in same scope: {}", name),
                    ident.span.clone(),
                ));
            }
        }
        let sid = self.symbols.fresh(
            kind,
            name,
            ident.span.clone(),
            owner,
            SymbolData::default(),
        );
        self.scopes.define(scope, Namespace::Values, name, sid);
        self.ident_to_symbol.insert(ident.id, sid);
        Ok(sid)
    }

    fn define_fn(&mut self, fd: &ast::FnDecl, owner: Option<SymbolId>) -> Result<SymbolId, Diagnostic> {
        let mut target_sector: Option<SymbolId> = None;
        if let Some(qual) = &fd.sector_qual {
            let matches = self.scopes.lookup(self.global, Namespace::Sectors, &qual.name);
            let Some(&first) = matches.first() else {
                return Err(Diagnostic::resolve(
                    format!("Unknown sector: {}", qual.name),
                    qual.span.clone(),
                ));
            };
            target_sector = Some(first);
            self.ident_to_symbol.insert(qual.id, first);
        }

        let scope = match owner {
            Some(sector) => self.sector_scopes[&sector],
            None => self.global,
        };
        let sid = self.define_in_scope(scope, &fd.name, SymbolKind::Fn, owner)?;
        let sym = self.symbols.get_mut(sid);
        sym.data.sector = target_sector;
        if let Some(tps) = &fd.type_params {
            sym.data.type_params = tps.iter().map(|p| p.name.clone()).collect();
        }
        Ok(sid)
    }

    // ---------------- pass B: use sites ----------------

    fn resolve_uses(&mut self, prog: &ast::Program) -> Result<(), Diagnostic> {
        let main_sector = self
            .scopes
            .lookup(self.global, Namespace::Sectors, "main")
            .first()
            .copied();

        for it in &prog.items {
            match it {
                ast::Item::Pattern(pd) => {
                    let name = pd.name.dotted();
                    if self.pattern_aliases.contains_key(&name) {
                        return Err(Diagnostic::resolve(
                            format!("Duplicate pattern: {}", name),
                            pd.span.clone(),
                        ));
                    }
                    validate_alias_pattern(&pd.pat)?;
                    self.pattern_aliases.insert(name, pd.pat.clone());
                }
                ast::Item::Type(td) => self.resolve_type_decl(td)?,
                ast::Item::Const(cd) => self.resolve_expr(self.global, &cd.value)?,
                ast::Item::Let(ld) => self.resolve_expr(self.global, &ld.value)?,
                ast::Item::Need(nd) => self.resolve_expr(self.global, &nd.value)?,
                ast::Item::Fn(fd) => self.resolve_fn(self.global, fd)?,
                ast::Item::Sector(sd) => {
                    let sector_id = self
                        .scopes
                        .lookup(self.global, Namespace::Sectors, &sd.name.name)
                        .first()
                        .copied()
                        .expect("sector declared in pass A");
                    let scope = self.sector_scopes[&sector_id];
                    for item in &sd.items {
                        match item {
                            ast::SectorItem::Let(ld) => self.resolve_expr(scope, &ld.value)?,
                            ast::SectorItem::Need(nd) => self.resolve_expr(scope, &nd.value)?,
                            ast::SectorItem::Fn(fd) => self.resolve_fn(scope, fd)?,
                            ast::SectorItem::Handler(h) => self.resolve_handler(scope, h)?,
                        }
                    }
                }
                ast::Item::Handler(h) => {
                    if let Some(main) = main_sector {
                        let scope = self.sector_scopes[&main];
                        self.resolve_handler(scope, h)?;
                    }
                }
                ast::Item::Use(_)
                | ast::Item::Mixin(_)
                | ast::Item::UseMixin(_)
                | ast::Item::ResolveMixin(_) => {}
            }
        }
        Ok(())
    }

    fn resolve_type_decl(&mut self, td: &ast::TypeDecl) -> Result<(), Diagnostic> {
        let mut params: HashMap<String, SymbolId> = HashMap::new();
        if let Some(tps) = &td.params {
            let owner = self.typename_to_symbol.get(&td.name.id).copied();
            let mut type_param_ids: Vec<SymbolId> = Vec::new();
            for p in tps {
                // Unique symbol name to avoid global collisions.
                let uniq = format!("{}#T@{}", td.name.dotted(), p.name);
                let pid = self.symbols.fresh(
                    SymbolKind::Type,
                    uniq,
                    p.span.clone(),
                    owner,
                    SymbolData::default(),
                );
                params.insert(p.name.clone(), pid);
                type_param_ids.push(pid);
            }
            if let Some(owner) = owner {
                self.symbols.get_mut(owner).data.type_param_ids = type_param_ids;
            }
        }
        self.resolve_type_rhs(&td.rhs, &params)
    }

    fn resolve_type_rhs(
        &mut self,
        rhs: &ast::TypeRhs,
        params: &HashMap<String, SymbolId>,
    ) -> Result<(), Diagnostic> {
        match rhs {
            ast::TypeRhs::Alias(target) => self.resolve_type_ref(target, params),
            ast::TypeRhs::Record(rec) => {
                for f in &rec.fields {
                    self.resolve_type_ref(&f.ty, params)?;
                }
                Ok(())
            }
            ast::TypeRhs::Sum(sum) => {
                for v in &sum.variants {
                    if let Some(payload) = &v.payload {
                        for t in payload {
                            self.resolve_type_ref(t, params)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_type_ref(
        &mut self,
        tr: &ast::TypeRef,
        params: &HashMap<String, SymbolId>,
    ) -> Result<(), Diagnostic> {
        match tr {
            ast::TypeRef::Paren(inner, _) => self.resolve_type_ref(inner, params),
            ast::TypeRef::Name(tn) => {
                if tn.name.parts.len() == 1 {
                    if let Some(&pid) = params.get(&tn.name.parts[0].name) {
                        self.typename_to_symbol.insert(tn.name.id, pid);
                        return Ok(());
                    }
                }
                let name = tn.name.dotted();
                let matches = self.scopes.lookup(self.global, Namespace::Types, &name);
                let Some(&first) = matches.first() else {
                    return Err(Diagnostic::resolve(
                        format!("Unknown type: {}", name),
                        tn.span.clone(),
                    ));
                };
                self.typename_to_symbol.insert(tn.name.id, first);
                if let Some(args) = &tn.args {
                    for a in args {
                        self.resolve_type_ref(a, params)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_fn(&mut self, scope: ScopeId, fd: &ast::FnDecl) -> Result<(), Diagnostic> {
        let mut params: HashMap<String, SymbolId> = HashMap::new();
        if let Some(tps) = &fd.type_params {
            let fn_owner = self.ident_to_symbol.get(&fd.name.id).copied();
            let mut type_param_ids: Vec<SymbolId> = Vec::new();
            for tp in tps {
                let uniq = format!("{}#T@{}", fd.name.name, tp.name);
                let pid = self.symbols.fresh(
                    SymbolKind::Type,
                    uniq,
                    tp.span.clone(),
                    fn_owner,
                    SymbolData::default(),
                );
                params.insert(tp.name.clone(), pid);
                type_param_ids.push(pid);
            }
            if let Some(fn_owner) = fn_owner {
                self.symbols.get_mut(fn_owner).data.type_param_ids = type_param_ids;
            }
        }

        for p in &fd.params {
            self.resolve_type_ref(&p.ty, &params)?;
        }
        if let Some(ret) = &fd.ret_type {
            self.resolve_type_ref(ret, &params)?;
        }

        let inner = self.scopes.child(scope);
        for p in &fd.params {
            self.define_in_scope(inner, &p.name, SymbolKind::Var, None)?;
        }

        match &fd.body {
            ast::FnBody::Expr(e) => self.resolve_expr(inner, e),
            ast::FnBody::Do(block, _) => self.resolve_block(inner, block),
        }
    }

    fn resolve_handler(&mut self, scope: ScopeId, h: &ast::OnHandler) -> Result<(), Diagnostic> {
        let inner = self.scopes.child(scope);
        if let Some(binder) = &h.binder {
            self.define_in_scope(inner, binder, SymbolKind::Var, None)?;
        }
        if let Some(when) = &h.when {
            self.resolve_expr(inner, when)?;
        }
        match &h.body {
            ast::HandlerBody::Expr(e) => self.resolve_expr(inner, e),
            ast::HandlerBody::Do(block, _) => self.resolve_block(inner, block),
        }
    }

    fn resolve_block(&mut self, scope: ScopeId, b: &ast::Block) -> Result<(), Diagnostic> {
        for st in &b.stmts {
            self.resolve_stmt(scope, st)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, scope: ScopeId, st: &ast::Stmt) -> Result<(), Diagnostic> {
        match st {
            ast::Stmt::Let(l) => {
                self.resolve_expr(scope, &l.value)?;
                self.define_in_scope(scope, &l.name, SymbolKind::Var, None)?;
                Ok(())
            }
            ast::Stmt::Assign(a) => {
                self.resolve_lvalue(scope, &a.target)?;
                self.resolve_expr(scope, &a.value)
            }
            ast::Stmt::Emit(e, _) | ast::Stmt::Return(e, _) | ast::Stmt::Expr(e, _) => {
                self.resolve_expr(scope, e)
            }
            ast::Stmt::If(i) => {
                self.resolve_expr(scope, &i.cond)?;
                let then_scope = self.scopes.child(scope);
                self.resolve_block(then_scope, &i.then_block)?;
                if let Some(eb) = &i.else_block {
                    let else_scope = self.scopes.child(scope);
                    self.resolve_block(else_scope, eb)?;
                }
                Ok(())
            }
            ast::Stmt::For(f) => {
                self.resolve_expr(scope, &f.iterable)?;
                let body_scope = self.scopes.child(scope);
                self.define_in_scope(body_scope, &f.binder, SymbolKind::Var, None)?;
                self.resolve_block(body_scope, &f.body)
            }
            ast::Stmt::Stop(_) | ast::Stmt::Yield(_) => Ok(()),
        }
    }

    fn resolve_lvalue(&mut self, scope: ScopeId, lv: &ast::LValue) -> Result<(), Diagnostic> {
        match lv {
            ast::LValue::Var(ident) => {
                self.resolve_ident_value(scope, ident)?;
                Ok(())
            }
            ast::LValue::Member { object, .. } => self.resolve_expr(scope, object),
            ast::LValue::Index { object, index, .. } => {
                self.resolve_expr(scope, object)?;
                self.resolve_expr(scope, index)
            }
        }
    }

    fn resolve_expr(&mut self, scope: ScopeId, e: &ast::Expr) -> Result<(), Diagnostic> {
        match e {
            ast::Expr::Lit(_) => Ok(()),
            ast::Expr::Var(ident) => {
                self.resolve_ident_value(scope, ident)?;
                Ok(())
            }
            ast::Expr::Record(r) => {
                for it in &r.items {
                    self.resolve_expr(scope, &it.value)?;
                }
                Ok(())
            }
            ast::Expr::Tuple(t) => {
                for it in &t.items {
                    self.resolve_expr(scope, it)?;
                }
                Ok(())
            }
            ast::Expr::Call(c) => {
                self.resolve_expr(scope, &c.callee)?;
                for a in &c.args {
                    self.resolve_expr(scope, a.value())?;
                }
                Ok(())
            }
            ast::Expr::Member(m) => {
                if let Some(sid) = self.try_resolve_namespaced_value(m)? {
                    self.ident_to_symbol.insert(m.field.id, sid);
                    return Ok(());
                }
                self.resolve_expr(scope, &m.object)
            }
            ast::Expr::Index(ix) => {
                self.resolve_expr(scope, &ix.object)?;
                self.resolve_expr(scope, &ix.index)
            }
            ast::Expr::Unary(u) => self.resolve_expr(scope, &u.expr),
            ast::Expr::Binary(b) => {
                self.resolve_expr(scope, &b.left)?;
                self.resolve_expr(scope, &b.right)
            }
            ast::Expr::Pipe(p) => {
                self.resolve_expr(scope, &p.head)?;
                for s in &p.stages {
                    self.resolve_expr(scope, s)?;
                }
                Ok(())
            }
            ast::Expr::Match(m) => {
                self.resolve_expr(scope, &m.scrutinee)?;
                for arm in &m.arms {
                    let arm_scope = self.scopes.child(scope);
                    self.resolve_pattern(arm_scope, &arm.pat)?;
                    match &arm.body {
                        ast::MatchArmBody::Expr(e) => self.resolve_expr(arm_scope, e)?,
                        ast::MatchArmBody::Do(block, _) => {
                            let block_scope = self.scopes.child(arm_scope);
                            self.resolve_block(block_scope, block)?;
                        }
                    }
                }
                Ok(())
            }
            ast::Expr::Await(a) => {
                let name = a.event_type.dotted();
                let matches = self.scopes.lookup(self.global, Namespace::Types, &name);
                if let Some(&first) = matches.first() {
                    self.typename_to_symbol.insert(a.event_type.id, first);
                }
                Ok(())
            }
            ast::Expr::Rpc(rc) | ast::Expr::CallSector(rc) => {
                let matches = self
                    .scopes
                    .lookup(self.global, Namespace::Sectors, &rc.sector.name);
                let Some(&sector_id) = matches.first() else {
                    return Err(Diagnostic::resolve(
                        format!("Unknown sector: {}", rc.sector.name),
                        rc.sector.span.clone(),
                    ));
                };
                self.ident_to_symbol.insert(rc.sector.id, sector_id);

                let fn_id = self.resolve_sector_fn(sector_id, &rc.fn_name)?;
                self.ident_to_symbol.insert(rc.fn_name.id, fn_id);

                for a in &rc.args {
                    self.resolve_expr(scope, a)?;
                }
                Ok(())
            }
            ast::Expr::Proceed(p) => {
                for a in &p.args {
                    self.resolve_expr(scope, a)?;
                }
                Ok(())
            }
            ast::Expr::TrySuffix(t) => self.resolve_expr(scope, &t.inner),
        }
    }

    fn resolve_pattern(&mut self, scope: ScopeId, p: &ast::Pattern) -> Result<(), Diagnostic> {
        match p {
            ast::Pattern::Wildcard(_) | ast::Pattern::Bool(_, _) => Ok(()),
            ast::Pattern::Var(ident) => {
                self.define_in_scope(scope, ident, SymbolKind::Var, None)?;
                Ok(())
            }
            ast::Pattern::Ctor(ctor) => {
                let name = ctor.name.dotted();

                // Nullary constructors may name a pattern alias; expansion
                // chains through alias-of-alias but must not cycle.
                if ctor.args.is_none() && self.pattern_aliases.contains_key(&name) {
                    let expanded =
                        expand_pattern_alias(&name, &self.pattern_aliases, &ctor.span)?;
                    return self.resolve_pattern(scope, &expanded);
                }

                let matches = self.scopes.lookup(self.global, Namespace::Values, &name);
                let Some(&first) = matches.first() else {
                    return Err(Diagnostic::resolve(
                        format!("Unknown constructor pattern: {}", name),
                        ctor.span.clone(),
                    ));
                };
                self.typename_to_symbol.insert(ctor.name.id, first);
                if let Some(args) = &ctor.args {
                    for a in args {
                        self.resolve_pattern(scope, a)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_ident_value(
        &mut self,
        scope: ScopeId,
        ident: &ast::Ident,
    ) -> Result<SymbolId, Diagnostic> {
        let matches = self.scopes.lookup(scope, Namespace::Values, &ident.name);
        if matches.is_empty() {
            return Err(Diagnostic::resolve(
                format!("NameNotFound: {}", ident.name),
                ident.span.clone(),
            ));
        }
        let sid = if matches.len() > 1 {
            // Prefer the candidate from the same source file; this lets a
            // flattened stdlib module refer to its own definitions without
            // being shadowed by imported duplicates.
            let same_file: Vec<SymbolId> = matches
                .iter()
                .copied()
                .filter(|sid| self.symbols.get(*sid).span.file == ident.span.file)
                .collect();
            if same_file.len() == 1 {
                same_file[0]
            } else {
                return Err(Diagnostic::resolve(
                    format!("NameAmbiguity: {}", ident.name),
                    ident.span.clone(),
                ));
            }
        } else {
            matches[0]
        };
        self.ident_to_symbol.insert(ident.id, sid);
        Ok(sid)
    }

    /// `rpc s.f` / `call s.f` target: `f` must be a function owned by
    /// sector `s`, either declared inside it or attached via `fn@s`.
    fn resolve_sector_fn(
        &mut self,
        sector_id: SymbolId,
        fn_name: &ast::Ident,
    ) -> Result<SymbolId, Diagnostic> {
        let mut matches: Vec<SymbolId> = Vec::new();
        if let Some(&scope) = self.sector_scopes.get(&sector_id) {
            matches.extend(
                self.scopes
                    .lookup(scope, Namespace::Values, &fn_name.name)
                    .iter()
                    .copied(),
            );
        }
        for sym in self.symbols.iter() {
            if sym.kind == SymbolKind::Fn
                && sym.name == fn_name.name
                && sym.data.sector == Some(sector_id)
            {
                matches.push(sym.id);
            }
        }

        let mut seen: HashSet<SymbolId> = HashSet::new();
        matches.retain(|sid| seen.insert(*sid));
        if matches.is_empty() {
            return Err(Diagnostic::resolve(
                format!("NameNotFound: {}", fn_name.name),
                fn_name.span.clone(),
            ));
        }
        if matches.len() > 1 {
            return Err(Diagnostic::resolve(
                format!("NameAmbiguity: {}", fn_name.name),
                fn_name.span.clone(),
            ));
        }
        Ok(matches[0])
    }

    /// Recognize `std.option.unwrapOr`-style chains: every segment an
    /// identifier, the prefix naming a stdlib module, the final segment one
    /// of that module's exported globals.
    fn try_resolve_namespaced_value(
        &self,
        e: &ast::MemberExpr,
    ) -> Result<Option<SymbolId>, Diagnostic> {
        let mut parts: Vec<&str> = vec![e.field.name.as_str()];
        let mut cur: &ast::Expr = &e.object;
        loop {
            match cur {
                ast::Expr::Member(m) => {
                    parts.push(m.field.name.as_str());
                    cur = &m.object;
                }
                ast::Expr::Var(ident) => {
                    parts.push(ident.name.as_str());
                    break;
                }
                _ => return Ok(None),
            }
        }
        parts.reverse();
        if parts.len() < 2 {
            return Ok(None);
        }

        let sym_name = parts[parts.len() - 1];
        let mod_qname = parts[..parts.len() - 1].join(".");
        let Some(vpath) = stdlib_virtual_path(&mod_qname) else {
            return Ok(None);
        };

        let matches = self.scopes.lookup(self.global, Namespace::Values, sym_name);
        if matches.is_empty() {
            return Ok(None);
        }
        let filtered: Vec<SymbolId> = matches
            .iter()
            .copied()
            .filter(|sid| {
                self.symbols
                    .get(*sid)
                    .span
                    .file
                    .replace('\\', "/")
                    .ends_with(&vpath)
            })
            .collect();
        if filtered.is_empty() {
            return Ok(None);
        }
        if filtered.len() > 1 {
            return Err(Diagnostic::resolve(
                format!("NameAmbiguity: {}", sym_name),
                e.span.clone(),
            ));
        }
        Ok(Some(filtered[0]))
    }
}

fn validate_alias_pattern(p: &ast::Pattern) -> Result<(), Diagnostic> {
    match p {
        ast::Pattern::Wildcard(_) | ast::Pattern::Bool(_, _) => Ok(()),
        ast::Pattern::Var(ident) => Err(Diagnostic::resolve(
            "pattern alias cannot bind variables (use _)",
            ident.span.clone(),
        )),
        ast::Pattern::Ctor(ctor) => {
            if let Some(args) = &ctor.args {
                for a in args {
                    validate_alias_pattern(a)?;
                }
            }
            Ok(())
        }
    }
}

/// Follow nullary alias chains to the final pattern shape.
pub(crate) fn expand_pattern_alias(
    name: &str,
    aliases: &HashMap<String, ast::Pattern>,
    use_span: &Span,
) -> Result<ast::Pattern, Diagnostic> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut cur_name = name.to_string();
    loop {
        if !seen.insert(cur_name.clone()) {
            return Err(Diagnostic::resolve(
                format!("Cyclic pattern alias: {}", cur_name),
                use_span.clone(),
            ));
        }
        let pat = aliases
            .get(&cur_name)
            .cloned()
            .unwrap_or(ast::Pattern::Wildcard(use_span.clone()));
        match &pat {
            ast::Pattern::Ctor(ctor) if ctor.args.is_none() => {
                let next = ctor.name.dotted();
                if aliases.contains_key(&next) {
                    cur_name = next;
                    continue;
                }
                return Ok(pat);
            }
            _ => return Ok(pat),
        }
    }
}
