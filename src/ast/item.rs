//! Top-level items, declarations and statements.

use super::expr::{Block, Expr, Pattern};
use super::{Ident, NodeId, QualifiedName};
use crate::span::Span;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub enum Item {
    Type(TypeDecl),
    Const(ConstDecl),
    Let(LetDecl),
    Need(NeedDecl),
    Fn(FnDecl),
    Sector(SectorDecl),
    Handler(OnHandler),
    Mixin(MixinDecl),
    Use(UseStmt),
    UseMixin(UseMixinStmt),
    ResolveMixin(ResolveMixinStmt),
    Pattern(PatternDecl),
}

impl Item {
    pub fn span(&self) -> &Span {
        match self {
            Item::Type(x) => &x.span,
            Item::Const(x) => &x.span,
            Item::Let(x) => &x.span,
            Item::Need(x) => &x.span,
            Item::Fn(x) => &x.span,
            Item::Sector(x) => &x.span,
            Item::Handler(x) => &x.span,
            Item::Mixin(x) => &x.span,
            Item::Use(x) => &x.span,
            Item::UseMixin(x) => &x.span,
            Item::ResolveMixin(x) => &x.span,
            Item::Pattern(x) => &x.span,
        }
    }
}

// ---------------- types ----------------

#[derive(Debug, Clone, Serialize)]
pub struct TypeDecl {
    pub name: QualifiedName,
    pub params: Option<Vec<Ident>>,
    pub rhs: TypeRhs,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeRhs {
    Alias(TypeRef),
    Record(RecordType),
    Sum(SumType),
}

impl TypeRhs {
    pub fn span(&self) -> &Span {
        match self {
            TypeRhs::Alias(t) => t.span(),
            TypeRhs::Record(r) => &r.span,
            TypeRhs::Sum(s) => &s.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordType {
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub name: Ident,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct SumType {
    pub variants: Vec<VariantDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantDecl {
    pub name: Ident,
    pub payload: Option<Vec<TypeRef>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeRef {
    Name(TypeName),
    Paren(Box<TypeRef>, Span),
}

impl TypeRef {
    pub fn span(&self) -> &Span {
        match self {
            TypeRef::Name(n) => &n.span,
            TypeRef::Paren(_, span) => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeName {
    pub name: QualifiedName,
    pub args: Option<Vec<TypeRef>>,
    pub span: Span,
}

// ---------------- value declarations ----------------

#[derive(Debug, Clone, Serialize)]
pub struct ConstDecl {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct LetDecl {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeedAttr {
    pub cache: Option<String>,
    pub cache_fail: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeedDecl {
    pub name: Ident,
    pub attrs: Option<NeedAttr>,
    pub value: Expr,
    pub span: Span,
}

// ---------------- functions ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Normal,
    Varargs,
    Varkw,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamDecl {
    pub name: Ident,
    pub ty: TypeRef,
    pub kind: ParamKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum FnBody {
    /// `= <expr>`
    Expr(Expr),
    /// `= do: <block>`
    Do(Block, Span),
}

impl FnBody {
    pub fn span(&self) -> &Span {
        match self {
            FnBody::Expr(e) => e.span(),
            FnBody::Do(_, span) => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FnDecl {
    pub name: Ident,
    /// `fn@sector name(...)` attaches a top-level fn to a sector.
    pub sector_qual: Option<Ident>,
    pub type_params: Option<Vec<Ident>>,
    pub params: Vec<ParamDecl>,
    pub ret_type: Option<TypeRef>,
    pub body: FnBody,
    pub span: Span,
}

// ---------------- sectors and handlers ----------------

#[derive(Debug, Clone, Serialize)]
pub enum SectorItem {
    Let(LetDecl),
    Need(NeedDecl),
    Fn(FnDecl),
    Handler(OnHandler),
}

impl SectorItem {
    pub fn span(&self) -> &Span {
        match self {
            SectorItem::Let(x) => &x.span,
            SectorItem::Need(x) => &x.span,
            SectorItem::Fn(x) => &x.span,
            SectorItem::Handler(x) => &x.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorDecl {
    pub name: Ident,
    pub items: Vec<SectorItem>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum EventPattern {
    Type(QualifiedName),
    Call(QualifiedName, Vec<Expr>, Span),
}

impl EventPattern {
    pub fn name(&self) -> &QualifiedName {
        match self {
            EventPattern::Type(n) => n,
            EventPattern::Call(n, _, _) => n,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            EventPattern::Type(n) => &n.span,
            EventPattern::Call(_, _, span) => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum HandlerBody {
    Expr(Expr),
    Do(Block, Span),
}

impl HandlerBody {
    pub fn span(&self) -> &Span {
        match self {
            HandlerBody::Expr(e) => e.span(),
            HandlerBody::Do(_, span) => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnHandler {
    #[serde(skip)]
    pub id: NodeId,
    pub event: EventPattern,
    pub binder: Option<Ident>,
    pub when: Option<Expr>,
    pub body: HandlerBody,
    pub span: Span,
}

// ---------------- mixins ----------------

#[derive(Debug, Clone, Serialize)]
pub enum MixinTarget {
    Sector(Ident),
    Type(QualifiedName),
}

impl MixinTarget {
    pub fn span(&self) -> &Span {
        match self {
            MixinTarget::Sector(i) => &i.span,
            MixinTarget::Type(q) => &q.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FnSignature {
    pub name: Ident,
    pub params: Vec<ParamDecl>,
    pub ret_type: Option<TypeRef>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HookPoint {
    Head,
    Invoke,
    Tail,
}

impl HookPoint {
    pub fn label(self) -> &'static str {
        match self {
            HookPoint::Head => "head",
            HookPoint::Invoke => "invoke",
            HookPoint::Tail => "tail",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum MixinItem {
    /// `fn name(params) -> T = body`
    FnAdd(MixinFnAdd),
    /// `name: Type` (record-type targets only)
    FieldAdd(MixinFieldAdd),
    /// `around fn name(params) -> T: block`
    Around(MixinAround),
    /// `hook <point> fn name(params) with(opts) = body`
    Hook(MixinHook),
    Pattern(PatternDecl),
}

#[derive(Debug, Clone, Serialize)]
pub struct MixinFnAdd {
    pub sig: FnSignature,
    pub body: FnBody,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixinFieldAdd {
    pub name: Ident,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixinAround {
    pub sig: FnSignature,
    pub block: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixinHook {
    pub point: HookPoint,
    pub sig: FnSignature,
    pub body: FnBody,
    pub opts: BTreeMap<String, String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixinDecl {
    pub name: QualifiedName,
    pub version: u32,
    pub target: MixinTarget,
    pub items: Vec<MixinItem>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UseStmt {
    pub name: QualifiedName,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UseMixinStmt {
    pub name: QualifiedName,
    pub version: u32,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferRef {
    pub name: QualifiedName,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferRule {
    pub prefer: PreferRef,
    pub over: PreferRef,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveMixinStmt {
    pub rules: Vec<PreferRule>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternDecl {
    pub name: QualifiedName,
    pub pat: Pattern,
    pub span: Span,
}

// ---------------- statements ----------------

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    Emit(Expr, Span),
    Return(Expr, Span),
    Expr(Expr, Span),
    Stop(Span),
    Yield(Span),
    If(IfStmt),
    For(ForStmt),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Let(x) => &x.span,
            Stmt::Assign(x) => &x.span,
            Stmt::Emit(_, span) => span,
            Stmt::Return(_, span) => span,
            Stmt::Expr(_, span) => span,
            Stmt::Stop(span) => span,
            Stmt::Yield(span) => span,
            Stmt::If(x) => &x.span,
            Stmt::For(x) => &x.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LetStmt {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    pub fn label(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum LValue {
    Var(Ident),
    Member {
        object: Box<Expr>,
        field: Ident,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
}

impl LValue {
    pub fn span(&self) -> &Span {
        match self {
            LValue::Var(i) => &i.span,
            LValue::Member { span, .. } => span,
            LValue::Index { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignStmt {
    pub target: LValue,
    pub op: AssignOp,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForStmt {
    pub binder: Ident,
    pub iterable: Expr,
    pub body: Block,
    pub span: Span,
}
