//! Resolved intermediate representation.
//!
//! Mirrors the surface AST with every identifier replaced by its
//! `SymbolId`, pipes expanded into call chains, try-suffix rewritten into
//! explicit match-and-propagate statements, and block-arm matches hoisted
//! into statement matches writing a synthesized result variable. HIR is
//! immutable once built; the type checker only reads it.

use crate::ast::Lit;
use crate::span::Span;
use crate::symbols::{SymbolId, TypeId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum TypeRef {
    /// Plain type reference, builtin, declared type or type parameter.
    Name { id: TypeId, span: Span },
    /// Type application, `List[T]`.
    App {
        base: TypeId,
        args: Vec<TypeRef>,
        span: Span,
    },
}

impl TypeRef {
    pub fn span(&self) -> &Span {
        match self {
            TypeRef::Name { span, .. } => span,
            TypeRef::App { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub types: Vec<TypeDecl>,
    pub consts: Vec<ValueDecl>,
    pub globals: Vec<ValueDecl>,
    pub needs: Vec<ValueDecl>,
    pub fns: Vec<FnDecl>,
    pub sectors: Vec<SectorDecl>,
    pub run: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDecl {
    pub sym: SymbolId,
    pub rhs: TypeRhs,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeRhs {
    Alias { target: TypeRef, span: Span },
    Record { fields: Vec<FieldDecl>, span: Span },
    Sum { variants: Vec<VariantDecl>, span: Span },
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantDecl {
    pub ctor: SymbolId,
    pub payload: Option<Vec<TypeRef>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueDecl {
    pub sym: SymbolId,
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Normal,
    Varargs,
    Varkw,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub sym: SymbolId,
    pub ty: TypeRef,
    pub kind: ParamKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct FnDecl {
    pub sym: SymbolId,
    pub owner_sector: Option<SymbolId>,
    pub params: Vec<Param>,
    pub ret_type: Option<TypeRef>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorDecl {
    pub sym: SymbolId,
    pub fns: Vec<FnDecl>,
    pub handlers: Vec<HandlerDecl>,
    pub lets: Vec<ValueDecl>,
    pub needs: Vec<ValueDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerDecl {
    pub sym: SymbolId,
    pub event_type: TypeId,
    pub binder: Option<SymbolId>,
    pub when: Option<Expr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    If(IfStmt),
    For(ForStmt),
    Emit(Expr, Span),
    Return(Expr, Span),
    /// Try-suffix failure path inside a handler body.
    AbortHandler(Option<Expr>, Span),
    Stop(Span),
    Yield(Span),
    Expr(Expr, Span),
    Match(MatchStmt),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Let(x) => &x.span,
            Stmt::Assign(x) => &x.span,
            Stmt::If(x) => &x.span,
            Stmt::For(x) => &x.span,
            Stmt::Emit(_, span) => span,
            Stmt::Return(_, span) => span,
            Stmt::AbortHandler(_, span) => span,
            Stmt::Stop(span) => span,
            Stmt::Yield(span) => span,
            Stmt::Expr(_, span) => span,
            Stmt::Match(x) => &x.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LetStmt {
    pub sym: SymbolId,
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignStmt {
    pub target: LValue,
    pub op: crate::ast::AssignOp,
    pub expr: Expr,
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
    pub binder: SymbolId,
    pub iterable: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum LValue {
    Var { sym: SymbolId, span: Span },
    Member {
        object: Box<Expr>,
        field: String,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Literal {
    pub lit: Lit,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Lit(Literal),
    Var { sym: SymbolId, span: Span },
    /// Placeholder initializer for synthesized result variables.
    Undef { span: Span },
    Record(RecordLit),
    Tuple(TupleLit),
    Call(CallExpr),
    Member(MemberExpr),
    Index(IndexExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Match(MatchExpr),
    AwaitEvent { type_id: TypeId, span: Span },
    RpcCall(RpcCallExpr),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Lit(x) => &x.span,
            Expr::Var { span, .. } => span,
            Expr::Undef { span } => span,
            Expr::Record(x) => &x.span,
            Expr::Tuple(x) => &x.span,
            Expr::Call(x) => &x.span,
            Expr::Member(x) => &x.span,
            Expr::Index(x) => &x.span,
            Expr::Unary(x) => &x.span,
            Expr::Binary(x) => &x.span,
            Expr::Match(x) => &x.span,
            Expr::AwaitEvent { span, .. } => span,
            Expr::RpcCall(x) => &x.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordItem {
    pub key: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordLit {
    pub items: Vec<RecordItem>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TupleLit {
    pub items: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum CallArg {
    Pos { value: Expr, span: Span },
    Star { value: Expr, span: Span },
    Kw { name: String, value: Expr, span: Span },
    StarStar { value: Expr, span: Span },
}

impl CallArg {
    pub fn value(&self) -> &Expr {
        match self {
            CallArg::Pos { value, .. } => value,
            CallArg::Star { value, .. } => value,
            CallArg::Kw { value, .. } => value,
            CallArg::StarStar { value, .. } => value,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            CallArg::Pos { span, .. } => span,
            CallArg::Star { span, .. } => span,
            CallArg::Kw { span, .. } => span,
            CallArg::StarStar { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<CallArg>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberExpr {
    pub object: Box<Expr>,
    pub field: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexExpr {
    pub object: Box<Expr>,
    pub index: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnaryExpr {
    pub op: String,
    pub expr: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinaryExpr {
    pub op: String,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Pattern {
    Wildcard(Span),
    Var { sym: SymbolId, span: Span },
    Bool(bool, Span),
    Ctor {
        ctor: SymbolId,
        args: Option<Vec<Pattern>>,
        span: Span,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchArmExpr {
    pub pat: Pattern,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchExpr {
    pub scrutinee: Box<Expr>,
    pub arms: Vec<MatchArmExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchArmStmt {
    pub pat: Pattern,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchStmt {
    pub scrutinee: Expr,
    pub arms: Vec<MatchArmStmt>,
    pub span: Span,
}

/// Cross-sector call; `await_result` distinguishes `rpc` from `call`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcCallExpr {
    pub sector: SymbolId,
    pub target: SymbolId,
    pub args: Vec<Expr>,
    pub await_result: bool,
    pub span: Span,
}
