//! Expressions, patterns and blocks.

use super::{Ident, QualifiedName};
use crate::span::Span;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub stmts: Vec<super::Stmt>,
    pub span: Span,
}

/// Literal payloads. Int and Float carry their normalized source text
/// (base-prefixed ints are already decimal). Bytes reuse the string
/// representation with every char in byte range, as validated by the lexer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Lit {
    Int(String),
    Float(String),
    Str(String),
    Bytes(String),
    Bool(bool),
}

#[derive(Debug, Clone, Serialize)]
pub struct Literal {
    pub lit: Lit,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Lit(Literal),
    Var(Ident),
    Record(RecordLit),
    Tuple(TupleLit),
    Call(CallExpr),
    Member(MemberExpr),
    Index(IndexExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Pipe(PipeExpr),
    Match(MatchExpr),
    Await(AwaitExpr),
    /// `rpc sector.fn(args)` — cross-sector call awaiting the result.
    Rpc(SectorCallExpr),
    /// `call sector.fn(args)` — fire-and-forget cross-sector call.
    CallSector(SectorCallExpr),
    Proceed(ProceedExpr),
    TrySuffix(TrySuffixExpr),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Lit(x) => &x.span,
            Expr::Var(x) => &x.span,
            Expr::Record(x) => &x.span,
            Expr::Tuple(x) => &x.span,
            Expr::Call(x) => &x.span,
            Expr::Member(x) => &x.span,
            Expr::Index(x) => &x.span,
            Expr::Unary(x) => &x.span,
            Expr::Binary(x) => &x.span,
            Expr::Pipe(x) => &x.span,
            Expr::Match(x) => &x.span,
            Expr::Await(x) => &x.span,
            Expr::Rpc(x) => &x.span,
            Expr::CallSector(x) => &x.span,
            Expr::Proceed(x) => &x.span,
            Expr::TrySuffix(x) => &x.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordItem {
    pub key: Ident,
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
    Kw { name: Ident, value: Expr, span: Span },
    StarStar { value: Expr, span: Span },
}

impl CallArg {
    pub fn span(&self) -> &Span {
        match self {
            CallArg::Pos { span, .. } => span,
            CallArg::Star { span, .. } => span,
            CallArg::Kw { span, .. } => span,
            CallArg::StarStar { span, .. } => span,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            CallArg::Pos { value, .. } => value,
            CallArg::Star { value, .. } => value,
            CallArg::Kw { value, .. } => value,
            CallArg::StarStar { value, .. } => value,
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
    pub field: Ident,
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

/// `head |> f |> g(a)`. Stages are kept unexpanded until lowering.
#[derive(Debug, Clone, Serialize)]
pub struct PipeExpr {
    pub head: Box<Expr>,
    pub stages: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum MatchArmBody {
    Expr(Expr),
    Do(Block, Span),
}

impl MatchArmBody {
    pub fn span(&self) -> &Span {
        match self {
            MatchArmBody::Expr(e) => e.span(),
            MatchArmBody::Do(_, span) => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchArm {
    pub pat: Pattern,
    pub body: MatchArmBody,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchExpr {
    pub scrutinee: Box<Expr>,
    pub arms: Vec<MatchArm>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwaitExpr {
    pub event_type: QualifiedName,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorCallExpr {
    pub sector: Ident,
    pub fn_name: Ident,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProceedExpr {
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrySuffixExpr {
    pub inner: Box<Expr>,
    pub span: Span,
}

// ---------------- patterns ----------------

#[derive(Debug, Clone, Serialize)]
pub enum Pattern {
    Wildcard(Span),
    Var(Ident),
    Bool(bool, Span),
    Ctor(PCtor),
}

impl Pattern {
    pub fn span(&self) -> &Span {
        match self {
            Pattern::Wildcard(span) => span,
            Pattern::Var(i) => &i.span,
            Pattern::Bool(_, span) => span,
            Pattern::Ctor(c) => &c.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PCtor {
    pub name: QualifiedName,
    /// `None` for a bare constructor, `Some(vec![])` for explicit `()`.
    pub args: Option<Vec<Pattern>>,
    pub span: Span,
}
