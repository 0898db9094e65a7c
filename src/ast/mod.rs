//! Surface AST.
//!
//! Nodes are owned sums with a span on every node. Identifiers,
//! qualified names and handlers additionally carry a [`NodeId`]: a
//! process-unique identity the resolver keys its side tables on
//! (`ident_to_symbol` and friends). Cloning a node clones its identity;
//! passes that synthesize new resolvable nodes must build them through
//! [`Ident::new`] so each surviving node has one identity.
//!
//! NodeIds are skipped during serialization — serialized ASTs are stable
//! across runs.

pub mod expr;
pub mod item;

pub use expr::*;
pub use item::*;

use crate::span::Span;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

impl NodeId {
    pub fn fresh() -> NodeId {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ident {
    #[serde(skip)]
    pub id: NodeId,
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Ident {
            id: NodeId::fresh(),
            name: name.into(),
            span,
        }
    }

    /// Same name and span, fresh identity.
    pub fn renumbered(&self) -> Ident {
        Ident::new(self.name.clone(), self.span.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualifiedName {
    #[serde(skip)]
    pub id: NodeId,
    pub parts: Vec<Ident>,
    pub span: Span,
}

impl QualifiedName {
    pub fn new(parts: Vec<Ident>, span: Span) -> Self {
        QualifiedName {
            id: NodeId::fresh(),
            parts,
            span,
        }
    }

    pub fn single(name: impl Into<String>, span: Span) -> Self {
        let ident = Ident::new(name, span.clone());
        QualifiedName::new(vec![ident], span)
    }

    /// Dotted rendering, `a.b.c`.
    pub fn dotted(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub items: Vec<Item>,
    pub run: Option<Span>,
    pub span: Span,
}
