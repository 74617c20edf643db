//! Type annotation nodes.
//!
//! Annotations are syntax, not resolved types: `Int[2][]` parses to nested
//! `Array` nodes whose sizes are ordinary expressions. Semantic analysis
//! resolves them and validates the sizes.

use crate::Span;

use super::ast::{Expr, NodeId};

#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    /// A primitive or user-defined type name.
    Named(String),
    /// `T[]` or `T[size]`. The outermost dimension is written first.
    Array {
        element: Box<TypeExpr>,
        size: Option<Box<Expr>>,
    },
}
