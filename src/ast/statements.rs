use std::rc::Rc;

use crate::Span;

use super::{
    ast::{Expr, NodeId},
    types::TypeExpr,
};

#[derive(Debug, Clone)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expression(Expr),
    VarDecl {
        name: String,
        ty: TypeExpr,
        init: Option<Expr>,
    },
    FunDecl(Rc<FunDecl>),
    StructDecl(Rc<TypeDecl>),
    ClassDecl(Rc<TypeDecl>),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
}

/// A function declaration. Shared between the statement that introduces it
/// and the closures the interpreter builds from it.
#[derive(Debug, Clone)]
pub struct FunDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub params: Vec<Param>,
    /// `None` means the function returns nothing.
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub ty: TypeExpr,
}

/// A struct or class declaration. Structs carry no methods.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Rc<FunDecl>>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub ty: TypeExpr,
}
