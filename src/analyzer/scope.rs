use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    ast::{ast::NodeId, statements::FunDecl, types::TypeExpr},
    Span,
};

/// What a name was introduced by. Resolution treats these differently:
/// variables are only visible after their declaration site, everything
/// else is visible to the whole program (or the whole type body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Variable,
    Parameter,
    Field,
    Function,
    Struct,
    Class,
    Builtin,
}

#[derive(Debug)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    /// Node that owns this declaration. Resolved declaration types are
    /// recorded under this id.
    pub node: NodeId,
    pub span: Span,
    pub annotation: Option<TypeExpr>,
    pub function: Option<Rc<FunDecl>>,
}

impl Declaration {
    pub fn new(
        name: String,
        kind: DeclKind,
        node: NodeId,
        span: Span,
        annotation: Option<TypeExpr>,
    ) -> Self {
        Self {
            name,
            kind,
            node,
            span,
            annotation,
            function: None,
        }
    }

    pub fn function(name: String, kind: DeclKind, fun: Rc<FunDecl>) -> Self {
        Self {
            name,
            kind,
            node: fun.id,
            span: fun.span.clone(),
            annotation: None,
            function: Some(fun),
        }
    }

    pub fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: DeclKind::Builtin,
            node: 0,
            span: Span::null(),
            annotation: None,
            function: None,
        }
    }
}

/// A lexical scope. Scopes form a chain up to the program root and are
/// filled in gradually as resolution rounds visit their declarations,
/// which is why the name table sits behind a `RefCell`.
pub struct Scope {
    parent: Option<Rc<Scope>>,
    names: RefCell<HashMap<String, Rc<Declaration>>>,
}

impl Scope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            names: RefCell::new(HashMap::new()),
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(parent.clone()),
            names: RefCell::new(HashMap::new()),
        })
    }

    /// Adds a declaration. Fails when the scope already holds a
    /// different declaration under the same name.
    pub fn declare(&self, decl: Declaration) -> Result<(), ()> {
        let mut names = self.names.borrow_mut();
        if let Some(existing) = names.get(&decl.name) {
            if existing.node == decl.node {
                return Ok(());
            }
            return Err(());
        }

        names.insert(decl.name.clone(), Rc::new(decl));
        Ok(())
    }

    /// Finds the nearest declaration of `name`, walking outwards.
    pub fn lookup(&self, name: &str) -> Option<Rc<Declaration>> {
        if let Some(decl) = self.names.borrow().get(name) {
            return Some(decl.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Finds the nearest plain variable named `name`, ignoring other
    /// declaration kinds. Used for the field/variable collision check.
    pub fn lookup_variable(&self, name: &str) -> Option<Rc<Declaration>> {
        if let Some(decl) = self.names.borrow().get(name) {
            if decl.kind == DeclKind::Variable {
                return Some(decl.clone());
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.lookup_variable(name))
    }
}
