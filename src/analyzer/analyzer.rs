use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::{
    ast::{
        ast::{BinaryOp, Expr, ExprKind, NodeId, UnaryOp},
        statements::{FunDecl, Stmt, StmtKind, TypeDecl},
        types::{TypeExpr, TypeExprKind},
    },
    errors::errors::SemanticError,
    Span,
};

use super::{
    scope::{DeclKind, Declaration, Scope},
    types::{format_shape, Signature, Type},
};

/// Everything later stages need from analysis: node types keyed by id,
/// declared array sizes for default allocation, and the diagnostics.
pub struct Analysis {
    pub types: HashMap<NodeId, Type>,
    pub sizes: HashMap<NodeId, Vec<usize>>,
    pub errors: Vec<SemanticError>,
}

/// The state of one node attribute during resolution. `Pending` means a
/// name it depends on has not been registered yet; `Failed` means the
/// node already produced a diagnostic and everything built on it should
/// stay quiet.
enum Outcome {
    Typed(Type),
    Pending,
    Failed,
}

pub fn analyze(program: &[Stmt]) -> Analysis {
    let root = Scope::root();
    // `print` is always in scope
    let _ = root.declare(Declaration::builtin("print"));

    let mut analyzer = Analyzer {
        registry: HashMap::new(),
        scopes: HashMap::new(),
        types: HashMap::new(),
        shapes: HashMap::new(),
        decl_shapes: HashMap::new(),
        sizes: HashMap::new(),
        signatures: HashMap::new(),
        failed: HashSet::new(),
        done: HashSet::new(),
        registered: HashSet::new(),
        errors: Vec::new(),
        pending: Vec::new(),
        progress: false,
        return_types: Vec::new(),
        print_signature: Rc::new(Signature {
            name: String::from("print"),
            params: vec![Type::Str],
            ret: Type::Str,
        }),
    };

    loop {
        analyzer.progress = false;
        analyzer.pending.clear();

        let mut settled = true;
        for stmt in program {
            if !analyzer.resolve_stmt(stmt, &root) {
                settled = false;
            }
        }

        if settled {
            break;
        }
        if !analyzer.progress {
            // Nothing moved this round, so what is still pending can
            // never resolve.
            analyzer.report_unresolved();
            break;
        }
    }

    Analysis {
        types: analyzer.types,
        sizes: analyzer.sizes,
        errors: analyzer.errors,
    }
}

struct Analyzer {
    /// Struct and class declarations by name.
    registry: HashMap<String, (Rc<TypeDecl>, bool)>,
    /// Lexical scopes by owning node, kept stable across rounds.
    scopes: HashMap<NodeId, Rc<Scope>>,
    types: HashMap<NodeId, Type>,
    /// Static shapes of array-valued expressions, where known.
    shapes: HashMap<NodeId, Vec<usize>>,
    /// Static shapes of declarations, from sized annotations or the
    /// initializer.
    decl_shapes: HashMap<NodeId, Vec<usize>>,
    /// Validated leading sizes of variable declarations.
    sizes: HashMap<NodeId, Vec<usize>>,
    signatures: HashMap<NodeId, Rc<Signature>>,
    failed: HashSet<NodeId>,
    /// Statements that have fully settled and are skipped in later rounds.
    done: HashSet<NodeId>,
    /// Declarations already entered into their scope.
    registered: HashSet<NodeId>,
    errors: Vec<SemanticError>,
    /// Names that could not be looked up this round.
    pending: Vec<(String, Span)>,
    progress: bool,
    /// Expected return types of the functions currently being analyzed.
    return_types: Vec<Type>,
    print_signature: Rc<Signature>,
}

impl Analyzer {
    // ------------------------------------------------------------------
    // Statements

    /// Resolves as much of a statement as currently possible. Returns
    /// true once the statement (and everything under it) has settled.
    fn resolve_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> bool {
        if self.done.contains(&stmt.id) {
            return true;
        }

        let settled = match &stmt.kind {
            StmtKind::Expression(expr) => {
                !matches!(self.resolve_expr(expr, scope), Outcome::Pending)
            }
            StmtKind::VarDecl { name, ty, init } => {
                self.resolve_var_decl(stmt, name, ty, init.as_ref(), scope)
            }
            StmtKind::FunDecl(fun) => self.resolve_function(fun, scope),
            StmtKind::StructDecl(decl) => self.resolve_type_decl(decl, false, scope),
            StmtKind::ClassDecl(decl) => self.resolve_type_decl(decl, true, scope),
            StmtKind::Block(stmts) => {
                let inner = self.scope_for(stmt.id, scope);
                let mut settled = true;
                for stmt in stmts {
                    if !self.resolve_stmt(stmt, &inner) {
                        settled = false;
                    }
                }
                settled
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let cond = self.resolve_expr(condition, scope);
                let mut settled = !matches!(cond, Outcome::Pending);
                if !self.resolve_stmt(then_body, scope) {
                    settled = false;
                }
                if let Some(else_body) = else_body {
                    if !self.resolve_stmt(else_body, scope) {
                        settled = false;
                    }
                }
                if settled {
                    if let Outcome::Typed(t) = cond {
                        if t != Type::Bool {
                            self.error(
                                format!("If statement with a non-boolean condition of type: {}", t),
                                condition.span.clone(),
                            );
                        }
                    }
                }
                settled
            }
            StmtKind::While { condition, body } => {
                let cond = self.resolve_expr(condition, scope);
                let mut settled = !matches!(cond, Outcome::Pending);
                if !self.resolve_stmt(body, scope) {
                    settled = false;
                }
                if settled {
                    if let Outcome::Typed(t) = cond {
                        if t != Type::Bool {
                            self.error(
                                format!(
                                    "While statement with a non-boolean condition of type: {}",
                                    t
                                ),
                                condition.span.clone(),
                            );
                        }
                    }
                }
                settled
            }
            StmtKind::Return(value) => {
                let outcome = match value {
                    Some(expr) => self.resolve_expr(expr, scope),
                    None => Outcome::Typed(Type::Void),
                };
                match outcome {
                    Outcome::Pending => false,
                    Outcome::Failed => true,
                    Outcome::Typed(actual) => {
                        // Return statements outside any function are legal
                        // and end the program with a value.
                        if let Some(expected) = self.return_types.last().cloned() {
                            let compatible = match (&expected, &actual) {
                                (Type::Void, Type::Void) => true,
                                (Type::Void, _) | (_, Type::Void) => false,
                                (expected, actual) => expected.assignable_from(actual),
                            };
                            if !compatible {
                                self.error(
                                    format!("expected {} but got {}", expected, actual),
                                    stmt.span.clone(),
                                );
                            }
                        }
                        true
                    }
                }
            }
        };

        if settled {
            self.done.insert(stmt.id);
        }
        settled
    }

    fn resolve_var_decl(
        &mut self,
        stmt: &Stmt,
        name: &str,
        ty: &TypeExpr,
        init: Option<&Expr>,
        scope: &Rc<Scope>,
    ) -> bool {
        if self.registered.insert(stmt.id) {
            self.progress = true;
            let decl = Declaration::new(
                name.to_string(),
                DeclKind::Variable,
                stmt.id,
                stmt.span.clone(),
                Some(ty.clone()),
            );
            if scope.declare(decl).is_err() {
                self.error(format!("Trying to redeclare: {}", name), stmt.span.clone());
            }
        }

        let annotation = self.resolve_type_expr(ty, scope);
        let value = init.map(|expr| (expr, self.resolve_expr(expr, scope)));

        if matches!(annotation, Outcome::Pending) {
            return false;
        }
        if let Some((_, Outcome::Pending)) = value {
            return false;
        }

        // Settles this round, so the checks below run exactly once.
        if let Outcome::Typed(declared) = annotation {
            let sizes = self.validate_sizes(ty);
            if !sizes.is_empty() {
                if sizes.len() == declared.dimensions() {
                    self.decl_shapes.insert(stmt.id, sizes.clone());
                }
                self.sizes.insert(stmt.id, sizes);
            }

            if let Some((expr, Outcome::Typed(actual))) = &value {
                if !declared.assignable_from(actual) {
                    self.error(
                        format!("expected {} but got {}", declared, actual),
                        expr.span.clone(),
                    );
                }
            }

            self.types.insert(stmt.id, declared);
        }
        true
    }

    fn resolve_function(&mut self, fun: &Rc<FunDecl>, scope: &Rc<Scope>) -> bool {
        if self.done.contains(&fun.id) {
            return true;
        }

        if self.registered.insert(fun.id) {
            self.progress = true;
            let decl = Declaration::function(fun.name.clone(), DeclKind::Function, fun.clone());
            if scope.declare(decl).is_err() {
                self.error(
                    format!("Trying to redeclare: {}", fun.name),
                    fun.span.clone(),
                );
            }
        }

        let signature = self.resolve_signature(fun, scope);
        if matches!(signature, Outcome::Pending) {
            return false;
        }

        let body_scope = self.scope_for(fun.id, scope);
        for param in &fun.params {
            if self.registered.insert(param.id) {
                self.progress = true;
                let decl = Declaration::new(
                    param.name.clone(),
                    DeclKind::Parameter,
                    param.id,
                    param.span.clone(),
                    Some(param.ty.clone()),
                );
                if body_scope.declare(decl).is_err() {
                    self.error(
                        format!("Trying to redeclare: {}", param.name),
                        param.span.clone(),
                    );
                }
            }
        }

        let ret = match &signature {
            Outcome::Typed(Type::Function(sig)) => sig.ret.clone(),
            // The signature failed; still analyze the body for its own errors.
            _ => Type::Void,
        };

        self.return_types.push(ret.clone());
        let mut settled = true;
        for stmt in &fun.body {
            if !self.resolve_stmt(stmt, &body_scope) {
                settled = false;
            }
        }
        self.return_types.pop();

        if settled && self.done.insert(fun.id) {
            if ret != Type::Void && !block_returns(&fun.body) {
                self.error(String::from("Missing return in function"), fun.span.clone());
            }
        }
        settled
    }

    fn resolve_signature(&mut self, fun: &Rc<FunDecl>, scope: &Rc<Scope>) -> Outcome {
        if let Some(sig) = self.signatures.get(&fun.id) {
            return Outcome::Typed(Type::Function(sig.clone()));
        }
        if self.failed.contains(&fun.id) {
            return Outcome::Failed;
        }

        let mut params = Vec::new();
        let mut failed = false;
        for param in &fun.params {
            match self.resolve_type_expr(&param.ty, scope) {
                Outcome::Typed(t) => {
                    self.types.insert(param.id, t.clone());
                    params.push(t);
                }
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => failed = true,
            }
        }

        let ret = match &fun.return_type {
            Some(ty) => match self.resolve_type_expr(ty, scope) {
                Outcome::Typed(t) => t,
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => {
                    failed = true;
                    Type::Void
                }
            },
            None => Type::Void,
        };

        if failed {
            return self.fail_silent(fun.id);
        }

        self.types.insert(fun.id, ret.clone());
        let sig = Rc::new(Signature {
            name: fun.name.clone(),
            params,
            ret,
        });
        self.signatures.insert(fun.id, sig.clone());
        self.progress = true;
        Outcome::Typed(Type::Function(sig))
    }

    fn resolve_type_decl(&mut self, decl: &Rc<TypeDecl>, is_class: bool, scope: &Rc<Scope>) -> bool {
        if self.registered.insert(decl.id) {
            self.progress = true;
            let kind = if is_class {
                DeclKind::Class
            } else {
                DeclKind::Struct
            };
            let declaration =
                Declaration::new(decl.name.clone(), kind, decl.id, decl.span.clone(), None);
            if scope.declare(declaration).is_err() {
                self.error(
                    format!("Trying to redeclare: {}", decl.name),
                    decl.span.clone(),
                );
            }
            self.registry.insert(decl.name.clone(), (decl.clone(), is_class));
        }

        let body_scope = self.scope_for(decl.id, scope);
        for field in &decl.fields {
            if self.registered.insert(field.id) {
                self.progress = true;
                if scope.lookup_variable(&field.name).is_some() {
                    panic!("You cannot define a attribut and a variable with the same name");
                }
                let declaration = Declaration::new(
                    field.name.clone(),
                    DeclKind::Field,
                    field.id,
                    field.span.clone(),
                    Some(field.ty.clone()),
                );
                if body_scope.declare(declaration).is_err() {
                    self.error(
                        format!("Trying to redeclare: {}", field.name),
                        field.span.clone(),
                    );
                }
            }
        }

        let mut settled = true;
        for field in &decl.fields {
            match self.resolve_type_expr(&field.ty, scope) {
                Outcome::Typed(t) => {
                    self.types.insert(field.id, t);
                }
                Outcome::Pending => settled = false,
                Outcome::Failed => {}
            }
        }

        for method in &decl.methods {
            if !self.resolve_function(method, &body_scope) {
                settled = false;
            }
        }
        settled
    }

    // ------------------------------------------------------------------
    // Expressions

    fn resolve_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Outcome {
        if let Some(t) = self.types.get(&expr.id) {
            return Outcome::Typed(t.clone());
        }
        if self.failed.contains(&expr.id) {
            return Outcome::Failed;
        }

        match &expr.kind {
            ExprKind::Int(_) => self.typed(expr.id, Type::Int),
            ExprKind::Float(_) => self.typed(expr.id, Type::Float),
            ExprKind::Str(_) => self.typed(expr.id, Type::Str),
            ExprKind::Bool(_) => self.typed(expr.id, Type::Bool),
            ExprKind::Null => self.typed(expr.id, Type::Null),
            ExprKind::Identifier(name) => self.resolve_identifier(expr, name, scope),
            ExprKind::Array(elements) => self.resolve_array(expr, elements, scope),
            ExprKind::Unary { op, operand } => self.resolve_unary(expr, *op, operand, scope),
            ExprKind::Binary { op, left, right } => {
                self.resolve_binary(expr, *op, left, right, scope)
            }
            ExprKind::Assign { target, value } => self.resolve_assign(expr, target, value, scope),
            ExprKind::Index { target, index } => self.resolve_index(expr, target, index, scope),
            ExprKind::Field { target, field } => self.resolve_field(expr, target, field, scope),
            ExprKind::Call { callee, args } => self.resolve_call(expr, callee, args, scope),
            ExprKind::Construct { name, args } => self.resolve_construct(expr, name, args, scope),
        }
    }

    fn resolve_identifier(&mut self, expr: &Expr, name: &str, scope: &Rc<Scope>) -> Outcome {
        let Some(decl) = scope.lookup(name) else {
            self.pending.push((name.to_string(), expr.span.clone()));
            return Outcome::Pending;
        };

        match decl.kind {
            DeclKind::Variable if expr.span.start.0 < decl.span.start.0 => self.fail(
                expr.id,
                format!("Variable used before declaration: {}", name),
                expr.span.clone(),
            ),
            DeclKind::Variable | DeclKind::Parameter | DeclKind::Field => {
                let outcome = match decl.annotation.as_ref() {
                    Some(ty) => self.resolve_type_expr(ty, scope),
                    None => Outcome::Failed,
                };
                match outcome {
                    Outcome::Typed(t) => {
                        let shape = self.decl_shapes.get(&decl.node).cloned().or_else(|| {
                            decl.annotation.as_ref().and_then(static_annotation_shape)
                        });
                        if let Some(shape) = shape {
                            self.shapes.insert(expr.id, shape);
                        }
                        self.typed(expr.id, t)
                    }
                    Outcome::Pending => Outcome::Pending,
                    Outcome::Failed => self.fail_silent(expr.id),
                }
            }
            DeclKind::Function => match decl.function.clone() {
                Some(fun) => match self.resolve_signature(&fun, scope) {
                    Outcome::Typed(t) => self.typed(expr.id, t),
                    Outcome::Pending => Outcome::Pending,
                    Outcome::Failed => self.fail_silent(expr.id),
                },
                None => self.fail_silent(expr.id),
            },
            DeclKind::Struct | DeclKind::Class => self.typed(expr.id, Type::Meta),
            DeclKind::Builtin => {
                let sig = self.print_signature.clone();
                self.typed(expr.id, Type::Function(sig))
            }
        }
    }

    fn resolve_array(&mut self, expr: &Expr, elements: &[Expr], scope: &Rc<Scope>) -> Outcome {
        let mut element_types = Vec::new();
        let mut failed = false;
        for element in elements {
            match self.resolve_expr(element, scope) {
                Outcome::Typed(t) => element_types.push(t),
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => failed = true,
            }
        }
        if failed {
            return self.fail_silent(expr.id);
        }

        // The empty literal types as Null[], which binds to any array type
        let mut element_type = Type::Null;
        for t in &element_types {
            if element_type == Type::Null {
                element_type = t.clone();
            } else if element_type != *t && element_type.is_numeric() && t.is_numeric() {
                element_type = Type::Float;
            }
        }

        let shape = if elements.is_empty() {
            Some(vec![0])
        } else if element_type.is_array() {
            let mut common: Option<Vec<usize>> = None;
            let mut known = true;
            for element in elements {
                match self.shapes.get(&element.id) {
                    Some(shape) => match &common {
                        Some(c) if c != shape => {
                            known = false;
                            break;
                        }
                        Some(_) => {}
                        None => common = Some(shape.clone()),
                    },
                    None => {
                        known = false;
                        break;
                    }
                }
            }
            match (known, common) {
                (true, Some(inner)) => {
                    let mut shape = vec![elements.len()];
                    shape.extend(inner);
                    Some(shape)
                }
                _ => None,
            }
        } else {
            Some(vec![elements.len()])
        };

        if let Some(shape) = shape {
            self.shapes.insert(expr.id, shape);
        }
        self.typed(expr.id, Type::Array(Box::new(element_type)))
    }

    fn resolve_unary(
        &mut self,
        expr: &Expr,
        op: UnaryOp,
        operand: &Expr,
        scope: &Rc<Scope>,
    ) -> Outcome {
        let t = match self.resolve_expr(operand, scope) {
            Outcome::Pending => return Outcome::Pending,
            Outcome::Failed => return self.fail_silent(expr.id),
            Outcome::Typed(t) => t,
        };

        match op {
            UnaryOp::Not => {
                if t == Type::Bool {
                    self.typed(expr.id, Type::Bool)
                } else {
                    self.fail(
                        expr.id,
                        format!(
                            "Attempting to perform unary logic on non-boolean type: {}",
                            t
                        ),
                        expr.span.clone(),
                    )
                }
            }
            UnaryOp::Neg => {
                if t.is_numeric() {
                    self.typed(expr.id, t)
                } else {
                    self.fail(
                        expr.id,
                        format!("Trying to negate {}", t),
                        expr.span.clone(),
                    )
                }
            }
        }
    }

    fn resolve_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Rc<Scope>,
    ) -> Outcome {
        let lhs = self.resolve_expr(left, scope);
        let rhs = self.resolve_expr(right, scope);
        let (lt, rt) = match (lhs, rhs) {
            (Outcome::Pending, _) | (_, Outcome::Pending) => return Outcome::Pending,
            (Outcome::Failed, _) | (_, Outcome::Failed) => return self.fail_silent(expr.id),
            (Outcome::Typed(lt), Outcome::Typed(rt)) => (lt, rt),
        };

        if op.is_logic() {
            for t in [&lt, &rt] {
                if *t != Type::Bool {
                    let message = format!(
                        "Attempting to perform binary logic on non-boolean type: {}",
                        t
                    );
                    return self.fail(expr.id, message, expr.span.clone());
                }
            }
            return self.typed(expr.id, Type::Bool);
        }

        if op.is_equality() {
            let comparable = lt == rt
                || (lt.is_numeric() && rt.is_numeric())
                // Arrays of any shape compare by reference
                || (lt.is_array() && rt.is_array())
                || lt == Type::Null
                || rt == Type::Null
                || lt.assignable_from(&rt)
                || rt.assignable_from(&lt);
            if comparable {
                return self.typed(expr.id, Type::Bool);
            }
            let message = format!("Trying to compare incomparable types {} and {}", lt, rt);
            return self.fail(expr.id, message, expr.span.clone());
        }

        if op.is_ordering() {
            if lt.is_numeric() && rt.is_numeric() {
                return self.typed(expr.id, Type::Bool);
            }
            let message = format!("Trying to compare incomparable types {} and {}", lt, rt);
            return self.fail(expr.id, message, expr.span.clone());
        }

        if op == BinaryOp::MatMul {
            return self.resolve_matmul(expr, left, right, lt, rt);
        }

        self.resolve_arithmetic(expr, op, left, right, lt, rt, scope)
    }

    fn resolve_arithmetic(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        lt: Type,
        rt: Type,
        scope: &Rc<Scope>,
    ) -> Outcome {
        // String concatenation stringifies the other side
        if op == BinaryOp::Add && (lt == Type::Str || rt == Type::Str) {
            return self.typed(expr.id, Type::Str);
        }

        if lt.is_numeric() && rt.is_numeric() {
            let t = if lt == Type::Float || rt == Type::Float {
                Type::Float
            } else {
                Type::Int
            };
            return self.typed(expr.id, t);
        }

        if lt.is_array() && rt.is_array() {
            let mismatch = match (self.shapes.get(&left.id), self.shapes.get(&right.id)) {
                (Some(ls), Some(rs)) if ls != rs => Some((format_shape(ls), format_shape(rs))),
                _ => None,
            };
            if let Some((ls, rs)) = mismatch {
                let message = format!(
                    "Trying to operate on arrays with different dimensions: {} and {}",
                    ls, rs
                );
                return self.fail(expr.id, message, expr.span.clone());
            }

            let result = if lt != rt
                && lt.base().is_numeric()
                && rt.base().is_numeric()
                && lt.dimensions() == rt.dimensions()
                && (*lt.base() == Type::Float || *rt.base() == Type::Float)
            {
                lt.with_float_base()
            } else {
                lt
            };
            let shape = self
                .shapes
                .get(&left.id)
                .or_else(|| self.shapes.get(&right.id))
                .cloned();
            if let Some(shape) = shape {
                self.shapes.insert(expr.id, shape);
            }
            return self.typed(expr.id, result);
        }

        if lt.is_array() && rt.is_numeric() {
            let result = if rt == Type::Float && *lt.base() == Type::Int {
                lt.with_float_base()
            } else {
                lt
            };
            if let Some(shape) = self.shapes.get(&left.id).cloned() {
                self.shapes.insert(expr.id, shape);
            }
            return self.typed(expr.id, result);
        }

        if lt.is_numeric() && rt.is_array() {
            // Scalar dividends pass analysis and are rejected when evaluated
            let result = if lt == Type::Float && *rt.base() == Type::Int {
                rt.with_float_base()
            } else {
                rt
            };
            if let Some(shape) = self.shapes.get(&right.id).cloned() {
                self.shapes.insert(expr.id, shape);
            }
            return self.typed(expr.id, result);
        }

        if let Some(outcome) = self.class_operator(expr, op, &lt, &rt, scope) {
            return outcome;
        }

        let message = format!("Trying to {} {} with {}", op.verb(), lt, rt);
        self.fail(expr.id, message, expr.span.clone())
    }

    /// Arithmetic on class instances dispatches to the conventionally
    /// named operator methods, when the class defines them.
    fn class_operator(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lt: &Type,
        rt: &Type,
        scope: &Rc<Scope>,
    ) -> Option<Outcome> {
        let method_name = operator_method(op)?;
        let Type::Class(name) = lt else { return None };
        let (decl, _) = self.registry.get(name).cloned()?;
        let method = decl.methods.iter().find(|m| m.name == method_name)?.clone();

        Some(match self.resolve_signature(&method, scope) {
            Outcome::Typed(Type::Function(sig)) => {
                if sig.params.len() == 1 && sig.params[0].assignable_from(rt) {
                    self.typed(expr.id, sig.ret.clone())
                } else {
                    let message = format!("Trying to {} {} with {}", op.verb(), lt, rt);
                    self.fail(expr.id, message, expr.span.clone())
                }
            }
            Outcome::Pending => Outcome::Pending,
            _ => self.fail_silent(expr.id),
        })
    }

    fn resolve_matmul(
        &mut self,
        expr: &Expr,
        left: &Expr,
        right: &Expr,
        lt: Type,
        rt: Type,
    ) -> Outcome {
        let valid =
            |t: &Type| t.is_array() && t.base().is_numeric() && t.dimensions() <= 2;
        if !valid(&lt) || !valid(&rt) {
            let message = format!("Trying to dotproduct {} with {}", lt, rt);
            return self.fail(expr.id, message, expr.span.clone());
        }

        // A 1-D left operand acts as a row vector, a 1-D right operand as
        // a column vector, so the result is always 2-D.
        let mut result_shape = None;
        let mismatch = match (self.shapes.get(&left.id), self.shapes.get(&right.id)) {
            (Some(ls), Some(rs)) => {
                let (l_rows, l_cols) = if ls.len() == 1 {
                    (1, ls[0])
                } else {
                    (ls[0], ls[1])
                };
                let (r_rows, r_cols) = if rs.len() == 1 {
                    (rs[0], 1)
                } else {
                    (rs[0], rs[1])
                };
                if l_cols != r_rows {
                    Some((format_shape(ls), format_shape(rs)))
                } else {
                    result_shape = Some(vec![l_rows, r_cols]);
                    None
                }
            }
            _ => None,
        };
        if let Some((ls, rs)) = mismatch {
            let message = format!(
                "Trying to dotproduct arrays with incompatible dimensions: {} and {}",
                ls, rs
            );
            return self.fail(expr.id, message, expr.span.clone());
        }
        if let Some(shape) = result_shape {
            self.shapes.insert(expr.id, shape);
        }

        let base = if *lt.base() == Type::Float || *rt.base() == Type::Float {
            Type::Float
        } else {
            Type::Int
        };
        self.typed(expr.id, Type::Array(Box::new(Type::Array(Box::new(base)))))
    }

    fn resolve_assign(
        &mut self,
        expr: &Expr,
        target: &Expr,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Outcome {
        if !matches!(
            target.kind,
            ExprKind::Identifier(_) | ExprKind::Index { .. } | ExprKind::Field { .. }
        ) {
            return self.fail(
                expr.id,
                String::from("Invalid assignment target"),
                target.span.clone(),
            );
        }

        let lhs = self.resolve_expr(target, scope);
        let rhs = self.resolve_expr(value, scope);
        match (lhs, rhs) {
            (Outcome::Pending, _) | (_, Outcome::Pending) => Outcome::Pending,
            (Outcome::Failed, _) | (_, Outcome::Failed) => self.fail_silent(expr.id),
            (Outcome::Typed(target_type), Outcome::Typed(value_type)) => {
                if !target_type.assignable_from(&value_type) {
                    let message = format!("expected {} but got {}", target_type, value_type);
                    return self.fail(expr.id, message, expr.span.clone());
                }
                self.typed(expr.id, target_type)
            }
        }
    }

    fn resolve_index(
        &mut self,
        expr: &Expr,
        target: &Expr,
        index: &Expr,
        scope: &Rc<Scope>,
    ) -> Outcome {
        let target_outcome = self.resolve_expr(target, scope);
        let index_outcome = self.resolve_expr(index, scope);
        let (target_type, index_type) = match (target_outcome, index_outcome) {
            (Outcome::Pending, _) | (_, Outcome::Pending) => return Outcome::Pending,
            (Outcome::Failed, _) | (_, Outcome::Failed) => return self.fail_silent(expr.id),
            (Outcome::Typed(t), Outcome::Typed(i)) => (t, i),
        };

        if index_type != Type::Int {
            return self.fail(
                expr.id,
                String::from("Indexing an array using a non-Int-valued expression"),
                index.span.clone(),
            );
        }

        match target_type {
            Type::Array(element) => {
                let shape = self
                    .shapes
                    .get(&target.id)
                    .filter(|shape| shape.len() > 1)
                    .map(|shape| shape[1..].to_vec());
                if let Some(shape) = shape {
                    self.shapes.insert(expr.id, shape);
                }
                self.typed(expr.id, *element)
            }
            other => self.fail(
                expr.id,
                format!("Trying to index a non-array of type: {}", other),
                target.span.clone(),
            ),
        }
    }

    fn resolve_field(
        &mut self,
        expr: &Expr,
        target: &Expr,
        field: &str,
        scope: &Rc<Scope>,
    ) -> Outcome {
        let target_type = match self.resolve_expr(target, scope) {
            Outcome::Pending => return Outcome::Pending,
            Outcome::Failed => return self.fail_silent(expr.id),
            Outcome::Typed(t) => t,
        };

        match &target_type {
            Type::Array(_) => match field {
                "length" | "count" | "nDim" => self.typed(expr.id, Type::Int),
                "sum" => {
                    let t = if *target_type.base() == Type::Float {
                        Type::Float
                    } else {
                        Type::Int
                    };
                    self.typed(expr.id, t)
                }
                "avg" => self.typed(expr.id, Type::Float),
                _ => self.missing_field(expr, field, &target_type),
            },
            Type::Struct(name) | Type::Class(name) => {
                let Some((decl, is_class)) = self.registry.get(name).cloned() else {
                    // Registered together with the declaration, so a hit on
                    // the name implies a hit here.
                    return self.fail_silent(expr.id);
                };

                if let Some(field_decl) = decl.fields.iter().find(|f| f.name == field) {
                    return match self.resolve_type_expr(&field_decl.ty, scope) {
                        Outcome::Typed(t) => self.typed(expr.id, t),
                        Outcome::Pending => Outcome::Pending,
                        Outcome::Failed => self.fail_silent(expr.id),
                    };
                }

                if is_class {
                    if let Some(method) = decl.methods.iter().find(|m| m.name == field).cloned() {
                        return match self.resolve_signature(&method, scope) {
                            Outcome::Typed(t) => self.typed(expr.id, t),
                            Outcome::Pending => Outcome::Pending,
                            Outcome::Failed => self.fail_silent(expr.id),
                        };
                    }
                }

                self.missing_field(expr, field, &target_type)
            }
            _ => self.missing_field(expr, field, &target_type),
        }
    }

    fn missing_field(&mut self, expr: &Expr, field: &str, target_type: &Type) -> Outcome {
        self.fail(
            expr.id,
            format!(
                "Trying to access missing field {} on {}",
                field,
                target_type.describe()
            ),
            expr.span.clone(),
        )
    }

    fn resolve_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        scope: &Rc<Scope>,
    ) -> Outcome {
        let callee_type = match self.resolve_expr(callee, scope) {
            Outcome::Pending => return Outcome::Pending,
            Outcome::Failed => return self.fail_silent(expr.id),
            Outcome::Typed(t) => t,
        };

        let mut arg_types = Vec::new();
        let mut failed = false;
        for arg in args {
            match self.resolve_expr(arg, scope) {
                Outcome::Typed(t) => arg_types.push(t),
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => failed = true,
            }
        }
        if failed {
            return self.fail_silent(expr.id);
        }

        let sig = match callee_type {
            Type::Function(sig) => sig,
            other => {
                let message = format!("Trying to call a non-function value of type: {}", other);
                return self.fail(expr.id, message, callee.span.clone());
            }
        };

        if arg_types.len() != sig.params.len() {
            let message = format!(
                "Wrong number of arguments to {}: expected {} but got {}",
                sig.name,
                sig.params.len(),
                arg_types.len()
            );
            return self.fail(expr.id, message, expr.span.clone());
        }

        let mut ok = true;
        for (i, (param, arg)) in sig.params.iter().zip(arg_types.iter()).enumerate() {
            if !param.assignable_from(arg) {
                self.errors.push(SemanticError::new(
                    format!("argument {}: expected {} but got {}", i, param, arg),
                    args[i].span.clone(),
                ));
                ok = false;
            }
        }
        if !ok {
            self.failed.insert(expr.id);
            self.progress = true;
            return Outcome::Failed;
        }

        self.typed(expr.id, sig.ret.clone())
    }

    fn resolve_construct(
        &mut self,
        expr: &Expr,
        name: &str,
        args: &[Expr],
        scope: &Rc<Scope>,
    ) -> Outcome {
        let Some(decl) = scope.lookup(name) else {
            self.pending.push((name.to_string(), expr.span.clone()));
            return Outcome::Pending;
        };
        if !matches!(decl.kind, DeclKind::Struct | DeclKind::Class) {
            return self.fail(
                expr.id,
                format!("Trying to construct a non-type: {}", name),
                expr.span.clone(),
            );
        }
        let Some((type_decl, is_class)) = self.registry.get(name).cloned() else {
            return self.fail_silent(expr.id);
        };

        let mut arg_types = Vec::new();
        let mut failed = false;
        for arg in args {
            match self.resolve_expr(arg, scope) {
                Outcome::Typed(t) => arg_types.push(t),
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => failed = true,
            }
        }
        if failed {
            return self.fail_silent(expr.id);
        }

        if arg_types.len() != type_decl.fields.len() {
            let message = format!(
                "Wrong number of arguments to {}: expected {} but got {}",
                name,
                type_decl.fields.len(),
                arg_types.len()
            );
            return self.fail(expr.id, message, expr.span.clone());
        }

        let mut ok = true;
        for (i, field) in type_decl.fields.iter().enumerate() {
            let field_type = match self.resolve_type_expr(&field.ty, scope) {
                Outcome::Typed(t) => t,
                Outcome::Pending => return Outcome::Pending,
                Outcome::Failed => {
                    ok = false;
                    continue;
                }
            };
            if !field_type.assignable_from(&arg_types[i]) {
                self.errors.push(SemanticError::new(
                    format!("argument {}: expected {} but got {}", i, field_type, arg_types[i]),
                    args[i].span.clone(),
                ));
                ok = false;
            }
        }
        if !ok {
            self.failed.insert(expr.id);
            self.progress = true;
            return Outcome::Failed;
        }

        let t = if is_class {
            Type::Class(name.to_string())
        } else {
            Type::Struct(name.to_string())
        };
        self.typed(expr.id, t)
    }

    // ------------------------------------------------------------------
    // Type annotations

    fn resolve_type_expr(&mut self, ty: &TypeExpr, scope: &Rc<Scope>) -> Outcome {
        if let Some(t) = self.types.get(&ty.id) {
            return Outcome::Typed(t.clone());
        }
        if self.failed.contains(&ty.id) {
            return Outcome::Failed;
        }

        match &ty.kind {
            TypeExprKind::Named(name) => match name.as_str() {
                "Int" => self.typed(ty.id, Type::Int),
                "Float" => self.typed(ty.id, Type::Float),
                "Bool" => self.typed(ty.id, Type::Bool),
                "String" => self.typed(ty.id, Type::Str),
                "Void" => self.typed(ty.id, Type::Void),
                "Type" => self.typed(ty.id, Type::Meta),
                _ => match scope.lookup(name) {
                    Some(decl) if decl.kind == DeclKind::Struct => {
                        self.typed(ty.id, Type::Struct(name.clone()))
                    }
                    Some(decl) if decl.kind == DeclKind::Class => {
                        self.typed(ty.id, Type::Class(name.clone()))
                    }
                    Some(_) => self.fail(
                        ty.id,
                        format!("Could not resolve: {}", name),
                        ty.span.clone(),
                    ),
                    None => {
                        self.pending.push((name.clone(), ty.span.clone()));
                        Outcome::Pending
                    }
                },
            },
            TypeExprKind::Array { element, size: _ } => {
                match self.resolve_type_expr(element, scope) {
                    Outcome::Typed(t) => self.typed(ty.id, Type::Array(Box::new(t))),
                    Outcome::Pending => Outcome::Pending,
                    Outcome::Failed => self.fail_silent(ty.id),
                }
            }
        }
    }

    /// Checks the leading dimension sizes of a variable annotation and
    /// returns the valid prefix. Checking stops at the first unsized or
    /// invalid dimension.
    fn validate_sizes(&mut self, ty: &TypeExpr) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut current = ty;
        while let TypeExprKind::Array { element, size } = &current.kind {
            let Some(size) = size else { break };
            match constant_size(size) {
                Some(n) => sizes.push(n),
                None => {
                    self.error(
                        format!("Illegal size for array declaration: {}", render_size(size)),
                        size.span.clone(),
                    );
                    break;
                }
            }
            current = element;
        }
        sizes
    }

    // ------------------------------------------------------------------
    // Bookkeeping

    fn scope_for(&mut self, id: NodeId, parent: &Rc<Scope>) -> Rc<Scope> {
        if let Some(scope) = self.scopes.get(&id) {
            return scope.clone();
        }
        let scope = Scope::child(parent);
        self.scopes.insert(id, scope.clone());
        scope
    }

    fn error(&mut self, message: String, span: Span) {
        self.errors.push(SemanticError::new(message, span));
        self.progress = true;
    }

    fn fail(&mut self, id: NodeId, message: String, span: Span) -> Outcome {
        if self.failed.insert(id) {
            self.errors.push(SemanticError::new(message, span));
            self.progress = true;
        }
        Outcome::Failed
    }

    fn fail_silent(&mut self, id: NodeId) -> Outcome {
        if self.failed.insert(id) {
            self.progress = true;
        }
        Outcome::Failed
    }

    fn typed(&mut self, id: NodeId, t: Type) -> Outcome {
        if self.types.insert(id, t.clone()).is_none() {
            self.progress = true;
        }
        Outcome::Typed(t)
    }

    fn report_unresolved(&mut self) {
        let mut seen = HashSet::new();
        let pending = std::mem::take(&mut self.pending);
        for (name, span) in pending {
            if seen.insert(name.clone()) {
                self.errors
                    .push(SemanticError::new(format!("Could not resolve: {}", name), span));
            }
        }
    }
}

/// The method a class must define to support an arithmetic operator.
pub fn operator_method(op: BinaryOp) -> Option<&'static str> {
    match op {
        BinaryOp::Add => Some("plus"),
        BinaryOp::Sub => Some("minus"),
        BinaryOp::Mul => Some("mul"),
        BinaryOp::Div => Some("div"),
        BinaryOp::Mod => Some("modulo"),
        _ => None,
    }
}

fn constant_size(expr: &Expr) -> Option<usize> {
    match &expr.kind {
        ExprKind::Int(n) if *n >= 0 => Some(*n as usize),
        _ => None,
    }
}

fn render_size(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Int(n) => n.to_string(),
        ExprKind::Float(f) => f.to_string(),
        ExprKind::Str(s) => format!("\"{}\"", s),
        ExprKind::Bool(b) => b.to_string(),
        ExprKind::Identifier(name) => format!("\"{}\"", name),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => format!("-{}", render_size(operand)),
        _ => String::from("?"),
    }
}

/// The full static shape of an annotation, when every dimension carries a
/// constant size.
fn static_annotation_shape(ty: &TypeExpr) -> Option<Vec<usize>> {
    let mut shape = Vec::new();
    let mut current = ty;
    loop {
        match &current.kind {
            TypeExprKind::Array { element, size } => {
                shape.push(constant_size(size.as_deref()?)?);
                current = element;
            }
            TypeExprKind::Named(_) => break,
        }
    }
    if shape.is_empty() {
        None
    } else {
        Some(shape)
    }
}

fn block_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_returns)
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(stmts) => block_returns(stmts),
        StmtKind::If {
            then_body,
            else_body: Some(else_body),
            ..
        } => stmt_returns(then_body) && stmt_returns(else_body),
        _ => false,
    }
}
