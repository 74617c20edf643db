use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    analyzer::{
        analyzer::operator_method,
        types::{format_shape, Type},
        Analysis,
    },
    ast::{
        ast::{BinaryOp, Expr, ExprKind, UnaryOp},
        statements::{FunDecl, Stmt, StmtKind, TypeDecl},
    },
    errors::errors::{RuntimeError, RuntimeErrorKind},
    Span,
};

use super::{
    env::{assign, lookup, receiver_of, Env},
    value::{Closure, Instance, Value},
};

/// Why a statement list stopped early: a `return`, or a runtime failure.
pub enum Exit {
    Return(Option<Value>),
    Fail(RuntimeError),
}

type Flow<T> = Result<T, Exit>;

/// Where a leaf combination comes from: plain scalars, a scalar broadcast
/// over an array, or an elementwise array operation.
#[derive(Clone, Copy, PartialEq)]
enum LeafContext {
    Scalar,
    Broadcast,
    Elementwise,
}

/// Evaluates the program. Returns everything printed plus either the
/// program's return value or the runtime error that aborted it.
pub fn interpret(
    program: &[Stmt],
    analysis: &Analysis,
) -> (String, Result<Option<Value>, RuntimeError>) {
    let globals = Env::root();
    let mut interpreter = Interpreter {
        analysis,
        registry: HashMap::new(),
        globals: globals.clone(),
        output: String::new(),
    };

    let result = match interpreter.run_block(program, &globals) {
        Ok(()) => Ok(None),
        Err(Exit::Return(value)) => Ok(value),
        Err(Exit::Fail(error)) => Err(error),
    };

    (interpreter.output, result)
}

struct Interpreter<'a> {
    analysis: &'a Analysis,
    /// Struct and class declarations by name.
    registry: HashMap<String, (Rc<TypeDecl>, bool)>,
    globals: Rc<RefCell<Env>>,
    output: String,
}

impl Interpreter<'_> {
    // ------------------------------------------------------------------
    // Statements

    fn run_block(&mut self, stmts: &[Stmt], env: &Rc<RefCell<Env>>) -> Flow<()> {
        self.hoist(stmts, env);
        for stmt in stmts {
            self.exec_stmt(stmt, env)?;
        }
        Ok(())
    }

    /// Binds function, struct and class declarations before the block
    /// runs, so they can be used above their textual position.
    fn hoist(&mut self, stmts: &[Stmt], env: &Rc<RefCell<Env>>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::FunDecl(fun) => {
                    let closure = Value::Function(Rc::new(Closure {
                        decl: fun.clone(),
                        env: env.clone(),
                        receiver: None,
                    }));
                    env.borrow_mut().define(fun.name.clone(), closure);
                }
                StmtKind::StructDecl(decl) => {
                    self.registry.insert(decl.name.clone(), (decl.clone(), false));
                    env.borrow_mut()
                        .define(decl.name.clone(), Value::Type(decl.name.clone()));
                }
                StmtKind::ClassDecl(decl) => {
                    self.registry.insert(decl.name.clone(), (decl.clone(), true));
                    env.borrow_mut()
                        .define(decl.name.clone(), Value::Type(decl.name.clone()));
                }
                _ => {}
            }
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Env>>) -> Flow<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.eval(expr, env)?;
                Ok(())
            }
            StmtKind::VarDecl { name, init, .. } => {
                let value = match init {
                    Some(expr) => {
                        let value = self.eval(expr, env)?;
                        convert(value, self.analysis.types.get(&stmt.id))
                    }
                    None => self.default_value(stmt),
                };
                env.borrow_mut().define(name.clone(), value);
                Ok(())
            }
            // Bound during hoisting
            StmtKind::FunDecl(_) | StmtKind::StructDecl(_) | StmtKind::ClassDecl(_) => Ok(()),
            StmtKind::Block(stmts) => {
                let inner = Env::child(env);
                self.run_block(stmts, &inner)
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval_bool(condition, env)? {
                    self.exec_stmt(then_body, env)
                } else if let Some(else_body) = else_body {
                    self.exec_stmt(else_body, env)
                } else {
                    Ok(())
                }
            }
            StmtKind::While { condition, body } => {
                while self.eval_bool(condition, env)? {
                    self.exec_stmt(body, env)?;
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.eval(expr, env)?),
                    None => None,
                };
                Err(Exit::Return(value))
            }
        }
    }

    /// The value an uninitialized variable starts with. Numeric and Bool
    /// variables get zero values, sized arrays are allocated up front,
    /// everything else starts as null.
    fn default_value(&self, stmt: &Stmt) -> Value {
        let Some(ty) = self.analysis.types.get(&stmt.id) else {
            return Value::Null;
        };
        match ty {
            Type::Array(element) => match self.analysis.sizes.get(&stmt.id) {
                Some(sizes) if !sizes.is_empty() => allocate(sizes, element),
                _ => Value::Null,
            },
            other => scalar_default(other),
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    fn eval(&mut self, expr: &Expr, env: &Rc<RefCell<Env>>) -> Flow<Value> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Identifier(name) => self.eval_identifier(expr, name, env),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element, env)?);
                }
                Ok(Value::Array(Rc::new(RefCell::new(values))))
            }
            ExprKind::Unary { op, operand } => self.eval_unary(expr, *op, operand, env),
            ExprKind::Binary { op, left, right } => self.eval_binary(expr, *op, left, right, env),
            ExprKind::Assign { target, value } => self.eval_assign(expr, target, value, env),
            ExprKind::Index { target, index } => self.eval_index(expr, target, index, env),
            ExprKind::Field { target, field } => self.eval_field(expr, target, field, env),
            ExprKind::Call { callee, args } => self.eval_call(expr, callee, args, env),
            ExprKind::Construct { name, args } => self.eval_construct(expr, name, args, env),
        }
    }

    fn eval_identifier(&mut self, expr: &Expr, name: &str, env: &Rc<RefCell<Env>>) -> Flow<Value> {
        if let Some(value) = lookup(env, name) {
            return Ok(value);
        }
        if name == "print" {
            return Ok(Value::Print);
        }
        // Methods of the enclosing class are reachable by bare name
        if let Some(receiver) = receiver_of(env) {
            if let Some((decl, _)) = self.registry.get(&receiver.name).cloned() {
                if let Some(method) = decl.methods.iter().find(|m| m.name == name).cloned() {
                    return Ok(Value::Function(Rc::new(Closure {
                        decl: method,
                        env: self.globals.clone(),
                        receiver: Some(receiver),
                    })));
                }
            }
        }
        Err(self.unresolved(format!("undefined name {}", name), &expr.span))
    }

    fn eval_bool(&mut self, expr: &Expr, env: &Rc<RefCell<Env>>) -> Flow<bool> {
        match self.eval(expr, env)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &expr.span)),
            other => Err(self.unresolved(format!("condition evaluated to {}", other), &expr.span)),
        }
    }

    fn eval_unary(
        &mut self,
        expr: &Expr,
        op: UnaryOp,
        operand: &Expr,
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let value = self.eval(operand, env)?;
        match (op, value) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
            (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
            (_, Value::Null) => Err(self.fail(RuntimeErrorKind::NullReference, &expr.span)),
            (op, value) => Err(self.unresolved(
                format!("cannot apply {:?} to {}", op, value),
                &expr.span,
            )),
        }
    }

    fn eval_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        // && and || only evaluate the right side when needed
        if op.is_logic() {
            let lhs = self.eval_bool(left, env)?;
            return match (op, lhs) {
                (BinaryOp::And, false) => Ok(Value::Bool(false)),
                (BinaryOp::Or, true) => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(self.eval_bool(right, env)?)),
            };
        }

        let lhs = self.eval(left, env)?;
        let rhs = self.eval(right, env)?;

        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
                self.compare(op, lhs, rhs, &expr.span)
            }
            BinaryOp::MatMul => self.matmul(lhs, rhs, &expr.span),
            _ => {
                // A statically-String operand stringifies the other side
                // even when it currently holds null
                if op == BinaryOp::Add && (self.static_str(left) || self.static_str(right)) {
                    return Ok(Value::Str(format!("{}{}", lhs, rhs)));
                }
                self.arithmetic(op, lhs, rhs, &expr.span)
            }
        }
    }

    fn static_str(&self, expr: &Expr) -> bool {
        matches!(self.analysis.types.get(&expr.id), Some(Type::Str))
    }

    fn compare(&mut self, op: BinaryOp, lhs: Value, rhs: Value, span: &Span) -> Flow<Value> {
        let a = self.numeric(lhs, span)?;
        let b = self.numeric(rhs, span)?;
        let result = match op {
            BinaryOp::Less => a < b,
            BinaryOp::LessEq => a <= b,
            BinaryOp::Greater => a > b,
            BinaryOp::GreaterEq => a >= b,
            // Only ordering operators are routed here
            _ => unreachable!("{:?} is not an ordering operator", op),
        };
        Ok(Value::Bool(result))
    }

    fn numeric(&mut self, value: Value, span: &Span) -> Flow<f64> {
        match value {
            Value::Int(n) => Ok(n as f64),
            Value::Float(x) => Ok(x),
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, span)),
            other => Err(self.unresolved(format!("cannot compare {}", other), span)),
        }
    }

    // ------------------------------------------------------------------
    // Arithmetic

    fn arithmetic(&mut self, op: BinaryOp, lhs: Value, rhs: Value, span: &Span) -> Flow<Value> {
        // String concatenation stringifies the other operand
        if op == BinaryOp::Add {
            if let Value::Str(s) = &lhs {
                return Ok(Value::Str(format!("{}{}", s, rhs)));
            }
            if let Value::Str(s) = &rhs {
                return Ok(Value::Str(format!("{}{}", lhs, s)));
            }
        }

        match (lhs, rhs) {
            (Value::Array(left), Value::Array(right)) => {
                self.elementwise(op, &left, &right, span)
            }
            (Value::Array(left), rhs) => self.broadcast(op, &left, &rhs, false, span),
            (lhs, Value::Array(right)) => {
                if op == BinaryOp::Div || op == BinaryOp::Mod {
                    // A scalar dividend has no elementwise meaning
                    return Err(self.unresolved(
                        format!("cannot {} a scalar by an array", op.verb()),
                        span,
                    ));
                }
                self.broadcast(op, &right, &lhs, true, span)
            }
            (lhs, rhs) => self.leaf_op(op, lhs, rhs, LeafContext::Scalar, span),
        }
    }

    /// Strict elementwise combination of two arrays: lengths, nesting and
    /// leaf kinds must agree at every level.
    fn elementwise(
        &mut self,
        op: BinaryOp,
        left: &Rc<RefCell<Vec<Value>>>,
        right: &Rc<RefCell<Vec<Value>>>,
        span: &Span,
    ) -> Flow<Value> {
        let l = left.borrow().clone();
        let r = right.borrow().clone();
        if l.len() != r.len() {
            return Err(self.shape_mismatch(
                &Value::Array(left.clone()),
                &Value::Array(right.clone()),
                span,
            ));
        }

        let mut result = Vec::with_capacity(l.len());
        for (a, b) in l.into_iter().zip(r) {
            let value = match (a, b) {
                (Value::Array(a), Value::Array(b)) => self.elementwise(op, &a, &b, span)?,
                (a @ Value::Array(_), b) | (a, b @ Value::Array(_)) => {
                    return Err(self.shape_mismatch(&a, &b, span));
                }
                (a, b) => self.leaf_op(op, a, b, LeafContext::Elementwise, span)?,
            };
            result.push(value);
        }
        Ok(Value::Array(Rc::new(RefCell::new(result))))
    }

    /// Applies a scalar to every leaf of an array.
    fn broadcast(
        &mut self,
        op: BinaryOp,
        values: &Rc<RefCell<Vec<Value>>>,
        scalar: &Value,
        scalar_left: bool,
        span: &Span,
    ) -> Flow<Value> {
        let items = values.borrow().clone();
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let value = match item {
                Value::Array(inner) => self.broadcast(op, &inner, scalar, scalar_left, span)?,
                leaf if scalar_left => {
                    self.leaf_op(op, scalar.clone(), leaf, LeafContext::Broadcast, span)?
                }
                leaf => self.leaf_op(op, leaf, scalar.clone(), LeafContext::Broadcast, span)?,
            };
            result.push(value);
        }
        Ok(Value::Array(Rc::new(RefCell::new(result))))
    }

    /// Combines two non-array values. Inside an array/array operation the
    /// leaf kinds are strict (Int and Float do not mix); scalar broadcasts
    /// promote instead. A zero Float denominator fails inside arrays and
    /// keeps IEEE semantics between plain scalars.
    fn leaf_op(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        context: LeafContext,
        span: &Span,
    ) -> Flow<Value> {
        if op == BinaryOp::Add {
            if let Value::Str(s) = &lhs {
                return Ok(Value::Str(format!("{}{}", s, rhs)));
            }
            if let Value::Str(s) = &rhs {
                return Ok(Value::Str(format!("{}{}", lhs, s)));
            }
        }

        let divides = op == BinaryOp::Div || op == BinaryOp::Mod;

        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => self.int_op(op, a, b, span),
            (Value::Float(a), Value::Float(b)) => {
                if context != LeafContext::Scalar && divides && b == 0.0 {
                    return Err(self.fail(RuntimeErrorKind::DivisionByZero, span));
                }
                Ok(float_op(op, a, b))
            }
            (Value::Instance(receiver), rhs) => self.dispatch_operator(op, receiver, rhs, span),
            (lhs, rhs) => {
                if context != LeafContext::Elementwise {
                    if let (Some(a), Some(b)) = (as_number(&lhs), as_number(&rhs)) {
                        if context == LeafContext::Broadcast && divides && b == 0.0 {
                            return Err(self.fail(RuntimeErrorKind::DivisionByZero, span));
                        }
                        return Ok(float_op(op, a, b));
                    }
                }
                if matches!(lhs, Value::Null) || matches!(rhs, Value::Null) {
                    return Err(self.fail(RuntimeErrorKind::NullReference, span));
                }
                Err(self.unresolved(
                    format!("cannot {} {} with {}", op.verb(), lhs, rhs),
                    span,
                ))
            }
        }
    }

    fn int_op(&mut self, op: BinaryOp, a: i64, b: i64, span: &Span) -> Flow<Value> {
        let result = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(self.fail(RuntimeErrorKind::DivisionByZero, span));
                }
                a / b
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(self.fail(RuntimeErrorKind::DivisionByZero, span));
                }
                a % b
            }
            _ => return Err(self.unresolved(format!("cannot {} Int with Int", op.verb()), span)),
        };
        Ok(Value::Int(result))
    }

    /// Arithmetic on class instances goes through the conventionally
    /// named operator methods.
    fn dispatch_operator(
        &mut self,
        op: BinaryOp,
        receiver: Rc<Instance>,
        rhs: Value,
        span: &Span,
    ) -> Flow<Value> {
        let Some(method_name) = operator_method(op) else {
            return Err(self.unresolved(
                format!("cannot {} {}", op.verb(), receiver.name),
                span,
            ));
        };
        let method = match self.registry.get(&receiver.name) {
            Some((decl, true)) => decl.methods.iter().find(|m| m.name == method_name).cloned(),
            _ => None,
        };
        let Some(method) = method else {
            return Err(self.unresolved(
                format!("no {} method on {}", method_name, receiver.name),
                span,
            ));
        };

        let globals = self.globals.clone();
        self.invoke(&method, &globals, Some(receiver), vec![rhs])
    }

    // ------------------------------------------------------------------
    // Matrix product

    fn matmul(&mut self, lhs: Value, rhs: Value, span: &Span) -> Flow<Value> {
        let (left, left_int) = self.as_matrix(&lhs, true, span)?;
        let (right, right_int) = self.as_matrix(&rhs, false, span)?;

        let inner = left.first().map(|row| row.len()).unwrap_or(0);
        if inner != right.len() || inner == 0 {
            return Err(self.shape_mismatch(&lhs, &rhs, span));
        }
        let columns = right.first().map(|row| row.len()).unwrap_or(0);
        let int_result = left_int && right_int;

        let mut out = Vec::with_capacity(left.len());
        for row in &left {
            let mut out_row = Vec::with_capacity(columns);
            for c in 0..columns {
                let mut sum = 0.0;
                for (k, x) in row.iter().enumerate() {
                    sum += x * right[k][c];
                }
                out_row.push(if int_result {
                    Value::Int(sum as i64)
                } else {
                    Value::Float(sum)
                });
            }
            out.push(Value::Array(Rc::new(RefCell::new(out_row))));
        }
        Ok(Value::Array(Rc::new(RefCell::new(out))))
    }

    /// Reads an operand of `@` as a rectangular matrix of numbers. A 1-D
    /// array acts as a row vector on the left and a column vector on the
    /// right. Also reports whether every leaf was an Int.
    fn as_matrix(
        &mut self,
        value: &Value,
        row_vector: bool,
        span: &Span,
    ) -> Flow<(Vec<Vec<f64>>, bool)> {
        let Value::Array(values) = value else {
            return Err(self.unresolved(format!("cannot dotproduct {}", value), span));
        };
        let values = values.borrow().clone();
        let mut all_int = true;

        if !values.iter().any(|v| matches!(v, Value::Array(_))) {
            let mut leaves = Vec::with_capacity(values.len());
            for v in &values {
                leaves.push(self.matrix_leaf(v, &mut all_int, span)?);
            }
            let rows = if row_vector {
                vec![leaves]
            } else {
                leaves.into_iter().map(|x| vec![x]).collect()
            };
            return Ok((rows, all_int));
        }

        let mut rows = Vec::with_capacity(values.len());
        let mut width = None;
        for row in &values {
            let Value::Array(row) = row else {
                return Err(
                    self.unresolved(String::from("dotproduct operands must be rectangular"), span)
                );
            };
            let row = row.borrow().clone();
            if *width.get_or_insert(row.len()) != row.len() {
                return Err(
                    self.unresolved(String::from("dotproduct operands must be rectangular"), span)
                );
            }
            let mut leaves = Vec::with_capacity(row.len());
            for v in &row {
                leaves.push(self.matrix_leaf(v, &mut all_int, span)?);
            }
            rows.push(leaves);
        }
        Ok((rows, all_int))
    }

    fn matrix_leaf(&mut self, value: &Value, all_int: &mut bool, span: &Span) -> Flow<f64> {
        match value {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(x) => {
                *all_int = false;
                Ok(*x)
            }
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, span)),
            other => Err(self.unresolved(format!("cannot dotproduct {}", other), span)),
        }
    }

    // ------------------------------------------------------------------
    // Assignment, indexing, fields

    fn eval_assign(
        &mut self,
        expr: &Expr,
        target: &Expr,
        value: &Expr,
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let new_value = self.eval(value, env)?;
        let new_value = convert(new_value, self.analysis.types.get(&expr.id));

        match &target.kind {
            ExprKind::Identifier(name) => {
                if assign(env, name, new_value.clone()) {
                    Ok(new_value)
                } else {
                    Err(self.unresolved(format!("undefined name {}", name), &target.span))
                }
            }
            ExprKind::Index { target: array, index } => {
                let array_value = self.eval(array, env)?;
                let index_value = self.eval(index, env)?;
                let Value::Int(i) = index_value else {
                    return Err(
                        self.unresolved(format!("index is {}", index_value), &index.span)
                    );
                };
                match array_value {
                    Value::Array(values) => {
                        let mut values = values.borrow_mut();
                        if i < 0 || i as usize >= values.len() {
                            return Err(self.fail(
                                RuntimeErrorKind::IndexOutOfRange {
                                    index: i,
                                    length: values.len(),
                                },
                                &expr.span,
                            ));
                        }
                        values[i as usize] = new_value.clone();
                        Ok(new_value)
                    }
                    Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &array.span)),
                    other => {
                        Err(self.unresolved(format!("cannot index {}", other), &array.span))
                    }
                }
            }
            ExprKind::Field { target: object, field } => {
                let object_value = self.eval(object, env)?;
                match object_value {
                    Value::Instance(instance) => {
                        if instance.set(field, new_value.clone()) {
                            Ok(new_value)
                        } else {
                            Err(self.unresolved(
                                format!("missing field {} on {}", field, instance.name),
                                &expr.span,
                            ))
                        }
                    }
                    Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &object.span)),
                    other => Err(self.unresolved(
                        format!("no field {} on {}", field, other),
                        &expr.span,
                    )),
                }
            }
            _ => Err(self.unresolved(String::from("invalid assignment target"), &target.span)),
        }
    }

    fn eval_index(
        &mut self,
        expr: &Expr,
        target: &Expr,
        index: &Expr,
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let target_value = self.eval(target, env)?;
        let index_value = self.eval(index, env)?;
        let Value::Int(i) = index_value else {
            return Err(self.unresolved(format!("index is {}", index_value), &index.span));
        };
        match target_value {
            Value::Array(values) => {
                let values = values.borrow();
                if i < 0 || i as usize >= values.len() {
                    return Err(self.fail(
                        RuntimeErrorKind::IndexOutOfRange {
                            index: i,
                            length: values.len(),
                        },
                        &expr.span,
                    ));
                }
                Ok(values[i as usize].clone())
            }
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &target.span)),
            other => Err(self.unresolved(format!("cannot index {}", other), &target.span)),
        }
    }

    fn eval_field(
        &mut self,
        expr: &Expr,
        target: &Expr,
        field: &str,
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let value = self.eval(target, env)?;
        match value {
            Value::Array(values) => self.array_field(expr, target, field, &values),
            Value::Instance(instance) => {
                if let Some(value) = instance.get(field) {
                    return Ok(value);
                }
                if instance.class {
                    if let Some((decl, _)) = self.registry.get(&instance.name).cloned() {
                        if let Some(method) =
                            decl.methods.iter().find(|m| m.name == field).cloned()
                        {
                            return Ok(Value::Function(Rc::new(Closure {
                                decl: method,
                                env: self.globals.clone(),
                                receiver: Some(instance),
                            })));
                        }
                    }
                }
                Err(self.unresolved(
                    format!("missing field {} on {}", field, instance.name),
                    &expr.span,
                ))
            }
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &target.span)),
            other => Err(self.unresolved(format!("no field {} on {}", field, other), &expr.span)),
        }
    }

    /// The pseudo-fields every array carries: length, count, sum, avg and
    /// nDim.
    fn array_field(
        &mut self,
        expr: &Expr,
        target: &Expr,
        field: &str,
        values: &Rc<RefCell<Vec<Value>>>,
    ) -> Flow<Value> {
        match field {
            "length" => Ok(Value::Int(values.borrow().len() as i64)),
            "count" => Ok(Value::Int(count_leaves(values) as i64)),
            "sum" => Ok(sum_leaves(values)),
            "avg" => {
                let count = count_leaves(values);
                if count == 0 {
                    return Ok(Value::Float(0.0));
                }
                let sum = match sum_leaves(values) {
                    Value::Int(n) => n as f64,
                    Value::Float(x) => x,
                    _ => 0.0,
                };
                Ok(Value::Float(sum / count as f64))
            }
            // The dimension count comes from the static type, not the data
            "nDim" => {
                let dims = self
                    .analysis
                    .types
                    .get(&target.id)
                    .map(|t| t.dimensions())
                    .unwrap_or(0);
                Ok(Value::Int(dims as i64))
            }
            _ => Err(self.unresolved(format!("missing field {} on array", field), &expr.span)),
        }
    }

    // ------------------------------------------------------------------
    // Calls and construction

    fn eval_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let callee_value = self.eval(callee, env)?;
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval(arg, env)?);
        }

        match callee_value {
            Value::Print => {
                let value = arg_values.into_iter().next().unwrap_or(Value::Null);
                self.output.push_str(&format!("{}\n", value));
                Ok(value)
            }
            Value::Function(closure) => {
                let parent = closure.env.clone();
                self.invoke(&closure.decl, &parent, closure.receiver.clone(), arg_values)
            }
            Value::Null => Err(self.fail(RuntimeErrorKind::NullReference, &callee.span)),
            other => Err(self.unresolved(format!("cannot call {}", other), &expr.span)),
        }
    }

    fn invoke(
        &mut self,
        decl: &Rc<FunDecl>,
        parent: &Rc<RefCell<Env>>,
        receiver: Option<Rc<Instance>>,
        args: Vec<Value>,
    ) -> Flow<Value> {
        let env = Env::call(parent, receiver);
        for (param, arg) in decl.params.iter().zip(args) {
            let arg = convert(arg, self.analysis.types.get(&param.id));
            env.borrow_mut().define(param.name.clone(), arg);
        }

        match self.run_block(&decl.body, &env) {
            Ok(()) => Ok(Value::Null),
            Err(Exit::Return(value)) => {
                let value = value.unwrap_or(Value::Null);
                Ok(convert(value, self.analysis.types.get(&decl.id)))
            }
            Err(fail) => Err(fail),
        }
    }

    fn eval_construct(
        &mut self,
        expr: &Expr,
        name: &str,
        args: &[Expr],
        env: &Rc<RefCell<Env>>,
    ) -> Flow<Value> {
        let Some((decl, class)) = self.registry.get(name).cloned() else {
            return Err(self.unresolved(format!("unknown type {}", name), &expr.span));
        };

        let mut fields = Vec::with_capacity(decl.fields.len());
        for (field, arg) in decl.fields.iter().zip(args) {
            let value = self.eval(arg, env)?;
            let value = convert(value, self.analysis.types.get(&field.id));
            fields.push((field.name.clone(), value));
        }

        Ok(Value::Instance(Rc::new(Instance {
            name: name.to_string(),
            class,
            fields: RefCell::new(fields),
        })))
    }

    // ------------------------------------------------------------------
    // Failure helpers

    fn fail(&self, kind: RuntimeErrorKind, span: &Span) -> Exit {
        Exit::Fail(RuntimeError::new(kind, span.clone()))
    }

    fn unresolved(&self, message: String, span: &Span) -> Exit {
        self.fail(RuntimeErrorKind::UnresolvedOperation { message }, span)
    }

    fn shape_mismatch(&self, left: &Value, right: &Value, span: &Span) -> Exit {
        self.fail(
            RuntimeErrorKind::InvalidOperandShape {
                left: shape_string(left),
                right: shape_string(right),
            },
            span,
        )
    }
}

/// Converts a value to its declared type where the language does so
/// implicitly: Int widens to Float, including the leaves of an array
/// bound to a Float-based array type.
fn convert(value: Value, ty: Option<&Type>) -> Value {
    let Some(ty) = ty else { return value };
    convert_value(value, ty)
}

fn convert_value(value: Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Int(n), Type::Float) => Value::Float(n as f64),
        (Value::Array(values), Type::Array(element)) => {
            if *ty.base() == Type::Float && has_int_leaf(&values) {
                let converted: Vec<Value> = values
                    .borrow()
                    .iter()
                    .map(|v| convert_value(v.clone(), element))
                    .collect();
                Value::Array(Rc::new(RefCell::new(converted)))
            } else {
                Value::Array(values)
            }
        }
        (value, _) => value,
    }
}

fn has_int_leaf(values: &Rc<RefCell<Vec<Value>>>) -> bool {
    values.borrow().iter().any(|v| match v {
        Value::Int(_) => true,
        Value::Array(inner) => has_int_leaf(inner),
        _ => false,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Value {
    Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        // Float division and modulo follow IEEE 754, zero included
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("{:?} is not an arithmetic operator", op),
    })
}

fn scalar_default(ty: &Type) -> Value {
    match ty {
        Type::Int => Value::Int(0),
        Type::Float => Value::Float(0.0),
        Type::Bool => Value::Bool(false),
        _ => Value::Null,
    }
}

/// Allocates a default array for the given leading sizes. Unsized inner
/// dimensions stay null.
fn allocate(sizes: &[usize], element: &Type) -> Value {
    let values: Vec<Value> = (0..sizes[0])
        .map(|_| {
            if sizes.len() > 1 {
                match element {
                    Type::Array(inner) => allocate(&sizes[1..], inner),
                    _ => Value::Null,
                }
            } else {
                scalar_default(element)
            }
        })
        .collect();
    Value::Array(Rc::new(RefCell::new(values)))
}

fn count_leaves(values: &Rc<RefCell<Vec<Value>>>) -> usize {
    values
        .borrow()
        .iter()
        .map(|v| match v {
            Value::Array(inner) => count_leaves(inner),
            _ => 1,
        })
        .sum()
}

/// Sums the numeric leaves. The result stays Int until a Float leaf is
/// seen; non-numeric leaves are skipped.
fn sum_leaves(values: &Rc<RefCell<Vec<Value>>>) -> Value {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut float_seen = false;
    accumulate(values, &mut int_sum, &mut float_sum, &mut float_seen);
    if float_seen {
        Value::Float(float_sum + int_sum as f64)
    } else {
        Value::Int(int_sum)
    }
}

fn accumulate(
    values: &Rc<RefCell<Vec<Value>>>,
    int_sum: &mut i64,
    float_sum: &mut f64,
    float_seen: &mut bool,
) {
    for value in values.borrow().iter() {
        match value {
            Value::Int(n) => *int_sum += n,
            Value::Float(x) => {
                *float_seen = true;
                *float_sum += x;
            }
            Value::Array(inner) => accumulate(inner, int_sum, float_sum, float_seen),
            _ => {}
        }
    }
}

/// The runtime shape of a value, rendered like `[2, 3]`. Descends along
/// first elements, which is enough for diagnostics.
fn shape_string(value: &Value) -> String {
    let mut dims = Vec::new();
    let mut current = value.clone();
    while let Value::Array(values) = current {
        let first = {
            let values = values.borrow();
            dims.push(values.len());
            values.first().cloned()
        };
        match first {
            Some(next) => current = next,
            None => break,
        }
    }
    format_shape(&dims)
}
