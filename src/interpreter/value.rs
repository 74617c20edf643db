use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use crate::ast::statements::FunDecl;

use super::env::Env;

/// A runtime value. Arrays and instances are shared references, so
/// assignment aliases rather than copies.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Array(Rc<RefCell<Vec<Value>>>),
    Instance(Rc<Instance>),
    Function(Rc<Closure>),
    /// A struct or class name used as a value.
    Type(String),
    /// The built-in print function.
    Print,
}

/// A struct or class instance. Fields keep declaration order so instances
/// print deterministically.
#[derive(Debug)]
pub struct Instance {
    pub name: String,
    pub class: bool,
    pub fields: RefCell<Vec<(String, Value)>>,
}

impl Instance {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .borrow()
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    }

    pub fn set(&self, name: &str, value: Value) -> bool {
        for (field, slot) in self.fields.borrow_mut().iter_mut() {
            if field == name {
                *slot = value;
                return true;
            }
        }
        false
    }
}

/// A function value: the declaration plus the environment it was created
/// in, and the instance it is bound to when it is a method.
#[derive(Debug)]
pub struct Closure {
    pub decl: Rc<FunDecl>,
    pub env: Rc<RefCell<Env>>,
    pub receiver: Option<Rc<Instance>>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // Numeric values compare across kinds, so 1 == 1.0
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            // Reference equality for arrays and instances
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Print, Value::Print) => true,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                if x.is_infinite() {
                    write!(f, "{}Infinity", if *x < 0.0 { "-" } else { "" })
                } else if x.fract() == 0.0 && x.is_finite() {
                    // Integral floats keep a trailing .0 to stay visibly Float
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Value::Instance(instance) => {
                write!(f, "{}(", instance.name)?;
                for (i, (name, value)) in instance.fields.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, ")")
            }
            Value::Function(closure) => write!(f, "fun {}", closure.decl.name),
            Value::Type(name) => write!(f, "{}", name),
            Value::Print => write!(f, "fun print"),
        }
    }
}
