use std::fmt::Display;
use std::rc::Rc;

/// A resolved semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Null,
    Void,
    /// The type of a type name used as a value, e.g. `"" + Point`.
    Meta,
    Array(Box<Type>),
    Struct(String),
    Class(String),
    Function(Rc<Signature>),
}

#[derive(Debug, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    /// The innermost element type of a (possibly nested) array, or the
    /// type itself when it is not an array.
    pub fn base(&self) -> &Type {
        match self {
            Type::Array(element) => element.base(),
            other => other,
        }
    }

    /// Array nesting depth: `Int` is 0, `Int[][]` is 2.
    pub fn dimensions(&self) -> usize {
        match self {
            Type::Array(element) => 1 + element.dimensions(),
            _ => 0,
        }
    }

    /// Rebuilds the same array nesting over a `Float` base. Used for
    /// numeric promotion of elementwise results.
    pub fn with_float_base(&self) -> Type {
        match self {
            Type::Array(element) => Type::Array(Box::new(element.with_float_base())),
            _ => Type::Float,
        }
    }

    /// Like `Display`, but names the kind of user-defined types, e.g.
    /// "struct P" instead of "P".
    pub fn describe(&self) -> String {
        match self {
            Type::Struct(name) => format!("struct {}", name),
            Type::Class(name) => format!("class {}", name),
            other => other.to_string(),
        }
    }

    /// Whether a value of `other` may be bound where `self` is expected.
    ///
    /// Int widens to Float, null binds to any reference type, and the
    /// empty array literal (whose element type is `Null`) binds to any
    /// array type.
    pub fn assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }

        match (self, other) {
            (Type::Float, Type::Int) => true,
            (
                Type::Str | Type::Array(_) | Type::Struct(_) | Type::Class(_) | Type::Function(_),
                Type::Null,
            ) => true,
            (Type::Array(a), Type::Array(b)) => **b == Type::Null || a.assignable_from(b),
            _ => false,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Bool => write!(f, "Bool"),
            Type::Str => write!(f, "String"),
            Type::Null => write!(f, "Null"),
            Type::Void => write!(f, "Void"),
            Type::Meta => write!(f, "Type"),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Struct(name) | Type::Class(name) => write!(f, "{}", name),
            Type::Function(sig) => write!(f, "fun {}", sig.name),
        }
    }
}

/// Renders a static shape the way dimension diagnostics expect it,
/// e.g. `[3, 2]`.
pub fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}
