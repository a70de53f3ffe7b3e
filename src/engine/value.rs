use std::fmt;
use std::sync::Arc;

use super::ast::Expr;

/// Structured interpreter value crossing the engine boundary.
///
/// Variants partition into four kinds (see [`ValueKind`]): plain data,
/// callables, environment references, and engine-specific opaque values.
/// Only `Data`-kind values are portable across a state blob and a fresh
/// interpreter instance.
#[derive(Debug, Clone)]
pub enum Value {
    /// Symbol literal.
    Symbol(String),
    /// Keyword literal (leading colon in source).
    Keyword(String),
    /// UTF-8 string.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// Heterogeneous list.
    List(Vec<Value>),
    /// User-defined function.
    Closure(Arc<Closure>),
    /// Named built-in function.
    Builtin(&'static str),
    /// Reference to the interpreter's global environment.
    Environment,
    /// Engine-specific value with no portable representation.
    Opaque(&'static str),
}

/// A user-defined function value. Parameters are bound in a local frame;
/// free symbols in the body resolve against the global scope at call time.
#[derive(Debug)]
pub struct Closure {
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    /// Body forms, evaluated in sequence.
    pub body: Vec<Expr>,
}

/// Coarse classification of a value for persistence decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain data; portable across a state blob.
    Data,
    /// Function value bound to the producing interpreter.
    Callable,
    /// Reference into an interpreter environment.
    Environment,
    /// Engine-specific value with no portable representation.
    Opaque,
}

impl ValueKind {
    /// Short lowercase label for log and error messages.
    pub fn label(self) -> &'static str {
        match self {
            ValueKind::Data => "data",
            ValueKind::Callable => "callable",
            ValueKind::Environment => "environment",
            ValueKind::Opaque => "opaque",
        }
    }
}

impl Value {
    /// Classify this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Symbol(_)
            | Value::Keyword(_)
            | Value::Text(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Boolean(_)
            | Value::List(_) => ValueKind::Data,
            Value::Closure(_) | Value::Builtin(_) => ValueKind::Callable,
            Value::Environment => ValueKind::Environment,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Whether this value may enter a session state blob.
    ///
    /// Aggregates are classified by their top-level tag; a `Data`-kind list
    /// holding a callable passes this predicate and fails at encode time
    /// instead, so the failure is reported rather than silently dropped.
    pub fn is_persistable(&self) -> bool {
        self.kind() == ValueKind::Data
    }

    /// Convenience accessor for string references.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Symbol(sym) => Some(sym),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Environment, Value::Environment) => true,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Symbol(sym) => write!(f, "{}", sym),
            Value::Keyword(kw) => write!(f, ":{}", kw),
            Value::Text(text) => write!(f, "{}", text),
            Value::Integer(num) => write!(f, "{}", num),
            Value::Float(num) => write!(f, "{}", num),
            Value::Boolean(flag) => write!(f, "{}", flag),
            Value::List(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Closure(closure) => write!(f, "#<closure/{}>", closure.params.len()),
            Value::Builtin(name) => write!(f, "#<builtin {}>", name),
            Value::Environment => write!(f, "#<environment>"),
            Value::Opaque(tag) => write!(f, "#<{}>", tag),
        }
    }
}

/// A named value in the interpreter's global scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Binding name.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

impl Binding {
    /// Construct a binding.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
