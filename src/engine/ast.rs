use serde::{Deserialize, Serialize};

/// Generic S-expression nodes used throughout the script language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Expr {
    /// A bare symbol.
    Symbol(String),
    /// Keyword tokens (leading colon).
    Keyword(String),
    /// String literal.
    String(String),
    /// Signed integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Nested list.
    List(Vec<Expr>),
}

/// A parsed script: the sequence of top-level forms from one evaluation
/// request, plus the source text retained for error reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Parsed top-level forms in source order.
    pub forms: Vec<Expr>,
    /// Original source text.
    pub source: String,
}

impl Script {
    /// Construct a script from its source and parsed forms.
    pub fn new(source: impl Into<String>, forms: Vec<Expr>) -> Self {
        Self {
            forms,
            source: source.into(),
        }
    }
}
