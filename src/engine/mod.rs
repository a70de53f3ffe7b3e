//! Interpreter engine boundary for the evaluation pipeline.
//!
//! The pipeline treats the scripting engine as an external collaborator and
//! only speaks to it through the [`Engine`] trait: parse source text, run a
//! parsed script, enumerate and install global bindings, and render values
//! for display. The built-in [`ScriptEngine`] implements the trait for a
//! small s-expression language so the service runs end-to-end without an
//! embedded third-party interpreter.

/// Abstract syntax tree definitions for the script language.
pub mod ast;
/// Parser for the script language.
pub mod parser;
/// Built-in engine implementation.
pub mod script;
/// Structured value model shared across the engine boundary.
pub mod value;

pub use ast::{Expr, Script};
pub use parser::parse_script;
pub use script::ScriptEngine;
pub use value::{Binding, Value, ValueKind};

use thiserror::Error;

/// Fault raised by an engine while parsing or executing a script.
///
/// Faults surface to the remote caller with their message intact; the
/// pipeline never persists session state for a faulted call.
#[derive(Debug, Clone, Error)]
pub enum EngineFault {
    /// Source text could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A symbol was referenced that has no binding in scope.
    #[error("unbound variable: {0}")]
    Unbound(String),

    /// Any other fault raised during evaluation.
    #[error("{0}")]
    Eval(String),
}

/// Result of running a parsed script to completion.
#[derive(Debug, Clone)]
pub struct Evaluated {
    /// Value produced by the final form.
    pub value: Value,
    /// Whether the engine wants the final value auto-rendered.
    pub visible: bool,
    /// Text the script printed explicitly during execution.
    pub output: String,
}

/// Interface the evaluation pipeline requires from a scripting engine.
///
/// An engine instance owns one global scope. The pipeline reuses a single
/// instance across many sessions, so between calls it clears the scope and
/// reinstalls the bindings restored from the session's state blob.
pub trait Engine {
    /// Parsed representation of a script, specific to the engine.
    type Expr;

    /// Parse source text. `Ok(None)` means the text contains nothing
    /// evaluable (empty or whitespace/comments only), which the pipeline
    /// treats as an empty response rather than an error.
    fn parse(&self, source: &str) -> Result<Option<Self::Expr>, EngineFault>;

    /// Execute a parsed script against the engine's global scope.
    fn evaluate(&mut self, script: &Self::Expr) -> Result<Evaluated, EngineFault>;

    /// Enumerate the global scope in insertion/definition order.
    fn global_bindings(&self) -> Vec<Binding>;

    /// Install a binding into the global scope, overwriting any existing
    /// binding of the same name.
    fn set_global(&mut self, name: &str, value: Value);

    /// Remove every binding from the global scope. Engine default
    /// definitions (builtins) are not part of the scope and survive.
    fn clear_globals(&mut self);

    /// Render a value the way the engine's default print routine would.
    fn render(&self, value: &Value) -> String;
}
