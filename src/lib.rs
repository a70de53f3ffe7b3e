//! Reprise – a session-continuous script evaluation service
//!
//! This crate implements a remote script-evaluation endpoint where each
//! logical client session observes a continuous interpreter state even
//! though the transport is stateless and any of several interchangeable
//! worker contexts may service a given call:
//! - Interpreter state is captured after every successful evaluation,
//!   serialized into an opaque versioned blob, and stored externally
//! - Prior state is restored into the servicing worker's interpreter
//!   before the next evaluation on the same session
//! - Corrupt or foreign blobs degrade to a fresh session, never a crash
//! - An NDJSON control protocol plus daemon and REPL client binaries
//!
//! Only `Data`-kind bindings cross the persistence boundary; callables and
//! environment references stay behind in the live scope that produced them.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Service configuration and its on-disk form
pub mod config;
/// Interpreter engine boundary and the built-in script engine
pub mod engine;
/// Evaluation pipeline orchestrating restore, execute, and persist
pub mod pipeline;
/// NDJSON service dispatcher and protocol client
pub mod service;
/// Session state: codec, store adapters, and tokens
pub mod session;
/// Atomic filesystem write helpers shared by stores and config
pub mod storage;
/// Worker-affinity interpreter cache
pub mod worker;

// Re-export key types for convenience
pub use engine::{Engine, EngineFault};
pub use pipeline::{EvaluationError, Outcome, Pipeline};

/// Current version of the Reprise service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for control plane communication
pub const PROTOCOL_VERSION: &str = "1.0.0";
