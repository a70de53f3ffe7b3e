//! Evaluation pipeline: the session-continuation state machine.
//!
//! Each call walks `parse → restore → execute → render → persist →
//! respond`, with two short-circuits: empty input returns an empty
//! response, and an engine fault stops the call before anything is
//! persisted. State-continuity failures never fail the request: an
//! unreadable blob restores as a fresh session, and a failed save leaves
//! the previous blob authoritative for the next call.

use std::sync::Arc;

use thiserror::Error;

use crate::engine::Engine;
use crate::session::store::SessionStore;
use crate::session::{SessionToken, codec};
use crate::worker::{WorkerCache, WorkerId};

/// Evaluation fault surfaced to the remote caller.
///
/// This is the only failure a caller ever sees; every state-continuity
/// failure is absorbed by the pipeline and logged instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EvaluationError(pub String);

/// Result of one pipeline run, matched exhaustively by the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The script contained nothing evaluable; the response is empty text.
    EmptyInput,
    /// The script ran to completion; `output` holds the captured stream,
    /// including the auto-rendered result when the engine marked it
    /// visible.
    Success {
        /// Captured output text.
        output: String,
    },
    /// The engine raised a fault; nothing was persisted for this call.
    Fault {
        /// The engine's fault message.
        message: String,
    },
}

/// Orchestrates worker interpreters, the session store, and the state
/// codec into the evaluate operation.
pub struct Pipeline<E: Engine> {
    workers: WorkerCache<E>,
    store: Arc<dyn SessionStore>,
}

impl<E: Engine> Pipeline<E> {
    /// Build a pipeline over a session store and an interpreter factory.
    pub fn new(
        store: Arc<dyn SessionStore>,
        factory: impl Fn() -> E + Send + Sync + 'static,
    ) -> Self {
        Self {
            workers: WorkerCache::new(factory),
            store,
        }
    }

    /// The remote `evaluate` operation: run a script under a session and
    /// return the captured output text.
    pub fn evaluate(
        &self,
        worker: &WorkerId,
        session: &SessionToken,
        script: &str,
    ) -> Result<String, EvaluationError> {
        match self.run(worker, session, script) {
            Outcome::EmptyInput => Ok(String::new()),
            Outcome::Success { output } => Ok(output),
            Outcome::Fault { message } => Err(EvaluationError(message)),
        }
    }

    /// Run the full state machine for one call.
    pub fn run(&self, worker: &WorkerId, session: &SessionToken, script: &str) -> Outcome {
        let handle = self.workers.slot(worker);
        let mut engine = handle.lock();

        // Idle → Parsed. Nothing evaluable is a policy short-circuit, not
        // an error; the store is never touched for it.
        let parsed = match engine.parse(script) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return Outcome::EmptyInput,
            Err(fault) => {
                return Outcome::Fault {
                    message: fault.to_string(),
                };
            }
        };

        // Parsed → StateRestored. The worker's interpreter may hold scope
        // from whichever session it served last; the wipe below is what
        // keeps sessions isolated on a reused instance.
        engine.clear_globals();
        match self.store.load(session) {
            Ok(Some(blob)) => match codec::decode(&blob) {
                Ok(bindings) => {
                    for binding in bindings {
                        engine.set_global(&binding.name, binding.value);
                    }
                }
                Err(err) => {
                    tracing::warn!(%session, error = %err, "discarding undecodable session state");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%session, error = %err, "session state load failed, proceeding fresh");
            }
        }

        // StateRestored → Executed. On a fault the previous blob remains
        // authoritative for the session's next call.
        let evaluated = match engine.evaluate(&parsed) {
            Ok(evaluated) => evaluated,
            Err(fault) => {
                tracing::warn!(%session, fault = %fault, "evaluation failed");
                return Outcome::Fault {
                    message: fault.to_string(),
                };
            }
        };

        let mut output = evaluated.output;
        if evaluated.visible {
            output.push_str(&engine.render(&evaluated.value));
            output.push('\n');
        }

        // Executed → StatePersisted. Persistence failures are non-fatal:
        // the response still goes out, the session just reads stale on its
        // next call.
        let bindings = engine.global_bindings();
        match codec::encode(&bindings) {
            Ok(blob) => match self.store.save(session, &blob) {
                Ok(()) => {
                    let saved = bindings
                        .iter()
                        .filter(|binding| binding.value.is_persistable())
                        .count();
                    tracing::debug!(%session, variables = saved, bytes = blob.len(), "session state saved");
                }
                Err(err) => {
                    tracing::warn!(%session, error = %err, "session state save failed, durable state is stale");
                }
            },
            Err(err) => {
                tracing::warn!(%session, error = %err, "session state encode failed, durable state is stale");
            }
        }

        Outcome::Success { output }
    }

    /// Number of workers holding a bootstrapped interpreter.
    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }
}
