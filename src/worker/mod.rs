//! Worker-affinity interpreter cache.
//!
//! Every worker execution context (one connection-serving thread in the
//! daemon) owns exactly one interpreter, created lazily on the worker's
//! first call and reused for the worker's lifetime. The table lock guards
//! slot creation only; entries are never shared across workers, so
//! evaluation itself runs without contention.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of one worker execution context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Create a new random WorkerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a worker's interpreter. The mutex is uncontended in normal
/// operation because only the owning worker locks it.
pub type InterpreterHandle<E> = Arc<Mutex<E>>;

/// Affinity table mapping worker identities to their interpreter handles.
pub struct WorkerCache<E> {
    factory: Box<dyn Fn() -> E + Send + Sync>,
    slots: RwLock<HashMap<WorkerId, InterpreterHandle<E>>>,
}

impl<E> WorkerCache<E> {
    /// Create a cache that bootstraps interpreters with the given factory.
    pub fn new(factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Return the interpreter owned by `worker`, bootstrapping it on the
    /// worker's first call.
    pub fn slot(&self, worker: &WorkerId) -> InterpreterHandle<E> {
        if let Some(handle) = self.slots.read().get(worker) {
            return handle.clone();
        }

        let mut slots = self.slots.write();
        slots
            .entry(worker.clone())
            .or_insert_with(|| {
                tracing::info!(%worker, "bootstrapping interpreter");
                Arc::new(Mutex::new((self.factory)()))
            })
            .clone()
    }

    /// Number of workers that have bootstrapped an interpreter.
    pub fn worker_count(&self) -> usize {
        self.slots.read().len()
    }
}
