use std::sync::Arc;

use reprise::engine::{ScriptEngine, Value};
use reprise::pipeline::{Outcome, Pipeline};
use reprise::session::store::StoreError;
use reprise::session::{FileStore, MemoryStore, SessionStore, SessionToken, codec};
use reprise::worker::WorkerId;
use tempfile::TempDir;

fn pipeline_over(store: Arc<dyn SessionStore>) -> Pipeline<ScriptEngine> {
    Pipeline::new(store, ScriptEngine::new)
}

#[test]
fn continuity_across_workers() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store);
    let session = SessionToken::new("s-continuity");

    let worker_a = WorkerId::new();
    let worker_b = WorkerId::new();

    let output = pipeline
        .evaluate(&worker_a, &session, "(define x 5)")
        .unwrap();
    assert_eq!(output, "");

    // A different worker restores the same session from the store.
    let output = pipeline.evaluate(&worker_b, &session, "(print x)").unwrap();
    assert_eq!(output, "5\n");
}

#[test]
fn sessions_are_isolated_even_on_the_same_worker() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store);
    let worker = WorkerId::new();

    pipeline
        .evaluate(&worker, &SessionToken::new("alpha"), "(define x 41)")
        .unwrap();

    let err = pipeline
        .evaluate(&worker, &SessionToken::new("beta"), "(print x)")
        .unwrap_err();
    assert!(err.to_string().contains("unbound variable: x"));
}

#[test]
fn corrupt_state_degrades_to_a_fresh_session() {
    let store = Arc::new(MemoryStore::new());
    let session = SessionToken::new("s-corrupt");
    store.save(&session, b"definitely not a state blob").unwrap();

    let pipeline = pipeline_over(store.clone());
    let worker = WorkerId::new();

    // The call completes as if no prior state existed.
    let output = pipeline.evaluate(&worker, &session, "(define x 7)").unwrap();
    assert_eq!(output, "");

    // And the successful call replaced the garbage with a decodable blob.
    let blob = store.load(&session).unwrap().unwrap();
    let bindings = codec::decode(&blob).unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].value, Value::Integer(7));
}

#[test]
fn callables_do_not_survive_the_persistence_boundary() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store.clone());
    let session = SessionToken::new("s-filter");

    pipeline
        .evaluate(
            &WorkerId::new(),
            &session,
            "(define x 5) (define twice (lambda (n) (* 2 n)))",
        )
        .unwrap();

    // The blob holds only the data binding.
    let blob = store.load(&session).unwrap().unwrap();
    let bindings = codec::decode(&blob).unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].name, "x");

    // On a fresh worker the data binding restores, the callable does not.
    let worker = WorkerId::new();
    let output = pipeline.evaluate(&worker, &session, "(print x)").unwrap();
    assert_eq!(output, "5\n");
    let err = pipeline
        .evaluate(&worker, &session, "(twice 4)")
        .unwrap_err();
    assert!(err.to_string().contains("unbound variable: twice"));
}

#[test]
fn visibility_controls_auto_rendering() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store);
    let session = SessionToken::new("s-visibility");
    let worker = WorkerId::new();

    // Assignment alone renders nothing.
    let output = pipeline
        .evaluate(&worker, &session, "(define x 21)")
        .unwrap();
    assert_eq!(output, "");

    // A bare expression auto-renders its value.
    let output = pipeline.evaluate(&worker, &session, "(* x 2)").unwrap();
    assert_eq!(output, "42\n");

    // An explicit print captures output without double-rendering.
    let output = pipeline.evaluate(&worker, &session, "(print x)").unwrap();
    assert_eq!(output, "21\n");
}

#[test]
fn failed_evaluation_leaves_persisted_state_untouched() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store.clone());
    let session = SessionToken::new("s-fault");

    pipeline
        .evaluate(&WorkerId::new(), &session, "(define x 5)")
        .unwrap();
    let blob_before = store.load(&session).unwrap().unwrap();

    let err = pipeline
        .evaluate(&WorkerId::new(), &session, "(boom)")
        .unwrap_err();
    assert!(err.to_string().contains("unbound variable: boom"));

    // The previous blob is byte-identical and still decodes to {x: 5}.
    let blob_after = store.load(&session).unwrap().unwrap();
    assert_eq!(blob_before, blob_after);
    let bindings = codec::decode(&blob_after).unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].name, "x");
    assert_eq!(bindings[0].value, Value::Integer(5));

    // And the session continues from it.
    let output = pipeline
        .evaluate(&WorkerId::new(), &session, "(print x)")
        .unwrap();
    assert_eq!(output, "5\n");
}

#[test]
fn empty_input_is_an_empty_response_not_an_error() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(store.clone());
    let session = SessionToken::new("s-empty");
    let worker = WorkerId::new();

    for script in ["", "   \n\t", "; comment only\n"] {
        assert_eq!(
            pipeline.run(&worker, &session, script),
            Outcome::EmptyInput
        );
        assert_eq!(pipeline.evaluate(&worker, &session, script).unwrap(), "");
    }

    // Empty input never touches the store.
    assert!(store.load(&session).unwrap().is_none());
}

struct BrokenStore;

impl SessionStore for BrokenStore {
    fn load(&self, _token: &SessionToken) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("load unavailable")))
    }

    fn save(&self, _token: &SessionToken, _blob: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("save unavailable")))
    }
}

#[test]
fn degraded_store_never_fails_the_request() {
    let pipeline = pipeline_over(Arc::new(BrokenStore));
    let session = SessionToken::new("s-degraded");
    let worker = WorkerId::new();

    // Load and save both fail; the caller still gets a full response.
    let output = pipeline
        .evaluate(&worker, &session, "(define x 9) (print x)")
        .unwrap();
    assert_eq!(output, "9\n");
}

#[test]
fn save_failure_means_the_next_call_reads_stale_state() {
    struct SaveOnceStore {
        inner: MemoryStore,
        allow_saves: std::sync::atomic::AtomicUsize,
    }

    impl SessionStore for SaveOnceStore {
        fn load(&self, token: &SessionToken) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.load(token)
        }

        fn save(&self, token: &SessionToken, blob: &[u8]) -> Result<(), StoreError> {
            use std::sync::atomic::Ordering;
            if self.allow_saves.load(Ordering::SeqCst) == 0 {
                return Err(StoreError::Io(std::io::Error::other("save unavailable")));
            }
            self.allow_saves.fetch_sub(1, Ordering::SeqCst);
            self.inner.save(token, blob)
        }
    }

    let store = Arc::new(SaveOnceStore {
        inner: MemoryStore::new(),
        allow_saves: std::sync::atomic::AtomicUsize::new(1),
    });
    let pipeline = pipeline_over(store);
    let session = SessionToken::new("s-stale");

    pipeline
        .evaluate(&WorkerId::new(), &session, "(define x 1)")
        .unwrap();

    // This call succeeds but its save is dropped.
    let output = pipeline
        .evaluate(&WorkerId::new(), &session, "(define x 2) (print x)")
        .unwrap();
    assert_eq!(output, "2\n");

    // The next call observes the stale state from the first save.
    let output = pipeline
        .evaluate(&WorkerId::new(), &session, "(print x)")
        .unwrap();
    assert_eq!(output, "1\n");
}

#[test]
fn file_store_carries_a_session_across_pipelines() {
    let temp = TempDir::new().unwrap();
    let session = SessionToken::new("s-durable");

    // Two pipeline instances over the same directory stand in for two
    // daemon processes sharing a store.
    {
        let store = Arc::new(FileStore::open(temp.path().join("sessions")).unwrap());
        let pipeline = pipeline_over(store);
        pipeline
            .evaluate(&WorkerId::new(), &session, "(define greeting \"hello\")")
            .unwrap();
    }

    let store = Arc::new(FileStore::open(temp.path().join("sessions")).unwrap());
    let pipeline = pipeline_over(store);
    let output = pipeline
        .evaluate(&WorkerId::new(), &session, "(print greeting)")
        .unwrap();
    assert_eq!(output, "hello\n");
}
