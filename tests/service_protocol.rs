use reprise::engine::ScriptEngine;
use reprise::pipeline::Pipeline;
use reprise::service::Service;
use reprise::session::{MemoryStore, SessionStore};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;
use std::sync::Arc;

fn service_over_memory() -> Service<ScriptEngine> {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    Service::new(Arc::new(Pipeline::new(store, ScriptEngine::new)))
}

fn run_requests(service: &Service<ScriptEngine>, requests: Vec<Value>) -> Vec<Value> {
    let input_data = requests
        .into_iter()
        .map(|req| serde_json::to_string(&req).unwrap())
        .collect::<Vec<_>>()
        .join("\n");

    let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
    let writer = SharedWriter(sink.clone());
    let reader = Cursor::new(format!("{}\n", input_data));
    service.handle(reader, writer).unwrap();

    let output = sink.borrow();
    output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice::<Value>(line).unwrap())
        .collect()
}

#[test]
fn service_handles_basic_commands() {
    let service = service_over_memory();

    let requests = vec![
        json!({"id": 1, "command": "status", "params": {}}),
        json!({"id": 2, "command": "handshake", "params": {"client": "test", "protocol_version": reprise::PROTOCOL_VERSION}}),
        json!({"id": 3, "command": "status", "params": {}}),
        json!({"id": 4, "command": "evaluate", "params": {"script": "(+ 2 3)"}}),
        json!({"id": 5, "command": "noop", "params": {}}),
    ];

    let lines = run_requests(&service, requests);
    assert_eq!(lines.len(), 5);

    // Commands before the handshake are rejected.
    assert_eq!(lines[0]["error"]["code"], "protocol_error");
    assert!(lines[1]["result"].is_object());
    assert_eq!(lines[2]["result"]["workers"], json!(0));

    // Evaluate without a token mints a session and returns the output.
    let result = &lines[3]["result"];
    assert!(!result["session"].as_str().unwrap().is_empty());
    assert_eq!(result["output"], "5\n");

    assert_eq!(lines[4]["error"]["code"], "unsupported_command");
}

#[test]
fn session_continues_across_requests() {
    let service = service_over_memory();

    let requests = vec![
        json!({"id": 1, "command": "handshake", "params": {"client": "test", "protocol_version": reprise::PROTOCOL_VERSION}}),
        json!({"id": 2, "command": "evaluate", "params": {"session": "alpha", "script": "(define x 5)"}}),
        json!({"id": 3, "command": "evaluate", "params": {"session": "alpha", "script": "(print x)"}}),
        json!({"id": 4, "command": "evaluate", "params": {"session": "beta", "script": "(print x)"}}),
    ];

    let lines = run_requests(&service, requests);
    assert_eq!(lines.len(), 4);

    assert_eq!(lines[1]["result"]["output"], "");
    assert_eq!(lines[1]["result"]["session"], "alpha");
    assert_eq!(lines[2]["result"]["output"], "5\n");

    // A different session does not see alpha's bindings.
    assert_eq!(lines[3]["error"]["code"], "evaluation_error");
    assert!(
        lines[3]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("unbound variable: x")
    );
}

#[test]
fn faults_empty_scripts_and_garbage_lines() {
    let service = service_over_memory();

    let requests = vec![
        json!({"id": 1, "command": "handshake", "params": {"client": "test", "protocol_version": reprise::PROTOCOL_VERSION}}),
        json!({"id": 2, "command": "evaluate", "params": {"script": "   "}}),
        json!({"id": 3, "command": "evaluate", "params": {"script": "(/ 1 0)"}}),
        json!({"id": 4, "command": "evaluate", "params": {}}),
    ];

    let mut input_data = requests
        .into_iter()
        .map(|req| serde_json::to_string(&req).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    input_data.push_str("\nthis is not json\n");

    let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
    let writer = SharedWriter(sink.clone());
    let reader = Cursor::new(input_data);
    service.handle(reader, writer).unwrap();

    let output = sink.borrow();
    let lines: Vec<Value> = output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice::<Value>(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 5);
    // Empty input is a successful empty response, not an error.
    assert_eq!(lines[1]["result"]["output"], "");
    assert_eq!(lines[2]["error"]["code"], "evaluation_error");
    assert!(
        lines[2]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("division by zero")
    );
    assert_eq!(lines[3]["error"]["code"], "invalid_params");
    assert_eq!(lines[4]["error"]["code"], "parse_error");
}

#[test]
fn protocol_version_mismatch_is_rejected() {
    let service = service_over_memory();

    let requests = vec![
        json!({"id": 1, "command": "handshake", "params": {"client": "test", "protocol_version": "0.0.1"}}),
    ];

    let lines = run_requests(&service, requests);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["error"]["code"], "protocol_error");
}

struct SharedWriter(Rc<RefCell<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
