//! NDJSON control-plane service for the evaluation pipeline.
//!
//! This module exposes a small dispatcher that translates newline-delimited
//! JSON commands into calls on the [`Pipeline`]. It backs the `reprised`
//! daemon and is intentionally conservative: commands on one connection are
//! processed sequentially, and unsupported operations return structured
//! errors. Each connection is one worker execution context; it gets its own
//! [`WorkerId`] and therefore its own interpreter slot.

/// Synchronous client for the NDJSON protocol.
pub mod client;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::engine::Engine;
use crate::pipeline::{EvaluationError, Outcome, Pipeline};
use crate::session::SessionToken;
use crate::worker::WorkerId;
use crate::{PROTOCOL_VERSION, VERSION};

/// Service entry point: wraps a [`Pipeline`] and serves connections.
pub struct Service<E: Engine> {
    pipeline: Arc<Pipeline<E>>,
    started_at: DateTime<Utc>,
}

impl<E: Engine> Service<E> {
    /// Create a new service over the provided pipeline.
    pub fn new(pipeline: Arc<Pipeline<E>>) -> Self {
        Self {
            pipeline,
            started_at: Utc::now(),
        }
    }

    /// Shared handle to the underlying pipeline.
    pub fn pipeline(&self) -> Arc<Pipeline<E>> {
        self.pipeline.clone()
    }

    /// Process a single connection by consuming requests from the reader
    /// and writing responses. The connection is its own worker context.
    pub fn handle<R: BufRead, W: Write>(&self, reader: R, writer: W) -> io::Result<()> {
        let mut connection = Connection::new(self, writer);
        connection.run(reader)
    }
}

struct Connection<'a, E: Engine, W: Write> {
    service: &'a Service<E>,
    worker: WorkerId,
    writer: W,
    handshake_completed: bool,
}

impl<'a, E: Engine, W: Write> Connection<'a, E, W> {
    fn new(service: &'a Service<E>, writer: W) -> Self {
        Self {
            service,
            worker: WorkerId::new(),
            writer,
            handshake_completed: false,
        }
    }

    fn run<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Result<RequestEnvelope, _> = serde_json::from_str(&line);
            match envelope {
                Ok(request) => {
                    let response = self.handle_request(request);
                    self.write_response(response)?;
                }
                Err(err) => {
                    let response = ResponseEnvelope::from_error(
                        Value::Null,
                        ServiceError::Parse(err.to_string()),
                    );
                    self.write_response(response)?;
                }
            }
        }

        Ok(())
    }

    fn write_response(&mut self, envelope: ResponseEnvelope) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn handle_request(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        match self.dispatch(&request.command, &request.params) {
            Ok(value) => ResponseEnvelope::success(request.id, value),
            Err(err) => ResponseEnvelope::from_error(request.id, err),
        }
    }

    fn dispatch(&mut self, command: &str, params: &Value) -> Result<Value, ServiceError> {
        match command {
            "handshake" => self.cmd_handshake(params),
            "status" => self.cmd_status(),
            "evaluate" => self.cmd_evaluate(params),
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn cmd_handshake(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let client = params
            .get("client")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("client"))?;

        let requested = params
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("protocol_version"))?;

        if requested != PROTOCOL_VERSION {
            return Err(ServiceError::Protocol(format!(
                "unsupported protocol version: expected {}, got {}",
                PROTOCOL_VERSION, requested
            )));
        }

        self.handshake_completed = true;

        Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "runtime": {
                "version": VERSION,
                "client": client,
                "features": [
                    "status",
                    "evaluate",
                    "session_continuity"
                ]
            }
        }))
    }

    fn ensure_handshake(&self) -> Result<(), ServiceError> {
        if self.handshake_completed {
            Ok(())
        } else {
            Err(ServiceError::Protocol(
                "handshake required before issuing commands".into(),
            ))
        }
    }

    fn cmd_status(&mut self) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        let started_at = self.service.started_at;
        let uptime = Utc::now()
            .signed_duration_since(started_at)
            .num_seconds()
            .max(0);

        Ok(json!({
            "version": VERSION,
            "protocol_version": PROTOCOL_VERSION,
            "started_at": started_at.to_rfc3339(),
            "uptime_seconds": uptime,
            "workers": self.service.pipeline.worker_count(),
        }))
    }

    fn cmd_evaluate(&mut self, params: &Value) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;

        let script = params
            .get("script")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("script"))?;

        // The transport mints a token when the client has none yet; the
        // client echoes it back on later calls to continue the session.
        let session = match params.get("session").and_then(Value::as_str) {
            Some(token) => SessionToken::new(token),
            None => SessionToken::new(Uuid::new_v4().to_string()),
        };

        match self.service.pipeline.run(&self.worker, &session, script) {
            Outcome::EmptyInput => Ok(json!({
                "session": session.as_str(),
                "output": "",
            })),
            Outcome::Success { output } => Ok(json!({
                "session": session.as_str(),
                "output": output,
            })),
            Outcome::Fault { message } => {
                Err(ServiceError::Evaluation(EvaluationError(message)))
            }
        }
    }
}

#[derive(Debug)]
enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Protocol(String),
    Evaluation(EvaluationError),
}

impl ServiceError {
    fn invalid_param(name: &str) -> Self {
        ServiceError::InvalidParams(format!("missing or invalid parameter: {}", name))
    }
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Parse(message) => ErrorEnvelope {
                code: "parse_error".into(),
                message,
            },
            ServiceError::InvalidParams(message) => ErrorEnvelope {
                code: "invalid_params".into(),
                message,
            },
            ServiceError::Unsupported(command) => ErrorEnvelope {
                code: "unsupported_command".into(),
                message: format!("Command '{command}' is not supported"),
            },
            ServiceError::Protocol(message) => ErrorEnvelope {
                code: "protocol_error".into(),
                message,
            },
            ServiceError::Evaluation(err) => ErrorEnvelope {
                code: "evaluation_error".into(),
                message: err.to_string(),
            },
        }
    }
}
