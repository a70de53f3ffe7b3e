//! Control-plane client for the Reprise NDJSON service.
//!
//! A small, synchronous client that speaks the same newline-delimited JSON
//! protocol as the `reprised` daemon. It is intended to be reused by any
//! frontend (CLI, tests) that needs to drive the service.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use serde_json::{Value, json};
use thiserror::Error;

use crate::PROTOCOL_VERSION;

/// Errors produced by the [`ServiceClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error while communicating with the service.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// JSON (de)serialisation error for envelopes.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The service reported a structured protocol error.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
    /// Commands were issued before completing the handshake.
    #[error("handshake has not completed")]
    HandshakeNotCompleted,
    /// The service returned an unexpected or malformed payload.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The service closed the connection mid-request.
    #[error("connection closed by service")]
    ConnectionClosed,
}

/// Structured protocol error surfaced by the service.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProtocolError {
    /// Service-defined error code.
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
}

/// Response returned by the `handshake` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Protocol version agreed between client and service.
    pub protocol_version: String,
    /// Service version reported by the daemon.
    pub service_version: String,
    /// List of feature flags exposed by the service.
    pub features: Vec<String>,
}

/// Response returned by the `evaluate` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalReply {
    /// Session token to echo back on the next call.
    pub session: String,
    /// Captured output text.
    pub output: String,
}

/// Synchronous NDJSON client over a TCP connection.
pub struct ServiceClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_id: u64,
    handshake_completed: bool,
}

impl ServiceClient {
    /// Connect to a running daemon.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            reader,
            writer,
            next_id: 1,
            handshake_completed: false,
        })
    }

    /// Complete the protocol handshake. Must be called before any other
    /// command.
    pub fn handshake(&mut self, client_name: &str) -> Result<HandshakeInfo, ClientError> {
        let result = self.request(
            "handshake",
            json!({
                "client": client_name,
                "protocol_version": PROTOCOL_VERSION,
            }),
        )?;

        let protocol_version = result
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::MalformedResponse("missing protocol_version".into()))?
            .to_string();
        let runtime = result
            .get("runtime")
            .ok_or_else(|| ClientError::MalformedResponse("missing runtime".into()))?;
        let service_version = runtime
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let features = runtime
            .get("features")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        self.handshake_completed = true;
        Ok(HandshakeInfo {
            protocol_version,
            service_version,
            features,
        })
    }

    /// Evaluate a script, continuing `session` if one is provided.
    pub fn evaluate(
        &mut self,
        session: Option<&str>,
        script: &str,
    ) -> Result<EvalReply, ClientError> {
        self.ensure_handshake()?;

        let mut params = json!({ "script": script });
        if let Some(token) = session {
            params["session"] = Value::from(token);
        }

        let result = self.request("evaluate", params)?;
        let session = result
            .get("session")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::MalformedResponse("missing session".into()))?
            .to_string();
        let output = result
            .get("output")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(EvalReply { session, output })
    }

    /// Fetch the daemon's status payload.
    pub fn status(&mut self) -> Result<Value, ClientError> {
        self.ensure_handshake()?;
        self.request("status", json!({}))
    }

    fn ensure_handshake(&self) -> Result<(), ClientError> {
        if self.handshake_completed {
            Ok(())
        } else {
            Err(ClientError::HandshakeNotCompleted)
        }
    }

    fn request(&mut self, command: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let envelope = json!({
            "id": id,
            "command": command,
            "params": params,
        });
        serde_json::to_writer(&mut self.writer, &envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        let response: Value = serde_json::from_str(&line)?;
        if let Some(error) = response.get("error") {
            return Err(ClientError::Protocol(ProtocolError {
                code: error
                    .get("code")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::MalformedResponse("missing result".into()))
    }
}
