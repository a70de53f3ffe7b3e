//! Session state handling.
//!
//! A session is identified by an opaque token supplied by the transport
//! layer; its only durable representation is a state blob in a
//! [`SessionStore`](store::SessionStore). The [`codec`] module turns a
//! filtered snapshot of interpreter bindings into that blob and back.

/// Binding snapshot encoding and decoding.
pub mod codec;
/// Key→blob persistence adapters.
pub mod store;

pub use codec::{DecodeError, EncodeError, STATE_FORMAT_VERSION};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier supplied by the transport layer.
///
/// The core neither mints nor validates tokens; it only keys store
/// operations by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a transport-supplied token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
