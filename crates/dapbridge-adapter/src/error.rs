//! Adapter error types.

use std::net::SocketAddr;

use dapbridge_engine::EngineError;
use thiserror::Error;

use crate::session::SessionState;

/// Why a request got a failure response. The connection stays open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    /// Execution control arrived over the wire.
    #[error(
        "'{0}' is not available over DAP: resume the debuggee from the native \
         command loop at the (dbg) prompt (c, s, n, r)"
    )]
    RejectedControl(String),

    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments { command: String, message: String },

    #[error("unknown variablesReference {0}")]
    UnknownReference(i64),
}

/// Illegal session state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("session is closed")]
    Closed,
}

/// Errors from adapter lifecycle operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// `shutdown()` called where it cannot run.
    #[error("shutdown misuse: {0}")]
    ShutdownMisuse(&'static str),

    #[error("adapter already started")]
    AlreadyStarted,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to build network runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl AdapterError {
    pub(crate) fn bind(addr: impl ToString, source: std::io::Error) -> Self {
        AdapterError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Address helper for log fields.
pub(crate) fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string()).unwrap_or_else(|| "-".into())
}
