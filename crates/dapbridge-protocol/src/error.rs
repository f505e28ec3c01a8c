//! Codec error types.

use thiserror::Error;

/// Errors produced while framing or unframing DAP messages.
///
/// Every variant means the connection is no longer usable; callers close
/// it instead of trying to resynchronise on the byte stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed or truncated header or body.
    #[error("framing error: {0}")]
    Framing(String),

    /// The peer closed the stream cleanly between two messages.
    #[error("connection closed")]
    Closed,

    /// The message body could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether the error is a clean end of stream rather than a fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, CodecError::Closed)
    }
}
