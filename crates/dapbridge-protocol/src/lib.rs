//! dapbridge-protocol: Debug Adapter Protocol wire layer.
//!
//! This crate holds the adapter-side protocol message types and the
//! Content-Length framing used on the TCP connection between a DAP
//! client and the adapter.

pub mod codec;
pub mod error;
pub mod protocol;

pub use codec::{encode_message, read_message, write_message};
pub use error::CodecError;
pub use protocol::*;
