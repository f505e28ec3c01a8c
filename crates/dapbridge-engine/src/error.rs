//! Engine and bridge error types.

use thiserror::Error;

/// Errors raised by a stepping engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured backend name does not match any known engine.
    #[error("unsupported stepping backend '{0}': use 'console' or 'script'")]
    UnsupportedBackend(String),

    /// The engine's control queue is gone (engine dropped).
    #[error("engine control channel disconnected")]
    Disconnected,
}

/// Errors raised by [`DebuggerBridge`](crate::DebuggerBridge) operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A blocking operation was invoked on the debuggee's own thread.
    #[error("blocking debugger operation called from the debugger's own execution context")]
    DebuggerContext,

    /// A step operation was requested while the debuggee is running.
    #[error("debuggee is not stopped")]
    NotStopped,

    /// The debuggee has already exited.
    #[error("debuggee has exited")]
    Exited,

    /// Engine-level failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
