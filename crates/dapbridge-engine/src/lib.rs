//! dapbridge-engine: the stepping debugger behind the adapter.
//!
//! A cooperative line tracer: the debuggee reports its execution point
//! through a [`Probe`], the engine decides where to stop and, when
//! stopped, runs a blocking native command loop on the debuggee's own
//! thread. The [`DebuggerBridge`] is the synchronous facade the adapter
//! talks to.

pub mod backend;
pub mod breakpoint;
pub mod bridge;
pub mod command;
pub mod engine;
pub mod error;
pub mod eval;
pub mod frame;
pub mod probe;
mod tracer;

pub use backend::{BackendKind, ConsoleTerminal, ScriptHandle, ScriptTerminal, Terminal};
pub use breakpoint::{BreakMap, BreakTable};
pub use bridge::{DebuggerBridge, StepOutcome, UpcallResult, Upcalls};
pub use engine::{
    build_engine, Control, EngineObserver, ExitReason, LineEngine, StepKind, SteppingEngine,
    StopReason,
};
pub use error::{BridgeError, EngineError};
pub use eval::{evaluate, EvalError};
pub use frame::{Binding, Frame};
pub use probe::{FrameGuard, Probe};
