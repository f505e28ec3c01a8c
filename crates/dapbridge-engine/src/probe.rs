//! Instrumentation handle used by the debuggee.
//!
//! ```ignore
//! fn fib(probe: &Probe, n: u64) -> u64 {
//!     trace_fn!(probe, "fib");
//!     trace_line!(probe, n);
//!     if n < 2 { return n; }
//!     fib(probe, n - 1) + fib(probe, n - 2)
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::engine::SteppingEngine;
use crate::frame::Binding;

/// Cheap, cloneable handle the debuggee reports its execution point through.
#[derive(Clone)]
pub struct Probe {
    engine: Arc<dyn SteppingEngine>,
}

impl Probe {
    pub fn new(engine: Arc<dyn SteppingEngine>) -> Self {
        Self { engine }
    }

    /// Push a frame. It is popped when the returned guard drops.
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, name: &str, path: &str, line: u32) -> FrameGuard {
        self.engine.enter(name, path, i64::from(line));
        FrameGuard {
            engine: Arc::clone(&self.engine),
        }
    }

    /// Report that execution reached `path:line`. May block while stopped.
    pub fn line(&self, path: &str, line: u32, column: u32, locals: Vec<Binding>) {
        self.engine
            .line(path, i64::from(line), i64::from(column), locals);
    }

    /// Stop at the next reported line.
    pub fn set_trace(&self) {
        self.engine.set_trace();
    }

    /// Publish a program-wide binding.
    pub fn global(&self, name: &str, value: &dyn fmt::Debug) {
        self.engine.set_global(name, format!("{value:?}"));
    }
}

/// Pops its frame from the traced stack on drop.
pub struct FrameGuard {
    engine: Arc<dyn SteppingEngine>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.engine.leave();
    }
}

/// Report the current source line with the named locals.
#[macro_export]
macro_rules! trace_line {
    ($probe:expr $(, $name:ident)* $(,)?) => {
        $probe.line(file!(), line!(), column!(), $crate::bindings!($($name),*))
    };
}

/// Enter a traced frame for the rest of the enclosing block.
#[macro_export]
macro_rules! trace_fn {
    ($probe:expr, $name:expr) => {
        let _dapbridge_frame = $probe.enter($name, file!(), line!());
    };
}
