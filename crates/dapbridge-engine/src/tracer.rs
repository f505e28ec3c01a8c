//! Stop decisions for the line tracer.
//!
//! `TraceCore` owns the live call stack reported by the probe hooks and
//! the current stepping mode. It does no I/O and never blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::{StepKind, StopReason};
use crate::frame::{Binding, Frame};

const MODULE_FRAME: &str = "<module>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Stop only at breakpoints.
    Continue,
    /// Stop at the next line event.
    Step,
    /// Stop at the next line event, reported as a breakpoint.
    Trace,
    /// Stop at the next line event at `depth` or shallower.
    Next { depth: usize },
    /// Stop at the next line event shallower than `depth`.
    Return { depth: usize },
}

#[derive(Debug, Clone)]
struct LiveFrame {
    name: String,
    path: String,
    line: i64,
    column: i64,
    locals: Vec<Binding>,
}

#[derive(Debug)]
pub(crate) struct TraceCore {
    stack: Vec<LiveFrame>,
    globals: BTreeMap<String, String>,
    mode: Mode,
}

impl Default for TraceCore {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            globals: BTreeMap::new(),
            mode: Mode::Continue,
        }
    }
}

impl TraceCore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_trace(&mut self) {
        self.mode = Mode::Trace;
    }

    pub(crate) fn set_global(&mut self, name: &str, value: String) {
        self.globals.insert(name.to_string(), value);
    }

    pub(crate) fn on_enter(&mut self, name: &str, path: &str, line: i64) {
        self.stack.push(LiveFrame {
            name: name.to_string(),
            path: path.to_string(),
            line,
            column: 1,
            locals: Vec::new(),
        });
    }

    /// Pop the innermost frame. Returns `true` when that was the root.
    pub(crate) fn on_leave(&mut self) -> bool {
        self.stack.pop().is_some() && self.stack.is_empty()
    }

    /// Record a line event and decide whether to stop there.
    pub(crate) fn on_line(
        &mut self,
        path: &str,
        line: i64,
        column: i64,
        locals: Vec<Binding>,
        has_break: bool,
    ) -> Option<StopReason> {
        if self.stack.is_empty() {
            self.on_enter(MODULE_FRAME, path, line);
        }
        if let Some(top) = self.stack.last_mut() {
            top.path = path.to_string();
            top.line = line;
            top.column = column;
            top.locals = locals;
        }

        let depth = self.stack.len();
        if has_break {
            return Some(StopReason::Breakpoint);
        }
        match self.mode {
            Mode::Continue => None,
            Mode::Step => Some(StopReason::Step),
            Mode::Trace => Some(StopReason::Breakpoint),
            Mode::Next { depth: d } if depth <= d => Some(StopReason::Step),
            Mode::Return { depth: d } if depth < d => Some(StopReason::Step),
            Mode::Next { .. } | Mode::Return { .. } => None,
        }
    }

    /// Switch mode for the next resume, relative to the current depth.
    pub(crate) fn resume(&mut self, kind: StepKind) {
        let depth = self.stack.len();
        self.mode = match kind {
            StepKind::Continue => Mode::Continue,
            StepKind::Step => Mode::Step,
            StepKind::Next => Mode::Next { depth },
            StepKind::Return => Mode::Return { depth },
        };
    }

    /// Stop tracing: only breakpoints would stop from here on.
    pub(crate) fn disarm(&mut self) {
        self.mode = Mode::Continue;
    }

    /// Build the frame chain for the current stack; innermost gets id 0.
    pub(crate) fn snapshot(&self) -> Option<Arc<Frame>> {
        let globals: Arc<Vec<Binding>> = Arc::new(
            self.globals
                .iter()
                .map(|(name, value)| Binding::rendered(name.as_str(), value.as_str()))
                .collect(),
        );
        let count = self.stack.len();
        let mut back: Option<Arc<Frame>> = None;
        for (i, live) in self.stack.iter().enumerate() {
            back = Some(Arc::new(Frame {
                id: (count - 1 - i) as i64,
                name: live.name.clone(),
                path: live.path.clone(),
                line: live.line,
                column: live.column,
                locals: live.locals.clone(),
                globals: Arc::clone(&globals),
                back,
            }));
        }
        back
    }
}
