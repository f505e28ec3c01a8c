//! Stack frame snapshots.
//!
//! A [`Frame`] is built by the engine every time the debuggee stops and
//! dropped when it resumes. Frames link to their caller through `back`,
//! so the innermost frame is the handle to the whole stack.

use std::fmt;
use std::sync::Arc;

/// One named value, rendered as a display string at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Variable name.
    pub name: String,
    /// `Debug` rendering of the value.
    pub value: String,
}

impl Binding {
    /// Capture `value` under `name`.
    pub fn new(name: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        Self {
            name: name.into(),
            value: format!("{value:?}"),
        }
    }

    /// Build a binding from an already rendered value.
    pub fn rendered(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Capture local variables as a `Vec<Binding>`: `bindings!(x, total)`.
#[macro_export]
macro_rules! bindings {
    ($($name:ident),* $(,)?) => {
        vec![$($crate::Binding::new(stringify!($name), &$name)),*]
    };
}

/// Read-only snapshot of one call-stack entry.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the chain, 0 for the innermost frame.
    pub id: i64,
    /// Function name.
    pub name: String,
    /// Source path as reported by the probe.
    pub path: String,
    /// 1-based line.
    pub line: i64,
    /// 1-based column.
    pub column: i64,
    /// Local bindings at the stop.
    pub locals: Vec<Binding>,
    /// Program-wide bindings, shared by every frame of one snapshot.
    pub globals: Arc<Vec<Binding>>,
    /// The calling frame.
    pub back: Option<Arc<Frame>>,
}

impl Frame {
    /// Iterate from this frame outwards along the back-chain.
    pub fn chain(&self) -> FrameChain<'_> {
        FrameChain { next: Some(self) }
    }

    /// Find the frame with `id` in this frame's chain.
    pub fn find(&self, id: i64) -> Option<&Frame> {
        self.chain().find(|f| f.id == id)
    }

    /// Number of frames in the chain, this one included.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    /// Look a name up in locals, then globals.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.locals
            .iter()
            .chain(self.globals.iter())
            .find(|b| b.name == name)
            .map(|b| b.value.as_str())
    }
}

/// Iterator over a frame's back-chain, innermost first.
pub struct FrameChain<'a> {
    next: Option<&'a Frame>,
}

impl<'a> Iterator for FrameChain<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.back.as_deref();
        Some(current)
    }
}
