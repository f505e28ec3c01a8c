//! Synchronous facade over a stepping engine.
//!
//! The bridge is what the adapter holds. It forwards breakpoint and frame
//! queries straight to the engine, turns engine notifications into
//! [`Upcalls`], and offers blocking step operations for callers that live
//! outside the debuggee thread.
//!
//! Termination can be reported more than once (a `quit` at the prompt and
//! later the root frame returning, for example); `on_exit` is delivered
//! only for the first report.

use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use crate::breakpoint::BreakMap;
use crate::engine::{Control, EngineObserver, ExitReason, StepKind, SteppingEngine, StopReason};
use crate::error::BridgeError;
use crate::frame::Frame;

/// Result type returned by upcall handlers.
pub type UpcallResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Handlers invoked on the debuggee thread.
///
/// Failures, whether returned or panicked, are logged and swallowed.
pub trait Upcalls: Send + Sync {
    fn on_stop(&self, frame: Arc<Frame>, reason: StopReason) -> UpcallResult;
    fn on_resume(&self, kind: StepKind) -> UpcallResult;
    fn on_exit(&self, reason: ExitReason) -> UpcallResult;
}

/// Where a blocking step operation ended up.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Stopped(Arc<Frame>),
    Exited(ExitReason),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Progress {
    generation: u64,
    last: Option<StepOutcome>,
}

struct BridgeInner {
    upcalls: Arc<dyn Upcalls>,
    exited: AtomicBool,
    exit_reason: Mutex<Option<ExitReason>>,
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl BridgeInner {
    fn guarded(&self, upcall: &'static str, f: impl FnOnce() -> UpcallResult) {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(upcall, error = %e, "upcall failed"),
            Err(_) => tracing::error!(upcall, "upcall panicked"),
        }
    }

    fn advance(&self, outcome: StepOutcome) {
        let mut progress = lock(&self.progress);
        progress.generation += 1;
        progress.last = Some(outcome);
        self.changed.notify_all();
    }
}

impl EngineObserver for BridgeInner {
    fn stopped(&self, frame: Arc<Frame>, reason: StopReason) {
        let upcalls = Arc::clone(&self.upcalls);
        let stop_frame = Arc::clone(&frame);
        self.guarded("on_stop", move || upcalls.on_stop(stop_frame, reason));
        self.advance(StepOutcome::Stopped(frame));
    }

    fn resumed(&self, kind: StepKind) {
        let upcalls = Arc::clone(&self.upcalls);
        self.guarded("on_resume", move || upcalls.on_resume(kind));
    }

    fn exited(&self, reason: ExitReason) {
        if self.exited.swap(true, Ordering::SeqCst) {
            tracing::debug!(%reason, "duplicate exit report ignored");
            return;
        }
        *lock(&self.exit_reason) = Some(reason);
        let upcalls = Arc::clone(&self.upcalls);
        self.guarded("on_exit", move || upcalls.on_exit(reason));
        self.advance(StepOutcome::Exited(reason));
    }
}

/// The adapter's handle on the stepping engine.
#[derive(Clone)]
pub struct DebuggerBridge {
    engine: Arc<dyn SteppingEngine>,
    inner: Arc<BridgeInner>,
}

impl DebuggerBridge {
    /// Wrap `engine` and route its notifications to `upcalls`.
    pub fn new(engine: Arc<dyn SteppingEngine>, upcalls: Arc<dyn Upcalls>) -> Self {
        let inner = Arc::new(BridgeInner {
            upcalls,
            exited: AtomicBool::new(false),
            exit_reason: Mutex::new(None),
            progress: Mutex::new(Progress::default()),
            changed: Condvar::new(),
        });
        engine.attach(inner.clone());
        Self { engine, inner }
    }

    pub fn engine(&self) -> &Arc<dyn SteppingEngine> {
        &self.engine
    }

    pub fn set_trace(&self) {
        self.engine.set_trace();
    }

    pub fn set_break(&self, path: &str, line: i64) -> bool {
        self.engine.set_break(path, line)
    }

    pub fn clear_break(&self, path: &str, line: i64) -> bool {
        self.engine.clear_break(path, line)
    }

    pub fn list_breaks(&self) -> BreakMap {
        self.engine.list_breaks()
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.engine.current_frame()
    }

    /// Whether the calling thread is the debuggee thread.
    pub fn on_debugger_context(&self) -> bool {
        self.engine.debugger_thread() == Some(thread::current().id())
    }

    pub fn is_exited(&self) -> bool {
        self.inner.exited.load(Ordering::SeqCst)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        *lock(&self.inner.exit_reason)
    }

    /// Ask a running debuggee to stop tracing at its next hook, or a
    /// stopped one to leave its command loop.
    pub fn interrupt(&self) -> Result<(), BridgeError> {
        Ok(self.engine.post(Control::Interrupt)?)
    }

    pub fn continue_(&self) -> Result<StepOutcome, BridgeError> {
        self.resume(StepKind::Continue)
    }

    pub fn step(&self) -> Result<StepOutcome, BridgeError> {
        self.resume(StepKind::Step)
    }

    pub fn next(&self) -> Result<StepOutcome, BridgeError> {
        self.resume(StepKind::Next)
    }

    pub fn return_(&self) -> Result<StepOutcome, BridgeError> {
        self.resume(StepKind::Return)
    }

    /// Post a resume and block until the engine stops again or exits.
    fn resume(&self, kind: StepKind) -> Result<StepOutcome, BridgeError> {
        if self.on_debugger_context() {
            return Err(BridgeError::DebuggerContext);
        }
        if self.is_exited() {
            return Err(BridgeError::Exited);
        }
        if !self.engine.is_stopped() {
            return Err(BridgeError::NotStopped);
        }

        let mut progress = lock(&self.inner.progress);
        let start = progress.generation;
        self.engine.post(Control::Resume(kind))?;
        while progress.generation == start {
            progress = self
                .inner
                .changed
                .wait(progress)
                .unwrap_or_else(|e| e.into_inner());
        }
        progress.last.clone().ok_or(BridgeError::Exited)
    }
}
