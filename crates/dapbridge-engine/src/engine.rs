//! The stepping engine capability and its line-tracing implementation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use std::thread::{self, ThreadId};

use crate::backend::{BackendKind, ConsoleTerminal, ScriptHandle, ScriptTerminal, Terminal};
use crate::breakpoint::{BreakMap, BreakTable};
use crate::command::{self, Command, Location, HELP};
use crate::error::EngineError;
use crate::eval::evaluate;
use crate::frame::{Binding, Frame};
use crate::tracer::TraceCore;

/// How the debuggee resumes from a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Continue,
    Step,
    Next,
    Return,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Continue => "continue",
            StepKind::Step => "step",
            StepKind::Next => "next",
            StepKind::Return => "return",
        }
    }
}

/// Why the engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Step,
    Entry,
}

/// Why tracing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The traced root frame returned.
    Finished,
    /// `quit` at the prompt.
    Quit,
    /// The native command source closed.
    EndOfInput,
    /// Interrupted from another thread.
    Interrupted,
}

impl ExitReason {
    /// Process-style exit code reported to the client.
    pub fn exit_code(self) -> i64 {
        match self {
            ExitReason::Finished => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::Finished => "finished",
            ExitReason::Quit => "quit",
            ExitReason::EndOfInput => "end of input",
            ExitReason::Interrupted => "interrupted",
        })
    }
}

/// Messages posted to the engine from other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// One native command line.
    Input(String),
    Resume(StepKind),
    Eof,
    Interrupt,
}

/// Receives stop, resume and exit notifications on the debuggee thread.
pub trait EngineObserver: Send + Sync {
    fn stopped(&self, frame: Arc<Frame>, reason: StopReason);
    fn resumed(&self, kind: StepKind);
    fn exited(&self, reason: ExitReason);
}

/// Capability interface of a stepping debugger.
///
/// The hook methods (`enter`, `line`, `leave`, `set_global`) are called by
/// the debuggee through a [`Probe`](crate::Probe); `line` may block in the
/// native command loop. Everything else is safe to call from any thread.
pub trait SteppingEngine: Send + Sync {
    fn backend(&self) -> BackendKind;
    fn attach(&self, observer: Arc<dyn EngineObserver>);

    /// Stop at the next line event.
    fn set_trace(&self);
    /// Returns `false` if the breakpoint already existed.
    fn set_break(&self, path: &str, line: i64) -> bool;
    fn clear_break(&self, path: &str, line: i64) -> bool;
    fn list_breaks(&self) -> BreakMap;

    fn current_frame(&self) -> Option<Arc<Frame>>;
    fn is_stopped(&self) -> bool;
    /// Whether tracing has ended.
    fn has_exited(&self) -> bool;
    fn post(&self, control: Control) -> Result<(), EngineError>;
    /// Thread the debuggee runs on, once it has called a hook.
    fn debugger_thread(&self) -> Option<ThreadId>;

    fn enter(&self, name: &str, path: &str, line: i64);
    fn line(&self, path: &str, line: i64, column: i64, locals: Vec<Binding>);
    fn leave(&self);
    fn set_global(&self, name: &str, value: String);
}

/// Construct an engine for `kind`. Script engines also return their handle.
pub fn build_engine(kind: BackendKind) -> (Arc<dyn SteppingEngine>, Option<ScriptHandle>) {
    let (tx, rx) = mpsc::channel();
    match kind {
        BackendKind::Console => {
            let terminal = ConsoleTerminal::new(tx.clone());
            (Arc::new(LineEngine::new(kind, terminal, tx, rx)), None)
        }
        BackendKind::Script => {
            let transcript = Arc::new(Mutex::new(Vec::new()));
            let handle = ScriptHandle::new(tx.clone(), Arc::clone(&transcript));
            let terminal = ScriptTerminal::new(transcript);
            (Arc::new(LineEngine::new(kind, terminal, tx, rx)), Some(handle))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Line-tracing engine that runs its command loop on the debuggee thread.
pub struct LineEngine<T: Terminal> {
    kind: BackendKind,
    core: Mutex<TraceCore>,
    breaks: Mutex<BreakTable>,
    current: Mutex<Option<Arc<Frame>>>,
    observer: RwLock<Option<Arc<dyn EngineObserver>>>,
    control_tx: Sender<Control>,
    control_rx: Mutex<Receiver<Control>>,
    terminal: Mutex<T>,
    stopped: AtomicBool,
    ended: AtomicBool,
    interrupted: AtomicBool,
    thread: OnceLock<ThreadId>,
}

impl<T: Terminal> LineEngine<T> {
    pub fn new(
        kind: BackendKind,
        terminal: T,
        control_tx: Sender<Control>,
        control_rx: Receiver<Control>,
    ) -> Self {
        Self {
            kind,
            core: Mutex::new(TraceCore::new()),
            breaks: Mutex::new(BreakTable::new()),
            current: Mutex::new(None),
            observer: RwLock::new(None),
            control_tx,
            control_rx: Mutex::new(control_rx),
            terminal: Mutex::new(terminal),
            stopped: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            thread: OnceLock::new(),
        }
    }

    fn observer(&self) -> Option<Arc<dyn EngineObserver>> {
        self.observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn print(&self, text: &str) {
        lock(&self.terminal).print(text);
    }

    fn note_thread(&self) {
        self.thread.get_or_init(|| thread::current().id());
    }

    /// End tracing and report `reason`.
    fn finish(&self, reason: ExitReason) {
        self.ended.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        lock(&self.core).disarm();
        *lock(&self.current) = None;
        tracing::info!(%reason, "tracing ended");
        if let Some(observer) = self.observer() {
            observer.exited(reason);
        }
    }

    fn resume(&self, kind: StepKind) {
        lock(&self.core).resume(kind);
        *lock(&self.current) = None;
        self.stopped.store(false, Ordering::SeqCst);
        tracing::debug!(kind = kind.as_str(), "resuming");
        if let Some(observer) = self.observer() {
            observer.resumed(kind);
        }
    }

    /// Stop at the current line and serve the native command loop until
    /// something resumes or ends the debuggee.
    fn interact(&self, frame: Arc<Frame>, reason: StopReason) {
        *lock(&self.current) = Some(Arc::clone(&frame));
        tracing::debug!(path = %frame.path, line = frame.line, ?reason, "stopped");
        self.print(&format!("> {}:{} in {}()", frame.path, frame.line, frame.name));
        if let Some(observer) = self.observer() {
            observer.stopped(Arc::clone(&frame), reason);
        }
        // Only flag the stop once observers have seen it, so a resume
        // posted in response always follows the stop it answers.
        self.stopped.store(true, Ordering::SeqCst);

        loop {
            lock(&self.terminal).prompt();
            let control = lock(&self.control_rx).recv();
            match control {
                Ok(Control::Resume(kind)) => return self.resume(kind),
                Ok(Control::Eof) | Err(_) => return self.finish(ExitReason::EndOfInput),
                Ok(Control::Interrupt) => return self.finish(ExitReason::Interrupted),
                Ok(Control::Input(line)) => match command::parse(&line) {
                    Ok(Command::Resume(kind)) => return self.resume(kind),
                    Ok(Command::Quit) => return self.finish(ExitReason::Quit),
                    Ok(cmd) => self.run_command(cmd, &frame),
                    Err(e) => self.print(&format!("*** {e}")),
                },
            }
        }
    }

    fn run_command(&self, cmd: Command, frame: &Frame) {
        match cmd {
            Command::Print(expr) => match evaluate(&expr, frame) {
                Ok(value) => self.print(&value),
                Err(e) => self.print(&format!("*** {e}")),
            },
            Command::Break(loc) => {
                let (path, line) = resolve(loc, frame);
                self.set_break(&path, line);
                self.print(&format!("Breakpoint at {path}:{line}"));
            }
            Command::Clear(loc) => {
                let (path, line) = resolve(loc, frame);
                if self.clear_break(&path, line) {
                    self.print(&format!("Deleted breakpoint at {path}:{line}"));
                } else {
                    self.print(&format!("*** no breakpoint at {path}:{line}"));
                }
            }
            Command::Where => {
                let frames: Vec<&Frame> = frame.chain().collect();
                for f in frames.iter().rev() {
                    let marker = if f.id == frame.id { "->" } else { "  " };
                    self.print(&format!("{marker} {}:{} in {}()", f.path, f.line, f.name));
                }
            }
            Command::Help => self.print(HELP),
            Command::Empty | Command::Resume(_) | Command::Quit => {}
        }
    }
}

fn resolve(loc: Location, frame: &Frame) -> (String, i64) {
    (loc.path.unwrap_or_else(|| frame.path.clone()), loc.line)
}

impl<T: Terminal> SteppingEngine for LineEngine<T> {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn attach(&self, observer: Arc<dyn EngineObserver>) {
        *self.observer.write().unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    fn set_trace(&self) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        lock(&self.core).set_trace();
    }

    fn set_break(&self, path: &str, line: i64) -> bool {
        lock(&self.breaks).set(path, line)
    }

    fn clear_break(&self, path: &str, line: i64) -> bool {
        lock(&self.breaks).clear(path, line)
    }

    fn list_breaks(&self) -> BreakMap {
        lock(&self.breaks).all()
    }

    fn current_frame(&self) -> Option<Arc<Frame>> {
        lock(&self.current).clone()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn has_exited(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn post(&self, control: Control) -> Result<(), EngineError> {
        if control == Control::Interrupt {
            self.interrupted.store(true, Ordering::SeqCst);
        }
        self.control_tx
            .send(control)
            .map_err(|_| EngineError::Disconnected)
    }

    fn debugger_thread(&self) -> Option<ThreadId> {
        self.thread.get().copied()
    }

    fn enter(&self, name: &str, path: &str, line: i64) {
        self.note_thread();
        lock(&self.core).on_enter(name, path, line);
    }

    fn line(&self, path: &str, line: i64, column: i64, locals: Vec<Binding>) {
        self.note_thread();
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        if self.interrupted.load(Ordering::SeqCst) {
            return self.finish(ExitReason::Interrupted);
        }

        let has_break = lock(&self.breaks).hits(path, line);
        let decision = {
            let mut core = lock(&self.core);
            core.on_line(path, line, column, locals, has_break)
                .and_then(|reason| core.snapshot().map(|frame| (frame, reason)))
        };
        if let Some((frame, reason)) = decision {
            self.interact(frame, reason);
        }
    }

    fn leave(&self) {
        let root_returned = lock(&self.core).on_leave();
        if root_returned {
            self.finish(ExitReason::Finished);
        }
    }

    fn set_global(&self, name: &str, value: String) {
        lock(&self.core).set_global(name, value);
    }
}
