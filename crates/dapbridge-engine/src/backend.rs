//! Stepping backends: where the native command loop reads and writes.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::engine::Control;
use crate::error::EngineError;

/// Prompt shown when the debuggee stops.
pub const PROMPT: &str = "(dbg) ";

/// Which command loop an engine runs at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Commands from stdin, output to stdout.
    Console,
    /// Commands fed through a [`ScriptHandle`], output kept in a transcript.
    Script,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Console => "console",
            BackendKind::Script => "script",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(BackendKind::Console),
            "script" => Ok(BackendKind::Script),
            _ => Err(EngineError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Output side of the native command loop.
///
/// Only ever touched from the debuggee thread.
pub trait Terminal: Send + 'static {
    fn print(&mut self, text: &str);
    /// Called each time the loop is about to wait for a command.
    fn prompt(&mut self);
}

/// Terminal bound to the process's stdin and stdout.
pub struct ConsoleTerminal {
    control: Sender<Control>,
    reader_started: bool,
}

impl ConsoleTerminal {
    pub fn new(control: Sender<Control>) -> Self {
        Self {
            control,
            reader_started: false,
        }
    }

    fn start_reader(&mut self) {
        let control = self.control.clone();
        let spawned = thread::Builder::new()
            .name("dapbridge-stdin".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if control.send(Control::Input(line)).is_err() {
                        return;
                    }
                }
                let _ = control.send(Control::Eof);
            });
        match spawned {
            Ok(_) => self.reader_started = true,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn stdin reader");
                let _ = self.control.send(Control::Eof);
            }
        }
    }
}

impl Terminal for ConsoleTerminal {
    fn print(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }

    fn prompt(&mut self) {
        if !self.reader_started {
            self.start_reader();
        }
        let mut out = io::stdout().lock();
        let _ = write!(out, "{PROMPT}");
        let _ = out.flush();
    }
}

type Transcript = Arc<Mutex<Vec<String>>>;

/// Terminal that records output for a [`ScriptHandle`] to read back.
pub struct ScriptTerminal {
    transcript: Transcript,
}

impl ScriptTerminal {
    pub fn new(transcript: Arc<Mutex<Vec<String>>>) -> Self {
        Self { transcript }
    }
}

impl Terminal for ScriptTerminal {
    fn print(&mut self, text: &str) {
        let mut lines = self.transcript.lock().unwrap_or_else(|e| e.into_inner());
        lines.extend(text.lines().map(str::to_string));
    }

    fn prompt(&mut self) {}
}

/// Drives a script-backend engine from another thread.
#[derive(Clone)]
pub struct ScriptHandle {
    control: Sender<Control>,
    transcript: Transcript,
}

impl ScriptHandle {
    pub fn new(control: Sender<Control>, transcript: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            control,
            transcript,
        }
    }

    /// Queue one native command line.
    pub fn send(&self, line: &str) -> Result<(), EngineError> {
        self.control
            .send(Control::Input(line.to_string()))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Signal end of input; the engine treats it like `quit`.
    pub fn close(&self) -> Result<(), EngineError> {
        self.control
            .send(Control::Eof)
            .map_err(|_| EngineError::Disconnected)
    }

    /// Everything the engine has printed so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
