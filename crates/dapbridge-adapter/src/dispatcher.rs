//! Request routing: one handler per DAP command.
//!
//! Handlers only touch non-blocking bridge operations and the session's
//! adopted frame, so the network loop can call [`Dispatcher::dispatch`]
//! inline. Execution control is deliberately absent; the debuggee is
//! driven from its own native command loop.

use std::sync::{Arc, Mutex, MutexGuard};

use dapbridge_engine::{evaluate, DebuggerBridge, Frame};
use dapbridge_protocol::{
    BreakpointResponse, Capabilities, DisconnectArguments, EvaluateArguments,
    EvaluateResponseBody, Event, Request, Response, Scope, ScopesArguments,
    SetBreakpointsArguments, SetBreakpointsResponseBody, Source, StackFrame, StackTraceArguments,
    StopReason, Thread, Variable, VariablesArguments, MAIN_THREAD_ID,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::DispatchError;
use crate::session::Session;

/// Most frames a single `stackTrace` response carries.
pub const MAX_STACK_FRAMES: usize = 20;

/// `variablesReference` base for a frame's locals.
pub const LOCALS_REF_BASE: i64 = 1000;
/// `variablesReference` base for a frame's globals.
pub const GLOBALS_REF_BASE: i64 = 2000;

/// What the network loop writes back for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub response: Response,
    /// Events written right after the response.
    pub events: Vec<Event>,
    /// Close the client connection after writing.
    pub close: bool,
}

#[derive(Default)]
struct Handled {
    body: Option<Value>,
    events: Vec<Event>,
    close: bool,
}

impl Handled {
    fn body(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }
}

type Handler = fn(&Dispatcher, &Request) -> Result<Handled, DispatchError>;

const HANDLERS: &[(&str, Handler)] = &[
    ("initialize", Dispatcher::initialize),
    ("launch", Dispatcher::launch),
    ("configurationDone", Dispatcher::configuration_done),
    ("setBreakpoints", Dispatcher::set_breakpoints),
    ("threads", Dispatcher::threads),
    ("stackTrace", Dispatcher::stack_trace),
    ("scopes", Dispatcher::scopes),
    ("variables", Dispatcher::variables),
    ("evaluate", Dispatcher::evaluate),
    ("continue", Dispatcher::reject_control),
    ("pause", Dispatcher::reject_control),
    ("stepIn", Dispatcher::reject_control),
    ("stepOut", Dispatcher::reject_control),
    ("next", Dispatcher::reject_control),
    ("disconnect", Dispatcher::disconnect),
];

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Dispatcher {
    bridge: DebuggerBridge,
    session: Arc<Mutex<Session>>,
}

impl Dispatcher {
    pub fn new(bridge: DebuggerBridge, session: Arc<Mutex<Session>>) -> Self {
        Self { bridge, session }
    }

    /// Run the handler for `request` and build the reply.
    pub fn dispatch(&self, request: &Request) -> Reply {
        let handler = HANDLERS
            .iter()
            .find(|(name, _)| *name == request.command)
            .map(|(_, handler)| *handler);

        let result = match handler {
            Some(handler) => handler(self, request),
            None => Err(DispatchError::UnsupportedCommand(request.command.clone())),
        };

        match result {
            Ok(handled) => Reply {
                response: Response::success(request, handled.body),
                events: handled.events,
                close: handled.close,
            },
            Err(e) => {
                tracing::debug!(command = %request.command, seq = request.seq, error = %e, "request failed");
                Reply {
                    response: Response::failure(request, e.to_string()),
                    events: Vec::new(),
                    close: false,
                }
            }
        }
    }

    fn frame(&self) -> Option<Arc<Frame>> {
        lock(&self.session).frame()
    }

    fn initialize(&self, _request: &Request) -> Result<Handled, DispatchError> {
        let caps = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_evaluate_for_hovers: Some(true),
            ..Capabilities::default()
        };
        Ok(Handled::body(to_value(&caps)))
    }

    fn launch(&self, _request: &Request) -> Result<Handled, DispatchError> {
        Ok(Handled {
            body: Some(json!({})),
            events: vec![Event::initialized()],
            close: false,
        })
    }

    fn configuration_done(&self, _request: &Request) -> Result<Handled, DispatchError> {
        Ok(Handled {
            events: vec![Event::stopped(StopReason::Entry, Some("Paused on entry".into()))],
            ..Handled::default()
        })
    }

    fn set_breakpoints(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: SetBreakpointsArguments = arguments(request)?;
        let path = args
            .source
            .path
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DispatchError::InvalidArguments {
                command: request.command.clone(),
                message: "source.path is required".into(),
            })?;

        let existing = self.bridge.list_breaks().remove(&path).unwrap_or_default();
        for line in existing {
            self.bridge.clear_break(&path, line);
        }

        let breakpoints = args
            .requested_lines()
            .into_iter()
            .map(|line| {
                if line > 0 {
                    self.bridge.set_break(&path, line);
                    BreakpointResponse {
                        verified: true,
                        line: Some(line),
                        message: None,
                    }
                } else {
                    BreakpointResponse {
                        verified: false,
                        line: Some(line),
                        message: Some("line must be positive".into()),
                    }
                }
            })
            .collect();
        tracing::debug!(%path, "breakpoints replaced");

        Ok(Handled::body(to_value(&SetBreakpointsResponseBody {
            breakpoints,
        })))
    }

    fn threads(&self, _request: &Request) -> Result<Handled, DispatchError> {
        let threads = vec![Thread {
            id: MAIN_THREAD_ID,
            name: "main".into(),
        }];
        Ok(Handled::body(json!({ "threads": threads })))
    }

    fn stack_trace(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: StackTraceArguments = arguments(request)?;
        let Some(frame) = self.frame() else {
            return Ok(Handled::body(json!({ "stackFrames": [], "totalFrames": 0 })));
        };

        let start = args.start_frame.unwrap_or(0).max(0) as usize;
        let levels = match args.levels {
            Some(n) if n > 0 => (n as usize).min(MAX_STACK_FRAMES),
            _ => MAX_STACK_FRAMES,
        };
        let frames: Vec<StackFrame> = frame
            .chain()
            .skip(start)
            .take(levels)
            .map(|f| StackFrame {
                id: f.id,
                name: f.name.clone(),
                source: Some(Source::from_path(&f.path)),
                line: f.line,
                column: f.column,
            })
            .collect();

        Ok(Handled::body(json!({
            "stackFrames": frames,
            "totalFrames": frame.depth(),
        })))
    }

    fn scopes(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: ScopesArguments = arguments(request)?;
        let scopes = vec![
            Scope {
                name: "Locals".into(),
                variables_reference: LOCALS_REF_BASE + args.frame_id,
                expensive: false,
            },
            Scope {
                name: "Globals".into(),
                variables_reference: GLOBALS_REF_BASE + args.frame_id,
                expensive: false,
            },
        ];
        Ok(Handled::body(json!({ "scopes": scopes })))
    }

    fn variables(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: VariablesArguments = arguments(request)?;
        let reference = args.variables_reference;
        let unknown = || DispatchError::UnknownReference(reference);

        let (globals, frame_id) = match reference {
            r if (LOCALS_REF_BASE..GLOBALS_REF_BASE).contains(&r) => (false, r - LOCALS_REF_BASE),
            r if (GLOBALS_REF_BASE..GLOBALS_REF_BASE + LOCALS_REF_BASE).contains(&r) => {
                (true, r - GLOBALS_REF_BASE)
            }
            _ => return Err(unknown()),
        };

        let top = self.frame().ok_or_else(unknown)?;
        let frame = top.find(frame_id).ok_or_else(unknown)?;
        let bindings = if globals {
            frame.globals.as_slice()
        } else {
            frame.locals.as_slice()
        };
        let variables: Vec<Variable> = bindings
            .iter()
            .map(|b| Variable {
                name: b.name.clone(),
                value: b.value.clone(),
                variables_reference: 0,
            })
            .collect();
        Ok(Handled::body(json!({ "variables": variables })))
    }

    fn evaluate(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: EvaluateArguments = arguments(request)?;
        let frame_id = args.frame_id.unwrap_or(0);
        tracing::debug!(expression = %args.expression, context = ?args.context, frame_id, "evaluate");

        let result = match self.frame() {
            Some(top) => match top.find(frame_id) {
                Some(frame) => evaluate(&args.expression, frame)
                    .unwrap_or_else(|e| format!("Error: {e}")),
                None => format!("Error: no frame with id {frame_id}"),
            },
            None => "Error: debuggee is not stopped".to_string(),
        };

        Ok(Handled::body(to_value(&EvaluateResponseBody {
            result,
            variables_reference: 0,
        })))
    }

    fn reject_control(&self, request: &Request) -> Result<Handled, DispatchError> {
        tracing::info!(command = %request.command, "rejected execution control over DAP");
        Err(DispatchError::RejectedControl(request.command.clone()))
    }

    fn disconnect(&self, request: &Request) -> Result<Handled, DispatchError> {
        let args: DisconnectArguments = arguments(request)?;
        if args.terminate_debuggee == Some(true) || args.restart == Some(true) {
            tracing::info!(?args, "disconnect flags ignored, the debuggee keeps running");
        }
        Ok(Handled {
            close: true,
            ..Handled::default()
        })
    }
}

fn arguments<T: DeserializeOwned>(request: &Request) -> Result<T, DispatchError> {
    request
        .parse_arguments()
        .map_err(|e| DispatchError::InvalidArguments {
            command: request.command.clone(),
            message: e.to_string(),
        })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
