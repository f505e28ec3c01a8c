//! DAP protocol message types.
//!
//! Adapter-side view of the Debug Adapter Protocol: requests come in,
//! responses and events go out. Only the subset the adapter serves is
//! modelled; everything else stays as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};

/// Thread id reported for the single debuggee execution context.
pub const MAIN_THREAD_ID: i64 = 1;

/// Sequence number carried by every adapter-originated event.
pub const EVENT_SEQ: i64 = 0;

// Base messages

/// Incoming request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Opaque to the adapter; echoed in the response.
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    /// Build a request; used by clients and tests.
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            message_type: "request".into(),
            command: command.into(),
            arguments,
        }
    }

    /// Deserialize the arguments into a typed structure.
    ///
    /// Missing arguments deserialize from an empty object so that
    /// argument structs made only of optional fields still parse.
    pub fn parse_arguments<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        match &self.arguments {
            Some(args) => serde_json::from_value(args.clone()),
            None => serde_json::from_value(serde_json::json!({})),
        }
    }
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Same as `request_seq`.
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    /// Set on failure only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Response {
    /// Successful response to `request`.
    pub fn success(request: &Request, body: Option<serde_json::Value>) -> Self {
        Self {
            seq: request.seq,
            message_type: "response".into(),
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// Failed response to `request` carrying a human-readable message.
    pub fn failure(request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq: request.seq,
            message_type: "response".into(),
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }
}

/// Unsolicited notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Always [`EVENT_SEQ`].
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Event {
    /// Build an event with sequence number 0.
    pub fn new(event: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            seq: EVENT_SEQ,
            message_type: "event".into(),
            event: event.into(),
            body,
        }
    }

    /// `stopped` event for the main thread.
    pub fn stopped(reason: StopReason, description: Option<String>) -> Self {
        let body = StoppedEventBody {
            reason,
            description,
            thread_id: Some(MAIN_THREAD_ID),
            all_threads_stopped: Some(true),
        };
        Self::new("stopped", serde_json::to_value(body).ok())
    }

    /// `continued` event for the main thread.
    pub fn continued() -> Self {
        let body = ContinuedEventBody {
            thread_id: MAIN_THREAD_ID,
            all_threads_continued: Some(true),
        };
        Self::new("continued", serde_json::to_value(body).ok())
    }

    /// `exited` event carrying the debuggee exit code.
    pub fn exited(exit_code: i64) -> Self {
        Self::new(
            "exited",
            serde_json::to_value(ExitedEventBody { exit_code }).ok(),
        )
    }

    /// `terminated` event.
    pub fn terminated() -> Self {
        Self::new("terminated", None)
    }

    /// `initialized` event.
    pub fn initialized() -> Self {
        Self::new("initialized", None)
    }
}

// Request arguments and bodies

/// What the adapter advertises in its `initialize` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_evaluate_for_hovers: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    /// Replaces every breakpoint previously set in `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Older clients send bare line numbers instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArguments {
    /// Requested lines, preferring `breakpoints` over the deprecated `lines`.
    pub fn requested_lines(&self) -> Vec<i64> {
        match (&self.breakpoints, &self.lines) {
            (Some(bps), _) => bps.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines.clone(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// One entry per requested line, in request order.
    pub breakpoints: Vec<BreakpointResponse>,
}

/// Result for one requested breakpoint line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Why an unverified breakpoint was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Breakpoint as the client asks for it. Conditions are parsed and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    #[serde(default)]
    pub thread_id: i64,
    /// Frames to skip, counted from the innermost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// At most this many frames; absent or 0 means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    /// Frame whose bindings the expression sees; the innermost if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    /// `watch`, `repl`, `hover` or `clipboard`. Only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// `disconnect` flags. The adapter never terminates or restarts the
/// debuggee on request, so both are informational.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
}

// Runtime views

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

/// One entry of a `stackTrace` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Position in the chain, innermost frame = 0.
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Source {
    /// Source for `path`, named after its last component.
    pub fn from_path(path: &str) -> Self {
        let name = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            name,
            path: Some(path.to_string()),
        }
    }
}

/// `Locals` or `Globals` of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

/// A binding rendered for the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    /// Always 0: children are not expandable.
    pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// Rendered value, or `Error: ...` when evaluation failed.
    pub result: String,
    pub variables_reference: i64,
}

// Event bodies

/// `reason` of a `stopped` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// A step, next or return finished.
    Step,
    /// A breakpoint was hit, or a trace request took effect.
    Breakpoint,
    /// Synthetic stop sent after `configurationDone`.
    Entry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}
