//! Turn-level streaming events.
//!
//! `StreamEvent` is the orchestrator's output timeline for one turn. The
//! encoder turns each event into exactly one wire frame; the gateway relays
//! frames to the client in emission order.

use serde::{Deserialize, Serialize};
use threadloom_core::tool::{ToolErrorKind, ToolStatus};

/// Machine-readable kind carried by every error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnErrorKind {
    /// The model was unreachable or returned something unparsable
    ModelFailure,
    UnknownTool,
    InvalidArguments,
    ExecutionError,
    /// A tool call or the whole turn ran out of time
    Timeout,
    UnreachableResource,
    /// The tool budget ran out before a final answer
    BudgetExhausted,
    /// A message could not be recorded durably
    StoreWriteFailure,
    /// The thread was disabled; it accepts no further messages
    ThreadDisabled,
    /// The listener went away; logged, never framed
    Cancelled,
}

impl TurnErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelFailure => "model_failure",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::ExecutionError => "execution_error",
            Self::Timeout => "timeout",
            Self::UnreachableResource => "unreachable_resource",
            Self::BudgetExhausted => "budget_exhausted",
            Self::StoreWriteFailure => "store_write_failure",
            Self::ThreadDisabled => "thread_disabled",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TurnErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ToolErrorKind> for TurnErrorKind {
    fn from(kind: ToolErrorKind) -> Self {
        match kind {
            ToolErrorKind::UnknownTool => Self::UnknownTool,
            ToolErrorKind::InvalidArguments => Self::InvalidArguments,
            ToolErrorKind::ExecutionError => Self::ExecutionError,
            ToolErrorKind::Timeout => Self::Timeout,
            ToolErrorKind::UnreachableResource => Self::UnreachableResource,
        }
    }
}

/// Events emitted by the orchestrator during one turn.
///
/// Frame kinds on the wire:
/// - `text_delta`   : a fragment of the model's answer, in order
/// - `tool_started` : a tool call is about to run
/// - `tool_finished`: that tool call produced a result
/// - `error`        : the turn failed; always followed by `done`
/// - `done`         : the last frame of every turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },

    ToolStarted {
        call_id: String,
        name: String,
        /// Truncated rendering of the call arguments
        args: String,
    },

    ToolFinished {
        call_id: String,
        name: String,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<ToolErrorKind>,
    },

    Error { kind: TurnErrorKind, message: String },

    Done { thread_id: String },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn error(kind: TurnErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Frame kind for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
