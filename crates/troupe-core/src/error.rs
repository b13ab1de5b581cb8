//! Typed failure kinds with stable error codes.
//!
//! Every user-visible failure carries the identifying ids (tool name, call
//! id, agent id, checkpoint id) next to a stable machine code so callers can
//! branch programmatically instead of string-matching messages.

use thiserror::Error;

/// Errors surfaced by the agent runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An operation was attempted against an agent or queue in the wrong
    /// lifecycle state (completed queue, disposed agent, full pool, …).
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// A tool was allowed to run and then failed.
    #[error("tool '{tool}' (call {call_id}) failed: {reason}")]
    ToolExecution {
        tool: String,
        call_id: String,
        reason: String,
    },

    /// The model referenced a tool the registry does not know.
    #[error("tool '{tool}' not found")]
    ToolNotFound { tool: String },

    /// A hook or the permission engine denied a tool call.
    #[error("permission denied for tool '{tool}' (call {call_id}): {reason}")]
    PermissionDenied {
        tool: String,
        call_id: String,
        reason: String,
    },

    /// The model adapter failed.
    #[error("model error{}: {reason}", fmt_model(.model, .status))]
    Model {
        model: Option<String>,
        status: Option<u16>,
        reason: String,
    },

    /// Checkpoint persistence failed.
    #[error("checkpoint error{}: {reason}", fmt_id(.id))]
    Checkpoint { id: Option<String>, reason: String },

    /// The step loop hit its iteration ceiling.
    #[error("maximum iterations reached ({limit})")]
    MaxIterations { limit: u64 },

    /// A room operation named a member that is not registered.
    #[error("room member '{member}' not found")]
    RoomMemberNotFound { member: String },

    /// The caller's cancellation token fired; the current iteration aborted
    /// without corrupting history.
    #[error("operation cancelled")]
    Cancelled,
}

impl AgentError {
    /// Stable machine-readable code for programmatic branching.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            Self::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Model { .. } => "MODEL_ERROR",
            Self::Checkpoint { .. } => "CHECKPOINT_ERROR",
            Self::MaxIterations { .. } => "MAX_ITERATIONS",
            Self::RoomMemberNotFound { .. } => "KEY_NOT_FOUND",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Shorthand for [`AgentError::InvalidState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Shorthand for a checkpoint failure without a known id.
    pub fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            id: None,
            reason: reason.into(),
        }
    }
}

fn fmt_model(model: &Option<String>, status: &Option<u16>) -> String {
    match (model, status) {
        (Some(m), Some(s)) => format!(" ({m}, status {s})"),
        (Some(m), None) => format!(" ({m})"),
        (None, Some(s)) => format!(" (status {s})"),
        (None, None) => String::new(),
    }
}

fn fmt_id(id: &Option<String>) -> String {
    id.as_ref().map(|i| format!(" ({i})")).unwrap_or_default()
}

/// Result type for runtime operations.
pub type AgentResult<T> = Result<T, AgentError>;
