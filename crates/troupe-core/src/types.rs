//! Core conversation types shared across the runtime.
//!
//! History is an append-only sequence of [`Message`]s during normal
//! operation; branching requires a checkpoint fork. Wire forms are camelCase
//! JSON with unix-millisecond timestamps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current unix time in milliseconds (the wire timestamp unit).
pub fn unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─── Message ───────────────────────────────────────────────────────────────

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in an agent's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on tool-role messages: the id of the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant messages that request tool executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// An assistant turn that requests tool executions.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
        }
    }

    /// The tool-role answer to one tool call.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }

    /// Tool calls carried by this message, empty for non-assistant roles.
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

// ─── Tool call / outcome ───────────────────────────────────────────────────

/// A tool invocation requested by the model. Consumed exactly once per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Model-assigned call id.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The result of executing (or denying, or mocking) one tool call.
///
/// Produced by the executor, fed to post-tool hooks, then appended to
/// history as a tool-role message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// Rendered result text as it will appear in history.
    pub result: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

impl ToolOutcome {
    /// Convert into the tool-role history message answering the call.
    pub fn into_message(self) -> Message {
        Message::tool(self.id, self.result)
    }
}

// ─── Runtime state ─────────────────────────────────────────────────────────

/// Lifecycle state of an agent.
///
/// Wire form is an UPPER_SNAKE_CASE string; the decoder also accepts the
/// integers 0/1/2 and case-insensitive strings emitted by older writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRuntimeState {
    #[default]
    Ready,
    Working,
    Paused,
}

impl<'de> Deserialize<'de> for AgentRuntimeState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct StateVisitor;

        impl serde::de::Visitor<'_> for StateVisitor {
            type Value = AgentRuntimeState;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an agent state string or integer 0..=2")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v.to_ascii_uppercase().as_str() {
                    "READY" => Ok(AgentRuntimeState::Ready),
                    "WORKING" => Ok(AgentRuntimeState::Working),
                    "PAUSED" => Ok(AgentRuntimeState::Paused),
                    other => Err(E::custom(format!("unknown agent state '{other}'"))),
                }
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match v {
                    0 => Ok(AgentRuntimeState::Ready),
                    1 => Ok(AgentRuntimeState::Working),
                    2 => Ok(AgentRuntimeState::Paused),
                    other => Err(E::custom(format!("unknown agent state {other}"))),
                }
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("unknown agent state {v}")))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(StateVisitor)
    }
}

/// Point-in-time snapshot of an agent, returned by `Agent::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent_id: String,
    pub session_id: String,
    pub state: AgentRuntimeState,
    pub step_count: u64,
    /// Messages buffered in the queue, not yet flushed into history.
    pub pending_messages: usize,
}
