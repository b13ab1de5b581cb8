//! Runtime configuration surface.
//!
//! Plain serde structs with serde defaults; builders on [`crate::agent`] and
//! [`crate::pool`] consume these rather than reading process-wide state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_max_iterations() -> u64 {
    40
}

fn default_permission_mode() -> String {
    "auto".to_string()
}

fn default_max_pending() -> usize {
    1024
}

/// Per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Ceiling on the cumulative step count before the loop fails with
    /// `MAX_ITERATIONS`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Name of the permission mode consulted for every tool call.
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
    /// Queue backpressure bound: sends past this fail with `INVALID_STATE`.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            session_id: None,
            system_prompt: None,
            max_iterations: default_max_iterations(),
            permission_mode: default_permission_mode(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_max_agents() -> usize {
    50
}

/// Pool-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Skill discovery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsConfig {
    /// Search paths walked during discovery.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Only skills with these names are kept, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    /// Skills with these names are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    /// Trusted skills may grant their `allowed_tools` on activation.
    #[serde(default)]
    pub trusted: bool,
    /// Reject skills whose metadata violates the naming/length rules.
    #[serde(default = "default_true")]
    pub validate_on_load: bool,
}

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Http,
    StreamableHttp,
    Sse,
}

/// Connection settings for a dynamic MCP tool source.
///
/// The core only recognizes and serializes this shape; the MCP client that
/// consumes it is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    pub transport: McpTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}
