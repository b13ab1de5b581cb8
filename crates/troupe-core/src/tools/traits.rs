//! The uniform tool contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::AgentResult;
use crate::model::ToolSpec;

/// Access metadata values recognized by the permission engine. `access` is
/// an open string on the wire; these are the values the core emits.
pub mod access {
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const EXECUTE: &str = "execute";
    pub const MANAGE: &str = "manage";
    pub const MUTATE: &str = "mutate";
}

// ─── Results ───────────────────────────────────────────────────────────────

/// The result of a tool execution. The value of a successful execution is
/// an opaque structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
        }
    }

    /// Render as history text: string payloads verbatim, other payloads as
    /// compact JSON, errors as their message.
    pub fn render(&self) -> String {
        if self.success {
            match &self.value {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        } else {
            self.error.clone().unwrap_or_else(|| "tool failed".into())
        }
    }
}

// ─── Attributes & descriptor ───────────────────────────────────────────────

/// Static behavioural attributes a tool declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAttributes {
    /// The tool never mutates anything observable.
    #[serde(default)]
    pub read_only: bool,
    /// Repeated invocations are free of side effects.
    #[serde(default)]
    pub no_effect: bool,
    /// The tool always wants a human in the loop.
    #[serde(default)]
    pub requires_approval: bool,
    /// Calls in the same assistant turn may run concurrently.
    #[serde(default)]
    pub allow_parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_category: Option<String>,
}

/// Where a tool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Builtin,
    Registered,
    Mcp,
}

/// Permission-relevant metadata. Back-filled by the registry's descriptor
/// enricher when the tool itself leaves fields unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

/// Identity and metadata of a registered tool, consumed by permission
/// modes and serialized into snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub source: ToolSource,
    pub name: String,
    pub registry_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

impl ToolDescriptor {
    pub fn registered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: ToolSource::Registered,
            registry_id: name.clone(),
            name,
            config: None,
            metadata: ToolMetadata::default(),
        }
    }
}

/// Back-fill `mutates` and `access` from the tool's attributes. Fields the
/// tool set itself are left untouched, so applying this twice is a no-op.
pub fn enrich_descriptor(
    mut descriptor: ToolDescriptor,
    attributes: &ToolAttributes,
) -> ToolDescriptor {
    if descriptor.metadata.mutates.is_none() {
        descriptor.metadata.mutates = Some(!attributes.read_only);
    }
    if descriptor.metadata.access.is_none() {
        let access = if attributes.read_only {
            access::READ
        } else if descriptor.name.starts_with("bash_") {
            access::EXECUTE
        } else {
            access::WRITE
        };
        descriptor.metadata.access = Some(access.to_string());
    }
    descriptor
}

// ─── Context & trait ───────────────────────────────────────────────────────

/// Per-call execution context handed to tools.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub agent_id: String,
    pub call_id: String,
    pub metadata: Value,
}

/// A capability the step loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn Tool>` through the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"read_file"`.
    fn name(&self) -> &str;

    /// Human-readable description included in model requests.
    fn description(&self) -> &str;

    /// JSON Schema object describing the accepted input.
    fn input_schema(&self) -> Value;

    fn attributes(&self) -> ToolAttributes {
        ToolAttributes::default()
    }

    /// Execute with the given arguments. Must honour `cancel` across inner
    /// awaits.
    async fn execute(
        &self,
        args: Value,
        ctx: &ToolContext,
        cancel: &CancelToken,
    ) -> AgentResult<ToolResult>;

    /// Identity emitted to the permission engine and snapshots. The default
    /// leaves metadata unset; the registry back-fills it.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::registered(self.name())
    }

    /// Summary included in model requests.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}
