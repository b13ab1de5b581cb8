//! Permission engine: decide allow/deny/ask for each tool call.
//!
//! Modes are pluggable handlers registered by name. The engine is injected
//! into agents as a dependency; the step loop never reads process-wide
//! state. Three modes ship built in: `auto`, `approval`, `readonly`.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{ToolDescriptor, access};

/// Verdict for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

/// A named policy evaluated against per-tool descriptor metadata.
pub trait PermissionMode: Send + Sync {
    fn evaluate(
        &self,
        tool: &str,
        descriptor: Option<&ToolDescriptor>,
        config: &Value,
    ) -> PermissionDecision;
}

impl<F> PermissionMode for F
where
    F: Fn(&str, Option<&ToolDescriptor>, &Value) -> PermissionDecision + Send + Sync,
{
    fn evaluate(
        &self,
        tool: &str,
        descriptor: Option<&ToolDescriptor>,
        config: &Value,
    ) -> PermissionDecision {
        self(tool, descriptor, config)
    }
}

// ─── Built-in modes ────────────────────────────────────────────────────────

struct AutoMode;

impl PermissionMode for AutoMode {
    fn evaluate(&self, _: &str, _: Option<&ToolDescriptor>, _: &Value) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

struct ApprovalMode;

impl PermissionMode for ApprovalMode {
    fn evaluate(&self, _: &str, _: Option<&ToolDescriptor>, _: &Value) -> PermissionDecision {
        PermissionDecision::Ask
    }
}

/// Deny anything that mutates. `mutates` wins when set; otherwise the
/// `access` field decides; a descriptor with neither escalates to `ask`.
struct ReadonlyMode;

impl PermissionMode for ReadonlyMode {
    fn evaluate(
        &self,
        _tool: &str,
        descriptor: Option<&ToolDescriptor>,
        _config: &Value,
    ) -> PermissionDecision {
        let Some(descriptor) = descriptor else {
            return PermissionDecision::Ask;
        };
        match descriptor.metadata.mutates {
            Some(true) => PermissionDecision::Deny,
            Some(false) => PermissionDecision::Allow,
            None => match descriptor.metadata.access.as_deref() {
                Some(value) => {
                    let value = value.to_ascii_lowercase();
                    if matches!(
                        value.as_str(),
                        access::WRITE | access::EXECUTE | access::MANAGE | access::MUTATE
                    ) {
                        PermissionDecision::Deny
                    } else {
                        PermissionDecision::Allow
                    }
                }
                None => PermissionDecision::Ask,
            },
        }
    }
}

// ─── Engine ────────────────────────────────────────────────────────────────

struct ModeEntry {
    handler: Arc<dyn PermissionMode>,
    built_in: bool,
}

/// Serialized form of one registered mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeInfo {
    pub name: String,
    pub built_in: bool,
}

/// Result of restoring a snapshot: custom mode names that are not
/// registered in this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub missing: Vec<String>,
}

/// Registry of permission modes, consulted by the step loop per tool call.
pub struct PermissionEngine {
    modes: DashMap<String, ModeEntry>,
}

impl Default for PermissionEngine {
    fn default() -> Self {
        let engine = Self {
            modes: DashMap::new(),
        };
        engine.register_mode("auto", Arc::new(AutoMode), true);
        engine.register_mode("approval", Arc::new(ApprovalMode), true);
        engine.register_mode("readonly", Arc::new(ReadonlyMode), true);
        engine
    }
}

impl PermissionEngine {
    /// Engine pre-populated with the built-in modes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`. Re-registering a built-in name with
    /// `built_in = false` marks it custom from then on.
    pub fn register_mode(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn PermissionMode>,
        built_in: bool,
    ) {
        self.modes
            .insert(name.into(), ModeEntry { handler, built_in });
    }

    pub fn has_mode(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    /// Evaluate `mode` for one tool call. Unknown modes escalate to `ask`
    /// rather than silently allowing.
    pub fn evaluate(
        &self,
        mode: &str,
        tool: &str,
        descriptor: Option<&ToolDescriptor>,
        config: &Value,
    ) -> PermissionDecision {
        match self.modes.get(mode) {
            Some(entry) => entry.handler.evaluate(tool, descriptor, config),
            None => {
                tracing::warn!(mode, tool, "unknown permission mode, escalating to ask");
                PermissionDecision::Ask
            }
        }
    }

    /// Serializable `{name, built_in}` pairs, sorted by name.
    pub fn snapshot(&self) -> Vec<ModeInfo> {
        let mut infos: Vec<ModeInfo> = self
            .modes
            .iter()
            .map(|e| ModeInfo {
                name: e.key().clone(),
                built_in: e.value().built_in,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Check a snapshot against this engine. Unknown custom mode names are
    /// surfaced as missing without aborting.
    pub fn restore(&self, snapshot: &[ModeInfo]) -> RestoreReport {
        let missing = snapshot
            .iter()
            .filter(|info| !info.built_in && !self.modes.contains_key(&info.name))
            .map(|info| info.name.clone())
            .collect();
        RestoreReport { missing }
    }
}
