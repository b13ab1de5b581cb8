//! Factory registry for tools.
//!
//! Factories are keyed by case-insensitive id. Every instance handed out is
//! wrapped so its descriptor always carries `mutates`/`access` metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::traits::{
    Tool, ToolAttributes, ToolContext, ToolDescriptor, ToolResult, enrich_descriptor,
};
use crate::cancel::CancelToken;
use crate::error::{AgentError, AgentResult};
use crate::model::ToolSpec;

/// Instantiates a tool from optional configuration.
pub type ToolFactory = Arc<dyn Fn(Option<Value>) -> AgentResult<Arc<dyn Tool>> + Send + Sync>;

// ─── Descriptor enricher ───────────────────────────────────────────────────

/// Wrapper that back-fills descriptor metadata from the inner tool's
/// attributes. Everything else delegates.
struct EnrichedTool {
    inner: Arc<dyn Tool>,
}

#[async_trait::async_trait]
impl Tool for EnrichedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn input_schema(&self) -> Value {
        self.inner.input_schema()
    }

    fn attributes(&self) -> ToolAttributes {
        self.inner.attributes()
    }

    async fn execute(
        &self,
        args: Value,
        ctx: &ToolContext,
        cancel: &CancelToken,
    ) -> AgentResult<ToolResult> {
        self.inner.execute(args, ctx, cancel).await
    }

    fn descriptor(&self) -> ToolDescriptor {
        enrich_descriptor(self.inner.descriptor(), &self.inner.attributes())
    }
}

// ─── ToolRegistry ──────────────────────────────────────────────────────────

/// Central id → factory map plus a singleton instance cache.
///
/// `get` lazily instantiates and caches; `create` always builds a fresh
/// instance. Both return enriched tools. The enrichment itself only
/// back-fills unset fields, so enriching an already enriched descriptor is
/// a no-op.
#[derive(Default)]
pub struct ToolRegistry {
    factories: RwLock<HashMap<String, ToolFactory>>,
    instances: Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn wrap(tool: Arc<dyn Tool>) -> Arc<dyn Tool> {
        Arc::new(EnrichedTool { inner: tool })
    }

    /// Register a factory under a case-insensitive id. Overwrites any
    /// previous factory with the same id.
    pub fn register_factory(&self, id: impl Into<String>, factory: ToolFactory) {
        let key = id.into().to_lowercase();
        self.factories.write().insert(key, factory);
    }

    /// Register a pre-built tool as a singleton factory keyed by its name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let id = tool.name().to_string();
        let singleton = tool;
        self.register_factory(id, Arc::new(move |_config| Ok(singleton.clone())));
    }

    /// Instantiate a fresh tool from its factory.
    ///
    /// Fails with `TOOL_NOT_FOUND` for unknown ids.
    pub fn create(&self, id: &str, config: Option<Value>) -> AgentResult<Arc<dyn Tool>> {
        let factory = self
            .factories
            .read()
            .get(&id.to_lowercase())
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound {
                tool: id.to_string(),
            })?;
        Ok(Self::wrap(factory(config)?))
    }

    /// Return the cached instance for `name`, instantiating it on first use.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let key = name.to_lowercase();
        let instances = self.instances.lock();
        if let Some(tool) = instances.get(&key) {
            return Some(tool.clone());
        }
        drop(instances);

        let factory = self.factories.read().get(&key).cloned()?;
        let tool = match factory(None) {
            Ok(tool) => Self::wrap(tool),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool factory failed");
                return None;
            }
        };

        let mut instances = self.instances.lock();
        // A concurrent get may have won the race; keep the cached one.
        Some(instances.entry(key).or_insert(tool).clone())
    }

    /// Registered ids, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Enriched descriptors for every registered tool.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.names()
            .iter()
            .filter_map(|name| self.get(name))
            .map(|tool| tool.descriptor())
            .collect()
    }

    /// Model-facing summaries for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.names()
            .iter()
            .filter_map(|name| self.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::access;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn attributes(&self) -> ToolAttributes {
            ToolAttributes {
                read_only: true,
                ..Default::default()
            }
        }
        async fn execute(
            &self,
            args: Value,
            _ctx: &ToolContext,
            _cancel: &CancelToken,
        ) -> AgentResult<ToolResult> {
            Ok(ToolResult::ok(
                args.get("message").cloned().unwrap_or(Value::Null),
            ))
        }
    }

    struct ConfiguredTool {
        suffix: String,
    }

    #[async_trait::async_trait]
    impl Tool for ConfiguredTool {
        fn name(&self) -> &str {
            "configured"
        }
        fn description(&self) -> &str {
            "returns its configured suffix"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            _args: Value,
            _ctx: &ToolContext,
            _cancel: &CancelToken,
        ) -> AgentResult<ToolResult> {
            Ok(ToolResult::ok(self.suffix.clone()))
        }
    }

    #[test]
    fn create_unknown_id_fails() {
        let registry = ToolRegistry::new();
        let err = registry.create("nope", None).expect_err("must fail");
        assert_eq!(err.error_code(), "TOOL_NOT_FOUND");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("ECHO").is_some());
        assert!(registry.create("Echo", None).is_ok());
    }

    #[test]
    fn get_caches_singletons() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let a = registry.get("echo").expect("present");
        let b = registry.get("echo").expect("present");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn factory_receives_config() {
        let registry = ToolRegistry::new();
        registry.register_factory(
            "configured",
            Arc::new(|config| {
                let suffix = config
                    .and_then(|c| c.get("suffix").and_then(|s| s.as_str().map(String::from)))
                    .unwrap_or_default();
                Ok(Arc::new(ConfiguredTool { suffix }) as Arc<dyn Tool>)
            }),
        );
        let tool = registry
            .create("configured", Some(json!({"suffix": "-v2"})))
            .expect("create");
        assert_eq!(tool.name(), "configured");
    }

    #[test]
    fn returned_tools_carry_enriched_metadata() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let descriptor = registry.get("echo").expect("present").descriptor();
        assert_eq!(descriptor.metadata.mutates, Some(false));
        assert_eq!(descriptor.metadata.access.as_deref(), Some(access::READ));
    }

    #[test]
    fn double_wrapping_does_not_change_descriptor() {
        let tool = ToolRegistry::wrap(Arc::new(EchoTool));
        let once = tool.descriptor();
        let rewrapped = ToolRegistry::wrap(tool);
        assert_eq!(once, rewrapped.descriptor());
    }

    #[test]
    fn descriptors_cover_all_registrations() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register_factory(
            "configured",
            Arc::new(|_| Ok(Arc::new(ConfiguredTool { suffix: "".into() }) as Arc<dyn Tool>)),
        );
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 2);
        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
    }
}
