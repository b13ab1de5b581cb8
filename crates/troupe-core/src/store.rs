//! Abstract persistence contracts.
//!
//! [`StateStore`] persists opaque agent state documents (conversation state,
//! skills state); [`KvStore`] backs the remote-KV checkpoint backend. Both
//! ship in-memory reference implementations used by the pool's resume path
//! and by tests; file/Redis backends are external collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::AgentResult;

// ─── StateStore ────────────────────────────────────────────────────────────

/// Keyed JSON document store.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn exists(&self, id: &str) -> AgentResult<bool>;

    async fn save(&self, id: &str, state: Value) -> AgentResult<()>;

    async fn load(&self, id: &str) -> AgentResult<Option<Value>>;

    async fn list(&self) -> AgentResult<Vec<String>>;

    async fn delete(&self, id: &str) -> AgentResult<()>;
}

/// Concurrent in-memory [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Value>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn exists(&self, id: &str) -> AgentResult<bool> {
        Ok(self.entries.contains_key(id))
    }

    async fn save(&self, id: &str, state: Value) -> AgentResult<()> {
        self.entries.insert(id.to_string(), state);
        Ok(())
    }

    async fn load(&self, id: &str) -> AgentResult<Option<Value>> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    async fn list(&self) -> AgentResult<Vec<String>> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> AgentResult<()> {
        self.entries.remove(id);
        Ok(())
    }
}

// ─── KvStore ───────────────────────────────────────────────────────────────

/// Minimal key-value contract for remote checkpoint backends (Redis and
/// friends).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> AgentResult<Option<String>>;

    async fn put(&self, key: &str, value: String) -> AgentResult<()>;

    async fn delete(&self, key: &str) -> AgentResult<()>;

    /// All keys starting with `prefix`, in unspecified order.
    async fn scan_prefix(&self, prefix: &str) -> AgentResult<Vec<String>>;
}

/// Concurrent in-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, String>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> AgentResult<Option<String>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> AgentResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AgentResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> AgentResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }
}
