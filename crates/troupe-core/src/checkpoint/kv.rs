//! Checkpoint store over a remote key-value backend.
//!
//! Two key families: `ckpt:<id>` holds the JSON document, and
//! `ckpt-agent:<agent_id>:<id>` indexes ids per agent for `list`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Checkpoint, CheckpointListItem, Checkpointer, ListQuery, apply_query};
use crate::error::{AgentError, AgentResult};
use crate::store::KvStore;

/// Checkpointer backed by any [`KvStore`] (Redis and friends).
pub struct KvCheckpointer {
    store: Arc<dyn KvStore>,
}

impl KvCheckpointer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn data_key(id: &str) -> String {
        format!("ckpt:{id}")
    }

    fn index_key(agent_id: &str, id: &str) -> String {
        format!("ckpt-agent:{agent_id}:{id}")
    }

    fn index_prefix(agent_id: &str) -> String {
        format!("ckpt-agent:{agent_id}:")
    }
}

#[async_trait]
impl Checkpointer for KvCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> AgentResult<String> {
        let body = serde_json::to_string(checkpoint)
            .map_err(|e| AgentError::checkpoint(format!("encoding checkpoint: {e}")))?;
        self.store.put(&Self::data_key(&checkpoint.id), body).await?;
        self.store
            .put(
                &Self::index_key(&checkpoint.agent_id, &checkpoint.id),
                checkpoint.id.clone(),
            )
            .await?;
        Ok(checkpoint.id.clone())
    }

    async fn load(&self, id: &str) -> AgentResult<Option<Checkpoint>> {
        let Some(raw) = self.store.get(&Self::data_key(id)).await? else {
            return Ok(None);
        };
        let cp = serde_json::from_str(&raw).map_err(|e| AgentError::Checkpoint {
            id: Some(id.to_string()),
            reason: format!("decoding checkpoint: {e}"),
        })?;
        Ok(Some(cp))
    }

    async fn list(
        &self,
        agent_id: &str,
        query: &ListQuery,
    ) -> AgentResult<Vec<CheckpointListItem>> {
        let keys = self.store.scan_prefix(&Self::index_prefix(agent_id)).await?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = self.store.get(&key).await? else {
                continue;
            };
            if let Some(cp) = self.load(&id).await? {
                items.push(cp.list_item());
            }
        }
        Ok(apply_query(items, query))
    }

    async fn delete(&self, id: &str) -> AgentResult<()> {
        // Load first to learn the agent id for the index entry; a missing
        // document means there is nothing to clean up.
        if let Some(cp) = self.load(id).await? {
            self.store.delete(&Self::index_key(&cp.agent_id, id)).await?;
        }
        self.store.delete(&Self::data_key(id)).await?;
        Ok(())
    }
}
