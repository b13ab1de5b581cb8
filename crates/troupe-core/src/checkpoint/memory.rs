//! In-memory checkpoint store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Checkpoint, CheckpointListItem, Checkpointer, ListQuery, apply_query};
use crate::error::AgentResult;

/// Concurrent map of id → checkpoint. Clones on both save and load so no
/// caller ever holds a reference into the store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    checkpoints: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> AgentResult<String> {
        self.checkpoints
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(checkpoint.id.clone())
    }

    async fn load(&self, id: &str) -> AgentResult<Option<Checkpoint>> {
        Ok(self.checkpoints.get(id).map(|entry| entry.value().clone()))
    }

    async fn list(
        &self,
        agent_id: &str,
        query: &ListQuery,
    ) -> AgentResult<Vec<CheckpointListItem>> {
        let items = self
            .checkpoints
            .iter()
            .filter(|entry| entry.value().agent_id == agent_id)
            .map(|entry| entry.value().list_item())
            .collect();
        Ok(apply_query(items, query))
    }

    async fn delete(&self, id: &str) -> AgentResult<()> {
        self.checkpoints.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn checkpoint(agent: &str) -> Checkpoint {
        Checkpoint::new(agent, "s1", vec![Message::user("hi")], 1)
    }

    #[tokio::test]
    async fn save_load_roundtrip_is_defensive() {
        let store = MemoryCheckpointer::new();
        let mut cp = checkpoint("alpha");
        let id = store.save(&cp).await.expect("save");

        // Mutating the caller's copy must not reach the store.
        cp.messages.push(Message::user("mutated"));
        let loaded = store.load(&id).await.expect("load").expect("present");
        assert_eq!(loaded.messages.len(), 1);

        // Nor can mutations through a loaded clone.
        let mut loaded2 = store.load(&id).await.expect("load").expect("present");
        loaded2.step_count = 99;
        let reloaded = store.load(&id).await.expect("load").expect("present");
        assert_eq!(reloaded.step_count, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryCheckpointer::new();
        let id = store.save(&checkpoint("alpha")).await.expect("save");
        store.delete(&id).await.expect("delete");
        store.delete(&id).await.expect("second delete succeeds");
        store.delete("never-existed").await.expect("missing id ok");
    }

    #[tokio::test]
    async fn fork_creates_independent_snapshot() {
        let store = MemoryCheckpointer::new();
        let source = checkpoint("alpha");
        let source_id = store.save(&source).await.expect("save");

        let forked_id = store.fork(&source_id, "beta").await.expect("fork");
        assert!(forked_id.starts_with("beta:"));

        let forked = store.load(&forked_id).await.expect("load").expect("present");
        assert_eq!(forked.agent_id, "beta");
        assert_eq!(
            forked.metadata.parent_checkpoint_id.as_deref(),
            Some(source_id.as_str())
        );
        assert!(forked.metadata.is_fork_point);
        assert_eq!(forked.messages, source.messages);

        // Source untouched by the fork.
        let original = store.load(&source_id).await.expect("load").expect("present");
        assert!(!original.metadata.is_fork_point);
    }

    #[tokio::test]
    async fn fork_missing_checkpoint_fails() {
        let store = MemoryCheckpointer::new();
        let err = store.fork("ghost", "beta").await.expect_err("missing");
        assert_eq!(err.error_code(), "CHECKPOINT_ERROR");
    }

    #[tokio::test]
    async fn list_filters_by_agent() {
        let store = MemoryCheckpointer::new();
        store.save(&checkpoint("alpha")).await.expect("save");
        store.save(&checkpoint("beta")).await.expect("save");

        let items = store.list("alpha", &ListQuery::default()).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].agent_id, "alpha");
    }
}
