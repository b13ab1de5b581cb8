//! Checkpoint + fork subsystem.
//!
//! A checkpoint is an immutable snapshot of an agent — conversation,
//! step counter, activated skills — suitable for resume or fork. Backends
//! MUST clone on both save and load so retained references can never
//! mutate stored state.

mod file;
mod kv;
mod memory;

pub use file::FileCheckpointer;
pub use kv::KvCheckpointer;
pub use memory::MemoryCheckpointer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::skills::SkillsState;
use crate::types::{Message, unix_ms};

// ─── Types ─────────────────────────────────────────────────────────────────

/// Lineage and labelling attached to a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint_id: Option<String>,
    #[serde(default)]
    pub is_fork_point: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Immutable snapshot of one agent at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub messages: Vec<Message>,
    pub step_count: u64,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_state: Option<SkillsState>,
}

impl Checkpoint {
    /// Fresh snapshot with a generated `"<agent_id>:<unix_ms>"` id.
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        messages: Vec<Message>,
        step_count: u64,
    ) -> Self {
        let agent_id = agent_id.into();
        let timestamp = unix_ms();
        Self {
            id: format!("{agent_id}:{timestamp}"),
            agent_id,
            session_id: session_id.into(),
            timestamp,
            messages,
            step_count,
            metadata: CheckpointMetadata::default(),
            skills_state: None,
        }
    }

    /// Derive the forked snapshot: new identity, same content, lineage
    /// recorded. The source is left untouched.
    pub fn fork_as(&self, new_agent_id: &str, separator: char) -> Self {
        let timestamp = unix_ms();
        let mut forked = self.clone();
        forked.id = format!("{new_agent_id}{separator}{timestamp}");
        forked.agent_id = new_agent_id.to_string();
        forked.timestamp = timestamp;
        forked.metadata.parent_checkpoint_id = Some(self.id.clone());
        forked.metadata.is_fork_point = true;
        forked
    }

    pub fn list_item(&self) -> CheckpointListItem {
        CheckpointListItem {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            session_id: self.session_id.clone(),
            timestamp: self.timestamp,
            is_fork_point: self.metadata.is_fork_point,
            tags: self.metadata.tags.clone(),
        }
    }
}

/// Summary row returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointListItem {
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
    pub timestamp: i64,
    pub is_fork_point: bool,
    pub tags: Vec<String>,
}

/// Filters and paging for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub session_id: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Apply session filter, timestamp-descending order and paging.
pub(crate) fn apply_query(
    mut items: Vec<CheckpointListItem>,
    query: &ListQuery,
) -> Vec<CheckpointListItem> {
    if let Some(session_id) = &query.session_id {
        items.retain(|item| &item.session_id == session_id);
    }
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    let offset = query.offset.unwrap_or(0);
    let items: Vec<CheckpointListItem> = items.into_iter().skip(offset).collect();
    match query.limit {
        Some(limit) => items.into_iter().take(limit).collect(),
        None => items,
    }
}

// ─── Contract ──────────────────────────────────────────────────────────────

/// Save/load/list/delete/fork over immutable agent snapshots.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Atomically persist the snapshot; returns `checkpoint.id`.
    async fn save(&self, checkpoint: &Checkpoint) -> AgentResult<String>;

    /// Defensive clone, sharing no state with the store.
    async fn load(&self, id: &str) -> AgentResult<Option<Checkpoint>>;

    /// Summaries for one agent, ordered by timestamp descending.
    async fn list(
        &self,
        agent_id: &str,
        query: &ListQuery,
    ) -> AgentResult<Vec<CheckpointListItem>>;

    /// Idempotent: deleting a missing id succeeds.
    async fn delete(&self, id: &str) -> AgentResult<()>;

    /// Separator between agent id and timestamp in fork ids. File layouts
    /// override this because `:` is not filename-safe everywhere.
    fn fork_id_separator(&self) -> char {
        ':'
    }

    /// Load, rewrite identity/lineage, save. The source stays untouched.
    async fn fork(&self, id: &str, new_agent_id: &str) -> AgentResult<String> {
        let source = self.load(id).await?.ok_or_else(|| AgentError::Checkpoint {
            id: Some(id.to_string()),
            reason: "checkpoint not found".into(),
        })?;
        let forked = source.fork_as(new_agent_id, self.fork_id_separator());
        self.save(&forked).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(agent: &str, session: &str, ts: i64) -> CheckpointListItem {
        CheckpointListItem {
            id: format!("{agent}:{ts}"),
            agent_id: agent.into(),
            session_id: session.into(),
            timestamp: ts,
            is_fork_point: false,
            tags: vec![],
        }
    }

    #[test]
    fn fork_rewrites_identity_and_lineage() {
        let source = Checkpoint::new("alpha", "s1", vec![Message::user("x")], 4);
        let forked = source.fork_as("beta", ':');

        assert_eq!(forked.agent_id, "beta");
        assert!(forked.id.starts_with("beta:"));
        assert_eq!(forked.metadata.parent_checkpoint_id.as_deref(), Some(source.id.as_str()));
        assert!(forked.metadata.is_fork_point);
        assert_eq!(forked.messages, source.messages);
        assert_eq!(forked.step_count, source.step_count);
        // Source untouched.
        assert!(!source.metadata.is_fork_point);
        assert!(source.metadata.parent_checkpoint_id.is_none());
    }

    #[test]
    fn query_orders_newest_first_with_paging() {
        let items = vec![
            sample("a", "s1", 10),
            sample("a", "s1", 30),
            sample("a", "s2", 20),
        ];
        let all = apply_query(items.clone(), &ListQuery::default());
        assert_eq!(all[0].timestamp, 30);
        assert_eq!(all[2].timestamp, 10);

        let filtered = apply_query(
            items.clone(),
            &ListQuery {
                session_id: Some("s1".into()),
                ..Default::default()
            },
        );
        assert_eq!(filtered.len(), 2);

        let paged = apply_query(
            items,
            &ListQuery {
                offset: Some(1),
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].timestamp, 20);
    }

    #[test]
    fn checkpoint_serializes_camel_case() {
        let cp = Checkpoint::new("alpha", "s1", vec![], 0);
        let value = serde_json::to_value(&cp).expect("serialize");
        assert!(value.get("agentId").is_some());
        assert!(value.get("stepCount").is_some());
        assert!(value["metadata"].get("isForkPoint").is_some());
    }
}
