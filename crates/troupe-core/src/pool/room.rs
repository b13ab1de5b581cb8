//! Collaboration room: routes mentioned or broadcast messages between
//! pool-managed agents.
//!
//! Membership is by id only — the room never holds agent handles, so it
//! does not prolong agent life. A message to a member whose agent has left
//! the pool is silently skipped.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::AgentPool;
use crate::cancel::CancelToken;
use crate::error::{AgentError, AgentResult};
use crate::types::unix_ms;

#[allow(clippy::expect_used)]
static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").expect("static regex"));

/// One entry in the room history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub from: String,
    pub text: String,
    pub mentions: Vec<String>,
    /// Unix ms.
    pub timestamp: i64,
}

/// Routes `@mention` and broadcast messages among named members.
pub struct Room {
    pool: Arc<AgentPool>,
    members: DashMap<String, String>,
    history: Mutex<Vec<RoomMessage>>,
}

impl Room {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        Self {
            pool,
            members: DashMap::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Register `name` as pointing at `agent_id`. Overwrites an existing
    /// membership of the same name.
    pub fn join(&self, name: impl Into<String>, agent_id: impl Into<String>) {
        self.members.insert(name.into(), agent_id.into());
    }

    pub fn leave(&self, name: &str) -> bool {
        self.members.remove(name).is_some()
    }

    /// Member names, sorted.
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn history(&self) -> Vec<RoomMessage> {
        self.history.lock().clone()
    }

    fn extract_mentions(text: &str) -> Vec<String> {
        let mut mentions = Vec::new();
        for capture in MENTION.captures_iter(text) {
            let name = capture[1].to_string();
            if !mentions.contains(&name) {
                mentions.push(name);
            }
        }
        mentions
    }

    /// Route a message. Mentions go directed to each mentioned member;
    /// without mentions the message broadcasts to every member except the
    /// sender, concurrently. History is appended before dispatch.
    #[tracing::instrument(name = "room.say", skip_all, fields(from = %from))]
    pub async fn say(&self, from: &str, text: &str, cancel: &CancelToken) -> AgentResult<()> {
        let mentions = Self::extract_mentions(text);
        self.history.lock().push(RoomMessage {
            from: from.to_string(),
            text: text.to_string(),
            mentions: mentions.clone(),
            timestamp: unix_ms(),
        });

        let recipients: Vec<(String, String)> = if mentions.is_empty() {
            self.members
                .iter()
                .filter(|entry| entry.key() != from)
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        } else {
            mentions
                .iter()
                .filter_map(|name| {
                    self.members
                        .get(name)
                        .map(|entry| (name.clone(), entry.value().clone()))
                })
                .collect()
        };

        let formatted = format!("[from:{from}] {text}");
        let deliveries = recipients.iter().map(|(name, agent_id)| {
            let formatted = formatted.clone();
            async move {
                match self.pool.get(agent_id) {
                    Some(agent) => {
                        if let Err(e) = agent.run(Some(&formatted), cancel).await {
                            tracing::warn!(member = %name, error = %e, "room delivery failed");
                        }
                    }
                    None => {
                        tracing::debug!(member = %name, agent_id = %agent_id, "member agent gone, skipping");
                    }
                }
            }
        });
        futures::future::join_all(deliveries).await;
        Ok(())
    }

    /// Send to exactly one member. Unknown members fail.
    #[tracing::instrument(name = "room.whisper", skip_all, fields(from = %from, to = %to))]
    pub async fn whisper(
        &self,
        from: &str,
        to: &str,
        text: &str,
        cancel: &CancelToken,
    ) -> AgentResult<()> {
        let agent_id = self
            .members
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::RoomMemberNotFound {
                member: to.to_string(),
            })?;

        self.history.lock().push(RoomMessage {
            from: from.to_string(),
            text: text.to_string(),
            mentions: vec![to.to_string()],
            timestamp: unix_ms(),
        });

        let formatted = format!("[whisper from:{from}] {text}");
        if let Some(agent) = self.pool.get(&agent_id) {
            agent.run(Some(&formatted), cancel).await?;
        } else {
            tracing::debug!(member = %to, agent_id = %agent_id, "member agent gone, skipping");
        }
        Ok(())
    }
}
