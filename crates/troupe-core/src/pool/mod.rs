//! Agent pool: registry of live agents by id, capacity-bounded.
//!
//! The pool owns agent handles; removing an agent disposes it, disposing
//! the pool disposes every agent. Create/resume races resolve by "loser
//! disposes": the instance that lost the insert race is discarded and the
//! surviving entry returned.

mod room;

pub use room::{Room, RoomMessage};

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::agent::{Agent, AgentBuilder};
use crate::checkpoint::{Checkpointer, ListQuery};
use crate::config::{AgentConfig, PoolConfig};
use crate::error::{AgentError, AgentResult};
use crate::model::ModelProvider;
use crate::permissions::PermissionEngine;
use crate::store::StateStore;
use crate::tools::ToolRegistry;
use crate::types::{AgentStatus, unix_ms};

/// Shared collaborators handed to every pool-created agent.
#[derive(Clone)]
pub struct PoolDependencies {
    pub model: Arc<dyn ModelProvider>,
    pub registry: Arc<ToolRegistry>,
    pub permissions: Arc<PermissionEngine>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub store: Option<Arc<dyn StateStore>>,
}

impl PoolDependencies {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            registry: Arc::new(ToolRegistry::new()),
            permissions: Arc::new(PermissionEngine::new()),
            checkpointer: None,
            store: None,
        }
    }
}

/// Hosts many agents, keyed by id.
pub struct AgentPool {
    agents: DashMap<String, Arc<Agent>>,
    deps: PoolDependencies,
    config: PoolConfig,
}

impl AgentPool {
    pub fn new(deps: PoolDependencies, config: PoolConfig) -> Self {
        Self {
            agents: DashMap::new(),
            deps,
            config,
        }
    }

    fn build_agent(&self, id: &str, mut config: AgentConfig) -> AgentResult<Agent> {
        config.agent_id = Some(id.to_string());
        let mut builder = AgentBuilder::new()
            .with_config(config)
            .with_model(self.deps.model.clone())
            .with_registry(self.deps.registry.clone())
            .with_permissions(self.deps.permissions.clone());
        if let Some(checkpointer) = &self.deps.checkpointer {
            builder = builder.with_checkpointer(checkpointer.clone());
        }
        if let Some(store) = &self.deps.store {
            builder = builder.with_store(store.clone());
        }
        builder.build()
    }

    fn insert(&self, id: &str, agent: Arc<Agent>) -> AgentResult<Arc<Agent>> {
        if self.agents.len() >= self.config.max_agents {
            return Err(AgentError::invalid_state(format!(
                "agent pool is full ({} agents)",
                self.config.max_agents
            )));
        }
        match self.agents.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AgentError::invalid_state(format!(
                "agent '{id}' already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(agent.clone());
                Ok(agent)
            }
        }
    }

    /// Create and register a fresh agent. Rejects duplicates and a full
    /// pool.
    pub fn create(&self, id: &str, config: AgentConfig) -> AgentResult<Arc<Agent>> {
        let agent = Arc::new(self.build_agent(id, config)?);
        self.insert(id, agent)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).map(|entry| entry.value().clone())
    }

    /// Ids currently in the pool, optionally filtered by prefix, sorted.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| prefix.is_none_or(|p| id.starts_with(p)))
            .collect();
        ids.sort();
        ids
    }

    pub fn status(&self, id: &str) -> AgentResult<AgentStatus> {
        self.get(id)
            .map(|agent| agent.status())
            .ok_or_else(|| AgentError::invalid_state(format!("agent '{id}' not in pool")))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Return the live agent, or resurrect it from its latest checkpoint.
    /// A racing resume deduplicates by returning the existing entry; the
    /// losing instance is disposed.
    pub async fn resume(&self, id: &str, config: AgentConfig) -> AgentResult<Arc<Agent>> {
        if let Some(agent) = self.get(id) {
            return Ok(agent);
        }
        let checkpointer = self.deps.checkpointer.as_ref().ok_or_else(|| {
            AgentError::invalid_state("pool has no checkpointer to resume from")
        })?;

        let latest = checkpointer
            .list(
                id,
                &ListQuery {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::invalid_state(format!("no checkpoint for agent '{id}'")))?;
        let checkpoint = checkpointer
            .load(&latest.id)
            .await?
            .ok_or_else(|| AgentError::Checkpoint {
                id: Some(latest.id.clone()),
                reason: "checkpoint listed but not loadable".into(),
            })?;

        let mut restored_config = config;
        restored_config.agent_id = Some(id.to_string());
        let mut builder = AgentBuilder::new()
            .with_config(restored_config)
            .with_model(self.deps.model.clone())
            .with_registry(self.deps.registry.clone())
            .with_permissions(self.deps.permissions.clone())
            .with_checkpointer(checkpointer.clone())
            .restore_from(checkpoint);
        if let Some(store) = &self.deps.store {
            builder = builder.with_store(store.clone());
        }
        let agent = Arc::new(builder.build()?);

        match self.insert(id, agent.clone()) {
            Ok(agent) => Ok(agent),
            Err(_) => match self.get(id) {
                // Lost the race: keep the winner, drop ours.
                Some(existing) => {
                    let _ = agent.dispose().await;
                    Ok(existing)
                }
                None => Err(AgentError::invalid_state(format!(
                    "agent '{id}' could not be registered"
                ))),
            },
        }
    }

    /// Resume every agent the state store knows about. `factory` supplies
    /// the config per agent id; agents without checkpoints are skipped.
    pub async fn resume_all<F>(&self, factory: F) -> AgentResult<Vec<Arc<Agent>>>
    where
        F: Fn(&str) -> AgentConfig,
    {
        let Some(store) = &self.deps.store else {
            return Ok(Vec::new());
        };
        let mut resumed = Vec::new();
        for key in store.list().await? {
            let Some(id) = key.strip_prefix("agent:") else {
                continue;
            };
            match self.resume(id, factory(id)).await {
                Ok(agent) => resumed.push(agent),
                Err(e) => {
                    tracing::warn!(agent_id = id, error = %e, "resume skipped");
                }
            }
        }
        Ok(resumed)
    }

    /// Fork a live agent under a new id (auto-generated when omitted).
    pub async fn fork(&self, id: &str, new_id: Option<&str>) -> AgentResult<Arc<Agent>> {
        let source = self
            .get(id)
            .ok_or_else(|| AgentError::invalid_state(format!("agent '{id}' not in pool")))?;
        let generated;
        let new_id = match new_id {
            Some(new_id) => new_id,
            None => {
                generated = format!("{id}-fork-{}", unix_ms());
                &generated
            }
        };
        let forked = Arc::new(source.fork(new_id).await?);
        self.insert(new_id, forked)
    }

    /// Remove the agent and delete its persisted state.
    pub async fn delete(&self, id: &str) -> AgentResult<()> {
        self.remove(id).await;
        if let Some(store) = &self.deps.store {
            store.delete(&format!("agent:{id}")).await?;
        }
        Ok(())
    }

    /// Remove the agent from the pool and dispose it. Persisted state is
    /// left alone.
    pub async fn remove(&self, id: &str) -> bool {
        match self.agents.remove(id) {
            Some((_, agent)) => {
                let _ = agent.dispose().await;
                true
            }
            None => false,
        }
    }

    /// Dispose every agent and empty the pool.
    pub async fn dispose(&self) {
        let ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id).await;
        }
    }
}

#[cfg(test)]
mod tests;
