//! Skills manager: discovery, activation, prompt injection and persisted
//! activation state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::loader::discover_skills;
use super::prompt::{available_skills_xml, skill_instructions_xml};
use super::types::{ActivatedBy, ActivatedSkill, Skill, SkillResources, SkillsState};
use crate::config::SkillsConfig;
use crate::error::{AgentError, AgentResult};
use crate::store::StateStore;
use crate::types::unix_ms;

/// Owns the discovered skill set and the activation records for one agent.
pub struct SkillsManager {
    config: SkillsConfig,
    skills: RwLock<HashMap<String, Skill>>,
    state: RwLock<SkillsState>,
    state_store: Option<Arc<dyn StateStore>>,
    state_key: String,
}

impl SkillsManager {
    pub fn new(config: SkillsConfig) -> Self {
        Self {
            config,
            skills: RwLock::new(HashMap::new()),
            state: RwLock::new(SkillsState::default()),
            state_store: None,
            state_key: "skills".to_string(),
        }
    }

    /// Persist activation state through `store` under `key`.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>, key: impl Into<String>) -> Self {
        self.state_store = Some(store);
        self.state_key = key.into();
        self
    }

    /// Walk the configured paths and refresh the skill table. Metadata only;
    /// bodies load on activation.
    pub async fn discover(&self) -> AgentResult<Vec<Skill>> {
        let discovered = discover_skills(&self.config).await?;

        let mut skills = self.skills.write();
        let mut state = self.state.write();
        state.discovered = discovered.iter().map(|s| s.name.clone()).collect();
        state.last_discovery_at = Some(unix_ms());
        for skill in &discovered {
            // Keep activation info for skills that were already activated.
            let entry = skills.entry(skill.name.clone()).or_insert_with(|| skill.clone());
            entry.description = skill.description.clone();
            entry.path = skill.path.clone();
            entry.loaded_at = skill.loaded_at;
        }
        Ok(discovered)
    }

    /// Load body + resources, record the activation, and return the skill.
    pub async fn activate(&self, name: &str, by: ActivatedBy) -> AgentResult<Skill> {
        let skill = self
            .skills
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::invalid_state(format!("skill '{name}' not discovered")))?;

        let manifest = skill.path.join("SKILL.md");
        let content = tokio::fs::read_to_string(&manifest)
            .await
            .map_err(|e| AgentError::invalid_state(format!("loading skill '{name}': {e}")))?;
        let (_, body) =
            super::loader::parse_skill_file(&content, &skill.path, self.config.validate_on_load)?;

        let resources = SkillResources {
            scripts: list_dir(&skill.path.join("scripts")).await,
            references: list_dir(&skill.path.join("references")).await,
            assets: list_dir(&skill.path.join("assets")).await,
        };

        let activated_at = unix_ms();
        let tools_granted = if self.config.trusted {
            skill.allowed_tools.clone()
        } else {
            None
        };

        let activated = {
            let mut skills = self.skills.write();
            let entry = skills
                .get_mut(name)
                .ok_or_else(|| AgentError::invalid_state(format!("skill '{name}' disappeared")))?;
            entry.body = Some(body);
            entry.resources = Some(resources);
            entry.activated_at = Some(activated_at);
            entry.clone()
        };

        {
            let mut state = self.state.write();
            state.activated.retain(|a| a.name != name);
            state.activated.push(ActivatedSkill {
                name: name.to_string(),
                activated_at,
                activated_by: by,
                tools_granted,
            });
        }
        self.persist_state().await?;

        tracing::info!(skill = name, "skill activated");
        Ok(activated)
    }

    /// Read a file belonging to `skill`, resolved against its directory.
    /// Paths containing `..` are rejected; failures return `None`.
    pub async fn load_resource(&self, skill: &str, relative: &str) -> Option<String> {
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            tracing::warn!(skill, path = relative, "rejected path traversal in skill resource");
            return None;
        }
        let dir = self.skills.read().get(skill)?.path.clone();
        tokio::fs::read_to_string(dir.join(relative)).await.ok()
    }

    pub fn get(&self, name: &str) -> Option<Skill> {
        self.skills.read().get(name).cloned()
    }

    /// Discovered skills, sorted by name.
    pub fn list(&self) -> Vec<Skill> {
        let mut skills: Vec<Skill> = self.skills.read().values().cloned().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// `<available_skills>` fragment for the system prompt.
    pub fn available_skills_prompt(&self) -> Option<String> {
        available_skills_xml(&self.list())
    }

    /// `<skill_instructions>` reminder fragment for an activated skill.
    pub fn instructions_for(&self, name: &str) -> Option<String> {
        let skill = self.get(name)?;
        skill.activated_at?;
        Some(skill_instructions_xml(&skill))
    }

    pub fn state(&self) -> SkillsState {
        self.state.read().clone()
    }

    /// Adopt a previously persisted state (checkpoint resume path).
    pub fn restore_state(&self, state: SkillsState) {
        *self.state.write() = state;
    }

    /// Write the activation state through the store, when one is attached.
    pub async fn persist_state(&self) -> AgentResult<()> {
        let Some(store) = &self.state_store else {
            return Ok(());
        };
        let state = self.state.read().clone();
        let value = serde_json::to_value(&state)
            .map_err(|e| AgentError::invalid_state(format!("encoding skills state: {e}")))?;
        store.save(&self.state_key, value).await
    }
}

async fn list_dir(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    async fn manager_with_skill(trusted: bool) -> (tempfile::TempDir, SkillsManager) {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("meeting-notes");
        std::fs::create_dir_all(dir.join("scripts")).expect("mkdir");
        std::fs::create_dir_all(dir.join("references")).expect("mkdir");
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: meeting-notes\ndescription: takes notes\nallowed_tools: read_file\n---\nWrite everything down.",
        )
        .expect("write");
        std::fs::write(dir.join("scripts").join("fmt.sh"), "#!/bin/sh\n").expect("write");
        std::fs::write(dir.join("references").join("style.md"), "# style\n").expect("write");

        let manager = SkillsManager::new(SkillsConfig {
            paths: vec![root.path().to_path_buf()],
            trusted,
            ..Default::default()
        });
        manager.discover().await.expect("discover");
        (root, manager)
    }

    #[tokio::test]
    async fn discovery_populates_state() {
        let (_root, manager) = manager_with_skill(false).await;
        let state = manager.state();
        assert_eq!(state.discovered, vec!["meeting-notes".to_string()]);
        assert!(state.last_discovery_at.is_some());
        assert!(state.activated.is_empty());

        let skill = manager.get("meeting-notes").expect("discovered");
        assert!(skill.body.is_none(), "discovery is metadata-only");
    }

    #[tokio::test]
    async fn activation_loads_body_and_resources() {
        let (_root, manager) = manager_with_skill(false).await;
        let skill = manager
            .activate("meeting-notes", ActivatedBy::Agent)
            .await
            .expect("activate");

        assert_eq!(skill.body.as_deref(), Some("Write everything down."));
        let resources = skill.resources.expect("resources");
        assert_eq!(resources.scripts, vec!["fmt.sh".to_string()]);
        assert_eq!(resources.references, vec!["style.md".to_string()]);
        assert!(skill.activated_at.is_some());

        let state = manager.state();
        assert_eq!(state.activated.len(), 1);
        assert_eq!(state.activated[0].activated_by, ActivatedBy::Agent);
        assert!(state.activated[0].tools_granted.is_none(), "untrusted");
    }

    #[tokio::test]
    async fn trusted_activation_grants_tools() {
        let (_root, manager) = manager_with_skill(true).await;
        manager
            .activate("meeting-notes", ActivatedBy::User)
            .await
            .expect("activate");
        let state = manager.state();
        assert_eq!(
            state.activated[0].tools_granted,
            Some(vec!["read_file".to_string()])
        );
    }

    #[tokio::test]
    async fn activation_of_unknown_skill_fails() {
        let (_root, manager) = manager_with_skill(false).await;
        let err = manager
            .activate("ghost", ActivatedBy::Auto)
            .await
            .expect_err("unknown skill");
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn resource_loading_guards_against_traversal() {
        let (_root, manager) = manager_with_skill(false).await;
        assert!(
            manager
                .load_resource("meeting-notes", "scripts/fmt.sh")
                .await
                .is_some()
        );
        assert!(
            manager
                .load_resource("meeting-notes", "../meeting-notes/SKILL.md")
                .await
                .is_none(),
            "parent components are rejected"
        );
        assert!(
            manager
                .load_resource("meeting-notes", "scripts/../../../etc/passwd")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn prompt_fragments_reflect_activation() {
        let (_root, manager) = manager_with_skill(false).await;
        let available = manager.available_skills_prompt().expect("fragment");
        assert!(available.contains("<name>meeting-notes</name>"));

        assert!(
            manager.instructions_for("meeting-notes").is_none(),
            "no instructions before activation"
        );
        manager
            .activate("meeting-notes", ActivatedBy::Auto)
            .await
            .expect("activate");
        let instructions = manager.instructions_for("meeting-notes").expect("fragment");
        assert!(instructions.contains("Write everything down."));
        assert!(instructions.contains("- scripts/fmt.sh"));
    }

    #[tokio::test]
    async fn activation_persists_state_through_store() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("tidy-up");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: tidy-up\ndescription: cleans\n---\nbody",
        )
        .expect("write");

        let store = Arc::new(MemoryStateStore::new());
        let manager = SkillsManager::new(SkillsConfig {
            paths: vec![root.path().to_path_buf()],
            ..Default::default()
        })
        .with_state_store(store.clone(), "skills:agent-1");
        manager.discover().await.expect("discover");
        manager.activate("tidy-up", ActivatedBy::Auto).await.expect("activate");

        let persisted = store
            .load("skills:agent-1")
            .await
            .expect("load")
            .expect("saved");
        assert_eq!(persisted["activated"][0]["name"], "tidy-up");
    }
}
