//! Skill data model and persisted activation state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Files found under a skill's resource directories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResources {
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub assets: Vec<String>,
}

impl SkillResources {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.references.is_empty() && self.assets.is_empty()
    }
}

/// A skill as known to the manager. `body` and `resources` are only
/// populated once the skill is activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Kebab-case identifier, 1–64 chars.
    pub name: String,
    /// 1–1024 chars.
    pub description: String,
    /// Directory containing `SKILL.md`.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<SkillResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    /// Unix ms when the metadata was discovered.
    pub loaded_at: i64,
    /// Unix ms when the skill was activated, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<i64>,
}

/// Who triggered an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivatedBy {
    Auto,
    Agent,
    User,
}

/// One activation record in the persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedSkill {
    pub name: String,
    pub activated_at: i64,
    pub activated_by: ActivatedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_granted: Option<Vec<String>>,
}

/// Snapshot of the manager, persisted through the state store and carried
/// inside checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsState {
    #[serde(default)]
    pub discovered: Vec<String>,
    #[serde(default)]
    pub activated: Vec<ActivatedSkill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_discovery_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_state_roundtrips_camel_case() {
        let state = SkillsState {
            discovered: vec!["notes".into()],
            activated: vec![ActivatedSkill {
                name: "notes".into(),
                activated_at: 1_700_000_000_000,
                activated_by: ActivatedBy::Agent,
                tools_granted: Some(vec!["read_file".into()]),
            }],
            last_discovery_at: Some(1_700_000_000_000),
        };
        let value = serde_json::to_value(&state).expect("serialize");
        assert!(value.get("lastDiscoveryAt").is_some());
        assert_eq!(value["activated"][0]["activatedBy"], "agent");
        let back: SkillsState = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, state);
    }
}
