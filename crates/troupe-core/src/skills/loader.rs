//! Skill discovery: walk search paths, parse `SKILL.md` frontmatter.
//!
//! Discovery is metadata-only; bodies and resources load on activation.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::types::Skill;
use crate::config::SkillsConfig;
use crate::error::{AgentError, AgentResult};
use crate::types::unix_ms;

#[allow(clippy::expect_used)]
static KEBAB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("static regex"));

/// `allowed_tools` accepts either a YAML list or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedTools {
    List(Vec<String>),
    Csv(String),
}

impl AllowedTools {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Csv(raw) => raw
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: String,
    description: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    compatibility: Option<String>,
    #[serde(default)]
    allowed_tools: Option<AllowedTools>,
}

/// Split a `SKILL.md` document into frontmatter and body.
fn split_front_matter(content: &str) -> AgentResult<(&str, &str)> {
    let content = content.trim_start();
    let Some(rest) = content.strip_prefix("---") else {
        return Err(AgentError::invalid_state(
            "skill file must start with YAML frontmatter (---)",
        ));
    };
    let Some(end) = rest.find("\n---") else {
        return Err(AgentError::invalid_state(
            "missing closing --- for YAML frontmatter",
        ));
    };
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['\r', '\n']);
    Ok((yaml, body))
}

/// Parse one `SKILL.md` document into skill metadata plus its body.
///
/// When `validate` is set the name must be kebab-case (1–64 chars) and the
/// description non-empty (≤ 1024 chars).
pub fn parse_skill_file(
    content: &str,
    dir: &Path,
    validate: bool,
) -> AgentResult<(Skill, String)> {
    let (yaml, body) = split_front_matter(content)?;
    let frontmatter: SkillFrontmatter = serde_yaml::from_str(yaml)
        .map_err(|e| AgentError::invalid_state(format!("invalid skill frontmatter: {e}")))?;

    if validate {
        if frontmatter.name.len() > 64 || !KEBAB_NAME.is_match(&frontmatter.name) {
            return Err(AgentError::invalid_state(format!(
                "skill name '{}' is not kebab-case (1-64 chars)",
                frontmatter.name
            )));
        }
        if frontmatter.description.is_empty() || frontmatter.description.len() > 1024 {
            return Err(AgentError::invalid_state(format!(
                "skill '{}' description must be 1-1024 chars",
                frontmatter.name
            )));
        }
    }

    let skill = Skill {
        name: frontmatter.name,
        description: frontmatter.description,
        path: dir.to_path_buf(),
        body: None,
        resources: None,
        allowed_tools: frontmatter.allowed_tools.map(AllowedTools::into_vec),
        license: frontmatter.license,
        compatibility: frontmatter.compatibility,
        loaded_at: unix_ms(),
        activated_at: None,
    };
    Ok((skill, body.to_string()))
}

fn name_passes_filters(name: &str, config: &SkillsConfig) -> bool {
    if let Some(include) = &config.include
        && !include.iter().any(|i| i == name)
    {
        return false;
    }
    if let Some(exclude) = &config.exclude
        && exclude.iter().any(|e| e == name)
    {
        return false;
    }
    true
}

/// Walk the configured search paths; any directory containing a `SKILL.md`
/// is a skill. Unparseable skills are logged and skipped.
pub async fn discover_skills(config: &SkillsConfig) -> AgentResult<Vec<Skill>> {
    let mut skills = Vec::new();
    for root in &config.paths {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(path = %root.display(), error = %e, "skill path not readable");
                continue;
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentError::invalid_state(format!("reading skill directory: {e}")))?
        {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let manifest = dir.join("SKILL.md");
            let Ok(content) = tokio::fs::read_to_string(&manifest).await else {
                continue;
            };
            match parse_skill_file(&content, &dir, config.validate_on_load) {
                Ok((skill, _body)) if name_passes_filters(&skill.name, config) => {
                    skills.push(skill);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %manifest.display(), error = %e, "skipping unparseable skill");
                }
            }
        }
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(skills)
}
