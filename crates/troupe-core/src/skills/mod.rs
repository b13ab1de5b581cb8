//! Skills: directories of Markdown + resources that inject prompt
//! instructions when activated.
//!
//! Discovery is metadata-only (frontmatter); activation loads the body and
//! resource manifest and records the activation in persistable state.

mod loader;
mod manager;
mod prompt;
mod types;

pub use loader::{discover_skills, parse_skill_file};
pub use manager::SkillsManager;
pub use prompt::{available_skills_xml, skill_instructions_xml, xml_escape};
pub use types::{ActivatedBy, ActivatedSkill, Skill, SkillResources, SkillsState};
