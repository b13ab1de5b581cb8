//! Prompt XML fragments for skills.

use super::types::Skill;

/// Standard XML escaping for `& < > " '`.
pub fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `<available_skills>` fragment appended to the system prompt: one
/// `<skill>` element per discovered skill.
pub fn available_skills_xml(skills: &[Skill]) -> Option<String> {
    if skills.is_empty() {
        return None;
    }
    let mut xml = String::from("<available_skills>\n");
    for skill in skills {
        xml.push_str("  <skill>\n");
        xml.push_str(&format!("    <name>{}</name>\n", xml_escape(&skill.name)));
        xml.push_str(&format!(
            "    <description>{}</description>\n",
            xml_escape(&skill.description)
        ));
        let location = skill.path.to_string_lossy();
        if !location.is_empty() {
            xml.push_str(&format!(
                "    <location>{}</location>\n",
                xml_escape(&location)
            ));
        }
        xml.push_str("  </skill>\n");
    }
    xml.push_str("</available_skills>");
    Some(xml)
}

/// `<skill_instructions>` fragment emitted as a reminder after activation:
/// the body plus a resource manifest.
pub fn skill_instructions_xml(skill: &Skill) -> String {
    let mut xml = format!("<skill_instructions name=\"{}\">\n", xml_escape(&skill.name));
    if let Some(body) = &skill.body {
        xml.push_str(&xml_escape(body));
        xml.push('\n');
    }
    if let Some(resources) = &skill.resources
        && !resources.is_empty()
    {
        xml.push_str("Resources:\n");
        for (dir, files) in [
            ("scripts", &resources.scripts),
            ("references", &resources.references),
            ("assets", &resources.assets),
        ] {
            for file in files {
                xml.push_str(&format!("- {dir}/{}\n", xml_escape(file)));
            }
        }
    }
    xml.push_str("</skill_instructions>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::types::SkillResources;
    use std::path::PathBuf;

    fn skill(name: &str, description: &str) -> Skill {
        Skill {
            name: name.into(),
            description: description.into(),
            path: PathBuf::from(format!("/skills/{name}")),
            body: None,
            resources: None,
            allowed_tools: None,
            license: None,
            compatibility: None,
            loaded_at: 0,
            activated_at: None,
        }
    }

    #[test]
    fn escape_covers_all_five() {
        assert_eq!(
            xml_escape(r#"<a & "b" 'c'>"#),
            "&lt;a &amp; &quot;b&quot; &apos;c&apos;&gt;"
        );
    }

    #[test]
    fn available_skills_lists_each_skill() {
        let skills = vec![skill("notes", "take notes"), skill("mail", "send <mail>")];
        let xml = available_skills_xml(&skills).expect("non-empty");
        assert!(xml.starts_with("<available_skills>"));
        assert!(xml.contains("<name>notes</name>"));
        assert!(xml.contains("send &lt;mail&gt;"));
        assert!(xml.contains("<location>/skills/notes</location>"));
        assert!(xml.ends_with("</available_skills>"));
    }

    #[test]
    fn no_fragment_without_skills() {
        assert_eq!(available_skills_xml(&[]), None);
    }

    #[test]
    fn instructions_include_body_and_manifest() {
        let mut s = skill("notes", "take notes");
        s.body = Some("Write it all down.".into());
        s.resources = Some(SkillResources {
            scripts: vec!["summarise.sh".into()],
            references: vec!["style.md".into()],
            assets: vec![],
        });
        let xml = skill_instructions_xml(&s);
        assert!(xml.starts_with("<skill_instructions name=\"notes\">"));
        assert!(xml.contains("Write it all down."));
        assert!(xml.contains("- scripts/summarise.sh"));
        assert!(xml.contains("- references/style.md"));
        assert!(xml.ends_with("</skill_instructions>"));
    }
}
