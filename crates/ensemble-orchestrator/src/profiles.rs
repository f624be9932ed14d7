use crate::config::AgentConfig;
use ensemble_core::TaskCategory;
use std::str::FromStr;

/// Common spellings of capability tags mapped onto the category tag they mean.
const ALIASES: &[(&str, &str)] = &[
    ("coding", "code"),
    ("programming", "code"),
    ("software", "code"),
    ("debug", "debugging"),
    ("troubleshooting", "debugging"),
    ("architecture", "design"),
    ("analysis", "data"),
    ("analytics", "data"),
    ("writing", "creative"),
    ("brainstorming", "creative"),
    ("logic", "reasoning"),
    ("math", "reasoning"),
    ("plan", "planning"),
    ("scheduling", "planning"),
    ("sec", "security"),
    ("appsec", "security"),
    ("search", "research"),
];

/// Normalize one capability tag: lowercase, trimmed, aliases resolved.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim().to_lowercase().replace([' ', '-'], "_");
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(tag)
}

/// Normalize a declared tag list, keeping first-seen order and dropping empties and duplicates.
pub fn normalize_capabilities(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Agent seed for the performance store: id plus normalized capability tags.
#[derive(Debug, Clone)]
pub struct AgentSeed {
    pub id: String,
    pub capabilities: Vec<String>,
}

impl From<&AgentConfig> for AgentSeed {
    fn from(config: &AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            capabilities: normalize_capabilities(&config.capabilities),
        }
    }
}

/// Tags that name a task category, in declared order.
pub fn category_tags(capabilities: &[String]) -> Vec<TaskCategory> {
    capabilities
        .iter()
        .filter_map(|t| TaskCategory::from_str(t).ok())
        .filter(|c| *c != TaskCategory::General)
        .collect()
}
