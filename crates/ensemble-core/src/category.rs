use crate::EnsembleError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Category a task is classified into.
///
/// Variants are declared in priority order, most specific first. Anything
/// that compares categories on equal strength falls back to this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Vulnerabilities, threat models, hardening.
    Security,
    /// Diagnosing failures, stack traces, regressions.
    Debugging,
    /// Writing or refactoring source code.
    Code,
    /// Architecture, system and interface design.
    Design,
    /// Data analysis, queries, statistics.
    Data,
    /// Scheduling, roadmaps, task breakdowns.
    Planning,
    /// Open-ended writing and ideation.
    Creative,
    /// Logic, math, step-by-step argument.
    Reasoning,
    /// Summaries, comparisons, literature lookups.
    Research,
    /// Fallback when nothing more specific matches.
    General,
}

impl TaskCategory {
    /// All categories in priority order.
    pub const ALL: [TaskCategory; 10] = [
        TaskCategory::Security,
        TaskCategory::Debugging,
        TaskCategory::Code,
        TaskCategory::Design,
        TaskCategory::Data,
        TaskCategory::Planning,
        TaskCategory::Creative,
        TaskCategory::Reasoning,
        TaskCategory::Research,
        TaskCategory::General,
    ];

    /// Capability tag an agent declares to handle this category.
    pub fn tag(&self) -> &'static str {
        match self {
            TaskCategory::Security => "security",
            TaskCategory::Debugging => "debugging",
            TaskCategory::Code => "code",
            TaskCategory::Design => "design",
            TaskCategory::Data => "data",
            TaskCategory::Planning => "planning",
            TaskCategory::Creative => "creative",
            TaskCategory::Reasoning => "reasoning",
            TaskCategory::Research => "research",
            TaskCategory::General => "general",
        }
    }

    /// Position in the priority order (0 = most specific).
    pub fn priority(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).unwrap_or(Self::ALL.len())
    }

    /// Whether an agent declaring `tags` is a specialist for this category.
    ///
    /// Every agent handles [`TaskCategory::General`].
    pub fn matches_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        *self == TaskCategory::General || tags.iter().any(|t| t.as_ref() == self.tag())
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TaskCategory {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.tag() == lower)
            .ok_or_else(|| EnsembleError::Config(format!("Unknown task category: {s}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_is_declaration_order() {
        assert_eq!(TaskCategory::Security.priority(), 0);
        assert_eq!(TaskCategory::General.priority(), 9);
        assert!(TaskCategory::Code < TaskCategory::Reasoning);
    }

    #[test]
    fn test_general_matches_any_agent() {
        let tags: Vec<String> = vec![];
        assert!(TaskCategory::General.matches_tags(&tags));
        assert!(!TaskCategory::Code.matches_tags(&tags));
        assert!(TaskCategory::Code.matches_tags(&["code", "design"]));
    }

    #[test]
    fn test_from_str_roundtrip() {
        for category in TaskCategory::ALL {
            let parsed: TaskCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("astrology".parse::<TaskCategory>().is_err());
    }
}
