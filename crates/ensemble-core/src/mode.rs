use crate::EnsembleError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How many agents take part in a task and how they interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// Single best agent, no collaboration.
    #[default]
    None,
    /// All agents answer concurrently; best individual answer wins.
    Parallel,
    /// Agents answer, see anonymized peer answers, and revise.
    Consensus,
    /// Answer, targeted critique, revision.
    DevilsAdvocate,
    /// Agents answer, then score each other's answers.
    PeerReview,
    /// Agents grouped by capability tag answer their slice of the prompt.
    SpecializedTeams,
    /// Agents run in ranked order, each building on the previous output.
    Sequential,
    /// Parallel with ideation framing.
    Brainstorming,
    /// Peer review with critical framing.
    CriticalAnalysis,
}

impl CollaborationMode {
    /// All modes, single dispatch first.
    pub const ALL: [CollaborationMode; 9] = [
        CollaborationMode::None,
        CollaborationMode::Parallel,
        CollaborationMode::Consensus,
        CollaborationMode::DevilsAdvocate,
        CollaborationMode::PeerReview,
        CollaborationMode::SpecializedTeams,
        CollaborationMode::Sequential,
        CollaborationMode::Brainstorming,
        CollaborationMode::CriticalAnalysis,
    ];

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationMode::None => "none",
            CollaborationMode::Parallel => "parallel",
            CollaborationMode::Consensus => "consensus",
            CollaborationMode::DevilsAdvocate => "devils_advocate",
            CollaborationMode::PeerReview => "peer_review",
            CollaborationMode::SpecializedTeams => "specialized_teams",
            CollaborationMode::Sequential => "sequential",
            CollaborationMode::Brainstorming => "brainstorming",
            CollaborationMode::CriticalAnalysis => "critical_analysis",
        }
    }

    /// Whether more than one agent takes part.
    pub fn is_collaborative(&self) -> bool {
        !matches!(self, CollaborationMode::None)
    }
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollaborationMode {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| EnsembleError::Config(format!("Unknown collaboration mode: {s}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_dashes_and_spaces() {
        assert_eq!(
            "devils-advocate".parse::<CollaborationMode>().unwrap(),
            CollaborationMode::DevilsAdvocate
        );
        assert_eq!(
            "Peer Review".parse::<CollaborationMode>().unwrap(),
            CollaborationMode::PeerReview
        );
        assert!("round_robin".parse::<CollaborationMode>().is_err());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for mode in CollaborationMode::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
    }

    #[test]
    fn test_default_is_single_dispatch() {
        assert!(!CollaborationMode::default().is_collaborative());
        assert!(CollaborationMode::Sequential.is_collaborative());
    }
}
