use chrono::{DateTime, Utc};
use ensemble_core::{AgentId, CollaborationMode, HealthState, TaskCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Read-only view of one agent as held by the performance store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    /// Capability tags in declared order.
    pub capabilities: Vec<String>,
    /// Running performance score per category, each in [0, 1].
    pub scores: BTreeMap<TaskCategory, f64>,
    pub health: HealthState,
    pub consecutive_failures: u32,
    /// Exponentially weighted latency of recent calls, if any were observed.
    pub recent_latency_ms: Option<f64>,
}

impl AgentProfile {
    pub fn score(&self, category: TaskCategory) -> f64 {
        self.scores.get(&category).copied().unwrap_or(0.0)
    }

    /// Mean score across all categories.
    pub fn mean_score(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.values().sum::<f64>() / self.scores.len() as f64
    }

    pub fn handles(&self, category: TaskCategory) -> bool {
        category.matches_tags(&self.capabilities)
    }
}

/// One category a task matched, with its normalized confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category: TaskCategory,
    pub confidence: f64,
}

/// Lifecycle of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Classified,
    Routed,
    Executing,
    Completed,
    Failed { reason: String },
}

/// A single request as it moves through classification, routing and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub prompt: String,
    pub context: Option<String>,
    /// Ranked strongest first; never empty.
    pub categories: Vec<CategoryMatch>,
    pub agents: Vec<AgentId>,
    pub mode: CollaborationMode,
    pub state: TaskState,
    pub degraded_routing: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        prompt: impl Into<String>,
        context: Option<String>,
        mode: CollaborationMode,
        categories: Vec<CategoryMatch>,
    ) -> Self {
        let categories = if categories.is_empty() {
            vec![CategoryMatch {
                category: TaskCategory::General,
                confidence: 0.0,
            }]
        } else {
            categories
        };
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            context,
            categories,
            agents: Vec::new(),
            mode,
            state: TaskState::Classified,
            degraded_routing: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn top_category(&self) -> TaskCategory {
        self.categories
            .first()
            .map(|m| m.category)
            .unwrap_or(TaskCategory::General)
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn mark_routed(&mut self, agents: Vec<AgentId>, degraded: bool) {
        self.agents = agents;
        self.degraded_routing = degraded;
        self.state = TaskState::Routed;
    }

    pub fn mark_executing(&mut self) {
        self.state = TaskState::Executing;
    }

    pub fn mark_completed(&mut self) {
        self.state = TaskState::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = TaskState::Failed {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Failed { .. })
    }
}

/// What an agent was asked to do in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContributionRole {
    Answer,
    Revision,
    Critique,
    Review,
    Team { tag: String },
    Step,
}

/// One agent's output within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub agent_id: AgentId,
    pub role: ContributionRole,
    pub text: String,
    pub latency_ms: u64,
    /// Composite quality of `text` against the task prompt.
    pub quality: f64,
}

/// All contributions collected in one protocol round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// 1-based position within the session.
    pub index: u32,
    /// Protocol step this round served, e.g. `answer`, `critique`, `revision`.
    pub phase: String,
    pub contributions: Vec<Contribution>,
}

/// Metric sample fed to the health monitor after every agent call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub agent_id: AgentId,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub success: bool,
    /// Produced by a health probe rather than a task.
    #[serde(default)]
    pub probe: bool,
}

impl MetricSample {
    pub fn new(agent_id: impl Into<AgentId>, latency_ms: u64, success: bool) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            latency_ms,
            success,
            probe: false,
        }
    }

    pub fn probe(agent_id: impl Into<AgentId>, latency_ms: u64, success: bool) -> Self {
        Self {
            probe: true,
            ..Self::new(agent_id, latency_ms, success)
        }
    }
}
