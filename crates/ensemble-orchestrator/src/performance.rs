use crate::config::RoutingConfig;
use crate::profiles::AgentSeed;
use crate::types::AgentProfile;
use ensemble_core::{AgentId, HealthState, TaskCategory};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Smoothing factor for the per-agent latency average used as a tie-breaker.
const LATENCY_ALPHA: f64 = 0.3;

struct HealthRecord {
    state: HealthState,
    consecutive_failures: u32,
}

struct AgentEntry {
    capabilities: Vec<String>,
    /// One lock per category so concurrent feedback for different categories never contends.
    scores: HashMap<TaskCategory, Mutex<f64>>,
    health: RwLock<HealthRecord>,
    latency_ms: Mutex<Option<f64>>,
}

/// Process-wide registry of agent profiles and their running scores.
///
/// The set of agents is fixed at construction. All mutation goes through
/// narrow operations guarded per agent and per category; reads return
/// owned snapshots.
pub struct PerformanceStore {
    order: Vec<AgentId>,
    agents: HashMap<AgentId, AgentEntry>,
    alpha: f64,
    latency_weight: f64,
    latency_ceiling_ms: f64,
}

impl PerformanceStore {
    pub fn new(seeds: Vec<AgentSeed>, config: &RoutingConfig) -> Self {
        let mut order = Vec::with_capacity(seeds.len());
        let mut agents = HashMap::with_capacity(seeds.len());
        for seed in seeds {
            if agents.contains_key(&seed.id) {
                continue;
            }
            let scores = TaskCategory::ALL
                .iter()
                .map(|c| (*c, Mutex::new(config.initial_score)))
                .collect();
            order.push(seed.id.clone());
            agents.insert(
                seed.id,
                AgentEntry {
                    capabilities: seed.capabilities,
                    scores,
                    health: RwLock::new(HealthRecord {
                        state: HealthState::Healthy,
                        consecutive_failures: 0,
                    }),
                    latency_ms: Mutex::new(None),
                },
            );
        }
        Self {
            order,
            agents,
            alpha: config.ema_alpha,
            latency_weight: config.latency_weight,
            latency_ceiling_ms: config.latency_ceiling_ms.max(1) as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Agent ids in declaration order.
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Outcome signal in [0, 1] blended into the EMA for one call.
    pub fn outcome_signal(&self, success: bool, latency_ms: u64) -> f64 {
        if !success {
            return 0.0;
        }
        let latency_factor = (1.0 - latency_ms as f64 / self.latency_ceiling_ms).clamp(0.0, 1.0);
        (1.0 - self.latency_weight) + self.latency_weight * latency_factor
    }

    /// Fold one observed outcome into the agent's score for `category`.
    ///
    /// Returns the new score, or `None` for an unknown agent.
    pub fn record_outcome(
        &self,
        agent_id: &str,
        category: TaskCategory,
        success: bool,
        latency_ms: u64,
    ) -> Option<f64> {
        let entry = self.agents.get(agent_id)?;
        let outcome = self.outcome_signal(success, latency_ms);

        let new_score = {
            let mut score = entry.scores.get(&category)?.lock();
            *score = (self.alpha * outcome + (1.0 - self.alpha) * *score).clamp(0.0, 1.0);
            *score
        };

        {
            let mut latency = entry.latency_ms.lock();
            let observed = latency_ms as f64;
            *latency = Some(match *latency {
                Some(prev) => LATENCY_ALPHA * observed + (1.0 - LATENCY_ALPHA) * prev,
                None => observed,
            });
        }

        debug!(agent = %agent_id, %category, success, latency_ms, score = new_score, "Score updated");
        Some(new_score)
    }

    pub fn score(&self, agent_id: &str, category: TaskCategory) -> Option<f64> {
        let entry = self.agents.get(agent_id)?;
        entry.scores.get(&category).map(|s| *s.lock())
    }

    pub fn health(&self, agent_id: &str) -> Option<HealthState> {
        self.agents.get(agent_id).map(|e| e.health.read().state)
    }

    /// Overwrite an agent's health state. Returns the previous state.
    pub fn set_health(
        &self,
        agent_id: &str,
        state: HealthState,
        consecutive_failures: u32,
    ) -> Option<HealthState> {
        let entry = self.agents.get(agent_id)?;
        let mut health = entry.health.write();
        let previous = health.state;
        health.state = state;
        health.consecutive_failures = consecutive_failures;
        Some(previous)
    }

    /// Replace stored scores with previously persisted values. Unknown
    /// categories are ignored and values are clamped into [0, 1].
    pub fn restore_scores(&self, agent_id: &str, scores: &BTreeMap<TaskCategory, f64>) -> bool {
        let Some(entry) = self.agents.get(agent_id) else {
            return false;
        };
        for (category, value) in scores {
            if let Some(slot) = entry.scores.get(category) {
                *slot.lock() = value.clamp(0.0, 1.0);
            }
        }
        true
    }

    pub fn profile(&self, agent_id: &str) -> Option<AgentProfile> {
        let entry = self.agents.get(agent_id)?;
        let scores = entry
            .scores
            .iter()
            .map(|(c, s)| (*c, *s.lock()))
            .collect();
        let (health, consecutive_failures) = {
            let h = entry.health.read();
            (h.state, h.consecutive_failures)
        };
        Some(AgentProfile {
            id: agent_id.to_string(),
            capabilities: entry.capabilities.clone(),
            scores,
            health,
            consecutive_failures,
            recent_latency_ms: *entry.latency_ms.lock(),
        })
    }

    /// Snapshot of every profile in declaration order.
    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.order.iter().filter_map(|id| self.profile(id)).collect()
    }
}

impl std::fmt::Debug for PerformanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceStore")
            .field("agents", &self.order)
            .field("alpha", &self.alpha)
            .finish()
    }
}
