use crate::config::RoutingConfig;
use crate::performance::PerformanceStore;
use crate::types::{AgentProfile, Task};
use ensemble_core::{AgentId, CollaborationMode, TaskCategory};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Agents chosen for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected agents, best first.
    pub agents: Vec<AgentId>,
    /// Ranked fallbacks for single dispatch, at most `max_failover` long.
    pub alternates: Vec<AgentId>,
    /// No healthy specialist existed; the global best was used instead.
    pub degraded: bool,
}

/// Selects agents from the performance store and feeds outcomes back into it.
#[derive(Debug, Clone)]
pub struct TaskRouter {
    store: Arc<PerformanceStore>,
    config: RoutingConfig,
}

impl TaskRouter {
    pub fn new(store: Arc<PerformanceStore>, config: RoutingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<PerformanceStore> {
        &self.store
    }

    /// Number of agents a mode asks for.
    pub fn collaborators_for(&self, mode: CollaborationMode) -> usize {
        match mode {
            CollaborationMode::None => 1,
            CollaborationMode::DevilsAdvocate => 3,
            _ => self.config.max_collaborators.max(2),
        }
    }

    /// Pick the agent set for `task`.
    pub fn route(&self, task: &Task) -> RoutingDecision {
        let profiles = self.store.profiles();
        let k = self.collaborators_for(task.mode);

        let ranked = if task.mode == CollaborationMode::SpecializedTeams {
            rank_for_teams(&profiles, task)
        } else {
            rank_specialists(&profiles, task.top_category())
        };

        if ranked.is_empty() {
            let global = rank_global(&profiles, &[]);
            warn!(
                task_id = %task.id,
                category = %task.top_category(),
                fallback = ?global.first(),
                "No healthy specialist; using degraded routing"
            );
            return self.decide(global, k, true);
        }

        let mut ranked = ranked;
        if ranked.len() < k {
            // Top up with the best healthy generalists.
            let extra = rank_global(&profiles, &ranked);
            ranked.extend(
                extra
                    .into_iter()
                    .filter(|id| self.store.health(id).is_some_and(|h| h.is_routable())),
            );
        }
        self.decide(ranked, k, false)
    }

    fn decide(&self, mut ranked: Vec<AgentId>, k: usize, degraded: bool) -> RoutingDecision {
        let rest = if ranked.len() > k {
            ranked.split_off(k)
        } else {
            Vec::new()
        };
        let alternates = if k == 1 {
            rest.into_iter().take(self.config.max_failover).collect()
        } else {
            Vec::new()
        };
        debug!(agents = ?ranked, alternates = ?alternates, degraded, "Routing decision");
        RoutingDecision {
            agents: ranked,
            alternates,
            degraded,
        }
    }

    /// Feed one observed outcome back into the performance store.
    pub fn record_outcome(
        &self,
        agent_id: &str,
        category: TaskCategory,
        success: bool,
        latency_ms: u64,
    ) -> Option<f64> {
        self.store
            .record_outcome(agent_id, category, success, latency_ms)
    }
}

/// Sort key: weighted score descending, then lowest recent latency, then declaration order.
fn by_weight_then_latency(a: &(f64, f64, usize), b: &(f64, f64, usize)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then(a.1.total_cmp(&b.1))
        .then(a.2.cmp(&b.2))
}

fn latency_key(profile: &AgentProfile) -> f64 {
    profile.recent_latency_ms.unwrap_or(f64::INFINITY)
}

/// Routable specialists for `category`, best first.
fn rank_specialists(profiles: &[AgentProfile], category: TaskCategory) -> Vec<AgentId> {
    let mut keyed: Vec<((f64, f64, usize), &AgentProfile)> = profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| p.health.is_routable() && p.handles(category))
        .map(|(i, p)| {
            let weight = p.score(category) * p.health.routing_weight();
            ((weight, latency_key(p), i), p)
        })
        .collect();
    keyed.sort_by(|a, b| by_weight_then_latency(&a.0, &b.0));
    keyed.into_iter().map(|(_, p)| p.id.clone()).collect()
}

/// Routable agents covering any matched category, ranked by their best matched score.
///
/// The best agent of each category comes first so every matched category
/// gets a team lead before any category gets a second member.
fn rank_for_teams(profiles: &[AgentProfile], task: &Task) -> Vec<AgentId> {
    let mut out: Vec<AgentId> = Vec::new();
    for m in &task.categories {
        if let Some(lead) = rank_specialists(profiles, m.category)
            .into_iter()
            .find(|id| !out.contains(id))
        {
            out.push(lead);
        }
    }

    let mut keyed: Vec<((f64, f64, usize), &AgentProfile)> = profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| p.health.is_routable() && !out.contains(&p.id))
        .filter_map(|(i, p)| {
            let best = task
                .categories
                .iter()
                .filter(|m| p.handles(m.category))
                .map(|m| p.score(m.category))
                .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
            Some(((best * p.health.routing_weight(), latency_key(p), i), p))
        })
        .collect();
    keyed.sort_by(|a, b| by_weight_then_latency(&a.0, &b.0));
    out.extend(keyed.into_iter().map(|(_, p)| p.id.clone()));
    out
}

/// Every agent ranked by mean score across categories, skipping `exclude`.
///
/// Unavailable agents are only considered when nothing else is left.
fn rank_global(profiles: &[AgentProfile], exclude: &[AgentId]) -> Vec<AgentId> {
    let candidates: Vec<(usize, &AgentProfile)> = profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| !exclude.contains(&p.id))
        .collect();

    let routable: Vec<(usize, &AgentProfile)> = candidates
        .iter()
        .copied()
        .filter(|(_, p)| p.health.is_routable())
        .collect();

    let (pool, weighted) = if routable.is_empty() {
        (candidates, false)
    } else {
        (routable, true)
    };

    let mut keyed: Vec<((f64, f64, usize), &AgentProfile)> = pool
        .into_iter()
        .map(|(i, p)| {
            let weight = if weighted {
                p.mean_score() * p.health.routing_weight()
            } else {
                p.mean_score()
            };
            ((weight, latency_key(p), i), p)
        })
        .collect();
    keyed.sort_by(|a, b| by_weight_then_latency(&a.0, &b.0));
    keyed.into_iter().map(|(_, p)| p.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::AgentSeed;
    use crate::types::CategoryMatch;
    use ensemble_core::HealthState;

    fn seed(id: &str, caps: &[&str]) -> AgentSeed {
        AgentSeed {
            id: id.to_string(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn router(seeds: Vec<AgentSeed>) -> TaskRouter {
        let config = RoutingConfig::default();
        TaskRouter::new(Arc::new(PerformanceStore::new(seeds, &config)), config)
    }

    fn task(category: TaskCategory, mode: CollaborationMode) -> Task {
        Task::new(
            "x",
            None,
            mode,
            vec![CategoryMatch {
                category,
                confidence: 1.0,
            }],
        )
    }

    #[test]
    fn test_single_dispatch_picks_best_specialist() {
        let r = router(vec![
            seed("a", &["code"]),
            seed("b", &["code"]),
            seed("c", &["design"]),
        ]);
        r.record_outcome("b", TaskCategory::Code, true, 10);
        let d = r.route(&task(TaskCategory::Code, CollaborationMode::None));
        assert_eq!(d.agents, vec!["b"]);
        assert_eq!(d.alternates, vec!["a"]);
        assert!(!d.degraded);
    }

    #[test]
    fn test_degraded_agent_is_half_weight() {
        let r = router(vec![seed("a", &["code"]), seed("b", &["code"])]);
        r.record_outcome("a", TaskCategory::Code, true, 10);
        r.store().set_health("a", HealthState::Degraded, 3);
        let d = r.route(&task(TaskCategory::Code, CollaborationMode::None));
        assert_eq!(d.agents, vec!["b"]);
    }

    #[test]
    fn test_tie_broken_by_latency() {
        let r = router(vec![seed("a", &["code"]), seed("b", &["code"])]);
        r.record_outcome("a", TaskCategory::Data, true, 900);
        r.record_outcome("b", TaskCategory::Data, true, 100);
        let d = r.route(&task(TaskCategory::Code, CollaborationMode::None));
        assert_eq!(d.agents, vec!["b"]);
    }

    #[test]
    fn test_unavailable_specialists_fall_back_to_global_best() {
        let r = router(vec![seed("sec", &["security"]), seed("gen", &["writing"])]);
        r.store().set_health("sec", HealthState::Unavailable, 5);
        let d = r.route(&task(TaskCategory::Security, CollaborationMode::None));
        assert!(d.degraded);
        assert_eq!(d.agents, vec!["gen"]);
    }

    #[test]
    fn test_everything_unavailable_still_routes() {
        let r = router(vec![seed("a", &["code"])]);
        r.store().set_health("a", HealthState::Unavailable, 9);
        let d = r.route(&task(TaskCategory::Code, CollaborationMode::None));
        assert!(d.degraded);
        assert_eq!(d.agents, vec!["a"]);
    }

    #[test]
    fn test_general_matches_everyone() {
        let r = router(vec![seed("a", &["code"]), seed("b", &["design"])]);
        let d = r.route(&task(TaskCategory::General, CollaborationMode::Parallel));
        assert!(!d.degraded);
        assert_eq!(d.agents.len(), 2);
    }

    #[test]
    fn test_collaboration_tops_up_with_generalists() {
        let r = router(vec![
            seed("specialist", &["security"]),
            seed("g1", &["code"]),
            seed("g2", &["data"]),
        ]);
        let d = r.route(&task(TaskCategory::Security, CollaborationMode::Consensus));
        assert!(!d.degraded);
        assert_eq!(d.agents.len(), 3);
        assert_eq!(d.agents[0], "specialist");
        assert!(d.alternates.is_empty());
    }

    #[test]
    fn test_devils_advocate_asks_for_three() {
        let r = router(vec![seed("a", &["code"]), seed("b", &["code"])]);
        assert_eq!(r.collaborators_for(CollaborationMode::DevilsAdvocate), 3);
        let d = r.route(&task(TaskCategory::Code, CollaborationMode::DevilsAdvocate));
        assert_eq!(d.agents.len(), 2);
    }

    #[test]
    fn test_teams_cover_every_matched_category() {
        let r = router(vec![
            seed("d1", &["design"]),
            seed("d2", &["design"]),
            seed("s1", &["security"]),
        ]);
        let mut t = task(TaskCategory::Design, CollaborationMode::SpecializedTeams);
        t.categories.push(CategoryMatch {
            category: TaskCategory::Security,
            confidence: 0.4,
        });
        let d = r.route(&t);
        assert_eq!(d.agents.len(), 3);
        assert_eq!(d.agents[0], "d1");
        assert_eq!(d.agents[1], "s1");
    }
}
