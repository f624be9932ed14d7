use ensemble_agent::ModelConfig;
use ensemble_core::{AgentId, CollaborationMode, EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Static startup configuration of the routing/collaboration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// One agent: identity, declared capabilities and the provider behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    /// Capability tags in preference order (e.g. `["code", "reasoning"]`).
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// EMA smoothing factor for performance scores.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Score every agent starts with in every category.
    #[serde(default = "default_initial_score")]
    pub initial_score: f64,
    /// Share of a successful outcome attributed to latency.
    #[serde(default = "default_latency_weight")]
    pub latency_weight: f64,
    /// Latency at which the latency share of an outcome reaches zero.
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,
    /// Number of agents selected for collaborative modes.
    #[serde(default = "default_max_collaborators")]
    pub max_collaborators: usize,
    /// Alternates tried when a single-dispatch call fails.
    #[serde(default = "default_max_failover")]
    pub max_failover: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            ema_alpha: default_ema_alpha(),
            initial_score: default_initial_score(),
            latency_weight: default_latency_weight(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            max_collaborators: default_max_collaborators(),
            max_failover: default_max_failover(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Minimum Jaccard similarity for a near-duplicate hit.
    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: f64,
    /// How many recent entries the near-duplicate scan looks at.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Responses scoring below this composite quality are not cached.
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
    /// Recurring task templates. Empty means use the built-in set.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
            near_duplicate_threshold: default_near_duplicate_threshold(),
            recent_window: default_recent_window(),
            min_quality: default_min_quality(),
            templates: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// A recurring task template: a regex whose capture groups identify the intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    /// Hard timeout for every external agent call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Overall wall-clock bound for one task, all rounds included.
    #[serde(default = "default_task_deadline_ms")]
    pub task_deadline_ms: u64,
    #[serde(default = "default_consensus_max_rounds")]
    pub consensus_max_rounds: u32,
    /// Mean pairwise similarity at which consensus stops early.
    #[serde(default = "default_consensus_similarity")]
    pub consensus_similarity: f64,
    /// Per-protocol wall-clock budget in milliseconds.
    /// Protocols without an entry get `rounds × call_timeout_ms`.
    #[serde(default)]
    pub budgets: HashMap<CollaborationMode, u64>,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            task_deadline_ms: default_task_deadline_ms(),
            consensus_max_rounds: default_consensus_max_rounds(),
            consensus_similarity: default_consensus_similarity(),
            budgets: HashMap::new(),
        }
    }
}

impl CollaborationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_millis(self.task_deadline_ms)
    }

    /// Upper bound on sequential call rounds for `mode` with `agents` participants.
    pub fn rounds_for(&self, mode: CollaborationMode, agents: usize) -> u32 {
        match mode {
            CollaborationMode::Parallel
            | CollaborationMode::Brainstorming
            | CollaborationMode::SpecializedTeams => 1,
            CollaborationMode::PeerReview | CollaborationMode::CriticalAnalysis => 2,
            CollaborationMode::DevilsAdvocate => 3,
            CollaborationMode::Consensus => self.consensus_max_rounds.max(1),
            // Single dispatch tries its alternates one after another.
            CollaborationMode::None | CollaborationMode::Sequential => agents.max(1) as u32,
        }
    }

    /// Wall-clock budget for one run of `mode`.
    pub fn budget_for(&self, mode: CollaborationMode, agents: usize) -> Duration {
        if let Some(ms) = self.budgets.get(&mode) {
            return Duration::from_millis(*ms);
        }
        self.call_timeout() * self.rounds_for(mode, agents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Monitor tick interval.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Age after which metric samples drop out of the rolling window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Consecutive failures that move a healthy agent to degraded.
    #[serde(default = "default_degrade_after")]
    pub degrade_after: u32,
    /// Consecutive failures that make an agent unavailable.
    #[serde(default = "default_unavailable_after")]
    pub unavailable_after: u32,
    /// Consecutive successes that restore an agent to healthy.
    #[serde(default = "default_recover_after")]
    pub recover_after: u32,
    /// p95 latency above which an agent counts as degraded.
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
    /// Rolling error rate that raises a predictive alert.
    #[serde(default = "default_alert_error_rate")]
    pub alert_error_rate: f64,
    /// Samples needed before rates and percentiles are trusted.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Probe unavailable agents on every tick.
    #[serde(default = "default_probe")]
    pub probe: bool,
    #[serde(default = "default_probe_prompt")]
    pub probe_prompt: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            window_secs: default_window_secs(),
            degrade_after: default_degrade_after(),
            unavailable_after: default_unavailable_after(),
            recover_after: default_recover_after(),
            latency_threshold_ms: default_latency_threshold_ms(),
            alert_error_rate: default_alert_error_rate(),
            min_samples: default_min_samples(),
            probe: default_probe(),
            probe_prompt: default_probe_prompt(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_ema_alpha() -> f64 {
    0.2
}
fn default_initial_score() -> f64 {
    0.5
}
fn default_latency_weight() -> f64 {
    0.2
}
fn default_latency_ceiling_ms() -> u64 {
    30_000
}
fn default_max_collaborators() -> usize {
    3
}
fn default_max_failover() -> usize {
    1
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_capacity() -> usize {
    512
}
fn default_near_duplicate_threshold() -> f64 {
    0.85
}
fn default_recent_window() -> usize {
    64
}
fn default_min_quality() -> f64 {
    0.35
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_task_deadline_ms() -> u64 {
    120_000
}
fn default_consensus_max_rounds() -> u32 {
    2
}
fn default_consensus_similarity() -> f64 {
    0.8
}
fn default_interval_ms() -> u64 {
    10_000
}
fn default_window_secs() -> u64 {
    300
}
fn default_degrade_after() -> u32 {
    3
}
fn default_unavailable_after() -> u32 {
    5
}
fn default_recover_after() -> u32 {
    3
}
fn default_latency_threshold_ms() -> u64 {
    15_000
}
fn default_alert_error_rate() -> f64 {
    0.3
}
fn default_min_samples() -> usize {
    5
}
fn default_probe() -> bool {
    true
}
fn default_probe_prompt() -> String {
    "Reply with the single word OK.".to_string()
}

impl EnsembleConfig {
    /// Check the configuration before anything is built from it.
    pub fn validate(&self) -> EnsembleResult<()> {
        if self.agents.is_empty() {
            return Err(EnsembleError::Config(
                "No agents configured: at least one [[agents]] entry is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(EnsembleError::Config("Agent id must not be empty".into()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(EnsembleError::Config(format!(
                    "Duplicate agent id '{}'",
                    agent.id
                )));
            }
        }

        let r = &self.routing;
        if !(r.ema_alpha > 0.0 && r.ema_alpha <= 1.0) {
            return Err(EnsembleError::Config(format!(
                "routing.ema_alpha must be in (0, 1], got {}",
                r.ema_alpha
            )));
        }
        check_unit("routing.initial_score", r.initial_score)?;
        check_unit("routing.latency_weight", r.latency_weight)?;
        if r.latency_ceiling_ms == 0 {
            return Err(EnsembleError::Config(
                "routing.latency_ceiling_ms must be positive".into(),
            ));
        }

        check_unit("cache.near_duplicate_threshold", self.cache.near_duplicate_threshold)?;
        check_unit("cache.min_quality", self.cache.min_quality)?;
        for template in &self.cache.templates {
            regex::Regex::new(&template.pattern).map_err(|e| {
                EnsembleError::Config(format!("Invalid template '{}': {e}", template.name))
            })?;
        }

        let c = &self.collaboration;
        if c.call_timeout_ms == 0 || c.task_deadline_ms == 0 {
            return Err(EnsembleError::Config(
                "collaboration timeouts must be positive".into(),
            ));
        }
        check_unit("collaboration.consensus_similarity", c.consensus_similarity)?;

        let h = &self.health;
        if h.interval_ms == 0 {
            return Err(EnsembleError::Config("health.interval_ms must be positive".into()));
        }
        if h.unavailable_after < h.degrade_after {
            return Err(EnsembleError::Config(format!(
                "health.unavailable_after ({}) must be >= health.degrade_after ({})",
                h.unavailable_after, h.degrade_after
            )));
        }
        check_unit("health.alert_error_rate", h.alert_error_rate)?;

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> EnsembleResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EnsembleError::Config(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ensemble_agent::ProviderKind;

    fn agent(id: &str) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            capabilities: vec!["code".to_string()],
            model: ModelConfig {
                provider: ProviderKind::Echo,
                model_id: "echo".to_string(),
                api_key: String::new(),
                api_key_env: None,
                api_base_url: None,
                temperature: 0.0,
                max_tokens: 64,
            },
        }
    }

    #[test]
    fn test_empty_agents_is_fatal() {
        let err = EnsembleConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("No agents"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let cfg = EnsembleConfig {
            agents: vec![agent("a"), agent("a")],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_alpha_bounds() {
        let mut cfg = EnsembleConfig {
            agents: vec![agent("a")],
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        cfg.routing.ema_alpha = 0.0;
        assert!(cfg.validate().is_err());
        cfg.routing.ema_alpha = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_template_regex_rejected() {
        let mut cfg = EnsembleConfig {
            agents: vec![agent("a")],
            ..Default::default()
        };
        cfg.cache.templates.push(TemplateConfig {
            name: "broken".into(),
            pattern: "(unclosed".into(),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_budget_defaults_to_rounds_times_timeout() {
        let c = CollaborationConfig::default();
        assert_eq!(
            c.budget_for(CollaborationMode::DevilsAdvocate, 3),
            Duration::from_millis(90_000)
        );
        assert_eq!(
            c.budget_for(CollaborationMode::Sequential, 4),
            Duration::from_millis(120_000)
        );

        let mut custom = CollaborationConfig::default();
        custom.budgets.insert(CollaborationMode::Parallel, 5_000);
        assert_eq!(
            custom.budget_for(CollaborationMode::Parallel, 2),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_toml_agents_flatten_model() {
        let cfg: EnsembleConfig = toml::from_str(
            r#"
            [[agents]]
            id = "claude-main"
            capabilities = ["reasoning", "code"]
            provider = "claude"
            model_id = "claude-sonnet-4-20250514"
            api_key_env = "ANTHROPIC_API_KEY"

            [routing]
            ema_alpha = 0.3

            [collaboration.budgets]
            consensus = 45000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].model.provider, ProviderKind::Claude);
        assert_eq!(cfg.routing.ema_alpha, 0.3);
        assert_eq!(cfg.routing.max_collaborators, 3);
        assert_eq!(
            cfg.collaboration.budgets.get(&CollaborationMode::Consensus),
            Some(&45_000)
        );
        assert_eq!(cfg.health.unavailable_after, 5);
    }
}
