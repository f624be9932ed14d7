use crate::cache::{CacheEntry, CacheQuery, CacheStats, CachedAnswer, Fingerprint, MatchStrategy, ResponseCache};
use crate::classifier::TaskClassifier;
use crate::collaboration::{CollaborationEngine, CollaborationOutcome, Dispatcher};
use crate::config::EnsembleConfig;
use crate::flight::SingleFlight;
use crate::monitor::{HealthAlert, HealthMonitor, MetricSink, MonitorHandle};
use crate::performance::PerformanceStore;
use crate::persistence::JsonSnapshotStore;
use crate::profiles::AgentSeed;
use crate::quality::{QualityScore, QualityScorer};
use crate::router::TaskRouter;
use crate::types::{CategoryMatch, Task};
use chrono::{DateTime, Utc};
use ensemble_agent::{build_adapter, AgentPool};
use ensemble_core::{AgentId, CollaborationMode, EnsembleError, EnsembleResult, HealthState, TaskCategory};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Answer to one submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub result_text: String,
    pub contributing_agents: Vec<AgentId>,
    pub confidence: f64,
    pub cache_hit: bool,
    /// Lookup strategy that produced the hit.
    pub cache_strategy: Option<MatchStrategy>,
    pub degraded_routing: bool,
    pub categories: Vec<CategoryMatch>,
    pub mode: CollaborationMode,
    pub quality: QualityScore,
    /// Collaboration rounds recorded while producing the answer.
    pub rounds: usize,
    /// The answer was computed by a concurrent identical request.
    pub coalesced: bool,
    pub latency_ms: u64,
}

impl TaskResult {
    fn from_cache(task: &Task, entry: CacheEntry, started: Instant) -> Self {
        Self {
            task_id: task.id,
            result_text: entry.answer.text,
            contributing_agents: entry.answer.contributing_agents,
            confidence: entry.answer.confidence,
            cache_hit: true,
            cache_strategy: entry.strategy,
            degraded_routing: false,
            categories: task.categories.clone(),
            mode: task.mode,
            quality: entry.quality,
            rounds: 0,
            coalesced: false,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn from_outcome(task: &Task, outcome: CollaborationOutcome, started: Instant) -> Self {
        Self {
            task_id: task.id,
            result_text: outcome.text,
            contributing_agents: outcome.contributors,
            confidence: outcome.confidence,
            cache_hit: false,
            cache_strategy: None,
            degraded_routing: task.degraded_routing,
            categories: task.categories.clone(),
            mode: task.mode,
            quality: outcome.quality,
            rounds: outcome.rounds.len(),
            coalesced: false,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Per-agent view exported to dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub capabilities: Vec<String>,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub scores: BTreeMap<TaskCategory, f64>,
    pub mean_score: f64,
    pub recent_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<u64>,
    pub error_rate: f64,
}

/// Read-only state of the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub generated_at: DateTime<Utc>,
    pub agents: Vec<AgentSnapshot>,
    pub cache: CacheStats,
    pub alerts: Vec<HealthAlert>,
}

/// Entry point of the routing and collaboration core.
///
/// Owns the process-wide registries (performance store, cache, health
/// monitor) and runs each submitted task through
/// cache → classifier → router → collaboration → quality scoring → cache.
pub struct Orchestrator {
    pool: AgentPool,
    classifier: TaskClassifier,
    router: TaskRouter,
    cache: ResponseCache,
    flights: SingleFlight<Fingerprint, TaskResult>,
    engine: CollaborationEngine,
    monitor: Arc<HealthMonitor>,
    sink: MetricSink,
    monitor_handle: Mutex<Option<MonitorHandle>>,
    persistence: Option<JsonSnapshotStore>,
}

impl Orchestrator {
    /// Build the engine over an existing adapter pool.
    ///
    /// Fails only on invalid configuration, including configured agents
    /// missing from `pool`.
    ///
    /// Metric samples are folded into the health windows after every
    /// executed task. Health transitions and probes only happen once
    /// [`Orchestrator::start_health_monitor`] is running.
    pub fn new(config: EnsembleConfig, pool: AgentPool) -> EnsembleResult<Self> {
        config.validate()?;
        if let Some(missing) = config.agents.iter().find(|a| !pool.contains(&a.id)) {
            return Err(EnsembleError::Config(format!(
                "Agent '{}' has no adapter",
                missing.id
            )));
        }

        let seeds: Vec<AgentSeed> = config.agents.iter().map(AgentSeed::from).collect();
        let store = Arc::new(PerformanceStore::new(seeds, &config.routing));
        let router = TaskRouter::new(store.clone(), config.routing.clone());
        let cache = ResponseCache::new(&config.cache)?;
        let monitor = Arc::new(HealthMonitor::new(
            store,
            pool.clone(),
            config.health.clone(),
        ));
        let sink = monitor.sink();
        let engine = CollaborationEngine::new(config.collaboration.clone(), QualityScorer::new());

        info!(
            agents = config.agents.len(),
            cache_capacity = config.cache.capacity,
            ema_alpha = config.routing.ema_alpha,
            "Orchestrator initialised"
        );

        Ok(Self {
            pool,
            classifier: TaskClassifier::new(),
            router,
            cache,
            flights: SingleFlight::new(),
            engine,
            monitor,
            sink,
            monitor_handle: Mutex::new(None),
            persistence: None,
        })
    }

    /// Build the engine and one provider adapter per configured agent.
    pub fn from_config(config: EnsembleConfig) -> EnsembleResult<Self> {
        config.validate()?;
        let mut pool = AgentPool::new();
        for agent in &config.agents {
            pool.register(agent.id.clone(), build_adapter(agent.model.clone())?);
        }
        Self::new(config, pool)
    }

    /// Persist learned scores through `store` on shutdown.
    pub fn with_persistence(mut self, store: JsonSnapshotStore) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Load previously saved scores. Returns how many agents were restored.
    pub async fn restore(&self) -> EnsembleResult<usize> {
        match &self.persistence {
            Some(p) => p.restore(self.router.store()).await,
            None => Ok(0),
        }
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Start the periodic health loop. Fails if it is already running.
    pub fn start_health_monitor(&self) -> EnsembleResult<()> {
        let handle = self.monitor.spawn()?;
        *self.monitor_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop the health loop, save scores if persistence is configured, and
    /// drop every cached answer.
    pub async fn shutdown(&self) -> EnsembleResult<()> {
        let handle = self.monitor_handle.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        if let Some(p) = &self.persistence {
            p.save(self.router.store()).await?;
        }
        self.cache.clear();
        info!("Orchestrator shut down");
        Ok(())
    }

    /// Answer a task. Never fails: agent errors, routing exhaustion and
    /// protocol aborts all surface as result metadata.
    ///
    /// `mode` defaults to single-agent dispatch.
    pub async fn submit(
        &self,
        prompt: &str,
        context: Option<&str>,
        mode: Option<CollaborationMode>,
    ) -> TaskResult {
        let started = Instant::now();
        let mode = mode.unwrap_or_default();
        let categories = self.classifier.classify(prompt, context);
        let task = Task::new(prompt, context.map(str::to_string), mode, categories);
        let query = self
            .cache
            .query(prompt, context, task.top_category(), mode);

        if let Some(entry) = self.cache.lookup(&query) {
            info!(
                task_id = %task.id,
                strategy = ?entry.strategy,
                fingerprint = %entry.fingerprint,
                "Answered from cache"
            );
            return TaskResult::from_cache(&task, entry, started);
        }

        let (mut result, led) = self
            .flights
            .run(query.fingerprint.clone(), || self.execute(task, &query, started))
            .await;
        if !led {
            result.coalesced = true;
            result.latency_ms = started.elapsed().as_millis() as u64;
        }
        result
    }

    async fn execute(&self, mut task: Task, query: &CacheQuery, started: Instant) -> TaskResult {
        // A leader that finished between our lookup and now may have filled the entry.
        if let Some(entry) = self.cache.lookup_exact(query) {
            return TaskResult::from_cache(&task, entry, started);
        }

        let decision = self.router.route(&task);
        task.mark_routed(decision.agents.clone(), decision.degraded);
        if decision.degraded {
            warn!(task_id = %task.id, agents = ?decision.agents, "Degraded routing");
        }

        let mut agents = decision.agents;
        agents.extend(decision.alternates);
        let dispatcher = Dispatcher::new(
            &self.pool,
            &self.router,
            &self.sink,
            self.engine.config().call_timeout(),
            self.engine.budget(task.mode, agents.len()),
        );

        task.mark_executing();
        let outcome = self.engine.run(&task, agents, &dispatcher).await;

        if outcome.text.trim().is_empty() {
            task.mark_failed("no agent produced an answer");
        } else {
            task.mark_completed();
            if !outcome.aborted {
                self.cache.store(
                    query,
                    CachedAnswer {
                        text: outcome.text.clone(),
                        contributing_agents: outcome.contributors.clone(),
                        confidence: outcome.confidence,
                    },
                    outcome.quality,
                );
            }
        }

        // Without a running health loop the sink is only emptied here and in
        // `snapshot`.
        self.monitor.drain();

        let result = TaskResult::from_outcome(&task, outcome, started);
        info!(
            task_id = %result.task_id,
            mode = %result.mode,
            category = %task.top_category(),
            agents = ?result.contributing_agents,
            confidence = result.confidence,
            degraded = result.degraded_routing,
            latency_ms = result.latency_ms,
            state = ?task.state,
            "Task finished"
        );
        result
    }

    /// Per-agent health, scores and latency, plus cache counters and recent alerts.
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.monitor.drain();
        let agents = self
            .router
            .store()
            .profiles()
            .into_iter()
            .map(|p| {
                let stats = self.monitor.stats(&p.id);
                AgentSnapshot {
                    mean_score: p.mean_score(),
                    id: p.id,
                    capabilities: p.capabilities,
                    health: p.health,
                    consecutive_failures: p.consecutive_failures,
                    scores: p.scores,
                    recent_latency_ms: p.recent_latency_ms,
                    p95_latency_ms: stats.p95_latency_ms,
                    error_rate: stats.error_rate,
                }
            })
            .collect();
        OrchestratorSnapshot {
            generated_at: Utc::now(),
            agents,
            cache: self.cache.stats(),
            alerts: self.monitor.recent_alerts(),
        }
    }
}
