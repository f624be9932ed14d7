//! Multi-agent collaboration protocols.
//!
//! Every protocol enters with a routed [`Task`] and its selected agents and
//! exits with a [`CollaborationOutcome`]. Rounds run strictly one after
//! another; calls inside a round run concurrently. A failed call drops that
//! agent's contribution for the round and nothing is retried mid-protocol.

mod consensus;
mod devils_advocate;
mod parallel;
mod peer_review;
pub mod prompts;
mod sequential;
mod single;
mod teams;

use crate::config::CollaborationConfig;
use crate::monitor::MetricSink;
use crate::quality::{QualityScore, QualityScorer};
use crate::router::TaskRouter;
use crate::types::{AgentProfile, Contribution, ContributionRole, MetricSample, Round, Task};
use ensemble_agent::{AgentPool, Invocation};
use ensemble_core::{AgentId, CollaborationMode, TaskCategory};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confidence multiplier applied when a protocol aborts.
const ABORT_PENALTY: f64 = 0.5;

/// One agent call to issue within a round.
#[derive(Debug, Clone)]
pub struct Call {
    pub agent_id: AgentId,
    pub prompt: String,
    pub context: Option<String>,
    /// Category the outcome is credited to.
    pub category: TaskCategory,
}

impl Call {
    pub fn new(
        agent_id: impl Into<AgentId>,
        prompt: impl Into<String>,
        context: Option<String>,
        category: TaskCategory,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            context,
            category,
        }
    }
}

/// Issues agent calls under the per-call timeout and the task deadline, and
/// reports every outcome to the router and the health monitor.
pub struct Dispatcher<'a> {
    pool: &'a AgentPool,
    router: &'a TaskRouter,
    sink: &'a MetricSink,
    call_timeout: Duration,
    deadline: Instant,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        pool: &'a AgentPool,
        router: &'a TaskRouter,
        sink: &'a MetricSink,
        call_timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            pool,
            router,
            sink,
            call_timeout,
            deadline: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn profile(&self, agent_id: &str) -> Option<AgentProfile> {
        self.router.store().profile(agent_id)
    }

    /// Issue one call. Never fails; an empty answer counts as a failure.
    pub async fn call(&self, call: Call) -> Invocation {
        let timeout = self.call_timeout.min(self.remaining());
        if timeout.is_zero() {
            debug!(agent = %call.agent_id, "Deadline reached; call skipped");
            return Invocation::timeout(call.agent_id, 0);
        }

        let mut inv = self
            .pool
            .invoke(&call.agent_id, &call.prompt, call.context.as_deref(), timeout)
            .await;
        if inv.success && inv.text.trim().is_empty() {
            inv = Invocation::failed(inv.agent_id, "empty response", inv.latency_ms);
        }

        self.router
            .record_outcome(&inv.agent_id, call.category, inv.success, inv.latency_ms);
        self.sink.record(MetricSample::new(
            inv.agent_id.clone(),
            inv.latency_ms,
            inv.success,
        ));
        inv
    }

    /// Issue all calls concurrently; results keep the order of `calls`.
    pub async fn round(&self, calls: Vec<Call>) -> Vec<Invocation> {
        join_all(calls.into_iter().map(|c| self.call(c))).await
    }
}

/// Request-scoped state of one protocol run.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    pub task_id: Uuid,
    pub mode: CollaborationMode,
    pub agents: Vec<AgentId>,
    pub rounds: Vec<Round>,
    pub aborted: bool,
    prompt: String,
    scorer: QualityScorer,
}

impl CollaborationSession {
    pub fn new(task: &Task, agents: Vec<AgentId>, scorer: QualityScorer) -> Self {
        Self {
            task_id: task.id,
            mode: task.mode,
            agents,
            rounds: Vec::new(),
            aborted: false,
            prompt: task.prompt.clone(),
            scorer,
        }
    }

    pub fn score(&self, text: &str) -> QualityScore {
        self.scorer.score(&self.prompt, text)
    }

    /// Record the successful invocations of a round and return its contributions.
    ///
    /// Failed calls are logged and dropped. Nothing is recorded when every
    /// call failed.
    pub fn record_round(
        &mut self,
        phase: &str,
        results: &[(Invocation, ContributionRole)],
    ) -> Vec<Contribution> {
        let mut contributions = Vec::new();
        for (inv, role) in results {
            if inv.success {
                contributions.push(Contribution {
                    agent_id: inv.agent_id.clone(),
                    role: role.clone(),
                    text: inv.text.clone(),
                    latency_ms: inv.latency_ms,
                    quality: self.score(&inv.text).composite,
                });
            } else {
                warn!(
                    task_id = %self.task_id,
                    agent = %inv.agent_id,
                    phase,
                    timed_out = inv.timed_out,
                    error = inv.error.as_deref().unwrap_or("unknown"),
                    "Contribution dropped"
                );
            }
        }
        if !contributions.is_empty() {
            self.rounds.push(Round {
                index: self.rounds.len() as u32 + 1,
                phase: phase.to_string(),
                contributions: contributions.clone(),
            });
        }
        contributions
    }

    pub fn abort(&mut self, reason: &str) {
        warn!(task_id = %self.task_id, mode = %self.mode, reason, "Protocol aborted");
        self.aborted = true;
    }

    /// Distinct agents with at least one recorded contribution, in first-seen order.
    pub fn contributors(&self) -> Vec<AgentId> {
        let mut out: Vec<AgentId> = Vec::new();
        for c in self.rounds.iter().flat_map(|r| &r.contributions) {
            if !out.contains(&c.agent_id) {
                out.push(c.agent_id.clone());
            }
        }
        out
    }

    /// Share of issued calls that succeeded, across all recorded and dropped calls.
    fn success_ratio(&self, attempted: usize) -> f64 {
        if attempted == 0 {
            return 0.0;
        }
        let succeeded: usize = self.rounds.iter().map(|r| r.contributions.len()).sum();
        (succeeded as f64 / attempted as f64).min(1.0)
    }

    /// Close the session with a merged answer.
    ///
    /// Confidence is `base` scaled by the success ratio and halved if the
    /// protocol aborted.
    pub fn conclude(self, text: String, base: f64, attempted: usize) -> CollaborationOutcome {
        let quality = self.score(&text);
        let mut confidence = base.clamp(0.0, 1.0) * self.success_ratio(attempted);
        if self.aborted {
            confidence *= ABORT_PENALTY;
        }
        if text.trim().is_empty() {
            confidence = 0.0;
        }
        let contributors = self.contributors();
        info!(
            task_id = %self.task_id,
            mode = %self.mode,
            rounds = self.rounds.len(),
            contributors = contributors.len(),
            confidence,
            aborted = self.aborted,
            "Collaboration concluded"
        );
        CollaborationOutcome {
            text,
            confidence,
            contributors,
            quality,
            aborted: self.aborted,
            rounds: self.rounds,
        }
    }

    /// Close a session that produced nothing.
    pub fn fail(mut self, attempted: usize) -> CollaborationOutcome {
        self.aborted = true;
        self.conclude(String::new(), 0.0, attempted)
    }
}

/// Merged result of a protocol run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationOutcome {
    pub text: String,
    pub confidence: f64,
    pub contributors: Vec<AgentId>,
    pub quality: QualityScore,
    pub rounds: Vec<Round>,
    pub aborted: bool,
}

/// Drives the protocol selected by a task's collaboration mode.
#[derive(Debug, Clone)]
pub struct CollaborationEngine {
    config: CollaborationConfig,
    scorer: QualityScorer,
}

impl CollaborationEngine {
    pub fn new(config: CollaborationConfig, scorer: QualityScorer) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &CollaborationConfig {
        &self.config
    }

    /// Wall-clock budget for one run: the protocol budget, capped by the task deadline.
    pub fn budget(&self, mode: CollaborationMode, agents: usize) -> Duration {
        self.config
            .budget_for(mode, agents)
            .min(self.config.task_deadline())
    }

    /// Run the task's protocol over `agents` (ranked best first). For single
    /// dispatch the agents after the first are failover alternates.
    pub async fn run(
        &self,
        task: &Task,
        agents: Vec<AgentId>,
        dispatcher: &Dispatcher<'_>,
    ) -> CollaborationOutcome {
        let session = CollaborationSession::new(task, agents, self.scorer.clone());
        if session.agents.is_empty() {
            return session.fail(0);
        }
        info!(
            task_id = %task.id,
            mode = %task.mode,
            agents = ?session.agents,
            "Collaboration started"
        );
        match task.mode {
            CollaborationMode::None => single::run(session, task, dispatcher).await,
            CollaborationMode::Parallel => {
                parallel::run(session, task, dispatcher, parallel::Framing::Plain).await
            }
            CollaborationMode::Brainstorming => {
                parallel::run(session, task, dispatcher, parallel::Framing::Brainstorm).await
            }
            CollaborationMode::Consensus => {
                consensus::run(session, task, dispatcher, &self.config).await
            }
            CollaborationMode::DevilsAdvocate => {
                devils_advocate::run(session, task, dispatcher).await
            }
            CollaborationMode::PeerReview => {
                peer_review::run(session, task, dispatcher, peer_review::Framing::Review).await
            }
            CollaborationMode::CriticalAnalysis => {
                peer_review::run(session, task, dispatcher, peer_review::Framing::Critical).await
            }
            CollaborationMode::SpecializedTeams => teams::run(session, task, dispatcher).await,
            CollaborationMode::Sequential => sequential::run(session, task, dispatcher).await,
        }
    }
}

/// Index of the highest-quality contribution; ties keep the earlier one.
pub(crate) fn best_by_quality(contributions: &[Contribution]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in contributions.iter().enumerate() {
        match best {
            Some(b) if contributions[b].quality >= c.quality => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted adapters shared by the protocol tests.

    use async_trait::async_trait;
    use ensemble_agent::AgentAdapter;
    use ensemble_core::{EnsembleError, EnsembleResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Reply = Box<dyn Fn(&str, Option<&str>) -> EnsembleResult<String> + Send + Sync>;

    pub struct Scripted {
        reply: Reply,
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Scripted {
        pub fn new(
            reply: impl Fn(&str, Option<&str>) -> EnsembleResult<String> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn fixed(text: &str) -> Arc<Self> {
            let text = text.to_string();
            Self::new(move |_, _| Ok(text.clone()))
        }

        pub fn failing() -> Arc<Self> {
            Self::new(|_, _| Err(EnsembleError::Agent("scripted failure".into())))
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentAdapter for Scripted {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str, context: Option<&str>) -> EnsembleResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .push((prompt.to_string(), context.map(str::to_string)));
            (self.reply)(prompt, context)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod harness {
    //! Minimal wiring to drive a protocol without the orchestrator facade.

    use super::*;
    use crate::config::{HealthConfig, RoutingConfig};
    use crate::monitor::HealthMonitor;
    use crate::performance::PerformanceStore;
    use crate::profiles::AgentSeed;
    use crate::types::CategoryMatch;
    use ensemble_agent::AgentAdapter;
    use std::sync::Arc;

    pub struct Harness {
        pub pool: AgentPool,
        pub router: TaskRouter,
        pub monitor: HealthMonitor,
        pub sink: MetricSink,
        pub engine: CollaborationEngine,
    }

    #[derive(Default)]
    pub struct HarnessBuilder {
        pool: AgentPool,
        seeds: Vec<AgentSeed>,
        config: CollaborationConfig,
    }

    impl HarnessBuilder {
        pub fn agent(mut self, id: &str, caps: &[&str], adapter: Arc<dyn AgentAdapter>) -> Self {
            self.pool.register(id, adapter);
            self.seeds.push(AgentSeed {
                id: id.to_string(),
                capabilities: caps.iter().map(|c| c.to_string()).collect(),
            });
            self
        }

        pub fn config(mut self, config: CollaborationConfig) -> Self {
            self.config = config;
            self
        }

        pub fn build(self) -> Harness {
            let routing = RoutingConfig::default();
            let store = Arc::new(PerformanceStore::new(self.seeds, &routing));
            let router = TaskRouter::new(store.clone(), routing);
            let monitor = HealthMonitor::new(store, self.pool.clone(), HealthConfig::default());
            let sink = monitor.sink();
            Harness {
                pool: self.pool,
                router,
                monitor,
                sink,
                engine: CollaborationEngine::new(self.config, QualityScorer::new()),
            }
        }
    }

    impl Harness {
        pub fn builder() -> HarnessBuilder {
            HarnessBuilder::default()
        }

        pub fn task(&self, prompt: &str, mode: CollaborationMode, categories: &[TaskCategory]) -> Task {
            Task::new(
                prompt,
                None,
                mode,
                categories
                    .iter()
                    .map(|c| CategoryMatch {
                        category: *c,
                        confidence: 1.0 / categories.len() as f64,
                    })
                    .collect(),
            )
        }

        pub async fn run(&self, task: &Task, agents: &[&str]) -> CollaborationOutcome {
            let dispatcher = Dispatcher::new(
                &self.pool,
                &self.router,
                &self.sink,
                self.engine.config().call_timeout(),
                self.engine.budget(task.mode, agents.len()),
            );
            self.engine
                .run(task, agents.iter().map(|a| a.to_string()).collect(), &dispatcher)
                .await
        }
    }
}
