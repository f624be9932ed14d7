//! Task routing and multi-agent collaboration engine.
//!
//! Classifies incoming tasks, routes them to the best-performing agents,
//! runs a collaboration protocol when more than one agent takes part, and
//! caches quality-scored answers. A background health monitor adjusts agent
//! availability from observed latency and error rates.
//!
//! # Main types
//!
//! - [`Orchestrator`]: facade owning every registry; `submit` answers a task.
//! - [`TaskClassifier`]: keyword-signature classification into [`TaskCategory`](ensemble_core::TaskCategory).
//! - [`TaskRouter`]: score-weighted agent selection with an EMA feedback loop.
//! - [`ResponseCache`]: exact, near-duplicate and pattern lookup with quality gating.
//! - [`CollaborationEngine`]: the collaboration protocols.
//! - [`HealthMonitor`]: rolling-window health evaluation and alerts.

/// Response cache with three lookup strategies.
pub mod cache;
/// Keyword-signature task classification.
pub mod classifier;
/// Collaboration protocols and round dispatch.
pub mod collaboration;
/// Startup configuration.
pub mod config;
/// The orchestrator facade.
pub mod engine;
/// Single-flight coalescing of identical in-flight work.
pub mod flight;
/// Agent health monitoring.
pub mod monitor;
/// Per-agent, per-category performance scores.
pub mod performance;
/// JSON persistence of learned scores.
pub mod persistence;
/// Capability tag normalisation.
pub mod profiles;
/// Multi-dimensional answer quality scoring.
pub mod quality;
/// Agent selection.
pub mod router;
/// Text normalisation and similarity measures.
pub mod similarity;
/// Shared orchestration types.
pub mod types;

pub use cache::{CacheEntry, CacheStats, CachedAnswer, Fingerprint, MatchStrategy, ResponseCache};
pub use classifier::TaskClassifier;
pub use collaboration::{CollaborationEngine, CollaborationOutcome, CollaborationSession};
pub use config::{
    AgentConfig, CacheConfig, CollaborationConfig, EnsembleConfig, HealthConfig, RoutingConfig,
};
pub use engine::{AgentSnapshot, Orchestrator, OrchestratorSnapshot, TaskResult};
pub use flight::SingleFlight;
pub use monitor::{AlertKind, HealthAlert, HealthMonitor, MetricSink, MonitorHandle};
pub use performance::PerformanceStore;
pub use persistence::JsonSnapshotStore;
pub use quality::{QualityScore, QualityScorer};
pub use router::{RoutingDecision, TaskRouter};
pub use types::{
    AgentProfile, CategoryMatch, Contribution, ContributionRole, MetricSample, Round, Task,
    TaskState,
};
