//! Core types and error definitions for the Ensemble engine.
//!
//! This crate provides the vocabulary shared by the agent adapters, the
//! routing/collaboration core and the outer surfaces (gateway, CLI).
//!
//! # Main types
//!
//! - [`EnsembleError`]: Unified error enum for all Ensemble subsystems.
//! - [`EnsembleResult`]: Convenience alias for `Result<T, EnsembleError>`.
//! - [`TaskCategory`]: Category a task is classified into, in priority order.
//! - [`CollaborationMode`]: Requested multi-agent protocol (or single dispatch).
//! - [`HealthState`]: Availability of a backing agent.

/// Task categories and capability tags.
pub mod category;
/// Error types.
pub mod error;
/// Collaboration modes.
pub mod mode;

pub use category::TaskCategory;
pub use error::{EnsembleError, EnsembleResult};
pub use mode::CollaborationMode;

use serde::{Deserialize, Serialize};

/// Identifier of a configured agent (unique per process).
pub type AgentId = String;

/// Availability of an agent as judged by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Answering normally.
    #[default]
    Healthy,
    /// Failing intermittently or slow; still routable at reduced weight.
    Degraded,
    /// Excluded from routing until it recovers.
    Unavailable,
}

impl HealthState {
    /// Multiplier applied to performance scores when ranking candidates.
    pub fn routing_weight(&self) -> f64 {
        match self {
            HealthState::Healthy => 1.0,
            HealthState::Degraded => 0.5,
            HealthState::Unavailable => 0.0,
        }
    }

    /// Whether the router may select an agent in this state.
    pub fn is_routable(&self) -> bool {
        !matches!(self, HealthState::Unavailable)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unavailable => write!(f, "unavailable"),
        }
    }
}
