//! Agent adapters: one uniform call contract over every backing provider.
//!
//! # Main types
//!
//! - [`AgentAdapter`]: Trait each provider backend implements.
//! - [`Invocation`]: Text, latency and success flag of one call.
//! - [`AgentPool`]: Adapters keyed by agent id, with timeout-bounded `invoke`.
//! - [`ModelConfig`]: Provider, model and credentials for one agent.
#![allow(missing_docs)]

pub mod adapter;
pub mod backends;
pub mod config;
pub mod pool;

pub use adapter::{AgentAdapter, Invocation};
pub use backends::build_adapter;
pub use config::{ModelConfig, ProviderKind};
pub use pool::AgentPool;
