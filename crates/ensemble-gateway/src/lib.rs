//! HTTP surface of the Ensemble engine.
//!
//! `POST /v1/tasks` submits a task, `GET /v1/agents` returns the health and
//! performance snapshot, `GET /v1/alerts` the recent health alerts and
//! `GET /health` a liveness probe.

/// Request logging middleware.
pub mod middleware;
/// Request/response types and handlers.
pub mod router;
/// Router assembly.
pub mod server;

pub use router::{ApiError, TaskRequest};
pub use server::{GatewayConfig, GatewayServer};
