use crate::adapter::{AgentAdapter, Invocation};
use ensemble_core::AgentId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The set of adapters the process was configured with, keyed by agent id.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct AgentPool {
    adapters: HashMap<AgentId, Arc<dyn AgentAdapter>>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for `agent_id`.
    pub fn register(&mut self, agent_id: impl Into<AgentId>, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(agent_id.into(), adapter);
    }

    pub fn with(mut self, agent_id: impl Into<AgentId>, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.register(agent_id, adapter);
        self
    }

    pub fn get(&self, agent_id: &str) -> Option<&Arc<dyn AgentAdapter>> {
        self.adapters.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.adapters.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Call one agent with a hard timeout.
    ///
    /// Never returns an error: provider failures, unknown agents and expired
    /// deadlines all come back as an unsuccessful [`Invocation`].
    pub async fn invoke(
        &self,
        agent_id: &str,
        prompt: &str,
        context: Option<&str>,
        timeout: Duration,
    ) -> Invocation {
        let Some(adapter) = self.adapters.get(agent_id) else {
            warn!(agent = %agent_id, "Invocation for unregistered agent");
            return Invocation::failed(agent_id, "agent not registered", 0);
        };

        let start = Instant::now();
        let result = tokio::time::timeout(timeout, adapter.complete(prompt, context)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(text)) => {
                debug!(agent = %agent_id, provider = adapter.provider(), latency_ms, "Agent call succeeded");
                Invocation::ok(agent_id, text, latency_ms)
            }
            Ok(Err(e)) => {
                warn!(agent = %agent_id, provider = adapter.provider(), latency_ms, error = %e, "Agent call failed");
                Invocation::failed(agent_id, e.to_string(), latency_ms)
            }
            Err(_) => {
                warn!(
                    agent = %agent_id,
                    provider = adapter.provider(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Agent call timed out"
                );
                Invocation::timeout(agent_id, latency_ms)
            }
        }
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&AgentId> = self.adapters.keys().collect();
        ids.sort();
        f.debug_struct("AgentPool").field("agents", &ids).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ensemble_core::{EnsembleError, EnsembleResult};

    struct Slow(u64);

    #[async_trait]
    impl AgentAdapter for Slow {
        fn provider(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str, _context: Option<&str>) -> EnsembleResult<String> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            Ok("done".to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentAdapter for Broken {
        fn provider(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _prompt: &str, _context: Option<&str>) -> EnsembleResult<String> {
            Err(EnsembleError::Http("503 Service Unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let pool = AgentPool::new().with("fast", Arc::new(Slow(0)));
        let inv = pool.invoke("fast", "hi", None, Duration::from_secs(1)).await;
        assert!(inv.success);
        assert_eq!(inv.text, "done");
        assert!(inv.error.is_none());
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_failure() {
        let pool = AgentPool::new().with("slow", Arc::new(Slow(500)));
        let inv = pool.invoke("slow", "hi", None, Duration::from_millis(20)).await;
        assert!(!inv.success);
        assert!(inv.timed_out);
        assert!(inv.latency_ms < 500);
    }

    #[tokio::test]
    async fn test_invoke_provider_error() {
        let pool = AgentPool::new().with("broken", Arc::new(Broken));
        let inv = pool.invoke("broken", "hi", None, Duration::from_secs(1)).await;
        assert!(!inv.success);
        assert!(!inv.timed_out);
        assert!(inv.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_agent() {
        let pool = AgentPool::new();
        let inv = pool.invoke("ghost", "hi", None, Duration::from_secs(1)).await;
        assert!(!inv.success);
        assert_eq!(inv.agent_id, "ghost");
    }
}
