use crate::config::HealthConfig;
use crate::performance::PerformanceStore;
use crate::types::MetricSample;
use chrono::{DateTime, Utc};
use ensemble_agent::AgentPool;
use ensemble_core::{AgentId, EnsembleError, EnsembleResult, HealthState};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Alerts kept for the snapshot and the gateway.
const RECENT_ALERTS: usize = 100;

/// Cloneable handle through which agent calls report metric samples.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<MetricSample>,
}

impl MetricSink {
    pub fn record(&self, sample: MetricSample) {
        // The receiver only goes away at shutdown.
        let _ = self.tx.send(sample);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Error rate crossed the alert threshold while the agent is still healthy.
    ErrorRateRising,
    /// p95 latency above threshold moved the agent to degraded.
    LatencyDegraded,
    /// Consecutive failures moved the agent to degraded.
    Degraded,
    Unavailable,
    Recovered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub agent_id: AgentId,
    pub kind: AlertKind,
    pub message: String,
    pub error_rate: f64,
    pub p95_latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Rolling-window statistics for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStats {
    pub samples: usize,
    pub error_rate: f64,
    pub p95_latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

#[derive(Default)]
struct AgentWindow {
    samples: VecDeque<MetricSample>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    error_alerted: bool,
}

impl AgentWindow {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
    }

    fn stats(&self) -> HealthStats {
        let n = self.samples.len();
        let failures = self.samples.iter().filter(|s| !s.success).count();
        HealthStats {
            samples: n,
            error_rate: if n == 0 { 0.0 } else { failures as f64 / n as f64 },
            p95_latency_ms: p95(self.samples.iter().map(|s| s.latency_ms)),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
        }
    }
}

/// Nearest-rank 95th percentile.
fn p95(latencies: impl Iterator<Item = u64>) -> Option<u64> {
    let mut values: Vec<u64> = latencies.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    values.get(rank.saturating_sub(1)).copied()
}

/// Background health evaluation over agent metric samples.
///
/// The monitor only writes health state into the [`PerformanceStore`]; the
/// router picks it up on its next decision.
pub struct HealthMonitor {
    store: Arc<PerformanceStore>,
    pool: AgentPool,
    config: HealthConfig,
    windows: Mutex<HashMap<AgentId, AgentWindow>>,
    tx: mpsc::UnboundedSender<MetricSample>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<MetricSample>>>,
    alerts: broadcast::Sender<HealthAlert>,
    recent: Mutex<VecDeque<HealthAlert>>,
}

impl HealthMonitor {
    pub fn new(store: Arc<PerformanceStore>, pool: AgentPool, config: HealthConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (alerts, _) = broadcast::channel(64);
        Self {
            store,
            pool,
            config,
            windows: Mutex::new(HashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            alerts,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sink(&self) -> MetricSink {
        MetricSink {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to alerts as they are raised.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthAlert> {
        self.alerts.subscribe()
    }

    /// Most recent alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<HealthAlert> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Fold one sample into the agent's window and streak counters.
    pub fn ingest(&self, sample: MetricSample) {
        if !self.store.contains(&sample.agent_id) {
            debug!(agent = %sample.agent_id, "Ignoring sample for unknown agent");
            return;
        }
        let mut windows = self.windows.lock();
        let window = windows.entry(sample.agent_id.clone()).or_default();
        if sample.success {
            window.consecutive_successes += 1;
            window.consecutive_failures = 0;
        } else {
            window.consecutive_failures += 1;
            window.consecutive_successes = 0;
        }
        window.samples.push_back(sample);
    }

    /// Ingest everything queued on the sink. A no-op while the run loop owns the receiver.
    pub fn drain(&self) -> usize {
        let mut guard = self.rx.lock();
        let Some(rx) = guard.as_mut() else {
            return 0;
        };
        let mut pending = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            pending.push(sample);
        }
        drop(guard);
        let n = pending.len();
        for sample in pending {
            self.ingest(sample);
        }
        n
    }

    pub fn stats(&self, agent_id: &str) -> HealthStats {
        let cutoff = self.cutoff();
        let mut windows = self.windows.lock();
        match windows.get_mut(agent_id) {
            Some(window) => {
                window.prune(cutoff);
                window.stats()
            }
            None => HealthStats::default(),
        }
    }

    fn cutoff(&self) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.config.window())
            .unwrap_or_else(|_| chrono::Duration::seconds(self.config.window_secs as i64));
        Utc::now() - window
    }

    /// Apply health transitions for every agent and return the alerts raised.
    pub fn evaluate(&self) -> Vec<HealthAlert> {
        let cutoff = self.cutoff();
        let mut raised = Vec::new();
        {
            let mut windows = self.windows.lock();
            for agent_id in self.store.ids() {
                let Some(current) = self.store.health(agent_id) else {
                    continue;
                };
                let window = windows.entry(agent_id.clone()).or_default();
                window.prune(cutoff);
                let stats = window.stats();
                let trusted = stats.samples >= self.config.min_samples;
                let slow = trusted
                    && stats
                        .p95_latency_ms
                        .is_some_and(|p| p > self.config.latency_threshold_ms);
                let failing = stats.consecutive_failures >= self.config.degrade_after;

                // Healthy agents step through degraded before unavailable.
                let next = if current == HealthState::Healthy {
                    if failing || slow {
                        HealthState::Degraded
                    } else {
                        HealthState::Healthy
                    }
                } else if stats.consecutive_failures >= self.config.unavailable_after {
                    HealthState::Unavailable
                } else if stats.consecutive_successes >= self.config.recover_after && !slow {
                    HealthState::Healthy
                } else {
                    current
                };

                let alert = |kind: AlertKind, message: String| HealthAlert {
                    agent_id: agent_id.clone(),
                    kind,
                    message,
                    error_rate: stats.error_rate,
                    p95_latency_ms: stats.p95_latency_ms,
                    timestamp: Utc::now(),
                };

                if next == HealthState::Healthy
                    && current == HealthState::Healthy
                    && trusted
                    && stats.error_rate >= self.config.alert_error_rate
                {
                    if !window.error_alerted {
                        window.error_alerted = true;
                        raised.push(alert(
                            AlertKind::ErrorRateRising,
                            format!(
                                "Error rate {:.0}% over the last {} samples",
                                stats.error_rate * 100.0,
                                stats.samples
                            ),
                        ));
                    }
                } else if stats.error_rate < self.config.alert_error_rate {
                    window.error_alerted = false;
                }

                if next != current {
                    self.store
                        .set_health(agent_id, next, stats.consecutive_failures);
                    let transition = match next {
                        HealthState::Degraded if failing => Some(alert(
                            AlertKind::Degraded,
                            format!("{} consecutive failures", stats.consecutive_failures),
                        )),
                        HealthState::Degraded => Some(alert(
                            AlertKind::LatencyDegraded,
                            format!(
                                "p95 latency {} ms above {} ms",
                                stats.p95_latency_ms.unwrap_or_default(),
                                self.config.latency_threshold_ms
                            ),
                        )),
                        HealthState::Unavailable => Some(alert(
                            AlertKind::Unavailable,
                            format!("{} consecutive failures", stats.consecutive_failures),
                        )),
                        HealthState::Healthy => {
                            window.error_alerted = false;
                            Some(alert(
                                AlertKind::Recovered,
                                format!("{} consecutive successes", stats.consecutive_successes),
                            ))
                        }
                    };
                    raised.extend(transition);
                } else {
                    self.store
                        .set_health(agent_id, current, stats.consecutive_failures);
                }
            }
        }

        for alert in &raised {
            self.publish(alert.clone());
        }
        raised
    }

    fn publish(&self, alert: HealthAlert) {
        match alert.kind {
            AlertKind::Recovered => {
                info!(agent = %alert.agent_id, kind = ?alert.kind, "{}", alert.message);
            }
            _ => {
                warn!(
                    agent = %alert.agent_id,
                    kind = ?alert.kind,
                    error_rate = alert.error_rate,
                    p95_latency_ms = ?alert.p95_latency_ms,
                    "Health alert: {}",
                    alert.message
                );
            }
        }
        // No subscribers is fine.
        let _ = self.alerts.send(alert.clone());
        let mut recent = self.recent.lock();
        recent.push_back(alert);
        while recent.len() > RECENT_ALERTS {
            recent.pop_front();
        }
    }

    /// Send the probe prompt to every unavailable agent.
    ///
    /// Probe outcomes feed the health window only, never routing scores.
    pub async fn probe(&self) -> usize {
        if !self.config.probe {
            return 0;
        }
        let targets: Vec<AgentId> = self
            .store
            .ids()
            .iter()
            .filter(|id| self.store.health(id) == Some(HealthState::Unavailable))
            .cloned()
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let timeout = self.config.interval();
        let calls = targets.iter().map(|id| {
            self.pool
                .invoke(id, &self.config.probe_prompt, None, timeout)
        });
        let results = join_all(calls).await;
        for inv in &results {
            debug!(agent = %inv.agent_id, success = inv.success, latency_ms = inv.latency_ms, "Probe");
            self.ingest(MetricSample::probe(
                inv.agent_id.clone(),
                inv.latency_ms,
                inv.success,
            ));
        }
        results.len()
    }

    /// One monitor pass: drain samples, probe unavailable agents, evaluate.
    pub async fn tick(&self) -> Vec<HealthAlert> {
        self.drain();
        self.probe().await;
        self.evaluate()
    }

    /// Spawn the periodic loop. Fails if a loop is already running.
    pub fn spawn(self: &Arc<Self>) -> EnsembleResult<MonitorHandle> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| EnsembleError::Config("Health monitor is already running".into()))?;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = Arc::clone(self);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_ms = monitor.config.interval_ms, "Health monitor started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.probe().await;
                        monitor.evaluate();
                    }
                    sample = rx.recv() => match sample {
                        Some(sample) => monitor.ingest(sample),
                        None => break,
                    },
                    _ = stop_rx.changed() => break,
                }
            }
            *monitor.rx.lock() = Some(rx);
            info!("Health monitor stopped");
        });

        Ok(MonitorHandle {
            stop: stop_tx,
            join,
        })
    }

    /// JSON view for dashboards.
    pub fn to_json(&self) -> serde_json::Value {
        let agents: HashMap<AgentId, HealthStats> = self
            .store
            .ids()
            .iter()
            .map(|id| (id.clone(), self.stats(id)))
            .collect();
        serde_json::json!({
            "agents": agents,
            "alerts": self.recent_alerts(),
        })
    }
}

/// Handle to a running monitor loop.
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}
