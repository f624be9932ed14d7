use crate::performance::PerformanceStore;
use chrono::{DateTime, Utc};
use ensemble_core::{AgentId, EnsembleError, EnsembleResult, TaskCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_NAME: &str = "performance.json";

/// On-disk form of the performance scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub saved_at: DateTime<Utc>,
    pub agents: BTreeMap<AgentId, BTreeMap<TaskCategory, f64>>,
}

impl PerformanceSnapshot {
    pub fn capture(store: &PerformanceStore) -> Self {
        Self {
            saved_at: Utc::now(),
            agents: store
                .profiles()
                .into_iter()
                .map(|p| (p.id, p.scores))
                .collect(),
        }
    }
}

/// JSON persistence of learned scores, one file in the data directory.
pub struct JsonSnapshotStore {
    base_dir: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir.join(FILE_NAME)
    }

    /// Write the current scores. Returns the path written.
    pub async fn save(&self, store: &PerformanceStore) -> EnsembleResult<PathBuf> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let snapshot = PerformanceSnapshot::capture(store);
        let json = serde_json::to_string_pretty(&snapshot)?;

        // Replace atomically via rename.
        let path = self.path();
        let tmp = self.base_dir.join(format!("{FILE_NAME}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!(path = %path.display(), agents = snapshot.agents.len(), "Performance scores saved");
        Ok(path)
    }

    pub async fn load(&self) -> EnsembleResult<Option<PerformanceSnapshot>> {
        let path = self.path();
        if !path_exists(&path).await {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let snapshot = serde_json::from_str(&content).map_err(|e| {
            EnsembleError::Persistence(format!("Unreadable snapshot {}: {e}", path.display()))
        })?;
        Ok(Some(snapshot))
    }

    /// Restore saved scores into `store`. Agents that are no longer configured
    /// are skipped. Returns how many agents were restored.
    pub async fn restore(&self, store: &PerformanceStore) -> EnsembleResult<usize> {
        let Some(snapshot) = self.load().await? else {
            debug!(path = %self.path().display(), "No saved performance scores");
            return Ok(0);
        };
        let mut restored = 0;
        for (agent, scores) in &snapshot.agents {
            if store.restore_scores(agent, scores) {
                restored += 1;
            } else {
                warn!(agent = %agent, "Saved scores for unknown agent ignored");
            }
        }
        info!(restored, saved_at = %snapshot.saved_at, "Performance scores restored");
        Ok(restored)
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
