use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Storage;

/// Which statistic of a [`DurationRecord`] the scheduler trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationEstimate {
    /// Duration observed in the most recent ended session.
    #[default]
    Latest,
    /// Mean over every ended session that ran the spec.
    Mean,
}

impl std::fmt::Display for DurationEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationEstimate::Latest => write!(f, "latest"),
            DurationEstimate::Mean => write!(f, "mean"),
        }
    }
}

/// Observed run time of one spec path within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DurationRecord {
    pub last_ms: i64,
    pub total_ms: i64,
    pub samples: u64,
}

impl DurationRecord {
    pub fn observe(&mut self, duration_ms: i64) {
        self.last_ms = duration_ms;
        self.total_ms = self.total_ms.saturating_add(duration_ms);
        self.samples += 1;
    }

    /// Integer mean, rounded down.
    pub fn mean_ms(&self) -> i64 {
        if self.samples == 0 {
            return 0;
        }
        self.total_ms / self.samples as i64
    }

    pub fn estimate(&self, policy: DurationEstimate) -> i64 {
        match policy {
            DurationEstimate::Latest => self.last_ms,
            DurationEstimate::Mean => self.mean_ms(),
        }
    }
}

/// Per-project duration lookups on top of the storage backend.
#[derive(Clone)]
pub struct DurationHistory {
    storage: Arc<dyn Storage>,
    estimate: DurationEstimate,
}

impl DurationHistory {
    pub fn new(storage: Arc<dyn Storage>, estimate: DurationEstimate) -> Self {
        Self { storage, estimate }
    }

    pub async fn record_duration(&self, project: &str, spec_path: &str, duration_ms: i64) -> Result<()> {
        self.storage
            .record_duration(project, spec_path, duration_ms.max(0))
            .await
    }

    /// Fold an ended session's spec durations into project history.
    /// Returns false if they were already folded in.
    pub async fn record_session(&self, session_id: &str) -> Result<bool> {
        self.storage.record_session_durations(session_id).await
    }

    pub async fn lookup_duration(&self, project: &str, spec_path: &str) -> Result<Option<i64>> {
        Ok(self
            .storage
            .lookup_duration(project, spec_path)
            .await?
            .map(|record| record.estimate(self.estimate)))
    }

    /// Expected duration for each path, with gaps filled by [`fill_unknown`].
    pub async fn expected_durations(&self, project: &str, spec_paths: &[&str]) -> Result<Vec<i64>> {
        let mut known = Vec::with_capacity(spec_paths.len());
        for path in spec_paths {
            known.push(self.lookup_duration(project, path).await?);
        }
        Ok(fill_unknown(&known))
    }
}

/// Replace missing durations with the mean of the known ones (rounded down),
/// or zero when nothing is known.
pub fn fill_unknown(known: &[Option<i64>]) -> Vec<i64> {
    let (sum, count) = known
        .iter()
        .flatten()
        .fold((0i64, 0i64), |(sum, count), d| (sum.saturating_add(*d), count + 1));
    let fallback = if count == 0 { 0 } else { sum / count };

    known.iter().map(|d| d.unwrap_or(fallback)).collect()
}
