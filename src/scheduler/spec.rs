use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    Unassigned,
    Running,
    Finished,
}

impl std::fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecStatus::Unassigned => write!(f, "unassigned"),
            SpecStatus::Running => write!(f, "running"),
            SpecStatus::Finished => write!(f, "finished"),
        }
    }
}

/// One test file inside a session backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub id: String,
    pub session_id: String,
    pub file_path: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub assigned_worker: Option<String>,
    pub estimated_duration_ms: Option<i64>,
    pub passed: Option<bool>,
}

impl Spec {
    pub fn new(session_id: &str, file_path: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            file_path,
            start: None,
            end: None,
            assigned_worker: None,
            estimated_duration_ms: None,
            passed: None,
        }
    }

    pub fn status(&self) -> SpecStatus {
        match (self.start, self.end) {
            (None, _) => SpecStatus::Unassigned,
            (Some(_), None) => SpecStatus::Running,
            (Some(_), Some(_)) => SpecStatus::Finished,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    /// Running and held by `worker_id`.
    pub fn is_running_on(&self, worker_id: &str) -> bool {
        self.status() == SpecStatus::Running && self.assigned_worker.as_deref() == Some(worker_id)
    }

    /// Whether `next` may hand this spec out at `now`.
    ///
    /// Unassigned specs are always claimable. A running spec is claimable only
    /// when a lease is configured and its claim is older than the lease.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: Option<Duration>) -> bool {
        match (self.status(), self.start, lease) {
            (SpecStatus::Unassigned, _, _) => true,
            (SpecStatus::Running, Some(start), Some(lease)) => now - start >= lease,
            _ => false,
        }
    }

    /// Whether a claim at `now` would take the spec over from an expired holder.
    pub fn is_lease_expired(&self, now: DateTime<Utc>, lease: Option<Duration>) -> bool {
        self.status() == SpecStatus::Running && self.is_claimable(now, lease)
    }
}
