use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::scheduler::spec::{Spec, SpecStatus};

/// Result of trying to claim one spec.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The caller now holds the spec.
    Claimed {
        spec: Spec,
        /// True when this claim also set the session start.
        session_started: bool,
        /// Worker whose expired lease was taken over, if any.
        reclaimed_from: Option<String>,
    },
    /// Someone else got there first.
    Taken,
}

/// A spec finished by a completion report.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub spec: Spec,
    /// Every spec in the backlog now has an end time.
    pub session_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// This call set the session end.
    Finished(Session),
    /// The session had already ended; nothing changed.
    AlreadyEnded,
    /// Some specs have no end time yet.
    Unfinished { remaining: usize },
}

/// One parallel test run and its ledger of specs.
///
/// All mutation goes through the methods below so every storage backend
/// enforces the same transitions. Callers are expected to hold an exclusive
/// lock on the session for the duration of each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub backlog: Vec<Spec>,
    /// Spec durations have been written to project history.
    #[serde(default)]
    pub history_recorded: bool,
}

impl Session {
    /// Build a session with a fresh ledger, validating the inputs first.
    pub fn new(
        id: &str,
        project_name: &str,
        spec_paths: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(SplitError::InvalidArgument(
                "session id cannot be empty".to_string(),
            ));
        }
        if project_name.trim().is_empty() {
            return Err(SplitError::InvalidArgument(
                "project name cannot be empty".to_string(),
            ));
        }
        if spec_paths.is_empty() {
            return Err(SplitError::InvalidArgument(
                "session needs at least one spec".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(spec_paths.len());
        for path in spec_paths {
            if path.trim().is_empty() {
                return Err(SplitError::InvalidArgument(
                    "spec path cannot be empty".to_string(),
                ));
            }
            if !seen.insert(path.as_str()) {
                return Err(SplitError::InvalidArgument(format!(
                    "duplicate spec path {}",
                    path
                )));
            }
        }

        Ok(Self {
            id: id.to_string(),
            project_name: project_name.to_string(),
            created_at,
            start: None,
            end: None,
            history_recorded: false,
            backlog: spec_paths
                .iter()
                .map(|path| Spec::new(id, path.clone()))
                .collect(),
        })
    }

    pub fn spec(&self, spec_id: &str) -> Option<&Spec> {
        self.backlog.iter().find(|s| s.id == spec_id)
    }

    /// Specs `next` may hand out at `now`, in backlog order.
    pub fn candidates(&self, now: DateTime<Utc>, lease: Option<Duration>) -> Vec<&Spec> {
        self.backlog
            .iter()
            .filter(|s| s.is_claimable(now, lease))
            .collect()
    }

    pub fn count(&self, status: SpecStatus) -> usize {
        self.backlog.iter().filter(|s| s.status() == status).count()
    }

    pub fn all_finished(&self) -> bool {
        self.backlog.iter().all(Spec::is_finished)
    }

    pub fn is_ended(&self) -> bool {
        self.end.is_some()
    }

    /// Claim `spec_id` for `worker_id` if it is still claimable.
    ///
    /// Sets the session start on the first claim. A claim stamped earlier
    /// than the session start is moved up to it.
    pub fn claim(
        &mut self,
        spec_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Result<ClaimOutcome> {
        let session_id = self.id.clone();
        let start = self.start.map_or(now, |session_start| now.max(session_start));
        let spec = self
            .backlog
            .iter_mut()
            .find(|s| s.id == spec_id)
            .ok_or_else(|| {
                SplitError::NotFound(format!("spec {} in session {}", spec_id, session_id))
            })?;

        if !spec.is_claimable(now, lease) {
            return Ok(ClaimOutcome::Taken);
        }

        let reclaimed_from = if spec.is_lease_expired(now, lease) {
            spec.assigned_worker.take()
        } else {
            None
        };

        spec.start = Some(start);
        spec.assigned_worker = Some(worker_id.to_string());
        let spec = spec.clone();

        let session_started = self.start.is_none();
        if session_started {
            self.start = Some(now);
        }

        Ok(ClaimOutcome::Claimed {
            spec,
            session_started,
            reclaimed_from,
        })
    }

    /// Finish the spec `worker_id` is running.
    ///
    /// If the worker holds more than one running spec the earliest claim is
    /// finished first. Returns `None` when the worker holds nothing, which
    /// makes repeated reports harmless.
    pub fn complete(
        &mut self,
        worker_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Option<Completion> {
        let spec = self
            .backlog
            .iter_mut()
            .filter(|s| s.is_running_on(worker_id))
            .min_by_key(|s| s.start)?;

        let start = spec.start?;
        let end = now.max(start);
        spec.end = Some(end);
        spec.estimated_duration_ms = Some((end - start).num_milliseconds());
        spec.passed = Some(passed);
        let spec = spec.clone();

        Some(Completion {
            spec,
            session_complete: self.all_finished(),
        })
    }

    /// Set the session end once every spec has finished.
    pub fn finish(&mut self, now: DateTime<Utc>) -> FinishOutcome {
        if self.is_ended() {
            return FinishOutcome::AlreadyEnded;
        }
        let remaining = self.backlog.iter().filter(|s| !s.is_finished()).count();
        if remaining > 0 {
            return FinishOutcome::Unfinished { remaining };
        }

        let last_spec_end = self.backlog.iter().filter_map(|s| s.end).max();
        let end = match last_spec_end {
            Some(last) => now.max(last),
            None => now,
        };
        self.end = Some(end);
        FinishOutcome::Finished(self.clone())
    }

    /// Hand out `(path, duration_ms)` for every finished spec, once.
    ///
    /// Returns `None` before the session has ended and on every call after
    /// the first.
    pub fn take_durations(&mut self) -> Option<Vec<(String, i64)>> {
        if !self.is_ended() || self.history_recorded {
            return None;
        }
        self.history_recorded = true;
        Some(
            self.backlog
                .iter()
                .filter_map(|s| Some((s.file_path.clone(), s.estimated_duration_ms?.max(0))))
                .collect(),
        )
    }
}
