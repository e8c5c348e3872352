use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::{Result, SplitError};
use crate::scheduler::history::DurationHistory;
use crate::scheduler::session::{ClaimOutcome, Session};
use crate::scheduler::spec::Spec;
use crate::storage::Storage;

/// Hands out specs longest-expected-first (LPT greedy balancing).
#[derive(Clone)]
pub struct SpecAssigner {
    storage: Arc<dyn Storage>,
    history: DurationHistory,
    clock: Arc<dyn Clock>,
    lease: Option<Duration>,
}

impl SpecAssigner {
    pub fn new(
        storage: Arc<dyn Storage>,
        history: DurationHistory,
        clock: Arc<dyn Clock>,
        lease: Option<Duration>,
    ) -> Self {
        Self {
            storage,
            history,
            clock,
            lease,
        }
    }

    /// Claim the next spec of `session_id` for `worker_id`.
    ///
    /// Returns `Ok(None)` when nothing is left to hand out.
    pub async fn next(&self, session_id: &str, worker_id: &str) -> Result<Option<String>> {
        if worker_id.trim().is_empty() {
            return Err(SplitError::InvalidArgument(
                "worker id cannot be empty".to_string(),
            ));
        }

        let mut attempts = 0usize;
        let mut budget: Option<usize> = None;

        loop {
            let session = self.storage.get_session(session_id).await?;
            let now = self.clock.now();
            let ordered = self.ordered_candidates(&session, now).await?;

            let Some(head) = ordered.first() else {
                return Ok(None);
            };
            let limit = *budget.get_or_insert(ordered.len());

            match self
                .storage
                .claim_spec(session_id, &head.id, worker_id, now, self.lease)
                .await?
            {
                ClaimOutcome::Claimed {
                    spec,
                    session_started,
                    reclaimed_from,
                } => {
                    if session_started {
                        tracing::info!(session_id, "Session started");
                    }
                    if let Some(previous) = reclaimed_from {
                        tracing::warn!(
                            session_id,
                            spec = %spec.file_path,
                            previous_worker = %previous,
                            worker_id,
                            "Reclaimed spec with expired lease"
                        );
                    }
                    tracing::info!(session_id, spec = %spec.file_path, worker_id, "Spec assigned");
                    return Ok(Some(spec.file_path));
                }
                ClaimOutcome::Taken => {
                    attempts += 1;
                    tracing::debug!(
                        session_id,
                        spec = %head.file_path,
                        worker_id,
                        attempts,
                        "Lost claim race, retrying"
                    );
                    if attempts >= limit {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Claimable specs sorted by expected duration, longest first.
    ///
    /// Paths without history are estimated from the rest of the backlog, so
    /// the estimate does not drift as specs get claimed.
    async fn ordered_candidates(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<Spec>> {
        let paths: Vec<&str> = session
            .backlog
            .iter()
            .map(|s| s.file_path.as_str())
            .collect();
        let expected = self
            .history
            .expected_durations(&session.project_name, &paths)
            .await?;

        let candidates: Vec<(i64, &Spec)> = session
            .backlog
            .iter()
            .zip(expected)
            .filter(|(spec, _)| spec.is_claimable(now, self.lease))
            .map(|(spec, duration)| (duration, spec))
            .collect();

        Ok(order_by_duration(candidates))
    }
}

/// Sort `(expected_ms, spec)` pairs longest first; equal durations keep their
/// input order.
pub fn order_by_duration(mut candidates: Vec<(i64, &Spec)>) -> Vec<Spec> {
    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    candidates.into_iter().map(|(_, spec)| spec.clone()).collect()
}
