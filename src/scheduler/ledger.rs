use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, SplitError};
use crate::scheduler::session::Completion;
use crate::storage::Storage;

/// Completion reporting against the per-session spec ledger.
#[derive(Clone)]
pub struct SpecLedger {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl SpecLedger {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Finish the spec `worker_id` is running in `session_id`.
    ///
    /// A report from a worker that holds nothing (duplicate, late, or unknown
    /// worker) returns `Ok(None)` and leaves the ledger untouched.
    pub async fn complete(
        &self,
        session_id: &str,
        worker_id: &str,
        passed: bool,
    ) -> Result<Option<Completion>> {
        if worker_id.trim().is_empty() {
            return Err(SplitError::InvalidArgument(
                "worker id cannot be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let completion = self
            .storage
            .complete_spec(session_id, worker_id, passed, now)
            .await?;

        match &completion {
            Some(done) => tracing::info!(
                session_id,
                spec = %done.spec.file_path,
                worker_id,
                passed,
                duration_ms = done.spec.estimated_duration_ms.unwrap_or_default(),
                "Spec finished"
            ),
            None => tracing::debug!(
                session_id,
                worker_id,
                "Ignoring result report, worker holds no running spec"
            ),
        }

        Ok(completion)
    }
}
