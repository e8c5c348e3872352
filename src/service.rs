use std::sync::Arc;

use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::lifecycle::SessionLifecycle;
use crate::project::ProjectRegistry;
use crate::report::{ProjectReport, SessionReport};
use crate::scheduler::{DurationHistory, SpecAssigner, SpecLedger};
use crate::storage::{MemoryStorage, Storage};

/// Entry point used by the transport layer.
///
/// Wires the assigner, ledger, lifecycle and registry over one storage
/// backend and one clock. Cloning is cheap; every clone shares the same state.
#[derive(Clone)]
pub struct SplitService {
    storage: Arc<dyn Storage>,
    assigner: SpecAssigner,
    ledger: SpecLedger,
    lifecycle: SessionLifecycle,
    registry: ProjectRegistry,
    history: DurationHistory,
}

impl SplitService {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        let history = DurationHistory::new(storage.clone(), config.estimate);
        let registry = ProjectRegistry::new(storage.clone());
        let assigner = SpecAssigner::new(
            storage.clone(),
            history.clone(),
            clock.clone(),
            config.lease(),
        );
        let ledger = SpecLedger::new(storage.clone(), clock.clone());
        let lifecycle =
            SessionLifecycle::new(storage.clone(), registry.clone(), history.clone(), clock);

        Self {
            storage,
            assigner,
            ledger,
            lifecycle,
            registry,
            history,
        }
    }

    /// Service over a fresh [`MemoryStorage`] and the system clock.
    pub fn in_memory(config: SchedulerConfig) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock), config)
    }

    pub fn history(&self) -> &DurationHistory {
        &self.history
    }

    /// Start a new session for `project` and return its generated id.
    pub async fn create_session(&self, project: &str, spec_paths: &[String]) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.lifecycle.create(project, &session_id, spec_paths).await?;
        Ok(session_id)
    }

    /// Next spec for `worker_id`, or `None` once the session has nothing left
    /// to hand out.
    pub async fn next_spec(&self, session_id: &str, worker_id: &str) -> Result<Option<String>> {
        self.assigner.next(session_id, worker_id).await
    }

    /// Record the outcome of the spec `worker_id` is running. Ends the session
    /// when this was the last open spec.
    pub async fn report_spec_result(
        &self,
        session_id: &str,
        worker_id: &str,
        passed: bool,
    ) -> Result<()> {
        let Some(completion) = self.ledger.complete(session_id, worker_id, passed).await? else {
            return Ok(());
        };
        if completion.session_complete {
            self.lifecycle.end_session(session_id).await?;
        }
        Ok(())
    }

    /// End a session explicitly. Returns false if it had already ended.
    pub async fn end_session(&self, session_id: &str) -> Result<bool> {
        self.lifecycle.end_session(session_id).await
    }

    pub async fn get_project(&self, name: &str) -> Result<ProjectReport> {
        Ok(self.registry.get_full_project(name).await?.into())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionReport> {
        let session = self.storage.get_session(session_id).await?;
        Ok(SessionReport::from(&session))
    }

    pub async fn latest_session(&self, project: &str) -> Result<SessionReport> {
        let session = self.registry.latest_session(project).await?;
        Ok(SessionReport::from(&session))
    }

    /// Drop a session and its specs. Duration history is kept.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session = self.storage.delete_session(session_id).await?;
        tracing::info!(
            project = %session.project_name,
            session_id,
            "Session deleted"
        );
        Ok(())
    }
}
