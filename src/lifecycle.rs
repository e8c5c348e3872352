use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, SplitError};
use crate::project::ProjectRegistry;
use crate::scheduler::{DurationHistory, FinishOutcome, Session};
use crate::storage::Storage;

/// Session creation and end-of-session bookkeeping.
#[derive(Clone)]
pub struct SessionLifecycle {
    storage: Arc<dyn Storage>,
    registry: ProjectRegistry,
    history: DurationHistory,
    clock: Arc<dyn Clock>,
}

impl SessionLifecycle {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: ProjectRegistry,
        history: DurationHistory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            registry,
            history,
            clock,
        }
    }

    /// Seed a session ledger and register it under `project`.
    ///
    /// Input validation and the duplicate-id check both happen before the
    /// project is touched. If registration fails the session is removed
    /// again.
    pub async fn create(
        &self,
        project: &str,
        session_id: &str,
        spec_paths: &[String],
    ) -> Result<Session> {
        let session = Session::new(session_id, project, spec_paths, self.clock.now())?;

        self.storage.insert_session(session.clone()).await?;
        if let Err(err) = self.register(project, session_id).await {
            if let Err(rollback) = self.storage.delete_session(session_id).await {
                tracing::warn!(
                    project,
                    session_id,
                    error = %rollback,
                    "Failed to remove unregistered session"
                );
            }
            return Err(err);
        }

        tracing::info!(
            project,
            session_id,
            specs = session.backlog.len(),
            "Session created"
        );
        Ok(session)
    }

    async fn register(&self, project: &str, session_id: &str) -> Result<()> {
        self.registry.ensure_project(project).await?;
        self.registry.attach_session(project, session_id).await
    }

    /// End a fully finished session.
    ///
    /// Writes every spec duration into the project history and promotes the
    /// session to the project's latest. Returns false when the session had
    /// already ended; fails with `InvalidArgument` while specs are still open.
    ///
    /// Calling it again on an ended session finishes any bookkeeping a
    /// failed earlier call left undone. Durations are recorded once.
    pub async fn end_session(&self, session_id: &str) -> Result<bool> {
        let (session, ended) = match self
            .storage
            .finish_session(session_id, self.clock.now())
            .await?
        {
            FinishOutcome::Finished(session) => (session, true),
            FinishOutcome::AlreadyEnded => (self.storage.get_session(session_id).await?, false),
            FinishOutcome::Unfinished { remaining } => {
                return Err(SplitError::InvalidArgument(format!(
                    "session {} still has {} unfinished specs",
                    session_id, remaining
                )));
            }
        };

        if self.history.record_session(session_id).await? {
            tracing::debug!(
                project = %session.project_name,
                session_id,
                "Recorded spec durations"
            );
        }
        self.registry
            .set_latest_session(&session.project_name, session_id)
            .await?;

        if ended {
            tracing::info!(
                project = %session.project_name,
                session_id,
                specs = session.backlog.len(),
                "Session ended"
            );
        } else {
            tracing::debug!(session_id, "Session already ended");
        }
        Ok(ended)
    }
}
