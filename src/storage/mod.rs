//! Storage capabilities the engine depends on.
//!
//! The engine holds an `Arc<dyn Storage>` and never reaches around it. A
//! backend is conforming when every method is atomic for the aggregate it
//! touches:
//!
//! - **Sessions**: `claim_spec`, `complete_spec` and `finish_session` run the
//!   [`Session`] transition methods while holding exclusive access to that one
//!   session, so two claims on the same spec can never both succeed.
//! - **Projects**: `ensure_project`, `attach_session` and
//!   `set_latest_session` are read-modify-write on a single project.
//! - **Durations**: `record_duration` is an atomic upsert per
//!   `(project, spec path)`.
//!
//! [`MemoryStorage`] is the in-process implementation. A durable backend is
//! another implementation of the same trait.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::project::Project;
use crate::scheduler::history::DurationRecord;
use crate::scheduler::session::{ClaimOutcome, Completion, FinishOutcome, Session};

pub use memory::MemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the project if absent. Returns true when it was created.
    async fn ensure_project(&self, name: &str) -> Result<bool>;

    async fn get_project(&self, name: &str) -> Result<Project>;

    /// Append a session reference to a project. Re-attaching is a no-op.
    async fn attach_session(&self, project: &str, session_id: &str) -> Result<()>;

    /// Point the project at an ended session, unless it already points at one
    /// that ended later.
    async fn set_latest_session(&self, project: &str, session_id: &str) -> Result<()>;

    /// Store a new session. Fails with `Conflict` if the id is taken.
    async fn insert_session(&self, session: Session) -> Result<()>;

    /// Snapshot of one session.
    async fn get_session(&self, session_id: &str) -> Result<Session>;

    /// Remove a session and detach it from its project. Duration history is
    /// left untouched.
    async fn delete_session(&self, session_id: &str) -> Result<Session>;

    async fn claim_spec(
        &self,
        session_id: &str,
        spec_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Result<ClaimOutcome>;

    async fn complete_spec(
        &self,
        session_id: &str,
        worker_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Completion>>;

    async fn finish_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<FinishOutcome>;

    async fn record_duration(&self, project: &str, spec_path: &str, duration_ms: i64) -> Result<()>;

    /// Write the durations of an ended session into its project's history
    /// and mark the session recorded, as one step. Returns false when the
    /// session was already recorded; fails with `InvalidArgument` before the
    /// session has ended.
    async fn record_session_durations(&self, session_id: &str) -> Result<bool>;

    async fn lookup_duration(&self, project: &str, spec_path: &str) -> Result<Option<DurationRecord>>;
}
