use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, SplitError};
use crate::project::Project;
use crate::scheduler::history::DurationRecord;
use crate::scheduler::session::{ClaimOutcome, Completion, FinishOutcome, Session};
use crate::storage::Storage;

/// In-process backend.
///
/// Each session sits behind its own mutex so claims in different sessions do
/// not contend; the index maps only need a write lock on insert and delete.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    projects: RwLock<HashMap<String, Project>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    durations: RwLock<HashMap<(String, String), DurationRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session_handle(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SplitError::NotFound(format!("session {}", session_id)))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ensure_project(&self, name: &str) -> Result<bool> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(name) {
            return Ok(false);
        }
        projects.insert(name.to_string(), Project::new(name));
        Ok(true)
    }

    async fn get_project(&self, name: &str) -> Result<Project> {
        self.projects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SplitError::NotFound(format!("project {}", name)))
    }

    async fn attach_session(&self, project: &str, session_id: &str) -> Result<()> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(project)
            .ok_or_else(|| SplitError::NotFound(format!("project {}", project)))?;
        if !project.sessions.iter().any(|id| id == session_id) {
            project.sessions.push(session_id.to_string());
        }
        Ok(())
    }

    async fn set_latest_session(&self, project: &str, session_id: &str) -> Result<()> {
        let ended_at = {
            let handle = self.session_handle(session_id).await?;
            let end = handle.lock().await.end;
            end.ok_or_else(|| {
                SplitError::InvalidArgument(format!("session {} has not ended", session_id))
            })?
        };

        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(project)
            .ok_or_else(|| SplitError::NotFound(format!("project {}", project)))?;
        project.promote_latest(session_id, ended_at);
        Ok(())
    }

    async fn insert_session(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(SplitError::Conflict(format!(
                "session id {} already in use for project {}",
                session.id, session.project_name
            )));
        }
        sessions.insert(session.id.clone(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let handle = self.session_handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<Session> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SplitError::NotFound(format!("session {}", session_id)))?;
        let session = handle.lock().await.clone();

        if let Some(project) = self.projects.write().await.get_mut(&session.project_name) {
            project.detach_session(session_id);
        }
        Ok(session)
    }

    async fn claim_spec(
        &self,
        session_id: &str,
        spec_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> Result<ClaimOutcome> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        session.claim(spec_id, worker_id, now, lease)
    }

    async fn complete_spec(
        &self,
        session_id: &str,
        worker_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Completion>> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        Ok(session.complete(worker_id, passed, now))
    }

    async fn finish_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<FinishOutcome> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        Ok(session.finish(now))
    }

    async fn record_duration(&self, project: &str, spec_path: &str, duration_ms: i64) -> Result<()> {
        self.durations
            .write()
            .await
            .entry((project.to_string(), spec_path.to_string()))
            .or_default()
            .observe(duration_ms);
        Ok(())
    }

    async fn record_session_durations(&self, session_id: &str) -> Result<bool> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        if !session.is_ended() {
            return Err(SplitError::InvalidArgument(format!(
                "session {} has not ended",
                session_id
            )));
        }
        let Some(durations) = session.take_durations() else {
            return Ok(false);
        };

        let mut history = self.durations.write().await;
        for (path, duration_ms) in durations {
            history
                .entry((session.project_name.clone(), path))
                .or_default()
                .observe(duration_ms);
        }
        Ok(true)
    }

    async fn lookup_duration(&self, project: &str, spec_path: &str) -> Result<Option<DurationRecord>> {
        Ok(self
            .durations
            .read()
            .await
            .get(&(project.to_string(), spec_path.to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn new_session(id: &str, paths: &[&str]) -> Session {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        Session::new(id, "demo", &paths, at(0)).unwrap()
    }

    async fn run_to_end(storage: &MemoryStorage, id: &str, end: i64) {
        let session = storage.get_session(id).await.unwrap();
        for spec in &session.backlog {
            storage.claim_spec(id, &spec.id, "w1", at(end - 1), None).await.unwrap();
            storage.complete_spec(id, "w1", true, at(end)).await.unwrap();
        }
        storage.finish_session(id, at(end)).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_project_is_idempotent() {
        let storage = MemoryStorage::new();
        assert!(storage.ensure_project("demo").await.unwrap());
        assert!(!storage.ensure_project("demo").await.unwrap());
        assert_eq!(storage.get_project("demo").await.unwrap().name, "demo");
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get_project("nope").await,
            Err(SplitError::NotFound(_))
        ));
        assert!(matches!(
            storage.attach_session("nope", "s1").await,
            Err(SplitError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn attach_session_dedupes() {
        let storage = MemoryStorage::new();
        storage.ensure_project("demo").await.unwrap();
        storage.attach_session("demo", "s1").await.unwrap();
        storage.attach_session("demo", "s1").await.unwrap();
        storage.attach_session("demo", "s2").await.unwrap();
        assert_eq!(
            storage.get_project("demo").await.unwrap().sessions,
            vec!["s1".to_string(), "s2".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_session_id_conflicts() {
        let storage = MemoryStorage::new();
        storage.insert_session(new_session("s1", &["a"])).await.unwrap();
        let err = storage
            .insert_session(new_session("s1", &["b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Conflict(_)));
        // The original backlog is untouched.
        let stored = storage.get_session("s1").await.unwrap();
        assert_eq!(stored.backlog[0].file_path, "a");
    }

    #[tokio::test]
    async fn claims_arriving_out_of_order_stay_after_session_start() {
        let storage = MemoryStorage::new();
        storage.insert_session(new_session("s1", &["a", "b"])).await.unwrap();
        let session = storage.get_session("s1").await.unwrap();
        let (a, b) = (session.backlog[0].id.clone(), session.backlog[1].id.clone());

        storage.claim_spec("s1", &b, "wB", at(10), None).await.unwrap();
        storage.claim_spec("s1", &a, "wA", at(5), None).await.unwrap();

        let session = storage.get_session("s1").await.unwrap();
        let start = session.start.unwrap();
        assert!(session.backlog.iter().all(|s| s.start.unwrap() >= start));
    }

    #[tokio::test]
    async fn session_durations_are_recorded_once() {
        let storage = MemoryStorage::new();
        storage.insert_session(new_session("s1", &["a", "b"])).await.unwrap();

        let err = storage.record_session_durations("s1").await.unwrap_err();
        assert!(matches!(err, SplitError::InvalidArgument(_)));

        run_to_end(&storage, "s1", 4).await;
        assert!(storage.record_session_durations("s1").await.unwrap());
        assert!(!storage.record_session_durations("s1").await.unwrap());

        let record = storage.lookup_duration("demo", "a").await.unwrap().unwrap();
        assert_eq!(record.last_ms, 1_000);
        assert_eq!(record.samples, 1);
        assert!(storage.get_session("s1").await.unwrap().history_recorded);
    }

    #[tokio::test]
    async fn latest_session_requires_end() {
        let storage = MemoryStorage::new();
        storage.ensure_project("demo").await.unwrap();
        storage.insert_session(new_session("s1", &["a"])).await.unwrap();

        let err = storage.set_latest_session("demo", "s1").await.unwrap_err();
        assert!(matches!(err, SplitError::InvalidArgument(_)));
        assert!(storage
            .get_project("demo")
            .await
            .unwrap()
            .latest_session_id
            .is_none());
    }

    #[tokio::test]
    async fn latest_session_keeps_most_recent_end() {
        let storage = MemoryStorage::new();
        storage.ensure_project("demo").await.unwrap();
        storage.insert_session(new_session("s1", &["a"])).await.unwrap();
        storage.insert_session(new_session("s2", &["a"])).await.unwrap();
        run_to_end(&storage, "s1", 10).await;
        run_to_end(&storage, "s2", 20).await;

        storage.set_latest_session("demo", "s2").await.unwrap();
        storage.set_latest_session("demo", "s1").await.unwrap();
        assert_eq!(
            storage.get_project("demo").await.unwrap().latest_session_id.as_deref(),
            Some("s2")
        );
    }

    #[tokio::test]
    async fn delete_session_detaches_but_keeps_history() {
        let storage = MemoryStorage::new();
        storage.ensure_project("demo").await.unwrap();
        storage.insert_session(new_session("s1", &["a"])).await.unwrap();
        storage.attach_session("demo", "s1").await.unwrap();
        run_to_end(&storage, "s1", 5).await;
        storage.set_latest_session("demo", "s1").await.unwrap();
        storage.record_duration("demo", "a", 1000).await.unwrap();

        let removed = storage.delete_session("s1").await.unwrap();
        assert_eq!(removed.id, "s1");

        let project = storage.get_project("demo").await.unwrap();
        assert!(project.sessions.is_empty());
        assert!(project.latest_session_id.is_none());
        assert!(matches!(
            storage.get_session("s1").await,
            Err(SplitError::NotFound(_))
        ));
        assert_eq!(
            storage.lookup_duration("demo", "a").await.unwrap().map(|r| r.last_ms),
            Some(1000)
        );
    }

    #[tokio::test]
    async fn claim_on_missing_session_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage
            .claim_spec("nope", "x", "w1", at(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_session_returns_snapshot() {
        let storage = MemoryStorage::new();
        storage.insert_session(new_session("s1", &["a"])).await.unwrap();
        let before = storage.get_session("s1").await.unwrap();
        let spec_id = before.backlog[0].id.clone();
        storage.claim_spec("s1", &spec_id, "w1", at(1), None).await.unwrap();

        assert!(before.backlog[0].start.is_none());
        let after = storage.get_session("s1").await.unwrap();
        assert_eq!(after.backlog[0].start, Some(at(1)));
    }

    #[tokio::test]
    async fn record_duration_upserts() {
        let storage = MemoryStorage::new();
        assert!(storage.lookup_duration("demo", "a").await.unwrap().is_none());
        storage.record_duration("demo", "a", 10).await.unwrap();
        storage.record_duration("demo", "a", 30).await.unwrap();
        let record = storage.lookup_duration("demo", "a").await.unwrap().unwrap();
        assert_eq!(record.last_ms, 30);
        assert_eq!(record.samples, 2);
        assert_eq!(record.mean_ms(), 20);
    }
}
