use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::scheduler::Session;
use crate::storage::Storage;

/// A named stream of sessions sharing one duration history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub latest_session_id: Option<String>,
    pub latest_session_end: Option<DateTime<Utc>>,
    pub sessions: Vec<String>,
}

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latest_session_id: None,
            latest_session_end: None,
            sessions: Vec::new(),
        }
    }

    /// Move the latest pointer to `session_id` unless the current latest
    /// session ended after `ended_at`.
    pub fn promote_latest(&mut self, session_id: &str, ended_at: DateTime<Utc>) -> bool {
        if matches!(self.latest_session_end, Some(current) if current > ended_at) {
            return false;
        }
        self.latest_session_id = Some(session_id.to_string());
        self.latest_session_end = Some(ended_at);
        true
    }

    pub fn detach_session(&mut self, session_id: &str) {
        self.sessions.retain(|id| id != session_id);
        if self.latest_session_id.as_deref() == Some(session_id) {
            self.latest_session_id = None;
            self.latest_session_end = None;
        }
    }
}

/// A project with every session resolved.
#[derive(Debug, Clone)]
pub struct FullProject {
    pub name: String,
    pub latest_session_id: Option<String>,
    pub sessions: Vec<Session>,
}

/// Project bookkeeping on top of the storage backend.
#[derive(Clone)]
pub struct ProjectRegistry {
    storage: Arc<dyn Storage>,
}

impl ProjectRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn ensure_project(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SplitError::InvalidArgument(
                "project name cannot be empty".to_string(),
            ));
        }
        if self.storage.ensure_project(name).await? {
            tracing::info!(project = name, "Project registered");
        }
        Ok(())
    }

    pub async fn attach_session(&self, project: &str, session_id: &str) -> Result<()> {
        self.storage.attach_session(project, session_id).await
    }

    pub async fn set_latest_session(&self, project: &str, session_id: &str) -> Result<()> {
        self.storage.set_latest_session(project, session_id).await
    }

    /// Resolve every session of a project.
    ///
    /// A session id the project references but storage cannot find is
    /// reported as `NotFound`; the registry does not paper over it.
    pub async fn get_full_project(&self, name: &str) -> Result<FullProject> {
        let project = self.storage.get_project(name).await?;

        let mut sessions = Vec::with_capacity(project.sessions.len());
        for session_id in &project.sessions {
            let session = self.storage.get_session(session_id).await.map_err(|e| match e {
                SplitError::NotFound(_) => SplitError::NotFound(format!(
                    "session {} not found for {} project",
                    session_id, name
                )),
                other => other,
            })?;
            sessions.push(session);
        }

        Ok(FullProject {
            name: project.name,
            latest_session_id: project.latest_session_id,
            sessions,
        })
    }

    pub async fn latest_session(&self, name: &str) -> Result<Session> {
        let project = self.storage.get_project(name).await?;
        let latest = project.latest_session_id.ok_or_else(|| {
            SplitError::NotFound(format!("latest session for project {}", name))
        })?;
        self.storage.get_session(&latest).await
    }
}
