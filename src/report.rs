//! Read models handed to callers of the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project::FullProject;
use crate::scheduler::{Session, Spec, SpecStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecReport {
    pub path: String,
    pub status: SpecStatus,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub assigned_worker: Option<String>,
    pub passed: Option<bool>,
    pub estimated_duration_ms: Option<i64>,
}

impl From<&Spec> for SpecReport {
    fn from(spec: &Spec) -> Self {
        Self {
            path: spec.file_path.clone(),
            status: spec.status(),
            start: spec.start,
            end: spec.end,
            assigned_worker: spec.assigned_worker.clone(),
            passed: spec.passed,
            estimated_duration_ms: spec.estimated_duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub project_name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub total: usize,
    pub running: usize,
    pub finished: usize,
    pub specs: Vec<SpecReport>,
}

impl From<&Session> for SessionReport {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            project_name: session.project_name.clone(),
            start: session.start,
            end: session.end,
            total: session.backlog.len(),
            running: session.count(SpecStatus::Running),
            finished: session.count(SpecStatus::Finished),
            specs: session.backlog.iter().map(SpecReport::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub name: String,
    pub latest_session_id: Option<String>,
    pub sessions: Vec<SessionReport>,
}

impl From<FullProject> for ProjectReport {
    fn from(project: FullProject) -> Self {
        Self {
            name: project.name,
            latest_session_id: project.latest_session_id,
            sessions: project.sessions.iter().map(SessionReport::from).collect(),
        }
    }
}
