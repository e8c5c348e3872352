//! JSON HTTP surface over [`SplitService`].
//!
//! | Method | Path                          | Operation                 |
//! |--------|-------------------------------|---------------------------|
//! | POST   | `/api/sessions`               | create a session          |
//! | GET    | `/api/sessions/:id`           | session report            |
//! | DELETE | `/api/sessions/:id`           | delete a session          |
//! | POST   | `/api/sessions/:id/next`      | claim the next spec       |
//! | POST   | `/api/sessions/:id/result`    | report a spec result      |
//! | POST   | `/api/sessions/:id/end`       | end a finished session    |
//! | GET    | `/api/projects/:name`         | project with all sessions |
//! | GET    | `/api/projects/:name/latest`  | latest ended session      |

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ErrorKind, SplitError};
use crate::report::{ProjectReport, SessionReport};
use crate::service::SplitService;

#[derive(Clone)]
pub struct ApiState {
    pub service: SplitService,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub project_name: String,
    pub spec_files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub project_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextSpecRequest {
    pub worker_id: String,
}

/// `spec` is `null` when the session has no more work.
#[derive(Debug, Serialize, Deserialize)]
pub struct NextSpecResponse {
    pub spec: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResultRequest {
    pub worker_id: String,
    pub passed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub ended: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps engine errors onto HTTP status codes.
pub struct ApiError(SplitError);

impl From<SplitError> for ApiError {
    fn from(err: SplitError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/:id/next", post(next_spec_handler))
        .route("/api/sessions/:id/result", post(report_result_handler))
        .route("/api/sessions/:id/end", post(end_session_handler))
        .route("/api/projects/:name", get(get_project_handler))
        .route("/api/projects/:name/latest", get(latest_session_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Starting API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn create_session_handler(
    State(state): State<ApiState>,
    Json(payload): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let session_id = state
        .service
        .create_session(&payload.project_name, &payload.spec_files)
        .await?;
    Ok(Json(CreateSessionResponse {
        session_id,
        project_name: payload.project_name,
    }))
}

async fn get_session_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionReport>> {
    Ok(Json(state.service.get_session(&id).await?))
}

async fn delete_session_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn next_spec_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<NextSpecRequest>,
) -> ApiResult<Json<NextSpecResponse>> {
    let spec = state.service.next_spec(&id, &payload.worker_id).await?;
    Ok(Json(NextSpecResponse { spec }))
}

async fn report_result_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<ReportResultRequest>,
) -> ApiResult<StatusCode> {
    state
        .service
        .report_spec_result(&id, &payload.worker_id, payload.passed)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn end_session_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EndSessionResponse>> {
    let ended = state.service.end_session(&id).await?;
    Ok(Json(EndSessionResponse { ended }))
}

async fn get_project_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProjectReport>> {
    Ok(Json(state.service.get_project(&name).await?))
}

async fn latest_session_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SessionReport>> {
    Ok(Json(state.service.latest_session(&name).await?))
}
