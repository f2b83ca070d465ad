//! Automation session endpoints
//!
//! start → paused waits for a human; confirm is the only way to submit.

use axum::{extract::State, routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::models::{SessionStatus, SessionSummary, SessionTransition};
use super::ApiJson;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub job_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub job_id: i64,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    #[serde(flatten)]
    pub transition: SessionTransition,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct KillResponse {
    pub terminated: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

fn require_session_id(request: SessionRequest) -> ApiResult<String> {
    request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("INVALID_SESSION_ID", "session_id is required and must be a string")
        })
}

/// POST /api/automation/start
pub async fn start(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StartRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let job_id = request
        .job_id
        .ok_or_else(|| ApiError::bad_request("INVALID_JOB_ID", "job_id is required and must be a number"))?;

    let session = state.engine.start(job_id).await?;

    Ok(Json(SessionResponse {
        session_id: session.id,
        job_id: session.job_id,
        status: session.status,
        message: "Automation paused at submit button. Please review and confirm.".to_string(),
    }))
}

/// POST /api/automation/confirm
pub async fn confirm(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SessionRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let session_id = require_session_id(request)?;
    let transition = state.engine.confirm(&session_id).await?;

    Ok(Json(TransitionResponse {
        transition,
        message: "Application submitted successfully".to_string(),
    }))
}

/// POST /api/automation/cancel
pub async fn cancel(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SessionRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    let session_id = require_session_id(request)?;
    let transition = state.engine.cancel(&session_id).await?;

    Ok(Json(TransitionResponse {
        transition,
        message: "Automation cancelled successfully".to_string(),
    }))
}

/// POST /api/automation/kill
///
/// Cancels every live session and releases its browser.
pub async fn kill(State(state): State<AppState>) -> Json<KillResponse> {
    warn!("Kill switch activated via API");
    let terminated = state.engine.kill_all().await;

    Json(KillResponse {
        terminated,
        message: format!("Kill switch activated. Terminated {} session(s).", terminated),
        timestamp: Utc::now(),
    })
}

/// GET /api/automation/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.engine.list_sessions().await;
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

pub fn automation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/automation/start", post(start))
        .route("/api/automation/confirm", post(confirm))
        .route("/api/automation/cancel", post(cancel))
        .route("/api/automation/kill", post(kill))
        .route("/api/automation/sessions", get(list_sessions))
}
