//! Job posting endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use hjf_common::events::AgentEvent;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{JobFilter, JobPosting, JobStatus};
use super::ApiJson;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub min_score: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyCheckResponse {
    pub job_id: i64,
    pub message: String,
}

impl ListJobsQuery {
    fn into_filter(self) -> ApiResult<JobFilter> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<JobStatus>())
            .transpose()?;

        let min_score = match self.min_score.filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match raw.trim().parse::<u8>() {
                Ok(score) if score <= 100 => Some(score),
                _ => {
                    return Err(ApiError::bad_request(
                        "INVALID_MIN_SCORE",
                        "min_score must be a number between 0 and 100",
                    ))
                }
            },
        };

        Ok(JobFilter { status, min_score })
    }
}

fn parse_job_id(raw: &str) -> ApiResult<i64> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("INVALID_JOB_ID", "Job ID must be a valid number"))
}

fn job_not_found(job_id: i64) -> ApiError {
    ApiError::not_found("JOB_NOT_FOUND", format!("Job with ID {} not found", job_id))
}

/// GET /api/jobs?status=&min_score=
///
/// Newest first, then by descending match score.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobPosting>>> {
    let filter = query.into_filter()?;
    let jobs = db::jobs::list_jobs(&state.db, &filter).await?;
    Ok(Json(jobs))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobPosting>> {
    let job_id = parse_job_id(&id)?;
    let job = db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    Ok(Json(job))
}

/// PATCH /api/jobs/:id/status
///
/// Validated against the workflow table; a rejected change leaves the
/// stored status untouched.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<StatusUpdateRequest>,
) -> ApiResult<Json<JobPosting>> {
    let job_id = parse_job_id(&id)?;
    let to: JobStatus = request.status.unwrap_or_default().parse()?;

    let change = db::jobs::transition_status(&state.db, job_id, to).await?;

    state.event_bus.emit_lossy(AgentEvent::JobStatusChanged {
        job_id,
        old_status: change.from.to_string(),
        new_status: change.to.to_string(),
        timestamp: Utc::now(),
    });

    let job = db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    Ok(Json(job))
}

/// POST /api/jobs/:id/apply
///
/// Pre-flight check only; automation is started through
/// `POST /api/automation/start`.
pub async fn apply_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApplyCheckResponse>> {
    let job_id = parse_job_id(&id)?;
    let job = db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;

    if job.status != JobStatus::Approved {
        return Err(ApiError::bad_request(
            "INVALID_JOB_STATUS",
            format!(
                "Job must be in 'approved' status to apply. Current status: {}",
                job.status
            ),
        ));
    }

    Ok(Json(ApplyCheckResponse {
        job_id,
        message: "Use POST /api/automation/start with { \"job_id\": ... } to start automation"
            .to_string(),
    }))
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/status", patch(update_status))
        .route("/api/jobs/:id/apply", post(apply_check))
}
