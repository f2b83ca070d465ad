//! Candidate profile endpoints

use axum::{extract::State, routing::{get, post}, Json, Router};
use tracing::info;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{CandidateProfile, ProfileUpdate};
use super::ApiJson;
use crate::AppState;

fn profile_not_found() -> ApiError {
    ApiError::not_found(
        "PROFILE_NOT_FOUND",
        "User profile not found. Please create a profile first.",
    )
}

/// GET /api/profile
pub async fn get_profile(State(state): State<AppState>) -> ApiResult<Json<CandidateProfile>> {
    let profile = db::profile::get_profile(&state.db)
        .await?
        .ok_or_else(profile_not_found)?;
    Ok(Json(profile))
}

/// PUT /api/profile
///
/// Creates the single profile row or replaces its editable fields.
pub async fn put_profile(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<CandidateProfile>> {
    update.validate()?;
    let profile = db::profile::upsert_profile(&state.db, &update).await?;
    info!(email = %profile.email, "Profile saved");
    Ok(Json(profile))
}

/// POST /api/profile/structure
///
/// Runs the stored resume text through the structurer and stores the result.
pub async fn structure_profile(
    State(state): State<AppState>,
) -> ApiResult<Json<CandidateProfile>> {
    let structurer = state.structurer.clone().ok_or_else(|| ApiError::Unavailable {
        code: "ORACLE_UNAVAILABLE",
        message: "Resume structuring requires OPENAI_API_KEY or GROQ_API_KEY".to_string(),
    })?;

    let profile = db::profile::get_profile(&state.db)
        .await?
        .ok_or_else(profile_not_found)?;

    let structured = structurer.structure(&profile.resume_text).await?;
    db::profile::set_structured_data(&state.db, &structured).await?;

    let profile = db::profile::get_profile(&state.db)
        .await?
        .ok_or_else(profile_not_found)?;
    Ok(Json(profile))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/profile/structure", post(structure_profile))
}
