//! Ingestion trigger and source registry endpoints

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;

use crate::error::ApiResult;
use crate::services::connectors::{source_stats, SourceConfig, SourceStats};
use crate::services::ingestion::RunSummary;
use crate::AppState;

/// One registry entry as reported to clients
#[derive(Debug, Serialize)]
pub struct SourceView {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub max_jobs: usize,
    pub requires_auth: bool,
    pub has_auth: bool,
    pub max_age_hours: i64,
}

impl From<&SourceConfig> for SourceView {
    fn from(source: &SourceConfig) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            enabled: source.enabled,
            priority: source.priority,
            max_jobs: source.max_jobs,
            requires_auth: source.requires_auth,
            has_auth: source.has_required_auth(),
            max_age_hours: source.freshness.max_age.num_hours(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceView>,
    pub stats: SourceStats,
    pub ingestion_running: bool,
}

/// POST /api/ingestion/run
///
/// Runs every available source now; rejected while another run is active.
pub async fn run_ingestion(State(state): State<AppState>) -> ApiResult<Json<RunSummary>> {
    let summary = state.orchestrator.run().await?;
    Ok(Json(summary))
}

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    let sources = state.orchestrator.sources();
    Json(SourcesResponse {
        sources: sources.iter().map(SourceView::from).collect(),
        stats: source_stats(sources),
        ingestion_running: state.orchestrator.is_running(),
    })
}

pub fn ingestion_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ingestion/run", post(run_ingestion))
        .route("/api/sources", get(list_sources))
}
