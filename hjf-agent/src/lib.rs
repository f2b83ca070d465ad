//! hjf-agent library interface
//!
//! Job ingestion, match scoring and human-confirmed application automation.
//! Exposed as a library so integration tests can build the router and the
//! services around fakes.

pub mod api;
pub mod automation;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use hjf_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::automation::AutomationEngine;
use crate::services::ingestion::IngestionOrchestrator;
use crate::services::resume_structurer::ResumeStructurer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Broadcast to SSE and WebSocket listeners
    pub event_bus: EventBus,
    /// Owns the live automation sessions
    pub engine: Arc<AutomationEngine>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    /// `None` when no oracle is configured
    pub structurer: Option<Arc<ResumeStructurer>>,
    /// For uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        engine: Arc<AutomationEngine>,
        orchestrator: Arc<IngestionOrchestrator>,
        structurer: Option<Arc<ResumeStructurer>>,
    ) -> Self {
        Self {
            db,
            event_bus,
            engine,
            orchestrator,
            structurer,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::automation_routes())
        .merge(api::profile_routes())
        .merge(api::ingestion_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
