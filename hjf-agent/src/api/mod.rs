//! HTTP API handlers
//!
//! REST endpoints for postings, profile, automation and ingestion, plus the
//! SSE / WebSocket event feeds.

pub mod automation;
pub mod extract;
pub mod health;
pub mod ingestion;
pub mod jobs;
pub mod profile;
pub mod sse;

pub use automation::automation_routes;
pub use extract::ApiJson;
pub use health::health_routes;
pub use ingestion::ingestion_routes;
pub use jobs::job_routes;
pub use profile::profile_routes;
pub use sse::event_routes;
