//! Services for ingestion, scoring and outbound traffic

pub mod connectors;
pub mod fingerprint;
pub mod http_fetcher;
pub mod ingestion;
pub mod oracle;
pub mod rate_limiter;
pub mod resume_structurer;
pub mod retention;
pub mod robots;
pub mod scorer;

pub use fingerprint::fingerprint;
pub use http_fetcher::HttpFetcher;
pub use ingestion::{IngestionError, IngestionOrchestrator, RunSummary};
pub use oracle::{ClassificationOracle, OpenAiCompatibleOracle, OracleError};
pub use rate_limiter::{BackoffPolicy, DomainRateLimiter, FetchError};
pub use resume_structurer::{ResumeStructurer, StructureError};
pub use retention::RetentionSweep;
pub use robots::RobotsPolicy;
pub use scorer::MatchScorer;
