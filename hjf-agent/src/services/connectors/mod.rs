//! Source connectors
//!
//! A connector is initialised, scraped once through a lazy stream of
//! [`ScrapedCandidate`]s, then closed. Per-item problems are yielded as
//! non-terminal errors and the stream carries on; terminal errors (throttling
//! past the backoff ladder, exhausted network retries, a dead browser) end
//! the connector's run.

pub mod adzuna;
pub mod linkedin_public;
pub mod page_scrape;
pub mod rss;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::http_fetcher::HttpFetcher;
use super::rate_limiter::FetchError;
use super::robots::RobotsPolicy;
use crate::automation::{BrowserLauncher, DriverError};

pub use adzuna::{AdzunaConnector, AdzunaCredentials};
pub use linkedin_public::LinkedInPublicConnector;
pub use page_scrape::{BoardLayout, PageScrapeConnector};
pub use rss::RssConnector;

/// One posting as a source presented it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedCandidate {
    pub url: String,
    pub company: String,
    pub title: String,
    pub description: String,
    pub posted_at: Option<DateTime<Utc>>,
}

impl ScrapedCandidate {
    /// Text the match scorer reads
    pub fn scoring_text(&self) -> String {
        format!("{} at {}\n\n{}", self.title, self.company, self.description)
    }
}

/// What to do with candidates that carry no posting date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDate {
    Accept,
    Discard,
}

/// Staleness horizon for one connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub max_age: ChronoDuration,
    pub missing_date: MissingDate,
}

impl FreshnessPolicy {
    pub fn hours(hours: i64, missing_date: MissingDate) -> Self {
        Self {
            max_age: ChronoDuration::hours(hours),
            missing_date,
        }
    }

    pub fn admits(&self, posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match posted_at {
            Some(posted) => now.signed_duration_since(posted) <= self.max_age,
            None => self.missing_date == MissingDate::Accept,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("browser error: {0}")]
    Driver(#[from] DriverError),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("connector {0} was not initialised")]
    NotInitialized(String),

    #[error("connector {0} has already been scraped")]
    Exhausted(String),

    #[error("robots.txt disallows {0}")]
    Disallowed(String),
}

impl ConnectorError {
    /// Whether the connector's stream should stop
    pub fn is_terminal(&self) -> bool {
        match self {
            ConnectorError::Fetch(e) => e.is_terminal_for_connector(),
            ConnectorError::Driver(e) => matches!(e, DriverError::Closed | DriverError::Launch(_)),
            ConnectorError::Parse(_) => false,
            ConnectorError::MissingCredentials(_)
            | ConnectorError::NotInitialized(_)
            | ConnectorError::Exhausted(_)
            | ConnectorError::Disallowed(_) => true,
        }
    }
}

pub type CandidateStream<'a> = BoxStream<'a, Result<ScrapedCandidate, ConnectorError>>;

#[async_trait]
pub trait SourceConnector: Send {
    fn source_id(&self) -> &str;

    async fn init(&mut self) -> Result<(), ConnectorError>;

    /// Yield up to `max_jobs` fresh candidates. Callable once.
    fn scrape<'a>(&'a mut self, query: &'a str, max_jobs: usize) -> CandidateStream<'a>;

    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Stream holding a single error
pub(crate) fn failed_stream<'a>(err: ConnectorError) -> CandidateStream<'a> {
    Box::pin(futures::stream::once(async move { Err(err) }))
}

/// Where searches run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchScope {
    pub locations: Vec<String>,
    pub countries: Vec<String>,
}

impl Default for SearchScope {
    fn default() -> Self {
        Self {
            locations: vec!["Remote".to_string()],
            countries: vec!["us".to_string(), "gb".to_string()],
        }
    }
}

/// Per-source settings
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Lower runs first
    pub priority: u32,
    pub max_jobs: usize,
    pub requires_auth: bool,
    pub auth_env_vars: Vec<String>,
    pub freshness: FreshnessPolicy,
}

impl SourceConfig {
    /// Every required env var is set and non-empty
    pub fn has_required_auth(&self) -> bool {
        !self.requires_auth
            || self.auth_env_vars.iter().all(|var| {
                std::env::var(var)
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false)
            })
    }
}

fn source(
    id: &str,
    name: &str,
    enabled: bool,
    priority: u32,
    max_jobs: usize,
    auth_env_vars: &[&str],
    freshness: FreshnessPolicy,
) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        enabled,
        priority,
        max_jobs,
        requires_auth: !auth_env_vars.is_empty(),
        auth_env_vars: auth_env_vars.iter().map(|s| s.to_string()).collect(),
        freshness,
    }
}

/// Built-in source registry
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        source(
            "linkedin-public",
            "LinkedIn Public API",
            true,
            1,
            100,
            &[],
            FreshnessPolicy::hours(24, MissingDate::Accept),
        ),
        source(
            "adzuna",
            "Adzuna API",
            true,
            2,
            100,
            &["ADZUNA_APP_ID", "ADZUNA_API_KEY"],
            FreshnessPolicy::hours(24, MissingDate::Accept),
        ),
        source(
            "rss",
            "RSS Feeds",
            true,
            3,
            50,
            &[],
            FreshnessPolicy::hours(72, MissingDate::Discard),
        ),
        source(
            "linkedin",
            "LinkedIn (browser)",
            false,
            10,
            50,
            &["LINKEDIN_EMAIL", "LINKEDIN_PASSWORD"],
            FreshnessPolicy::hours(72, MissingDate::Accept),
        ),
        source(
            "indeed",
            "Indeed (browser)",
            false,
            11,
            50,
            &[],
            FreshnessPolicy::hours(72, MissingDate::Accept),
        ),
    ]
}

/// Enabled, credentialed sources in ascending priority
pub fn runnable_sources(sources: &[SourceConfig]) -> Vec<SourceConfig> {
    let mut runnable: Vec<SourceConfig> = sources
        .iter()
        .filter(|s| s.enabled)
        .filter(|s| {
            let ok = s.has_required_auth();
            if !ok {
                warn!(source = %s.id, vars = ?s.auth_env_vars, "Source enabled but credentials missing, skipping");
            }
            ok
        })
        .cloned()
        .collect();
    runnable.sort_by_key(|s| s.priority);
    runnable
}

/// Registry availability summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub total: usize,
    pub enabled: usize,
    pub available: usize,
    pub missing_auth: Vec<String>,
}

pub fn source_stats(sources: &[SourceConfig]) -> SourceStats {
    let enabled: Vec<&SourceConfig> = sources.iter().filter(|s| s.enabled).collect();
    let missing_auth: Vec<String> = enabled
        .iter()
        .filter(|s| !s.has_required_auth())
        .map(|s| s.id.clone())
        .collect();
    SourceStats {
        total: sources.len(),
        enabled: enabled.len(),
        available: enabled.len() - missing_auth.len(),
        missing_auth,
    }
}

/// Shared resources connectors are built from
#[derive(Clone)]
pub struct ConnectorDeps {
    pub fetcher: HttpFetcher,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub robots: Arc<RobotsPolicy>,
    pub scope: SearchScope,
}

/// Build the connector for a source, `None` for unknown ids
pub fn create_connector(source: &SourceConfig, deps: &ConnectorDeps) -> Option<Box<dyn SourceConnector>> {
    let connector: Box<dyn SourceConnector> = match source.id.as_str() {
        "linkedin-public" => Box::new(LinkedInPublicConnector::new(
            deps.fetcher.clone(),
            deps.scope.locations.clone(),
            source.freshness,
        )),
        "adzuna" => Box::new(AdzunaConnector::new(
            deps.fetcher.clone(),
            deps.scope.countries.clone(),
            AdzunaCredentials::from_env(),
            source.freshness,
        )),
        "rss" => Box::new(RssConnector::new(deps.fetcher.clone(), source.freshness)),
        "linkedin" => Box::new(PageScrapeConnector::new(
            BoardLayout::linkedin(),
            deps.launcher.clone(),
            deps.fetcher.clone(),
            deps.robots.clone(),
            source.freshness,
        )),
        "indeed" => Box::new(PageScrapeConnector::new(
            BoardLayout::indeed(),
            deps.launcher.clone(),
            deps.fetcher.clone(),
            deps.robots.clone(),
            source.freshness,
        )),
        _ => return None,
    };
    Some(connector)
}

/// Connector construction seam for the orchestrator
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, source: &SourceConfig) -> Option<Box<dyn SourceConnector>>;
}

pub struct DefaultConnectorFactory {
    deps: ConnectorDeps,
}

impl DefaultConnectorFactory {
    pub fn new(deps: ConnectorDeps) -> Self {
        Self { deps }
    }
}

impl ConnectorFactory for DefaultConnectorFactory {
    fn create(&self, source: &SourceConfig) -> Option<Box<dyn SourceConnector>> {
        create_connector(source, &self.deps)
    }
}
