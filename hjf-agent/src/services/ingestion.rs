//! Ingestion orchestrator
//!
//! Runs every runnable source in priority order, deduplicates candidates
//! against stored postings (fingerprint, then URL), scores the survivors
//! and stores them as `new`. A source that fails outright is logged and
//! recorded in the summary; the run moves on to the next source.

use chrono::Utc;
use futures::StreamExt;
use hjf_common::events::{AgentEvent, EventBus};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::connectors::{runnable_sources, ConnectorFactory, ScrapedCandidate, SourceConfig, SourceConnector};
use super::fingerprint::fingerprint;
use super::scorer::MatchScorer;
use crate::db;
use crate::models::NewJobPosting;

/// Counts for one source within a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceRunStats {
    pub examined: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub examined: usize,
    pub per_source: BTreeMap<String, SourceRunStats>,
    pub failed_sources: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,
}

impl IngestionError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestionError::AlreadyRunning => "INGESTION_RUNNING",
        }
    }
}

pub struct IngestionOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    factory: Arc<dyn ConnectorFactory>,
    scorer: Option<Arc<MatchScorer>>,
    sources: Vec<SourceConfig>,
    query: String,
    run_lock: Mutex<()>,
}

impl IngestionOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        factory: Arc<dyn ConnectorFactory>,
        scorer: Option<Arc<MatchScorer>>,
        sources: Vec<SourceConfig>,
        query: String,
    ) -> Self {
        Self {
            db,
            event_bus,
            factory,
            scorer,
            sources,
            query,
            run_lock: Mutex::new(()),
        }
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Run every runnable source once; overlapping runs are rejected
    pub async fn run(&self) -> Result<RunSummary, IngestionError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| IngestionError::AlreadyRunning)?;

        let started = std::time::Instant::now();
        let sources = runnable_sources(&self.sources);
        info!(sources = sources.len(), query = %self.query, "Ingestion run starting");

        let profile_text = match db::profile::get_profile(&self.db).await {
            Ok(Some(profile)) => Some(profile.scoring_text()),
            Ok(None) => {
                info!("No candidate profile, postings will be stored unscored");
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not load profile, postings will be stored unscored");
                None
            }
        };

        let mut summary = RunSummary::default();

        for source in &sources {
            let Some(connector) = self.factory.create(source) else {
                warn!(source = %source.id, "No connector implementation for source");
                summary.failed_sources.push(source.id.clone());
                continue;
            };

            let (stats, failed) = self
                .run_source(source, connector, profile_text.as_deref())
                .await;

            summary.examined += stats.examined;
            summary.inserted += stats.inserted;
            summary.duplicates += stats.duplicates;
            if failed {
                summary.failed_sources.push(source.id.clone());
            }
            summary.per_source.insert(source.id.clone(), stats);
        }

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            examined = summary.examined,
            failed = ?summary.failed_sources,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingestion run finished"
        );

        self.event_bus.emit_lossy(AgentEvent::IngestionCompleted {
            inserted: summary.inserted,
            duplicates: summary.duplicates,
            examined: summary.examined,
            failed_sources: summary.failed_sources.clone(),
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    /// Drive one connector to completion; the flag is true when it failed
    async fn run_source(
        &self,
        source: &SourceConfig,
        mut connector: Box<dyn SourceConnector>,
        profile_text: Option<&str>,
    ) -> (SourceRunStats, bool) {
        let mut stats = SourceRunStats::default();

        if let Err(e) = connector.init().await {
            error!(source = %source.id, error = %e, "Connector failed to initialise");
            if let Err(e) = connector.close().await {
                debug!(source = %source.id, error = %e, "Connector close after failed init");
            }
            return (stats, true);
        }

        let mut failed = false;
        {
            let mut stream = connector.scrape(&self.query, source.max_jobs);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(candidate) => {
                        stats.examined += 1;
                        match self.ingest(source, candidate, profile_text).await {
                            Ok(true) => stats.inserted += 1,
                            Ok(false) => stats.duplicates += 1,
                            Err(e) => {
                                stats.errors += 1;
                                error!(source = %source.id, error = %e, "Failed to store posting");
                            }
                        }
                    }
                    Err(e) if e.is_terminal() => {
                        error!(source = %source.id, error = %e, "Connector failed, abandoning source for this run");
                        failed = true;
                        break;
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!(source = %source.id, error = %e, "Skipping item");
                    }
                }
            }
        }

        if let Err(e) = connector.close().await {
            warn!(source = %source.id, error = %e, "Connector close failed");
        }

        info!(
            source = %source.id,
            examined = stats.examined,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            "Source finished"
        );
        (stats, failed)
    }

    /// Store one candidate; `Ok(false)` means it was already known
    async fn ingest(
        &self,
        source: &SourceConfig,
        candidate: ScrapedCandidate,
        profile_text: Option<&str>,
    ) -> hjf_common::Result<bool> {
        let print = fingerprint(&candidate.company, &candidate.title);

        if db::jobs::fingerprint_exists(&self.db, &print).await? {
            debug!(fingerprint = %print, "Duplicate posting (fingerprint)");
            return Ok(false);
        }
        if db::jobs::url_exists(&self.db, &candidate.url).await? {
            debug!(url = %candidate.url, "Duplicate posting (url)");
            return Ok(false);
        }

        let match_score = match (&self.scorer, profile_text) {
            (Some(scorer), Some(profile)) => scorer.score(&candidate.scoring_text(), profile).await,
            _ => None,
        };

        let posting = NewJobPosting {
            url: candidate.url,
            company: candidate.company,
            title: candidate.title,
            description: candidate.description,
            fingerprint: print,
            source: source.id.clone(),
            match_score,
            posted_at: candidate.posted_at,
        };

        match db::jobs::insert_job(&self.db, &posting).await {
            Ok(id) => {
                debug!(job_id = id, source = %source.id, score = ?match_score, "Stored posting");
                Ok(true)
            }
            // Lost a race with a concurrent insert of the same posting
            Err(e) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
