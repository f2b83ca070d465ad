//! Adzuna search API
//!
//! Needs `ADZUNA_APP_ID` and `ADZUNA_API_KEY`. One request per configured
//! country, newest first, restricted to the last day.

use async_stream::stream;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use super::{CandidateStream, ConnectorError, FreshnessPolicy, ScrapedCandidate, SourceConnector};
use crate::services::http_fetcher::HttpFetcher;
use crate::services::rate_limiter::FetchError;
use crate::utils::text::{clean_html, parse_feed_date};

const API_BASE: &str = "https://api.adzuna.com/v1/api/jobs";
const RESULTS_PER_PAGE: &str = "50";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdzunaCredentials {
    pub app_id: String,
    pub api_key: String,
}

impl AdzunaCredentials {
    pub fn from_env() -> Option<Self> {
        let app_id = std::env::var("ADZUNA_APP_ID").ok().filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("ADZUNA_API_KEY").ok().filter(|v| !v.trim().is_empty())?;
        Some(Self { app_id, api_key })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
pub struct AdzunaJob {
    pub title: Option<String>,
    pub company: Option<AdzunaCompany>,
    pub description: Option<String>,
    pub redirect_url: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdzunaCompany {
    pub display_name: Option<String>,
}

impl AdzunaJob {
    /// `None` when the result has no link to apply through
    pub fn into_candidate(self) -> Option<ScrapedCandidate> {
        let url = self.redirect_url.filter(|u| !u.trim().is_empty())?;
        Some(ScrapedCandidate {
            url,
            company: self
                .company
                .and_then(|c| c.display_name)
                .unwrap_or_else(|| "Unknown Company".to_string()),
            title: self
                .title
                .map(|t| clean_html(&t))
                .unwrap_or_else(|| "Unknown Title".to_string()),
            description: self
                .description
                .map(|d| clean_html(&d))
                .unwrap_or_else(|| "No description available".to_string()),
            posted_at: self.created.as_deref().and_then(parse_feed_date),
        })
    }
}

pub struct AdzunaConnector {
    fetcher: HttpFetcher,
    countries: Vec<String>,
    credentials: Option<AdzunaCredentials>,
    freshness: FreshnessPolicy,
    scraped: bool,
}

impl AdzunaConnector {
    pub fn new(
        fetcher: HttpFetcher,
        countries: Vec<String>,
        credentials: Option<AdzunaCredentials>,
        freshness: FreshnessPolicy,
    ) -> Self {
        Self {
            fetcher,
            countries,
            credentials,
            freshness,
            scraped: false,
        }
    }

    fn search_url(credentials: &AdzunaCredentials, country: &str, query: &str) -> Result<Url, FetchError> {
        Url::parse_with_params(
            &format!("{}/{}/search/1", API_BASE, country),
            &[
                ("app_id", credentials.app_id.as_str()),
                ("app_key", credentials.api_key.as_str()),
                ("results_per_page", RESULTS_PER_PAGE),
                ("what", query),
                ("max_days_old", "1"),
                ("sort_by", "date"),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl SourceConnector for AdzunaConnector {
    fn source_id(&self) -> &str {
        "adzuna"
    }

    async fn init(&mut self) -> Result<(), ConnectorError> {
        if self.credentials.is_none() {
            return Err(ConnectorError::MissingCredentials(
                "ADZUNA_APP_ID and ADZUNA_API_KEY must be set".to_string(),
            ));
        }
        info!(countries = ?self.countries, "Adzuna connector ready");
        Ok(())
    }

    fn scrape<'a>(&'a mut self, query: &'a str, max_jobs: usize) -> CandidateStream<'a> {
        if std::mem::replace(&mut self.scraped, true) {
            return super::failed_stream(ConnectorError::Exhausted(self.source_id().to_string()));
        }
        let Some(credentials) = self.credentials.clone() else {
            return super::failed_stream(ConnectorError::NotInitialized(self.source_id().to_string()));
        };

        let this = &*self;
        Box::pin(stream! {
            let mut yielded = 0usize;

            for country in &this.countries {
                if yielded >= max_jobs {
                    break;
                }

                let url = match Self::search_url(&credentials, country, query) {
                    Ok(url) => url,
                    Err(e) => {
                        yield Err(ConnectorError::from(e));
                        continue;
                    }
                };

                let response: SearchResponse = match this.fetcher.get_json(url.as_str()).await {
                    Ok(response) => response,
                    Err(e) => {
                        let terminal = e.is_terminal_for_connector();
                        yield Err(ConnectorError::from(e));
                        if terminal {
                            return;
                        }
                        continue;
                    }
                };
                debug!(country = %country, results = response.results.len(), "Adzuna results");

                for job in response.results {
                    if yielded >= max_jobs {
                        break;
                    }
                    let Some(candidate) = job.into_candidate() else {
                        continue;
                    };
                    if !this.freshness.admits(candidate.posted_at, chrono::Utc::now()) {
                        debug!(title = %candidate.title, "Stale Adzuna posting, skipping");
                        continue;
                    }
                    yielded += 1;
                    yield Ok(candidate);
                }
            }

            info!(count = yielded, "Adzuna scrape finished");
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_mapping() {
        let body = r#"{"results": [
            {"title": "<strong>Rust</strong> Developer", "company": {"display_name": "Crabs Ltd"},
             "description": "Systems work", "redirect_url": "https://adzuna.example/1",
             "created": "2026-03-10T08:00:00Z"},
            {"title": "No link", "company": {"display_name": "X"}},
            {"redirect_url": "https://adzuna.example/3"}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let candidates: Vec<ScrapedCandidate> = response
            .results
            .into_iter()
            .filter_map(AdzunaJob::into_candidate)
            .collect();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Rust Developer");
        assert_eq!(candidates[0].company, "Crabs Ltd");
        assert!(candidates[0].posted_at.is_some());
        assert_eq!(candidates[1].company, "Unknown Company");
        assert_eq!(candidates[1].title, "Unknown Title");
        assert_eq!(candidates[1].posted_at, None);
    }

    #[test]
    fn test_search_url() {
        let creds = AdzunaCredentials {
            app_id: "id".into(),
            api_key: "key".into(),
        };
        let url = AdzunaConnector::search_url(&creds, "gb", "rust").unwrap();
        assert_eq!(url.path(), "/v1/api/jobs/gb/search/1");
        let query = url.query().unwrap();
        assert!(query.contains("max_days_old=1"));
        assert!(query.contains("sort_by=date"));
        assert!(query.contains("results_per_page=50"));
    }
}
