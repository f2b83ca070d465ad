//! Browser-driven board scraping
//!
//! For boards without an API. One search page is loaded through the browser
//! driver (rate limited and backed off like any other request, after a
//! robots.txt check) and its job cards are read with an in-page script.

use async_stream::stream;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CandidateStream, ConnectorError, FreshnessPolicy, ScrapedCandidate, SourceConnector};
use crate::automation::{BrowserLauncher, DriverError, PageDriver};
use crate::services::http_fetcher::HttpFetcher;
use crate::services::rate_limiter::{domain_of, run_with_backoff, AttemptError, FetchError};
use crate::services::robots::RobotsPolicy;
use crate::utils::text::{clean_html, parse_relative_age};

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a board's search lives and how its cards are read
#[derive(Debug, Clone)]
pub struct BoardLayout {
    pub source_id: &'static str,
    pub search_base: &'static str,
    pub query_param: &'static str,
    pub extra_params: &'static [(&'static str, &'static str)],
    /// Returns `[{url, title, company, description, posted}]`
    pub card_script: &'static str,
}

const LINKEDIN_CARDS: &str = r#"
return Array.from(document.querySelectorAll('.base-card')).map(card => {
  const text = sel => { const el = card.querySelector(sel); return el ? el.textContent.trim() : ''; };
  const link = card.querySelector('a.base-card__full-link');
  return {
    url: link ? link.href : '',
    title: text('.base-search-card__title'),
    company: text('.base-search-card__subtitle'),
    description: 'Full job description available on LinkedIn',
    posted: text('time')
  };
});
"#;

const INDEED_CARDS: &str = r#"
return Array.from(document.querySelectorAll('.job_seen_beacon')).map(card => {
  const text = sel => { const el = card.querySelector(sel); return el ? el.textContent.trim() : ''; };
  const link = card.querySelector('a[data-jk]');
  const key = link ? link.getAttribute('data-jk') : '';
  return {
    url: key ? 'https://www.indeed.com/viewjob?jk=' + key : '',
    title: text('.jobTitle'),
    company: text('[data-testid="company-name"]'),
    description: text('.job-snippet') || 'Full job description available on Indeed',
    posted: text('.date')
  };
});
"#;

impl BoardLayout {
    pub fn linkedin() -> Self {
        Self {
            source_id: "linkedin",
            search_base: "https://www.linkedin.com/jobs/search/",
            query_param: "keywords",
            extra_params: &[("location", "Worldwide")],
            card_script: LINKEDIN_CARDS,
        }
    }

    pub fn indeed() -> Self {
        Self {
            source_id: "indeed",
            search_base: "https://www.indeed.com/jobs",
            query_param: "q",
            extra_params: &[("l", "")],
            card_script: INDEED_CARDS,
        }
    }

    pub fn search_url(&self, query: &str) -> Result<reqwest::Url, FetchError> {
        let mut params = vec![(self.query_param, query)];
        params.extend(self.extra_params.iter().copied());
        reqwest::Url::parse_with_params(self.search_base, &params)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }
}

/// Card as returned by the in-page script
#[derive(Debug, Clone, Deserialize)]
pub struct PageCard {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub posted: String,
}

pub struct PageScrapeConnector {
    layout: BoardLayout,
    launcher: Arc<dyn BrowserLauncher>,
    fetcher: HttpFetcher,
    robots: Arc<RobotsPolicy>,
    freshness: FreshnessPolicy,
    page: Option<Arc<dyn PageDriver>>,
    scraped: bool,
}

impl PageScrapeConnector {
    pub fn new(
        layout: BoardLayout,
        launcher: Arc<dyn BrowserLauncher>,
        fetcher: HttpFetcher,
        robots: Arc<RobotsPolicy>,
        freshness: FreshnessPolicy,
    ) -> Self {
        Self {
            layout,
            launcher,
            fetcher,
            robots,
            freshness,
            page: None,
            scraped: false,
        }
    }

    /// Load `url` with per-domain spacing and the shared backoff policy
    async fn navigate(&self, page: &dyn PageDriver, url: &str) -> Result<(), FetchError> {
        let domain = domain_of(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        run_with_backoff(
            self.fetcher.limiter(),
            self.fetcher.policy(),
            &domain,
            || async {
                match page.navigate(url, PAGE_LOAD_TIMEOUT).await {
                    Ok(outcome) if outcome.status == Some(429) => Err(AttemptError::Throttled),
                    Ok(_) => Ok(()),
                    Err(e) => Err(AttemptError::from(e)),
                }
            },
        )
        .await
    }
}

#[async_trait]
impl SourceConnector for PageScrapeConnector {
    fn source_id(&self) -> &str {
        self.layout.source_id
    }

    async fn init(&mut self) -> Result<(), ConnectorError> {
        let page = self.launcher.launch().await?;
        self.page = Some(page);
        info!(source = self.layout.source_id, "Browser connector ready");
        Ok(())
    }

    fn scrape<'a>(&'a mut self, query: &'a str, max_jobs: usize) -> CandidateStream<'a> {
        if std::mem::replace(&mut self.scraped, true) {
            return super::failed_stream(ConnectorError::Exhausted(self.source_id().to_string()));
        }
        let Some(page) = self.page.clone() else {
            return super::failed_stream(ConnectorError::NotInitialized(self.source_id().to_string()));
        };

        let this = &*self;
        Box::pin(stream! {
            let url = match this.layout.search_url(query) {
                Ok(url) => url,
                Err(e) => {
                    yield Err(ConnectorError::from(e));
                    return;
                }
            };

            if !this.robots.is_allowed(url.as_str()).await {
                warn!(source = this.layout.source_id, %url, "Search page disallowed by robots.txt");
                yield Err(ConnectorError::Disallowed(url.to_string()));
                return;
            }

            if let Err(e) = this.navigate(page.as_ref(), url.as_str()).await {
                yield Err(ConnectorError::from(e));
                return;
            }

            let cards: Vec<PageCard> = match page.evaluate(this.layout.card_script, Vec::new()).await {
                Ok(value) => match serde_json::from_value(value) {
                    Ok(cards) => cards,
                    Err(e) => {
                        yield Err(ConnectorError::Parse(e.to_string()));
                        return;
                    }
                },
                Err(e) => {
                    yield Err(ConnectorError::from(e));
                    return;
                }
            };
            debug!(source = this.layout.source_id, count = cards.len(), "Read job cards");

            let now = Utc::now();
            let mut yielded = 0usize;
            for card in cards {
                if yielded >= max_jobs {
                    break;
                }
                let title = clean_html(&card.title);
                let company = clean_html(&card.company);
                if card.url.is_empty() || title.is_empty() || company.is_empty() {
                    yield Err(ConnectorError::Parse(format!("incomplete card {:?}", card.title)));
                    continue;
                }

                let posted_at = parse_relative_age(&card.posted, now);
                if !this.freshness.admits(posted_at, now) {
                    continue;
                }

                yielded += 1;
                yield Ok(ScrapedCandidate {
                    url: card.url.trim().to_string(),
                    company,
                    title,
                    description: clean_html(&card.description),
                    posted_at,
                });
            }

            info!(source = this.layout.source_id, count = yielded, "Board scrape finished");
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        if let Some(page) = self.page.take() {
            page.close().await.map_err(|e| {
                warn!(source = self.layout.source_id, error = %e, "Browser close failed");
                ConnectorError::from(e)
            })?;
        }
        Ok(())
    }
}

impl From<DriverError> for AttemptError {
    fn from(e: DriverError) -> Self {
        if e.is_transient() {
            AttemptError::Transient(e.to_string())
        } else {
            AttemptError::Fatal(e.to_string())
        }
    }
}
