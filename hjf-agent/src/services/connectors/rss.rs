//! RSS / Atom job feeds
//!
//! Feeds are scanned with tolerant patterns rather than a strict XML
//! parser; job boards ship enough malformed markup that strictness loses
//! more items than it saves. Items without a date are untrusted by default.

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{CandidateStream, ConnectorError, FreshnessPolicy, ScrapedCandidate, SourceConnector};
use crate::services::http_fetcher::HttpFetcher;
use crate::services::rate_limiter::FetchError;
use crate::utils::text::{clean_html, decode_entities, parse_feed_date, unwrap_cdata};

/// Polled feeds, most active first
pub const DEFAULT_FEEDS: &[&str] = &[
    "https://remoteok.com/remote-dev-jobs.rss",
    "https://remoteok.com/remote-software-engineer-jobs.rss",
    "https://remoteok.com/remote-backend-jobs.rss",
    "https://hnrss.org/jobs",
    "https://weworkremotely.com/categories/remote-programming-jobs.rss",
    "https://weworkremotely.com/categories/remote-full-stack-programming-jobs.rss",
    "https://remotive.com/api/remote-jobs/feed",
    "https://lobste.rs/t/job.rss",
];

const UNKNOWN_COMPANY: &str = "Unknown Company";

static ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(item|entry)\b[^>]*>(.*?)</(item|entry)>").expect("valid regex"));
static LINK_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link\b[^>]*href="([^"]+)""#).expect("valid regex"));
static AT_COMPANY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bat\s+(.+?)(?:\s*\||$)").expect("valid regex"));
static DASH_COMPANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+[-–]\s+").expect("valid regex"));
static PAREN_COMPANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"));

/// One feed entry before freshness filtering
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

fn tag_text(block: &str, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        let pattern = format!(r"(?is)<{}\b[^>]*>(.*?)</{}>", regex::escape(name), regex::escape(name));
        let re = Regex::new(&pattern).ok()?;
        let raw = re.captures(block)?.get(1)?.as_str();
        let text = unwrap_cdata(raw).trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

/// Extract every item / entry from a feed document
pub fn parse_feed(xml: &str) -> Vec<FeedItem> {
    ITEM.captures_iter(xml)
        .filter_map(|caps| {
            let block = &caps[2];
            let title = tag_text(block, &["title"]).map(|t| clean_html(&decode_entities(&t)))?;
            let link = tag_text(block, &["link", "guid", "id"])
                .or_else(|| LINK_HREF.captures(block).map(|c| c[1].to_string()))
                .map(|l| decode_entities(&l).trim().to_string())
                .filter(|l| l.starts_with("http"))?;
            let description = tag_text(block, &["content:encoded", "description", "summary", "content"])
                .map(|d| clean_html(&decode_entities(&d)))
                .unwrap_or_else(|| "No description available".to_string());
            let published = tag_text(block, &["pubDate", "published", "updated", "dc:date"])
                .and_then(|d| parse_feed_date(&d));

            Some(FeedItem {
                title,
                link,
                description,
                published,
            })
        })
        .collect()
}

/// Best guess at the employer from a feed title
pub fn extract_company(title: &str) -> String {
    let company = AT_COMPANY
        .captures(title)
        .or_else(|| DASH_COMPANY.captures(title))
        .or_else(|| PAREN_COMPANY.captures(title))
        .map(|caps| caps[1].trim().to_string())
        .filter(|c| !c.is_empty());
    company.unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
}

pub struct RssConnector {
    fetcher: HttpFetcher,
    feeds: Vec<String>,
    freshness: FreshnessPolicy,
    scraped: bool,
}

impl RssConnector {
    pub fn new(fetcher: HttpFetcher, freshness: FreshnessPolicy) -> Self {
        Self::with_feeds(
            fetcher,
            DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            freshness,
        )
    }

    pub fn with_feeds(fetcher: HttpFetcher, feeds: Vec<String>, freshness: FreshnessPolicy) -> Self {
        Self {
            fetcher,
            feeds,
            freshness,
            scraped: false,
        }
    }
}

#[async_trait]
impl SourceConnector for RssConnector {
    fn source_id(&self) -> &str {
        "rss"
    }

    async fn init(&mut self) -> Result<(), ConnectorError> {
        info!(feeds = self.feeds.len(), "RSS connector ready");
        Ok(())
    }

    /// Feeds are not searchable; `query` only shows up in logs
    fn scrape<'a>(&'a mut self, query: &'a str, max_jobs: usize) -> CandidateStream<'a> {
        if std::mem::replace(&mut self.scraped, true) {
            return super::failed_stream(ConnectorError::Exhausted(self.source_id().to_string()));
        }

        let this = &*self;
        Box::pin(stream! {
            let mut yielded = 0usize;
            debug!(query, "Polling RSS feeds");

            for feed_url in &this.feeds {
                if yielded >= max_jobs {
                    break;
                }

                let page = match this.fetcher.get(feed_url).await {
                    Ok(page) if page.is_success() => page,
                    Ok(page) => {
                        warn!(feed = %feed_url, status = page.status, "Feed returned error status");
                        yield Err(ConnectorError::from(FetchError::Status {
                            status: page.status,
                            url: feed_url.clone(),
                        }));
                        continue;
                    }
                    Err(e) => {
                        let terminal = e.is_terminal_for_connector();
                        yield Err(ConnectorError::from(e));
                        if terminal {
                            return;
                        }
                        continue;
                    }
                };

                let items = parse_feed(&page.body);
                if items.is_empty() {
                    debug!(feed = %feed_url, "No items in feed");
                    continue;
                }

                let now = Utc::now();
                for item in items {
                    if yielded >= max_jobs {
                        break;
                    }
                    if !this.freshness.admits(item.published, now) {
                        debug!(title = %item.title, "Stale or undated feed item, skipping");
                        continue;
                    }
                    yielded += 1;
                    yield Ok(ScrapedCandidate {
                        company: extract_company(&item.title),
                        url: item.link,
                        title: item.title,
                        description: item.description,
                        posted_at: item.published,
                    });
                }
            }

            info!(count = yielded, "RSS scrape finished");
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}
