//! LinkedIn guest jobs API
//!
//! The search endpoint returns HTML job cards; each card's detail endpoint
//! carries the description and a "posted N days ago" stamp. No login.

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info, warn};

use super::{CandidateStream, ConnectorError, FreshnessPolicy, ScrapedCandidate, SourceConnector};
use crate::services::http_fetcher::HttpFetcher;
use crate::services::rate_limiter::FetchError;
use crate::utils::text::{clean_html, parse_feed_date, parse_relative_age};

const SEARCH_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
const DETAIL_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/jobPosting";
const VIEW_URL: &str = "https://www.linkedin.com/jobs/view";

/// `f_TPR` value for "past 24 hours"
const POSTED_WITHIN: &str = "r86400";

const NO_DESCRIPTION: &str = "No description available";

static CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<li[^>]*>.*?(?:data-job-id="(\d+)"|jobPosting:(\d+)).*?<h3[^>]*>(.*?)</h3>.*?<h4[^>]*>(.*?)</h4>(.*?)</li>"#)
        .expect("valid regex")
});
static CARD_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<time[^>]*datetime="([^"]+)""#).expect("valid regex"));
static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*description[^"]*"[^>]*>(.*?)</div>"#).expect("valid regex")
});
static POSTED_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="[^"]*posted-time-ago[^"]*"[^>]*>(.*?)<"#).expect("valid regex")
});

/// Job card from the search listing
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCard {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub listed_at: Option<DateTime<Utc>>,
}

pub fn parse_search_cards(html: &str) -> Vec<SearchCard> {
    CARD.captures_iter(html)
        .filter_map(|caps| {
            let job_id = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
            let listed_at = CARD_DATE
                .captures(&caps[5])
                .and_then(|d| parse_feed_date(&d[1]));
            Some(SearchCard {
                job_id,
                title: clean_html(&caps[3]),
                company: clean_html(&caps[4]),
                listed_at,
            })
        })
        .filter(|card| !card.title.is_empty() && !card.company.is_empty())
        .collect()
}

/// Description and posting date from a detail page
pub fn parse_job_detail(html: &str, now: DateTime<Utc>) -> (Option<String>, Option<DateTime<Utc>>) {
    let description = DESCRIPTION
        .captures(html)
        .map(|caps| clean_html(&caps[1]))
        .filter(|d| !d.is_empty());
    let posted_at = POSTED_AGO
        .captures(html)
        .and_then(|caps| parse_relative_age(&caps[1], now))
        .or_else(|| parse_relative_age(&clean_html(html), now));
    (description, posted_at)
}

pub struct LinkedInPublicConnector {
    fetcher: HttpFetcher,
    locations: Vec<String>,
    freshness: FreshnessPolicy,
    scraped: bool,
}

impl LinkedInPublicConnector {
    pub fn new(fetcher: HttpFetcher, locations: Vec<String>, freshness: FreshnessPolicy) -> Self {
        Self {
            fetcher,
            locations,
            freshness,
            scraped: false,
        }
    }

    fn search_url(query: &str, location: &str) -> Result<Url, FetchError> {
        Url::parse_with_params(
            SEARCH_URL,
            &[
                ("keywords", query),
                ("location", location),
                ("f_TPR", POSTED_WITHIN),
                ("start", "0"),
                ("sortBy", "DD"),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl SourceConnector for LinkedInPublicConnector {
    fn source_id(&self) -> &str {
        "linkedin-public"
    }

    async fn init(&mut self) -> Result<(), ConnectorError> {
        info!("LinkedIn public connector ready");
        Ok(())
    }

    fn scrape<'a>(&'a mut self, query: &'a str, max_jobs: usize) -> CandidateStream<'a> {
        if std::mem::replace(&mut self.scraped, true) {
            return super::failed_stream(ConnectorError::Exhausted(self.source_id().to_string()));
        }

        let this = &*self;
        Box::pin(stream! {
            let mut yielded = 0usize;

            for location in &this.locations {
                if yielded >= max_jobs {
                    break;
                }

                let url = match Self::search_url(query, location) {
                    Ok(url) => url,
                    Err(e) => {
                        yield Err(ConnectorError::from(e));
                        continue;
                    }
                };
                debug!(%url, location = %location, "Searching LinkedIn");

                let page = match this.fetcher.get(url.as_str()).await {
                    Ok(page) => page,
                    Err(e) => {
                        let terminal = e.is_terminal_for_connector();
                        yield Err(ConnectorError::from(e));
                        if terminal {
                            return;
                        }
                        continue;
                    }
                };
                if !page.is_success() {
                    warn!(status = page.status, location = %location, "LinkedIn search returned error status");
                    yield Err(ConnectorError::from(FetchError::Status { status: page.status, url: url.to_string() }));
                    continue;
                }

                let cards = parse_search_cards(&page.body);
                debug!(count = cards.len(), location = %location, "Parsed LinkedIn cards");

                for card in cards {
                    if yielded >= max_jobs {
                        break;
                    }

                    let detail_url = format!("{}/{}", DETAIL_URL, card.job_id);
                    let (description, detail_date) = match this.fetcher.get(&detail_url).await {
                        Ok(detail) if detail.is_success() => parse_job_detail(&detail.body, Utc::now()),
                        Ok(detail) => {
                            debug!(job_id = %card.job_id, status = detail.status, "No detail page");
                            (None, None)
                        }
                        Err(e) if e.is_terminal_for_connector() => {
                            yield Err(ConnectorError::from(e));
                            return;
                        }
                        Err(e) => {
                            warn!(job_id = %card.job_id, error = %e, "Detail fetch failed");
                            (None, None)
                        }
                    };

                    let posted_at = detail_date.or(card.listed_at);
                    if !this.freshness.admits(posted_at, Utc::now()) {
                        debug!(job_id = %card.job_id, "Stale or undated LinkedIn posting, skipping");
                        continue;
                    }

                    yielded += 1;
                    yield Ok(ScrapedCandidate {
                        url: format!("{}/{}", VIEW_URL, card.job_id),
                        company: card.company,
                        title: card.title,
                        description: description.unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                        posted_at,
                    });
                }
            }

            info!(count = yielded, "LinkedIn public scrape finished");
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const SEARCH_HTML: &str = r##"
<li>
  <div class="base-card" data-entity-urn="urn:li:jobPosting:3901" data-job-id="3901">
    <h3 class="base-search-card__title">
      Senior Rust Engineer
    </h3>
    <h4 class="base-search-card__subtitle"><a href="#">Ferrous &amp; Co</a></h4>
    <time class="job-search-card__listdate" datetime="2026-03-10">1 hour ago</time>
  </div>
</li>
<li>
  <div class="base-card" data-entity-urn="urn:li:jobPosting:3902">
    <h3 class="base-search-card__title">Platform Engineer</h3>
    <h4 class="base-search-card__subtitle">Acme</h4>
  </div>
</li>"##;

    #[test]
    fn test_parse_search_cards() {
        let cards = parse_search_cards(SEARCH_HTML);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].job_id, "3901");
        assert_eq!(cards[0].title, "Senior Rust Engineer");
        assert_eq!(cards[0].company, "Ferrous & Co");
        assert_eq!(
            cards[0].listed_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(cards[1].job_id, "3902");
        assert_eq!(cards[1].listed_at, None);
    }

    #[test]
    fn test_parse_job_detail() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let html = r#"<section>
            <span class="posted-time-ago__text">3 hours ago</span>
            <div class="show-more-less-html__markup description">We build <b>fast</b> things.</div>
        </section>"#;
        let (description, posted_at) = parse_job_detail(html, now);
        assert_eq!(description.as_deref(), Some("We build fast things."));
        assert_eq!(posted_at, Some(now - Duration::hours(3)));
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = LinkedInPublicConnector::search_url("rust engineer", "Remote").unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("keywords=rust+engineer"));
        assert!(query.contains("f_TPR=r86400"));
        assert!(query.contains("sortBy=DD"));
    }
}
