//! robots.txt policy
//!
//! Page-scrape connectors check the target path against the disallow
//! rules for `User-agent: *` (and agents naming "bot"). Rules are cached
//! per origin. An unreachable or unreadable robots.txt allows everything.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::http_fetcher::HttpFetcher;

/// Parsed disallow rules for one origin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn parse(content: &str) -> Self {
        let mut disallow = Vec::new();
        let mut applies = false;
        let mut in_agent_block = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines form one group
                    if !in_agent_block {
                        applies = false;
                    }
                    in_agent_block = true;
                    let agent = value.to_lowercase();
                    if agent == "*" || agent.contains("bot") {
                        applies = true;
                    }
                }
                "disallow" => {
                    in_agent_block = false;
                    if applies && !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }

        Self { disallow }
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        !self.disallow.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Cached robots.txt lookups
pub struct RobotsPolicy {
    fetcher: HttpFetcher,
    cache: Mutex<HashMap<String, RobotsRules>>,
}

impl RobotsPolicy {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `url` may be visited
    pub async fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return false;
        };
        let origin = parsed.origin().ascii_serialization();

        let cached = self.cache.lock().await.get(&origin).cloned();
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = self.load(&origin).await;
                self.cache.lock().await.insert(origin.clone(), rules.clone());
                rules
            }
        };

        let allowed = rules.is_allowed(parsed.path());
        if !allowed {
            debug!(url, "Disallowed by robots.txt");
        }
        allowed
    }

    async fn load(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{}/robots.txt", origin);
        match self.fetcher.get(&robots_url).await {
            Ok(page) if page.is_success() => RobotsRules::parse(&page.body),
            Ok(_) => RobotsRules::default(),
            Err(e) => {
                warn!(origin, error = %e, "Could not fetch robots.txt, allowing all");
                RobotsRules::default()
            }
        }
    }
}
