//! Per-domain rate limiting and backoff
//!
//! Every network operation against a domain first waits until at least
//! [`MIN_DOMAIN_INTERVAL`] has passed since the previous one. Explicit
//! throttling (HTTP 429) walks the [`THROTTLE_BACKOFF_MS`] ladder;
//! transient network faults get a separate, short retry budget.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

/// Minimum spacing between two requests to the same domain
pub const MIN_DOMAIN_INTERVAL: Duration = Duration::from_millis(30_000);

/// Waits after the 1st, 2nd and 3rd consecutive throttling response
pub const THROTTLE_BACKOFF_MS: [u64; 3] = [60_000, 120_000, 240_000];

/// Retries after a transient network fault
pub const NETWORK_RETRY_LIMIT: u32 = 3;

/// Fixed wait before each network retry
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_millis(5_000);

/// Process-wide map of domain → last request instant
///
/// Each domain has its own lock, so waiting on one domain never delays
/// requests to another. Requests to the same domain are serialized.
pub struct DomainRateLimiter {
    min_interval: Duration,
    domains: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl DomainRateLimiter {
    pub fn new() -> Self {
        Self::with_interval(MIN_DOMAIN_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `domain` may be contacted, then record the request
    pub async fn acquire(&self, domain: &str) {
        let slot = {
            let mut domains = self.domains.lock().await;
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut last_request = slot.lock().await;
        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(domain, wait_ms = wait.as_millis() as u64, "Rate limiting: waiting");
                sleep(wait).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Host part of a URL, used as the rate-limit key
pub fn domain_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Retry shape for one logical network operation
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub throttle_ladder: Vec<Duration>,
    pub network_retries: u32,
    pub network_retry_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            throttle_ladder: THROTTLE_BACKOFF_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            network_retries: NETWORK_RETRY_LIMIT,
            network_retry_delay: NETWORK_RETRY_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Same retry counts with no waiting
    pub fn immediate() -> Self {
        let default = Self::default();
        Self {
            throttle_ladder: vec![Duration::ZERO; default.throttle_ladder.len()],
            network_retries: default.network_retries,
            network_retry_delay: Duration::ZERO,
        }
    }
}

/// Outcome of one failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Remote side asked us to slow down (HTTP 429)
    Throttled,
    /// Timeout or connection-level fault
    Transient(String),
    /// Not worth retrying
    Fatal(String),
}

/// Terminal failure of a rate-limited operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{domain} kept throttling after {attempts} attempts")]
    Throttled { domain: String, attempts: u32 },

    #[error("network failure talking to {domain} after {attempts} attempts: {message}")]
    Network {
        domain: String,
        attempts: u32,
        message: String,
    },

    #[error("request failed: {0}")]
    Fatal(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Throttling beyond the ladder ends the connector's current operation
    pub fn is_terminal_for_connector(&self) -> bool {
        matches!(self, FetchError::Throttled { .. } | FetchError::Network { .. })
    }
}

/// Run `attempt` against `domain` with rate limiting and backoff
///
/// The limiter is consulted before every attempt, retries included.
pub async fn run_with_backoff<T, F, Fut>(
    limiter: &DomainRateLimiter,
    policy: &BackoffPolicy,
    domain: &str,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempts = 0u32;
    let mut throttle_step = 0usize;
    let mut network_retries = 0u32;

    loop {
        limiter.acquire(domain).await;
        attempts += 1;

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Throttled) => {
                let Some(delay) = policy.throttle_ladder.get(throttle_step) else {
                    error!(domain, attempts, "Throttling persisted past backoff ladder, giving up");
                    return Err(FetchError::Throttled {
                        domain: domain.to_string(),
                        attempts,
                    });
                };
                throttle_step += 1;
                warn!(
                    domain,
                    step = throttle_step,
                    delay_ms = delay.as_millis() as u64,
                    "Throttled (429), backing off"
                );
                sleep(*delay).await;
            }
            Err(AttemptError::Transient(message)) => {
                if network_retries >= policy.network_retries {
                    error!(domain, attempts, %message, "Network retries exhausted");
                    return Err(FetchError::Network {
                        domain: domain.to_string(),
                        attempts,
                        message,
                    });
                }
                network_retries += 1;
                warn!(
                    domain,
                    retry = network_retries,
                    of = policy.network_retries,
                    %message,
                    "Transient network fault, retrying"
                );
                sleep(policy.network_retry_delay).await;
            }
            Err(AttemptError::Fatal(message)) => return Err(FetchError::Fatal(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_ladder_literals() {
        assert_eq!(THROTTLE_BACKOFF_MS, [60_000, 120_000, 240_000]);
        for pair in THROTTLE_BACKOFF_MS.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
        assert_eq!(MIN_DOMAIN_INTERVAL, Duration::from_secs(30));
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://API.Adzuna.com/v1/x?y=1").as_deref(), Some("api.adzuna.com"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_domain_waits_min_interval() {
        let limiter = DomainRateLimiter::new();
        let start = Instant::now();

        limiter.acquire("a.example").await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire("a.example").await;
        assert!(start.elapsed() >= MIN_DOMAIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_domains_are_not_delayed() {
        let limiter = DomainRateLimiter::new();
        let start = Instant::now();

        limiter.acquire("a.example").await;
        limiter.acquire("b.example").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_ladder_then_success() {
        let limiter = DomainRateLimiter::with_interval(Duration::ZERO);
        let policy = BackoffPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = run_with_backoff(&limiter, &policy, "x", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AttemptError::Throttled)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        // 60s + 120s of backoff
        assert!(start.elapsed() >= Duration::from_secs(180));
        assert!(start.elapsed() < Duration::from_secs(181));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_past_ladder_is_terminal() {
        let limiter = DomainRateLimiter::with_interval(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = run_with_backoff(&limiter, &BackoffPolicy::default(), "x", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Throttled) }
        })
        .await;

        assert_eq!(
            result,
            Err(FetchError::Throttled {
                domain: "x".to_string(),
                attempts: 4
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_network_retry_budget() {
        let limiter = DomainRateLimiter::with_interval(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = run_with_backoff(&limiter, &BackoffPolicy::immediate(), "x", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Transient("timeout".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Network { attempts: 4, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1 + NETWORK_RETRY_LIMIT);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let limiter = DomainRateLimiter::with_interval(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = run_with_backoff(&limiter, &BackoffPolicy::immediate(), "x", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Fatal("bad request".to_string())) }
        })
        .await;

        assert_eq!(result, Err(FetchError::Fatal("bad request".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
