//! Rate-limited HTTP client shared by the API and feed connectors

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limiter::{
    domain_of, run_with_backoff, AttemptError, BackoffPolicy, DomainRateLimiter, FetchError,
};

/// User-Agent sent with every outbound request
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HorizonJobFiler/0.1";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body with its status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET with per-domain spacing, 429 backoff and network retries
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<DomainRateLimiter>,
    policy: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(limiter: Arc<DomainRateLimiter>, policy: BackoffPolicy) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter,
            policy,
        })
    }

    pub fn limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// GET `url`, returning any non-429 response
    pub async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let domain = domain_of(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        run_with_backoff(&self.limiter, &self.policy, &domain, || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(classify_reqwest_error)?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(AttemptError::Throttled);
            }

            let status = response.status().as_u16();
            let body = response.text().await.map_err(classify_reqwest_error)?;
            Ok(FetchedPage { status, body })
        })
        .await
    }

    /// GET `url` and decode a successful JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let page = self.get(url).await?;
        if !page.is_success() {
            return Err(FetchError::Status {
                status: page.status,
                url: url.to_string(),
            });
        }
        serde_json::from_str(&page.body).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        AttemptError::Fatal(err.to_string())
    } else {
        // timeouts, connection resets, truncated bodies
        AttemptError::Transient(err.to_string())
    }
}
