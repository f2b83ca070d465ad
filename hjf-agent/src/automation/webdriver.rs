//! W3C WebDriver adapter
//!
//! Talks to chromedriver / geckodriver over their HTTP JSON protocol.
//!
//! # Protocol Reference
//! - New session: `POST /session`
//! - Navigate: `POST /session/{id}/url`
//! - Find: `POST /session/{id}/element(s)`
//! - Script: `POST /session/{id}/execute/sync`
//! - Quit: `DELETE /session/{id}`

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::driver::{BrowserLauncher, DriverError, Locator, NavigationOutcome, PageDriver};

/// Upper bound on browser startup
pub const BROWSER_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Main-document status from the Navigation Timing entry
const NAVIGATION_STATUS_SCRIPT: &str =
    "const entry = performance.getEntriesByType('navigation')[0]; \
     return entry && entry.responseStatus ? entry.responseStatus : null;";

/// Launches browser sessions through a WebDriver server
pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(endpoint: &str, headless: bool) -> Result<Self, DriverError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage", "--window-size=1280,1024"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, DriverError> {
        let url = format!("{}/session", self.endpoint);
        let request = self.client.post(&url).json(&self.capabilities()).send();

        let response = tokio::time::timeout(BROWSER_LAUNCH_TIMEOUT, request)
            .await
            .map_err(|_| DriverError::Launch(format!("timed out after {:?}", BROWSER_LAUNCH_TIMEOUT)))?
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        if let Some(err) = protocol_error(&body) {
            return Err(DriverError::Launch(err.to_string()));
        }

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Launch("response missing sessionId".to_string()))?;

        info!(webdriver_session = session_id, "Browser launched");

        Ok(Arc::new(WebDriverPage {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One WebDriver session
pub struct WebDriverPage {
    client: Client,
    base: String,
    closed: AtomicBool,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let url = format!("{}{}", self.base, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if self.closed.load(Ordering::SeqCst) {
                DriverError::Closed
            } else {
                DriverError::Protocol(e.to_string())
            }
        })?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;

        if let Some(err) = protocol_error(&value) {
            return Err(err);
        }
        Ok(value["value"].clone())
    }

    async fn find(&self, selector: &str) -> Result<String, DriverError> {
        let value = self
            .command(Method::POST, "/element", Some(locator_body(selector)))
            .await
            .map_err(|e| match e {
                DriverError::Protocol(msg) if msg.contains("no such element") => {
                    DriverError::ElementNotFound(selector.to_string())
                }
                other => other,
            })?;

        value[ELEMENT_KEY]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome, DriverError> {
        self.command(
            Method::POST,
            "/timeouts",
            Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
        )
        .await?;

        let navigation = self.command(Method::POST, "/url", Some(json!({ "url": url })));
        // Small margin over the driver's own page-load timeout
        match tokio::time::timeout(timeout + Duration::from_secs(5), navigation).await {
            Err(_) => Err(DriverError::Timeout(timeout)),
            Ok(Err(DriverError::Protocol(msg))) if msg.starts_with("timeout") => {
                Err(DriverError::Timeout(timeout))
            }
            Ok(Err(DriverError::Protocol(msg))) => Err(DriverError::Navigation(msg)),
            Ok(Err(other)) => Err(other),
            Ok(Ok(_)) => {
                // Older browsers do not expose responseStatus; status stays unknown
                let status = match self.evaluate(NAVIGATION_STATUS_SCRIPT, Vec::new()).await {
                    Ok(value) => navigation_status(&value),
                    Err(DriverError::Closed) => return Err(DriverError::Closed),
                    Err(e) => {
                        debug!(url, error = %e, "Navigation status unavailable");
                        None
                    }
                };
                debug!(url, ?status, "Navigation complete");
                Ok(NavigationOutcome { status })
            }
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool, DriverError> {
        let value = self
            .command(Method::POST, "/elements", Some(locator_body(selector)))
            .await?;
        Ok(value.as_array().map(|a| !a.is_empty()).unwrap_or(false))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        self.command(Method::POST, &format!("/element/{}/clear", element), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn set_input_file(&self, selector: &str, path: &Path) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": path.display().to_string() })),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        self.command(Method::POST, &format!("/element/{}/click", element), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .delete(&self.base)
            .send()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        debug!(session = %self.base, "Browser session closed");
        Ok(())
    }
}

fn locator_body(selector: &str) -> Value {
    match Locator::parse(selector) {
        Locator::Css(css) => json!({ "using": "css selector", "value": css }),
        Locator::XPath(xpath) => json!({ "using": "xpath", "value": xpath }),
    }
}

/// `{"value": {"error": "...", "message": "..."}}` → error
/// HTTP status reported by [`NAVIGATION_STATUS_SCRIPT`]; zero means unknown
fn navigation_status(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .filter(|code| (100..=599).contains(code))
        .map(|code| code as u16)
}

fn protocol_error(body: &Value) -> Option<DriverError> {
    let error = body["value"]["error"].as_str()?;
    let message = body["value"]["message"].as_str().unwrap_or_default();
    Some(DriverError::Protocol(format!("{}: {}", error, message)))
}
