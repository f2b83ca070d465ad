//! Browser driver abstraction
//!
//! Selectors are CSS unless prefixed with `xpath=`. Every method takes
//! `&self` so a page can be closed from one task while another task is
//! blocked in an operation on it; the blocked operation then fails.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix marking an XPath selector
pub const XPATH_PREFIX: &str = "xpath=";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no element matches {0}")]
    ElementNotFound(String),

    #[error("browser closed")]
    Closed,

    #[error("driver error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Timeouts and network-level navigation faults
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Timeout(_) | DriverError::Navigation(_))
    }
}

/// Parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl<'a> Locator<'a> {
    pub fn parse(selector: &'a str) -> Self {
        match selector.strip_prefix(XPATH_PREFIX) {
            Some(xpath) => Locator::XPath(xpath),
            None => Locator::Css(selector),
        }
    }
}

/// Result of a navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// HTTP status of the main document, when the driver can see it
    pub status: Option<u16>,
}

/// One browser page
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome, DriverError>;

    /// Whether at least one element matches
    async fn exists(&self, selector: &str) -> Result<bool, DriverError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    async fn set_input_file(&self, selector: &str, path: &Path) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Run a script; `arguments[i]` inside the script is `args[i]`
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError>;

    /// Serialized DOM of the current page
    async fn content(&self) -> Result<String, DriverError> {
        let value = self
            .evaluate("return document.documentElement.outerHTML;", Vec::new())
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("page content was not a string".to_string()))
    }

    /// Release the page and its browser. Idempotent.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Starts browsers
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, DriverError>;
}
