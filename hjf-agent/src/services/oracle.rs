//! Classification oracle
//!
//! The agent treats the language model as an opaque oracle: a system
//! prompt and a user prompt go in, text comes out. Match scoring, form
//! field detection and resume structuring all sit on top of this trait.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One oracle request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("oracle not configured: {0}")]
    NotConfigured(String),
}

impl OracleError {
    /// Faults that no amount of retrying will fix
    pub fn is_authentication(&self) -> bool {
        match self {
            OracleError::Authentication(_) | OracleError::NotConfigured(_) => true,
            OracleError::Api { body, .. } => {
                let lower = body.to_lowercase();
                lower.contains("api key") || lower.contains("authentication")
            }
            _ => false,
        }
    }
}

/// Text-in, text-out model endpoint
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, OracleError>;
}

/// OpenAI-compatible chat completions endpoint (OpenAI, Groq, local servers)
pub struct OpenAiCompatibleOracle {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleOracle {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, OracleError> {
        if api_key.trim().is_empty() {
            return Err(OracleError::NotConfigured("empty API key".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ClassificationOracle for OpenAiCompatibleOracle {
    async fn complete(&self, request: ChatRequest) -> Result<String, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        debug!(model = %self.model, "Oracle request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Authentication(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let resp: serde_json::Value = response.json().await?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OracleError::Parse("missing choices[0].message.content".into()))?
            .to_string();

        Ok(content)
    }
}

/// Pull the first JSON object out of a model reply
///
/// Models often wrap JSON in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
