//! Form field detection
//!
//! Produces (selector, semantic label, confidence) candidates for the
//! fields on an application form. The oracle-backed detector is the
//! primary implementation; the markup heuristic covers runs without an
//! oracle.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::services::oracle::{extract_json_object, ChatRequest, ClassificationOracle, OracleError};
use crate::utils::text::truncate_chars;

/// Longest page excerpt sent to the oracle
pub const MAX_FORM_HTML_CHARS: usize = 10_000;

/// One detected form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Semantic label, e.g. "email" or "resume"
    #[serde(rename = "fieldType")]
    pub label: String,
    /// Input type, e.g. "text" or "file"
    #[serde(rename = "type", default)]
    pub input_type: String,
    pub selector: String,
    #[serde(default)]
    pub confidence: f32,
}

impl FormField {
    pub fn is_file_input(&self) -> bool {
        self.input_type.eq_ignore_ascii_case("file")
    }
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("could not parse detected fields: {0}")]
    Parse(String),
}

#[async_trait]
pub trait FieldDetector: Send + Sync {
    async fn detect(&self, page_html: &str) -> Result<Vec<FormField>, DetectionError>;
}

const SYSTEM_PROMPT: &str = "You analyze job application forms. Identify the input fields and \
respond with JSON only: {\"fields\": [{\"fieldType\": \"name|email|phone|github|linkedin|\
location|resume\", \"type\": \"text|email|tel|url|file\", \"selector\": \"CSS selector\", \
\"confidence\": 0.0-1.0}]}";

#[derive(Deserialize)]
struct DetectedFields {
    #[serde(default)]
    fields: Vec<FormField>,
}

/// Field detection through the classification oracle
pub struct OracleFieldDetector {
    oracle: Arc<dyn ClassificationOracle>,
}

impl OracleFieldDetector {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl FieldDetector for OracleFieldDetector {
    async fn detect(&self, page_html: &str) -> Result<Vec<FormField>, DetectionError> {
        let reply = self
            .oracle
            .complete(ChatRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: truncate_chars(page_html, MAX_FORM_HTML_CHARS),
                temperature: 0.1,
                max_tokens: 1000,
            })
            .await?;

        parse_detected_fields(&reply)
    }
}

/// Parse the oracle's `{"fields": [...]}` reply
pub fn parse_detected_fields(reply: &str) -> Result<Vec<FormField>, DetectionError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| DetectionError::Parse("no JSON object in reply".to_string()))?;
    let parsed: DetectedFields =
        serde_json::from_str(json).map_err(|e| DetectionError::Parse(e.to_string()))?;
    Ok(parsed.fields)
}

static INPUT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(input|textarea)\b([^>]*)>").expect("valid regex"));
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(name|id|type|autocomplete)\s*=\s*["']([^"']*)["']"#).expect("valid regex")
});

/// Attribute-based detection for forms with conventional field names
pub struct HeuristicFieldDetector;

#[async_trait]
impl FieldDetector for HeuristicFieldDetector {
    async fn detect(&self, page_html: &str) -> Result<Vec<FormField>, DetectionError> {
        Ok(detect_by_attributes(page_html))
    }
}

fn detect_by_attributes(html: &str) -> Vec<FormField> {
    let mut fields = Vec::new();

    for tag in INPUT_TAG.captures_iter(html) {
        let mut name = None;
        let mut id = None;
        let mut input_type = if tag[1].eq_ignore_ascii_case("textarea") {
            "textarea".to_string()
        } else {
            "text".to_string()
        };
        let mut autocomplete = None;

        for attr in ATTRIBUTE.captures_iter(&tag[2]) {
            let value = attr[2].to_string();
            match attr[1].to_lowercase().as_str() {
                "name" => name = Some(value),
                "id" => id = Some(value),
                "type" => input_type = value.to_lowercase(),
                _ => autocomplete = Some(value),
            }
        }

        if matches!(input_type.as_str(), "hidden" | "submit" | "button" | "checkbox" | "radio") {
            continue;
        }

        let hint = [&autocomplete, &name, &id]
            .into_iter()
            .flatten()
            .map(|s| s.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let Some(label) = classify_hint(&hint, &input_type) else {
            continue;
        };

        let selector = match (&id, &name) {
            (Some(id), _) if !id.is_empty() => format!("[id=\"{}\"]", id),
            (_, Some(name)) if !name.is_empty() => format!("[name=\"{}\"]", name),
            _ => continue,
        };

        fields.push(FormField {
            label: label.to_string(),
            input_type,
            selector,
            confidence: 0.6,
        });
    }

    fields
}

fn classify_hint(hint: &str, input_type: &str) -> Option<&'static str> {
    if input_type == "file" {
        return (hint.contains("resume") || hint.contains("cv")).then_some("resume");
    }
    if input_type == "email" || hint.contains("email") {
        Some("email")
    } else if input_type == "tel" || hint.contains("phone") || hint.contains("tel") {
        Some("phone")
    } else if hint.contains("linkedin") {
        Some("linkedin")
    } else if hint.contains("github") || hint.contains("portfolio") || hint.contains("website") {
        Some("github")
    } else if hint.contains("location") || hint.contains("city") {
        Some("location")
    } else if hint.contains("name") && !hint.contains("company") {
        Some("name")
    } else {
        None
    }
}
