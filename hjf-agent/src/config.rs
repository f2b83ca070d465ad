//! Agent configuration
//!
//! Bootstrap settings come from `hjf-agent.toml` (every key optional).
//! Secrets come from the environment, with the TOML file as fallback for the
//! oracle key.

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::services::connectors::{default_sources, MissingDate, SearchScope, SourceConfig};
use crate::services::retention::DEFAULT_RETENTION_DAYS;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_LOG_FILTER: &str = "hjf_agent=info,tower_http=info";
pub const DEFAULT_QUERY: &str = "software engineer";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub port: u16,
    pub data_folder: Option<PathBuf>,
    /// `development` or `production`
    pub environment: String,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub worker: WorkerConfig,
    pub oracle: OracleConfig,
    pub webdriver: WebDriverConfig,
    pub sources: Vec<SourceOverride>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_folder: None,
            environment: "development".to_string(),
            logging: LoggingConfig::default(),
            search: SearchConfig::default(),
            worker: WorkerConfig::default(),
            oracle: OracleConfig::default(),
            webdriver: WebDriverConfig::default(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub query: String,
    pub locations: Vec<String>,
    pub countries: Vec<String>,
    /// Caps every source's `max_jobs` when set
    pub max_jobs_per_source: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let scope = SearchScope::default();
        Self {
            query: DEFAULT_QUERY.to_string(),
            locations: scope.locations,
            countries: scope.countries,
            max_jobs_per_source: None,
        }
    }
}

impl SearchConfig {
    pub fn scope(&self) -> SearchScope {
        SearchScope {
            locations: self.locations.clone(),
            countries: self.countries.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub retention_days: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    pub url: String,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBDRIVER_URL.to_string(),
        }
    }
}

/// `[[sources]]` entry; unset fields keep the built-in value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
    pub id: String,
    pub enabled: Option<bool>,
    pub priority: Option<u32>,
    pub max_jobs: Option<usize>,
    pub max_age_hours: Option<i64>,
    pub accept_undated: Option<bool>,
}

impl AgentConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Built-in source registry with the file's overrides applied
    pub fn sources(&self) -> Vec<SourceConfig> {
        let mut sources = default_sources();

        for entry in &self.sources {
            let Some(source) = sources.iter_mut().find(|s| s.id == entry.id) else {
                warn!(source = %entry.id, "Ignoring override for unknown source");
                continue;
            };
            if let Some(enabled) = entry.enabled {
                source.enabled = enabled;
            }
            if let Some(priority) = entry.priority {
                source.priority = priority;
            }
            if let Some(max_jobs) = entry.max_jobs {
                source.max_jobs = max_jobs;
            }
            if let Some(hours) = entry.max_age_hours {
                source.freshness.max_age = chrono::Duration::hours(hours);
            }
            if let Some(accept) = entry.accept_undated {
                source.freshness.missing_date = if accept {
                    MissingDate::Accept
                } else {
                    MissingDate::Discard
                };
            }
        }

        if let Some(cap) = self.search.max_jobs_per_source {
            for source in &mut sources {
                source.max_jobs = source.max_jobs.min(cap);
            }
        }

        sources
    }
}

/// Resolved oracle connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Resolve the oracle key and endpoint
///
/// **Priority:** `OPENAI_API_KEY` → `GROQ_API_KEY` → TOML `oracle.api_key`.
/// Endpoint and model follow the provider the key came from unless the TOML
/// file names them. `None` leaves the oracle-backed features disabled.
pub fn resolve_oracle(config: &OracleConfig) -> Option<OracleSettings> {
    let openai_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| is_valid_key(k));
    let groq_key = std::env::var("GROQ_API_KEY").ok().filter(|k| is_valid_key(k));
    let toml_key = config.api_key.clone().filter(|k| is_valid_key(k));

    let found: Vec<&str> = [
        openai_key.as_ref().map(|_| "OPENAI_API_KEY"),
        groq_key.as_ref().map(|_| "GROQ_API_KEY"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if found.len() > 1 {
        warn!(
            "Oracle API key found in multiple sources: {}. Using {} (highest priority).",
            found.join(", "),
            found[0]
        );
    }

    let (api_key, base_url, model) = if let Some(key) = openai_key {
        info!("Oracle API key loaded from OPENAI_API_KEY");
        (key, OPENAI_BASE_URL, OPENAI_MODEL)
    } else if let Some(key) = groq_key {
        info!("Oracle API key loaded from GROQ_API_KEY");
        (key, GROQ_BASE_URL, GROQ_MODEL)
    } else if let Some(key) = toml_key {
        info!("Oracle API key loaded from TOML config");
        (key, OPENAI_BASE_URL, OPENAI_MODEL)
    } else {
        return None;
    };

    Some(OracleSettings {
        api_key,
        model: config.model.clone().unwrap_or_else(|| model.to_string()),
        base_url: config.base_url.clone().unwrap_or_else(|| base_url.to_string()),
    })
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
