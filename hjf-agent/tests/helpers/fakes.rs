//! In-memory fakes for the agent's external seams

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hjf_agent::automation::field_detector::DetectionError;
use hjf_agent::automation::{
    BrowserLauncher, DriverError, FieldDetector, FormField, NavigationOutcome, PageDriver,
};
use hjf_agent::services::connectors::{
    CandidateStream, ConnectorError, ConnectorFactory, FreshnessPolicy, MissingDate,
    ScrapedCandidate, SourceConfig, SourceConnector,
};
use hjf_agent::services::oracle::ChatRequest;
use hjf_agent::services::{ClassificationOracle, OracleError};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

/// How a fake page behaves
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub html: String,
    /// Selectors that exist on the page
    pub present: Vec<String>,
    pub navigate_error: Option<DriverError>,
    pub navigate_status: Option<u16>,
    pub click_error: Option<DriverError>,
    /// Returned by `close`; the page then stays open
    pub close_error: Option<DriverError>,
}

impl PageScript {
    /// Application form with name, email and resume upload plus a submit button
    pub fn application_form() -> Self {
        Self {
            html: "<form><input id=\"name\"><input id=\"email\"><input type=\"file\" id=\"cv\">\
                   <button type=\"submit\">Apply</button></form>"
                .to_string(),
            present: vec![
                "#name".to_string(),
                "#email".to_string(),
                "#cv".to_string(),
                r#"button[type="submit"]"#.to_string(),
            ],
            ..Default::default()
        }
    }
}

pub struct FakePage {
    script: PageScript,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl FakePage {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    fn guard(&self) -> Result<(), DriverError> {
        if self.is_closed() {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<NavigationOutcome, DriverError> {
        self.guard()?;
        self.record(format!("navigate:{}", url));
        if let Some(e) = &self.script.navigate_error {
            return Err(e.clone());
        }
        Ok(NavigationOutcome {
            status: self.script.navigate_status,
        })
    }

    async fn exists(&self, selector: &str) -> Result<bool, DriverError> {
        self.guard()?;
        Ok(self.script.present.iter().any(|s| s == selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.guard()?;
        self.record(format!("fill:{}={}", selector, value));
        Ok(())
    }

    async fn set_input_file(&self, selector: &str, path: &Path) -> Result<(), DriverError> {
        self.guard()?;
        let staged = path.exists();
        self.record(format!("upload:{}:{}", selector, staged));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.guard()?;
        self.record(format!("click:{}", selector));
        match &self.script.click_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, script: &str, _args: Vec<Value>) -> Result<Value, DriverError> {
        self.guard()?;
        if script.contains("outerHTML") {
            return Ok(json!(self.script.html));
        }
        self.record("evaluate".to_string());
        Ok(json!(true))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.script.close_error {
            return Err(e.clone());
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    script: PageScript,
    /// Per-launch script overrides, keyed by zero-based launch index
    overrides: HashMap<usize, PageScript>,
    fail: Option<DriverError>,
    launches: AtomicUsize,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeLauncher {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            overrides: HashMap::new(),
            fail: None,
            launches: AtomicUsize::new(0),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: DriverError) -> Self {
        Self {
            fail: Some(error),
            ..Self::new(PageScript::default())
        }
    }

    /// Use `script` for the `launch`-th browser only
    pub fn with_page_script(mut self, launch: usize, script: PageScript) -> Self {
        self.overrides.insert(launch, script);
        self
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().unwrap().clone()
    }

    pub fn last_page(&self) -> Arc<FakePage> {
        self.pages().last().cloned().expect("no page launched")
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, DriverError> {
        let index = self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        let script = self.overrides.get(&index).unwrap_or(&self.script).clone();
        let page = Arc::new(FakePage::new(script));
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }
}

/// Field detector with a fixed answer
pub struct StaticDetector {
    result: Result<Vec<FormField>, String>,
}

impl StaticDetector {
    pub fn fields(fields: Vec<FormField>) -> Self {
        Self { result: Ok(fields) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }

    /// Fields matching [`PageScript::application_form`], plus one that is
    /// not on the page
    pub fn application_form() -> Self {
        let field = |label: &str, input_type: &str, selector: &str| FormField {
            label: label.to_string(),
            input_type: input_type.to_string(),
            selector: selector.to_string(),
            confidence: 0.9,
        };
        Self::fields(vec![
            field("name", "text", "#name"),
            field("email", "email", "#email"),
            field("resume", "file", "#cv"),
            field("phone", "tel", "#phone-missing"),
        ])
    }
}

#[async_trait]
impl FieldDetector for StaticDetector {
    async fn detect(&self, _page_html: &str) -> Result<Vec<FormField>, DetectionError> {
        self.result.clone().map_err(DetectionError::Parse)
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Oracle answering from a queue; an empty queue answers with a 503
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<String, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationOracle for ScriptedOracle {
    async fn complete(&self, _request: ChatRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(OracleError::Api {
                    status: 503,
                    body: "service unavailable".to_string(),
                })
            })
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

pub fn candidate(url: &str, company: &str, title: &str) -> ScrapedCandidate {
    ScrapedCandidate {
        url: url.to_string(),
        company: company.to_string(),
        title: title.to_string(),
        description: "Build reliable services".to_string(),
        posted_at: Some(Utc::now()),
    }
}

pub fn test_source(id: &str, priority: u32) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: id.to_string(),
        enabled: true,
        priority,
        max_jobs: 100,
        requires_auth: false,
        auth_env_vars: Vec::new(),
        freshness: FreshnessPolicy::hours(24, MissingDate::Accept),
    }
}

/// What a fake connector does when run
#[derive(Debug, Clone, Default)]
pub struct ConnectorPlan {
    pub candidates: Vec<ScrapedCandidate>,
    pub fail_init: bool,
    /// Yield a terminal error after this many candidates
    pub terminal_after: Option<usize>,
    /// Yield a skippable parse error before the candidates
    pub parse_error: bool,
}

impl ConnectorPlan {
    pub fn yielding(candidates: Vec<ScrapedCandidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }
}

struct FakeConnector {
    id: String,
    plan: ConnectorPlan,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SourceConnector for FakeConnector {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn init(&mut self) -> Result<(), ConnectorError> {
        self.log.lock().unwrap().push(format!("init:{}", self.id));
        if self.plan.fail_init {
            return Err(ConnectorError::MissingCredentials(self.id.clone()));
        }
        Ok(())
    }

    fn scrape<'a>(&'a mut self, _query: &'a str, max_jobs: usize) -> CandidateStream<'a> {
        let mut items: Vec<Result<ScrapedCandidate, ConnectorError>> = Vec::new();
        if self.plan.parse_error {
            items.push(Err(ConnectorError::Parse("malformed card".to_string())));
        }
        for (i, candidate) in self.plan.candidates.iter().take(max_jobs).enumerate() {
            if self.plan.terminal_after == Some(i) {
                items.push(Err(ConnectorError::Disallowed(self.id.clone())));
            }
            items.push(Ok(candidate.clone()));
        }
        Box::pin(futures::stream::iter(items))
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.log.lock().unwrap().push(format!("close:{}", self.id));
        Ok(())
    }
}

/// Builds fake connectors from per-source plans; unknown ids get `None`
#[derive(Default)]
pub struct FakeFactory {
    plans: HashMap<String, ConnectorPlan>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, plan: ConnectorPlan) -> Self {
        self.plans.insert(id.to_string(), plan);
        self
    }

    /// `init:<id>` / `close:<id>` entries in call order
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ConnectorFactory for FakeFactory {
    fn create(&self, source: &SourceConfig) -> Option<Box<dyn SourceConnector>> {
        let plan = self.plans.get(&source.id)?.clone();
        Some(Box::new(FakeConnector {
            id: source.id.clone(),
            plan,
            log: self.log.clone(),
        }))
    }
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}
