//! Automation engine
//!
//! Owns the session registry. Each session owns one browser page and walks
//! FILLING → PAUSED → SUBMITTED/CANCELLED/ERROR. Every status change goes
//! through [`AutomationEngine::transition`], which holds the session's
//! lock, validates the edge, broadcasts it and, on a terminal status,
//! releases the browser and drops the session from the registry.
//!
//! Lock order: the registry lock is never held while a session lock is
//! awaited.

use chrono::{DateTime, Utc};
use hjf_common::events::{AgentEvent, EventBus};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::driver::{BrowserLauncher, DriverError, PageDriver};
use super::field_detector::{FieldDetector, FormField};
use super::submit;
use crate::db;
use crate::models::{
    session_id_for, CandidateProfile, JobStatus, ProfileField, SessionStatus, SessionSummary,
    SessionTransition, SubmissionSnapshot, TransitionError,
};

/// Page load budget
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait after clicking submit before the browser is closed
pub const SUBMIT_SETTLE_DELAY: Duration = Duration::from_secs(3);

const PAUSED_MESSAGE: &str = "Ready to submit - waiting for confirmation";

#[derive(Debug, Clone, Copy)]
pub struct AutomationTimings {
    pub navigation_timeout: Duration,
    pub submit_settle: Duration,
}

impl Default for AutomationTimings {
    fn default() -> Self {
        Self {
            navigation_timeout: NAVIGATION_TIMEOUT,
            submit_settle: SUBMIT_SETTLE_DELAY,
        }
    }
}

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Job {0} not found")]
    JobNotFound(i64),

    #[error("Job {job_id} is '{status}'; only approved jobs can be automated")]
    InvalidJobStatus { job_id: i64, status: JobStatus },

    #[error("No candidate profile configured")]
    ProfileNotFound,

    #[error("Job {0} already has an active automation session")]
    SessionAlreadyActive(i64),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {session_id} is '{status}': {reason}")]
    InvalidSessionState {
        session_id: String,
        status: SessionStatus,
        reason: String,
    },

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(DriverError),

    #[error("Failed to load job page: {0}")]
    Navigation(DriverError),

    #[error("Form field detection failed: {0}")]
    FieldDetection(String),

    #[error("No submit button found on page")]
    SubmitNotFound,

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Session {0} was closed before it could finish")]
    SessionClosed(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Storage(#[from] hjf_common::Error),
}

impl AutomationError {
    pub fn code(&self) -> &'static str {
        match self {
            AutomationError::JobNotFound(_) => "JOB_NOT_FOUND",
            AutomationError::InvalidJobStatus { .. } => "INVALID_JOB_STATUS",
            AutomationError::ProfileNotFound => "PROFILE_NOT_FOUND",
            AutomationError::SessionAlreadyActive(_) => "SESSION_ALREADY_ACTIVE",
            AutomationError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AutomationError::InvalidSessionState { .. } => "INVALID_SESSION_STATE",
            AutomationError::BrowserLaunch(_) => "BROWSER_LAUNCH_FAILED",
            AutomationError::Navigation(_) => "NAVIGATION_FAILED",
            AutomationError::FieldDetection(_) => "FIELD_DETECTION_FAILED",
            AutomationError::SubmitNotFound => "SUBMIT_NOT_FOUND",
            AutomationError::Submission(_) => "SUBMISSION_ERROR",
            AutomationError::SessionClosed(_) => "SESSION_CLOSED",
            AutomationError::Transition(e) => e.code(),
            AutomationError::Storage(_) => "DATABASE_ERROR",
        }
    }

    /// Whether starting over might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AutomationError::BrowserLaunch(_) | AutomationError::FieldDetection(_) => true,
            AutomationError::Navigation(e) => e.is_transient(),
            AutomationError::Storage(e) => e.is_lock_contention(),
            _ => false,
        }
    }
}

struct SlotState {
    status: SessionStatus,
    submit_selector: Option<&'static str>,
    /// Set while a confirm is clicking; a second confirm is rejected
    confirming: bool,
    released: bool,
    resume_file: Option<PathBuf>,
}

struct SessionSlot {
    id: String,
    job_id: i64,
    created_at: DateTime<Utc>,
    page: Arc<dyn PageDriver>,
    state: Mutex<SlotState>,
}

pub struct AutomationEngine {
    db: SqlitePool,
    event_bus: EventBus,
    launcher: Arc<dyn BrowserLauncher>,
    detector: Arc<dyn FieldDetector>,
    timings: AutomationTimings,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl AutomationEngine {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        launcher: Arc<dyn BrowserLauncher>,
        detector: Arc<dyn FieldDetector>,
    ) -> Self {
        Self::with_timings(db, event_bus, launcher, detector, AutomationTimings::default())
    }

    pub fn with_timings(
        db: SqlitePool,
        event_bus: EventBus,
        launcher: Arc<dyn BrowserLauncher>,
        detector: Arc<dyn FieldDetector>,
        timings: AutomationTimings,
    ) -> Self {
        Self {
            db,
            event_bus,
            launcher,
            detector,
            timings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Launch a browser for an approved job, fill its form and pause
    pub async fn start(&self, job_id: i64) -> Result<SessionSummary, AutomationError> {
        let job = db::jobs::get_job(&self.db, job_id)
            .await?
            .ok_or(AutomationError::JobNotFound(job_id))?;

        if job.status != JobStatus::Approved {
            warn!(job_id, status = %job.status, "Refusing to automate non-approved job");
            return Err(AutomationError::InvalidJobStatus {
                job_id,
                status: job.status,
            });
        }

        let profile = db::profile::get_profile(&self.db)
            .await?
            .ok_or(AutomationError::ProfileNotFound)?;

        if self.has_live_session(job_id).await {
            return Err(AutomationError::SessionAlreadyActive(job_id));
        }

        let page = self.launcher.launch().await.map_err(|e| {
            error!(job_id, error = %e, "Browser launch failed");
            AutomationError::BrowserLaunch(e)
        })?;

        let created_at = Utc::now();
        let slot = Arc::new(SessionSlot {
            id: session_id_for(job_id, created_at),
            job_id,
            created_at,
            page,
            state: Mutex::new(SlotState {
                status: SessionStatus::Filling,
                submit_selector: None,
                confirming: false,
                released: false,
                resume_file: None,
            }),
        });

        {
            let mut sessions = self.sessions.write().await;
            if sessions.values().any(|s| s.job_id == job_id) {
                drop(sessions);
                let _ = slot.page.close().await;
                return Err(AutomationError::SessionAlreadyActive(job_id));
            }
            sessions.insert(slot.id.clone(), slot.clone());
        }

        info!(session_id = %slot.id, job_id, url = %job.url, "Automation session started");
        self.emit(&slot, SessionStatus::Filling, "Browser launched, opening job page", true);

        if let Err(e) = self.prepare(&slot, &job.url, &profile).await {
            return Err(self.fail(&slot, e).await);
        }

        let outcome = self
            .transition(&slot, SessionStatus::Paused, PAUSED_MESSAGE, None)
            .await;
        match outcome {
            Ok(_) => Ok(SessionSummary {
                id: slot.id.clone(),
                job_id,
                status: SessionStatus::Paused,
                created_at: slot.created_at,
            }),
            // Cancelled or killed while filling
            Err(AutomationError::InvalidSessionState { .. }) => {
                Err(AutomationError::SessionClosed(slot.id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Navigate, detect, fill and locate the submit control
    async fn prepare(
        &self,
        slot: &Arc<SessionSlot>,
        url: &str,
        profile: &CandidateProfile,
    ) -> Result<(), AutomationError> {
        let outcome = slot
            .page
            .navigate(url, self.timings.navigation_timeout)
            .await
            .map_err(|e| self.driver_failure(slot, e, AutomationError::Navigation))?;
        if let Some(status) = outcome.status.filter(|s| *s >= 400) {
            return Err(AutomationError::Navigation(DriverError::Navigation(format!(
                "HTTP {}",
                status
            ))));
        }

        self.emit(slot, SessionStatus::Filling, "Detecting and filling form fields", false);

        let html = slot.page.content().await.map_err(|e| {
            self.driver_failure(slot, e, |e| AutomationError::FieldDetection(e.to_string()))
        })?;
        let fields = self
            .detector
            .detect(&html)
            .await
            .map_err(|e| AutomationError::FieldDetection(e.to_string()))?;

        let filled = self.fill_fields(slot, &fields, profile).await?;
        info!(session_id = %slot.id, detected = fields.len(), filled, "Form filled");

        let selector = submit::locate_submit(slot.page.as_ref())
            .await
            .map_err(|_| AutomationError::SessionClosed(slot.id.clone()))?
            .ok_or(AutomationError::SubmitNotFound)?;
        submit::highlight(slot.page.as_ref(), selector).await;

        slot.state.lock().await.submit_selector = Some(selector);
        Ok(())
    }

    /// Fill every field that maps onto the profile; returns the count filled
    async fn fill_fields(
        &self,
        slot: &Arc<SessionSlot>,
        fields: &[FormField],
        profile: &CandidateProfile,
    ) -> Result<usize, AutomationError> {
        let mut filled = 0;

        for field in fields {
            let Some(kind) = ProfileField::from_label(&field.label) else {
                debug!(session_id = %slot.id, label = %field.label, "No profile value for field");
                continue;
            };
            let Some(value) = profile.value_for(kind) else {
                continue;
            };

            match slot.page.exists(&field.selector).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(session_id = %slot.id, selector = %field.selector, "Detected selector not on page, skipping");
                    continue;
                }
                Err(DriverError::Closed) => {
                    return Err(AutomationError::SessionClosed(slot.id.clone()))
                }
                Err(e) => {
                    warn!(session_id = %slot.id, selector = %field.selector, error = %e, "Selector check failed, skipping");
                    continue;
                }
            }

            let result = if kind == ProfileField::Resume && field.is_file_input() {
                self.upload_resume(slot, &field.selector, value).await
            } else {
                slot.page.fill(&field.selector, value).await
            };

            match result {
                Ok(()) => filled += 1,
                Err(DriverError::Closed) => {
                    return Err(AutomationError::SessionClosed(slot.id.clone()))
                }
                Err(e) => {
                    warn!(session_id = %slot.id, label = %field.label, error = %e, "Could not fill field, skipping")
                }
            }
        }

        Ok(filled)
    }

    async fn upload_resume(
        &self,
        slot: &Arc<SessionSlot>,
        selector: &str,
        resume_text: &str,
    ) -> Result<(), DriverError> {
        let path = std::env::temp_dir().join(format!("{}-resume.txt", slot.id));
        tokio::fs::write(&path, resume_text)
            .await
            .map_err(|e| DriverError::Protocol(format!("could not stage resume: {}", e)))?;
        slot.state.lock().await.resume_file = Some(path.clone());
        slot.page.set_input_file(selector, &path).await
    }

    /// Click submit for a paused session and record the application
    pub async fn confirm(&self, session_id: &str) -> Result<SessionTransition, AutomationError> {
        let slot = self.slot(session_id).await?;

        let selector = {
            let mut state = slot.state.lock().await;
            if state.status != SessionStatus::Paused {
                return Err(AutomationError::InvalidSessionState {
                    session_id: slot.id.clone(),
                    status: state.status,
                    reason: "only paused sessions can be confirmed".to_string(),
                });
            }
            if state.confirming {
                return Err(AutomationError::InvalidSessionState {
                    session_id: slot.id.clone(),
                    status: state.status,
                    reason: "confirmation already in progress".to_string(),
                });
            }
            let selector = state.submit_selector.ok_or(AutomationError::SubmitNotFound)?;
            state.confirming = true;
            selector
        };

        info!(session_id = %slot.id, job_id = slot.job_id, selector, "Submission confirmed, clicking submit");

        if let Err(e) = slot.page.click(selector).await {
            let err = match e {
                DriverError::Closed => AutomationError::SessionClosed(slot.id.clone()),
                other => AutomationError::Submission(other.to_string()),
            };
            return Err(self.fail(&slot, err).await);
        }

        let change = match db::jobs::transition_status(&self.db, slot.job_id, JobStatus::Applied).await
        {
            Ok(change) => change,
            Err(e) => return Err(self.fail(&slot, e.into()).await),
        };
        self.event_bus.emit_lossy(AgentEvent::JobStatusChanged {
            job_id: change.job_id,
            old_status: change.from.to_string(),
            new_status: change.to.to_string(),
            timestamp: Utc::now(),
        });

        self.record_snapshot(&slot).await;

        self.transition(
            &slot,
            SessionStatus::Submitted,
            "Application submitted",
            Some(self.timings.submit_settle),
        )
        .await
        .map_err(|e| match e {
            AutomationError::InvalidSessionState { .. } => {
                AutomationError::SessionClosed(slot.id.clone())
            }
            other => other,
        })
    }

    async fn record_snapshot(&self, slot: &SessionSlot) {
        let profile = match db::profile::get_profile(&self.db).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(session_id = %slot.id, "Profile vanished before snapshot");
                return;
            }
            Err(e) => {
                error!(session_id = %slot.id, error = %e, "Could not load profile for snapshot");
                return;
            }
        };

        let snapshot = SubmissionSnapshot::capture(&profile, slot.job_id, &slot.id);
        if let Err(e) = db::submissions::record_submission(&self.db, &snapshot).await {
            error!(session_id = %slot.id, error = %e, "Could not record submission snapshot");
        }
    }

    /// Cancel a live session. The job's status is left alone.
    pub async fn cancel(&self, session_id: &str) -> Result<SessionTransition, AutomationError> {
        let slot = self.slot(session_id).await?;
        self.transition(&slot, SessionStatus::Cancelled, "Automation cancelled by user", None)
            .await
    }

    /// Cancel every session; returns how many were attempted
    pub async fn kill_all(&self) -> usize {
        let slots: Vec<Arc<SessionSlot>> = self.sessions.read().await.values().cloned().collect();
        if slots.is_empty() {
            info!("Kill switch activated with no active sessions");
            return 0;
        }

        warn!(sessions = slots.len(), "Kill switch activated, terminating all sessions");

        for slot in &slots {
            if let Err(e) = self
                .transition(slot, SessionStatus::Cancelled, "Automation killed", None)
                .await
            {
                error!(session_id = %slot.id, error = %e, "Failed to terminate session");
            }
        }

        slots.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let slots: Vec<Arc<SessionSlot>> = self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            let status = slot.state.lock().await.status;
            summaries.push(SessionSummary {
                id: slot.id.clone(),
                job_id: slot.job_id,
                status,
                created_at: slot.created_at,
            });
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn has_live_session(&self, job_id: i64) -> bool {
        self.sessions.read().await.values().any(|s| s.job_id == job_id)
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, AutomationError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AutomationError::SessionNotFound(session_id.to_string()))
    }

    /// The single place a session's status changes
    async fn transition(
        &self,
        slot: &Arc<SessionSlot>,
        to: SessionStatus,
        message: &str,
        settle: Option<Duration>,
    ) -> Result<SessionTransition, AutomationError> {
        let from = {
            let mut state = slot.state.lock().await;
            let from = state.status;
            if !from.can_transition_to(to) {
                return Err(AutomationError::InvalidSessionState {
                    session_id: slot.id.clone(),
                    status: from,
                    reason: format!("cannot move to '{}'", to),
                });
            }
            state.status = to;
            state.confirming = false;
            from
        };

        info!(session_id = %slot.id, job_id = slot.job_id, from = %from, to = %to, "Session transition");
        self.emit(slot, to, message, false);

        if to.is_terminal() {
            if let Some(delay) = settle {
                tokio::time::sleep(delay).await;
            }
            self.release(slot).await;
        }

        Ok(SessionTransition {
            session_id: slot.id.clone(),
            old_status: from,
            new_status: to,
            transitioned_at: Utc::now(),
        })
    }

    /// Move a session to ERROR, returning the error for the caller
    async fn fail(&self, slot: &Arc<SessionSlot>, err: AutomationError) -> AutomationError {
        error!(session_id = %slot.id, job_id = slot.job_id, code = err.code(), error = %err, "Automation failed");
        match self
            .transition(slot, SessionStatus::Error, &err.to_string(), None)
            .await
        {
            Ok(_) => err,
            // Already terminal: cancelled or killed underneath us
            Err(_) => match err {
                AutomationError::SessionClosed(_) => err,
                _ => AutomationError::SessionClosed(slot.id.clone()),
            },
        }
    }

    fn driver_failure(
        &self,
        slot: &SessionSlot,
        e: DriverError,
        wrap: impl FnOnce(DriverError) -> AutomationError,
    ) -> AutomationError {
        match e {
            DriverError::Closed => AutomationError::SessionClosed(slot.id.clone()),
            other => wrap(other),
        }
    }

    /// Close the browser, drop the staged resume and unregister. Idempotent.
    async fn release(&self, slot: &Arc<SessionSlot>) {
        let resume_file = {
            let mut state = slot.state.lock().await;
            if state.released {
                return;
            }
            state.released = true;
            state.resume_file.take()
        };

        if let Err(e) = slot.page.close().await {
            warn!(session_id = %slot.id, error = %e, "Browser close failed");
        }
        if let Some(path) = resume_file {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %e, "Could not remove staged resume");
            }
        }

        self.sessions.write().await.remove(&slot.id);
        debug!(session_id = %slot.id, "Session released");
    }

    fn emit(&self, slot: &SessionSlot, status: SessionStatus, message: &str, started: bool) {
        let session_id = slot.id.clone();
        let job_id = slot.job_id;
        let message = message.to_string();
        let timestamp = Utc::now();

        let event = if started {
            AgentEvent::AutomationStarted {
                session_id,
                job_id,
                message,
                timestamp,
            }
        } else {
            match status {
                SessionStatus::Filling => AgentEvent::AutomationFilling {
                    session_id,
                    job_id,
                    message,
                    timestamp,
                },
                SessionStatus::Paused => AgentEvent::AutomationPaused {
                    session_id,
                    job_id,
                    message,
                    timestamp,
                },
                SessionStatus::Submitted => AgentEvent::AutomationSubmitted {
                    session_id,
                    job_id,
                    message,
                    timestamp,
                },
                SessionStatus::Cancelled => AgentEvent::AutomationCancelled {
                    session_id,
                    job_id,
                    message,
                    timestamp,
                },
                SessionStatus::Error => AgentEvent::AutomationError {
                    session_id,
                    job_id,
                    message,
                    timestamp,
                },
            }
        };

        self.event_bus.emit_lossy(event);
    }
}
