//! Automation engine tests against a fake browser

mod helpers;

use helpers::{create_test_db, insert_job_with_status, seed_profile, FakeLauncher, PageScript, StaticDetector};
use hjf_agent::automation::{AutomationEngine, AutomationError, AutomationTimings, DriverError};
use hjf_agent::db;
use hjf_agent::models::{JobStatus, SessionStatus};
use hjf_common::events::{AgentEvent, EventBus};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    pool: SqlitePool,
    bus: EventBus,
    launcher: Arc<FakeLauncher>,
    engine: AutomationEngine,
}

async fn harness_with(launcher: FakeLauncher, detector: StaticDetector) -> Harness {
    let (dir, pool) = create_test_db().await.unwrap();
    let bus = EventBus::new(100);
    let launcher = Arc::new(launcher);
    let engine = AutomationEngine::with_timings(
        pool.clone(),
        bus.clone(),
        launcher.clone(),
        Arc::new(detector),
        AutomationTimings {
            navigation_timeout: Duration::from_secs(30),
            submit_settle: Duration::ZERO,
        },
    );
    Harness {
        _dir: dir,
        pool,
        bus,
        launcher,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(
        FakeLauncher::new(PageScript::application_form()),
        StaticDetector::application_form(),
    )
    .await
}

#[tokio::test]
async fn test_start_rejected_job_never_launches_browser() {
    let h = harness().await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "rejected", JobStatus::Rejected).await;

    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_JOB_STATUS");
    assert_eq!(h.launcher.launch_count(), 0);
    assert_eq!(h.engine.session_count().await, 0);
}

#[tokio::test]
async fn test_start_requires_profile_and_existing_job() {
    let h = harness().await;

    let err = h.engine.start(12345).await.unwrap_err();
    assert_eq!(err.code(), "JOB_NOT_FOUND");

    let job_id = insert_job_with_status(&h.pool, "noprofile", JobStatus::Approved).await;
    let err = h.engine.start(job_id).await.unwrap_err();
    assert!(matches!(err, AutomationError::ProfileNotFound));
    assert_eq!(h.launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_start_fills_form_and_pauses() {
    let h = harness().await;
    let profile = seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "fill", JobStatus::Approved).await;
    let mut rx = h.bus.subscribe();

    let session = h.engine.start(job_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
    assert_eq!(session.id, format!("auto-{}-{}", job_id, session.created_at.timestamp_millis()));

    let page = h.launcher.last_page();
    let fills = page.calls_starting_with("fill:");
    assert!(fills.contains(&format!("fill:#name={}", profile.full_name)));
    assert!(fills.contains(&format!("fill:#email={}", profile.email)));
    // Missing selector skipped, not fatal
    assert!(!fills.iter().any(|f| f.starts_with("fill:#phone-missing")));
    assert_eq!(page.calls_starting_with("upload:"), vec!["upload:#cv:true".to_string()]);
    // Highlighted, never clicked
    assert!(page.calls_starting_with("click:").is_empty());
    assert!(!page.is_closed());

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
    }
    assert_eq!(types.first(), Some(&"automation_started"));
    assert_eq!(types.last(), Some(&"automation_paused"));

    let job = db::jobs::get_job(&h.pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Approved);
}

#[tokio::test]
async fn test_confirm_submits_and_records_snapshot() {
    let h = harness().await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "confirm", JobStatus::Approved).await;

    let session = h.engine.start(job_id).await.unwrap();
    let mut rx = h.bus.subscribe();

    let transition = h.engine.confirm(&session.id).await.unwrap();
    assert_eq!(transition.old_status, SessionStatus::Paused);
    assert_eq!(transition.new_status, SessionStatus::Submitted);

    let page = h.launcher.last_page();
    assert_eq!(page.calls_starting_with("click:").len(), 1);
    assert!(page.is_closed());
    assert_eq!(h.engine.session_count().await, 0);

    let job = db::jobs::get_job(&h.pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Applied);

    let snapshots = db::submissions::list_for_job(&h.pool, job_id).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].session_id, session.id);
    assert_eq!(snapshots[0].email, "ada@example.com");

    let mut saw_status_change = false;
    let mut saw_submitted = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            AgentEvent::JobStatusChanged { old_status, new_status, .. } => {
                assert_eq!((old_status.as_str(), new_status.as_str()), ("approved", "applied"));
                saw_status_change = true;
            }
            AgentEvent::AutomationSubmitted { .. } => saw_submitted = true,
            _ => {}
        }
    }
    assert!(saw_status_change && saw_submitted);
}

#[tokio::test]
async fn test_confirm_only_from_paused() {
    let h = harness().await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "twice", JobStatus::Approved).await;

    let session = h.engine.start(job_id).await.unwrap();
    h.engine.confirm(&session.id).await.unwrap();

    // Session is gone after submission
    let err = h.engine.confirm(&session.id).await.unwrap_err();
    assert_eq!(err.code(), "SESSION_NOT_FOUND");

    let err = h.engine.confirm("auto-0-0").await.unwrap_err();
    assert_eq!(err.code(), "SESSION_NOT_FOUND");
    assert_eq!(h.launcher.last_page().calls_starting_with("click:").len(), 1);
}

#[tokio::test]
async fn test_cancel_releases_browser_and_keeps_job_status() {
    let h = harness().await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "cancel", JobStatus::Approved).await;

    let session = h.engine.start(job_id).await.unwrap();
    let transition = h.engine.cancel(&session.id).await.unwrap();
    assert_eq!(transition.new_status, SessionStatus::Cancelled);

    let page = h.launcher.last_page();
    assert!(page.is_closed());
    assert!(page.calls_starting_with("click:").is_empty());
    assert_eq!(h.engine.session_count().await, 0);

    let job = db::jobs::get_job(&h.pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Approved);

    // A cancelled job may be started again
    let again = h.engine.start(job_id).await.unwrap();
    assert_eq!(again.status, SessionStatus::Paused);
    assert_eq!(h.launcher.launch_count(), 2);
}

#[tokio::test]
async fn test_second_session_for_same_job_rejected() {
    let h = harness().await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "dup", JobStatus::Approved).await;

    h.engine.start(job_id).await.unwrap();
    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "SESSION_ALREADY_ACTIVE");
    assert_eq!(h.launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_kill_switch_terminates_every_session() {
    let h = harness().await;
    seed_profile(&h.pool).await;

    let mut ids = Vec::new();
    for tag in ["k1", "k2", "k3"] {
        let job_id = insert_job_with_status(&h.pool, tag, JobStatus::Approved).await;
        ids.push(h.engine.start(job_id).await.unwrap().id);
    }
    assert_eq!(h.engine.session_count().await, 3);

    let mut rx = h.bus.subscribe();
    assert_eq!(h.engine.kill_all().await, 3);
    assert_eq!(h.engine.session_count().await, 0);
    assert!(h.engine.list_sessions().await.is_empty());
    assert!(h.launcher.pages().iter().all(|p| p.is_closed()));

    let mut cancelled = 0;
    while let Ok(event) = rx.try_recv() {
        if let AgentEvent::AutomationCancelled { session_id, .. } = event {
            assert!(ids.contains(&session_id));
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 3);
}

#[tokio::test]
async fn test_kill_switch_survives_browser_close_failure() {
    let stuck = PageScript {
        close_error: Some(DriverError::Protocol("browser not responding".to_string())),
        ..PageScript::application_form()
    };
    let launcher = FakeLauncher::new(PageScript::application_form()).with_page_script(1, stuck);
    let h = harness_with(launcher, StaticDetector::application_form()).await;
    seed_profile(&h.pool).await;

    for tag in ["s1", "s2", "s3"] {
        let job_id = insert_job_with_status(&h.pool, tag, JobStatus::Approved).await;
        h.engine.start(job_id).await.unwrap();
    }

    let mut rx = h.bus.subscribe();
    assert_eq!(h.engine.kill_all().await, 3);
    assert_eq!(h.engine.session_count().await, 0);

    let pages = h.launcher.pages();
    assert_eq!(pages.len(), 3);
    assert!(pages[0].is_closed());
    assert!(!pages[1].is_closed());
    assert_eq!(pages[1].close_calls(), 1);
    assert!(pages[2].is_closed());

    let mut cancelled = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, AgentEvent::AutomationCancelled { .. }) {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 3);
}

#[tokio::test]
async fn test_kill_switch_with_no_sessions() {
    let h = harness().await;
    assert_eq!(h.engine.kill_all().await, 0);
    assert_eq!(h.engine.session_count().await, 0);
}

#[tokio::test]
async fn test_navigation_failure_releases_session() {
    let script = PageScript {
        navigate_error: Some(DriverError::Timeout(Duration::from_secs(30))),
        ..PageScript::application_form()
    };
    let h = harness_with(FakeLauncher::new(script), StaticDetector::application_form()).await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "navfail", JobStatus::Approved).await;
    let mut rx = h.bus.subscribe();

    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "NAVIGATION_FAILED");
    assert!(err.is_retryable());

    assert!(h.launcher.last_page().is_closed());
    assert_eq!(h.engine.session_count().await, 0);

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, AgentEvent::AutomationError { .. }) {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_browser_launch_failure() {
    let h = harness_with(
        FakeLauncher::failing(DriverError::Launch("chromedriver not running".into())),
        StaticDetector::application_form(),
    )
    .await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "nolaunch", JobStatus::Approved).await;

    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "BROWSER_LAUNCH_FAILED");
    assert_eq!(h.engine.session_count().await, 0);
}

#[tokio::test]
async fn test_missing_submit_control_fails_session() {
    let script = PageScript {
        present: vec!["#name".to_string(), "#email".to_string()],
        ..PageScript::application_form()
    };
    let h = harness_with(FakeLauncher::new(script), StaticDetector::application_form()).await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "nosubmit", JobStatus::Approved).await;

    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "SUBMIT_NOT_FOUND");
    assert!(h.launcher.last_page().is_closed());
}

#[tokio::test]
async fn test_field_detection_failure() {
    let h = harness_with(
        FakeLauncher::new(PageScript::application_form()),
        StaticDetector::failing("oracle returned prose"),
    )
    .await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "nodetect", JobStatus::Approved).await;

    let err = h.engine.start(job_id).await.unwrap_err();
    assert_eq!(err.code(), "FIELD_DETECTION_FAILED");
    assert_eq!(h.engine.session_count().await, 0);
}

#[tokio::test]
async fn test_failed_click_moves_session_to_error() {
    let script = PageScript {
        click_error: Some(DriverError::ElementNotFound("button".into())),
        ..PageScript::application_form()
    };
    let h = harness_with(FakeLauncher::new(script), StaticDetector::application_form()).await;
    seed_profile(&h.pool).await;
    let job_id = insert_job_with_status(&h.pool, "badclick", JobStatus::Approved).await;

    let session = h.engine.start(job_id).await.unwrap();
    let err = h.engine.confirm(&session.id).await.unwrap_err();
    assert_eq!(err.code(), "SUBMISSION_ERROR");

    let job = db::jobs::get_job(&h.pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Approved);
    assert_eq!(h.engine.session_count().await, 0);
}
