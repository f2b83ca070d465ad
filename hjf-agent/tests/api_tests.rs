//! Integration tests for the agent HTTP API

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::{
    candidate, create_test_db, insert_job_with_status, seed_profile, test_source, ConnectorPlan,
    FakeFactory, FakeLauncher, PageScript, StaticDetector,
};
use hjf_agent::automation::{AutomationEngine, AutomationTimings};
use hjf_agent::models::JobStatus;
use hjf_agent::services::IngestionOrchestrator;
use hjf_agent::AppState;
use hjf_common::events::EventBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

/// Router over a temp database, a fake browser and one fake source
async fn create_test_app() -> (Router, SqlitePool, TempDir) {
    let (dir, pool) = create_test_db().await.unwrap();
    let event_bus = EventBus::new(100);

    let engine = Arc::new(AutomationEngine::with_timings(
        pool.clone(),
        event_bus.clone(),
        Arc::new(FakeLauncher::new(PageScript::application_form())),
        Arc::new(StaticDetector::application_form()),
        AutomationTimings {
            navigation_timeout: Duration::from_secs(30),
            submit_settle: Duration::ZERO,
        },
    ));

    let factory = FakeFactory::new().with(
        "board",
        ConnectorPlan::yielding(vec![candidate("https://api.example.com/1", "Acme", "Rust Engineer")]),
    );
    let orchestrator = Arc::new(IngestionOrchestrator::new(
        pool.clone(),
        event_bus.clone(),
        Arc::new(factory),
        None,
        vec![test_source("board", 1)],
        "rust".to_string(),
    ));

    let state = AppState::new(pool.clone(), event_bus, engine, orchestrator, None);
    (hjf_agent::build_router(state), pool, dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn assert_error(body: &Value, code: &str, retryable: bool) {
    let error = &body["error"];
    assert_eq!(error["code"], code, "body: {}", body);
    assert_eq!(error["retryable"], retryable);
    assert!(error["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert!(error["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "hjf-agent");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["ingestion_running"], false);
}

#[tokio::test]
async fn test_list_jobs_rejects_bad_filters() {
    let (app, _pool, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/jobs?status=archived", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_STATUS", false);

    let (status, body) = send(&app, "GET", "/api/jobs?min_score=101", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_MIN_SCORE", false);

    let (status, body) = send(&app, "GET", "/api/jobs?status=new&min_score=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_get_job_errors() {
    let (app, _pool, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/jobs/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_JOB_ID", false);

    let (status, body) = send(&app, "GET", "/api/jobs/777", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "JOB_NOT_FOUND", false);
}

#[tokio::test]
async fn test_status_update_follows_workflow() {
    let (app, pool, _dir) = create_test_app().await;
    let id = insert_job_with_status(&pool, "api-flow", JobStatus::New).await;
    let uri = format!("/api/jobs/{}/status", id);

    let (status, body) = send(&app, "PATCH", &uri, Some(json!({ "status": "applied" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_STATE_TRANSITION", false);

    let (_, job) = send(&app, "GET", &format!("/api/jobs/{}", id), None).await;
    assert_eq!(job["status"], "new");

    let (status, job) = send(&app, "PATCH", &uri, Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "approved");
    assert_eq!(job["id"], id);

    let (status, body) = send(&app, "PATCH", &uri, Some(json!({ "status": "bogus" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_STATUS", false);
}

#[tokio::test]
async fn test_apply_check_requires_approved() {
    let (app, pool, _dir) = create_test_app().await;
    let new_id = insert_job_with_status(&pool, "check-new", JobStatus::New).await;
    let approved_id = insert_job_with_status(&pool, "check-approved", JobStatus::Approved).await;

    let (status, body) = send(&app, "POST", &format!("/api/jobs/{}/apply", new_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_JOB_STATUS", false);

    let (status, body) = send(&app, "POST", &format!("/api/jobs/{}/apply", approved_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_id"], approved_id);
}

#[tokio::test]
async fn test_profile_validation_and_round_trip() {
    let (app, _pool, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/profile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "PROFILE_NOT_FOUND", false);

    let (status, body) = send(&app, "PUT", "/api/profile", Some(json!({ "full_name": "Grace Hopper" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR", false);

    let bad_email = json!({
        "full_name": "Grace Hopper",
        "email": "grace at navy",
        "resume_text": "COBOL"
    });
    let (status, body) = send(&app, "PUT", "/api/profile", Some(bad_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_EMAIL", false);

    let valid = json!({
        "full_name": "Grace Hopper",
        "email": "grace@navy.example.mil",
        "resume_text": "Compilers. COBOL.",
        "location": "Arlington, VA"
    });
    let (status, body) = send(&app, "PUT", "/api/profile", Some(valid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Grace Hopper");

    let (status, body) = send(&app, "GET", "/api/profile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "grace@navy.example.mil");
    assert_eq!(body["location"], "Arlington, VA");
}

#[tokio::test]
async fn test_structure_without_oracle_is_unavailable() {
    let (app, pool, _dir) = create_test_app().await;
    seed_profile(&pool).await;

    let (status, body) = send(&app, "POST", "/api/profile/structure", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error(&body, "ORACLE_UNAVAILABLE", false);
}

#[tokio::test]
async fn test_start_requires_job_id_and_approved_job() {
    let (app, pool, _dir) = create_test_app().await;
    seed_profile(&pool).await;
    let rejected = insert_job_with_status(&pool, "api-rejected", JobStatus::Rejected).await;

    let (status, body) = send(&app, "POST", "/api/automation/start", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_JOB_ID", false);

    let (status, body) = send(&app, "POST", "/api/automation/start", Some(json!({ "job_id": rejected }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_JOB_STATUS", false);

    let (_, sessions) = send(&app, "GET", "/api/automation/sessions", None).await;
    assert_eq!(sessions["count"], 0);
}

async fn send_raw(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let (app, pool, _dir) = create_test_app().await;
    let id = insert_job_with_status(&pool, "bad-body", JobStatus::New).await;

    let cases = [
        ("POST", "/api/automation/start".to_string(), r#"{"job_id":"7"}"#),
        ("POST", "/api/automation/confirm".to_string(), "{\"session_id\":"),
        ("PATCH", format!("/api/jobs/{}/status", id), r#"{"status": 3}"#),
        ("PUT", "/api/profile".to_string(), "not json"),
    ];

    for (method, uri, body) in cases {
        let (status, json) = send_raw(&app, method, &uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
        assert_error(&json, "INVALID_REQUEST_BODY", false);
    }

    let (_, job) = send(&app, "GET", &format!("/api/jobs/{}", id), None).await;
    assert_eq!(job["status"], "new");
}

#[tokio::test]
async fn test_start_then_confirm_marks_job_applied() {
    let (app, pool, _dir) = create_test_app().await;
    seed_profile(&pool).await;
    let job_id = insert_job_with_status(&pool, "api-confirm", JobStatus::Approved).await;

    let (status, started) = send(&app, "POST", "/api/automation/start", Some(json!({ "job_id": job_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "paused");
    assert_eq!(started["job_id"], job_id);
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let (_, sessions) = send(&app, "GET", "/api/automation/sessions", None).await;
    assert_eq!(sessions["count"], 1);

    let (status, confirmed) = send(
        &app,
        "POST",
        "/api/automation/confirm",
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["old_status"], "paused");
    assert_eq!(confirmed["new_status"], "submitted");

    let (_, job) = send(&app, "GET", &format!("/api/jobs/{}", job_id), None).await;
    assert_eq!(job["status"], "applied");

    // Session is gone once submitted
    let (status, body) = send(
        &app,
        "POST",
        "/api/automation/confirm",
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "SESSION_NOT_FOUND", false);
}

#[tokio::test]
async fn test_cancel_and_kill() {
    let (app, pool, _dir) = create_test_app().await;
    seed_profile(&pool).await;

    let (status, body) = send(&app, "POST", "/api/automation/cancel", Some(json!({ "session_id": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_SESSION_ID", false);

    let (status, body) = send(&app, "POST", "/api/automation/kill", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["terminated"], 0);

    for tag in ["kill-a", "kill-b"] {
        let id = insert_job_with_status(&pool, tag, JobStatus::Approved).await;
        let (status, _) = send(&app, "POST", "/api/automation/start", Some(json!({ "job_id": id }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, "POST", "/api/automation/kill", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["terminated"], 2);

    let (_, sessions) = send(&app, "GET", "/api/automation/sessions", None).await;
    assert_eq!(sessions["count"], 0);
}

#[tokio::test]
async fn test_sources_and_manual_ingestion() {
    let (app, _pool, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/api/sources", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"][0]["id"], "board");
    assert_eq!(body["sources"][0]["max_age_hours"], 24);
    assert_eq!(body["stats"]["total"], 1);
    assert_eq!(body["ingestion_running"], false);

    let (status, summary) = send(&app, "POST", "/api/ingestion/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["inserted"], 1);
    assert_eq!(summary["failed_sources"], json!([]));

    let (_, jobs) = send(&app, "GET", "/api/jobs?status=new", None).await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["company"], "Acme");
}
