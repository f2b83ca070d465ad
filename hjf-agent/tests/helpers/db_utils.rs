//! Database test utilities

use anyhow::Result;
use hjf_agent::models::{CandidateProfile, JobStatus, NewJobPosting, ProfileUpdate};
use hjf_agent::services::fingerprint;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary database with the agent schema
///
/// Returns (TempDir, SqlitePool); keep the TempDir alive for the test.
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_hjf.db");
    let pool = hjf_agent::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

pub fn sample_posting(url: &str, company: &str, title: &str) -> NewJobPosting {
    NewJobPosting {
        url: url.to_string(),
        company: company.to_string(),
        title: title.to_string(),
        description: format!("{} is hiring a {}", company, title),
        fingerprint: fingerprint(company, title),
        source: "test".to_string(),
        match_score: None,
        posted_at: None,
    }
}

/// Insert a posting and force its status, bypassing the workflow table
pub async fn insert_job_with_status(pool: &SqlitePool, tag: &str, status: JobStatus) -> i64 {
    let posting = sample_posting(
        &format!("https://jobs.example.com/{}", tag),
        &format!("Company {}", tag),
        "Software Engineer",
    );
    let id = hjf_agent::db::jobs::insert_job(pool, &posting).await.unwrap();
    sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn seed_profile(pool: &SqlitePool) -> CandidateProfile {
    let update = ProfileUpdate {
        full_name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: Some("+44 20 7946 0000".to_string()),
        github_url: Some("https://github.com/ada".to_string()),
        resume_text: "Analytical engine programmer. Rust, Tokio, SQLite.".to_string(),
        ..Default::default()
    };
    hjf_agent::db::profile::upsert_profile(pool, &update).await.unwrap()
}
