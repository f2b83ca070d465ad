//! Database access for the job filer agent
//!
//! SQLite via sqlx. Timestamps are stored as RFC 3339 UTC text with
//! millisecond precision so lexical order equals chronological order.

pub mod jobs;
pub mod profile;
pub mod submissions;

use chrono::{DateTime, SecondsFormat, Utc};
use hjf_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and create tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create agent tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            company TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            fingerprint TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            match_score INTEGER CHECK (match_score IS NULL OR (match_score BETWEEN 0 AND 100)),
            status TEXT NOT NULL DEFAULT 'new'
                CHECK (status IN ('new', 'approved', 'rejected', 'applied')),
            posted_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
        .execute(pool)
        .await?;

    // Audit rows outlive retention of the posting they reference, so no FK
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS application_submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            session_id TEXT NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            github_url TEXT,
            linkedin_url TEXT,
            location TEXT,
            resume_text TEXT NOT NULL,
            bio TEXT,
            submitted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profile (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            github_url TEXT,
            linkedin_url TEXT,
            location TEXT,
            resume_text TEXT NOT NULL,
            structured_data TEXT,
            bio TEXT,
            desired_job_titles TEXT NOT NULL DEFAULT '[]',
            desired_locations TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (jobs, application_submissions, user_profile)");

    Ok(())
}

/// Format a timestamp for storage
pub fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db_time(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
