//! Application submission audit rows
//!
//! Insert-only. Rows are never updated.

use hjf_common::Result;
use sqlx::{Row, SqlitePool};

use super::{from_db_time, to_db_time};
use crate::models::SubmissionSnapshot;

/// Write a submission snapshot
pub async fn record_submission(pool: &SqlitePool, snapshot: &SubmissionSnapshot) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO application_submissions (
            job_id, session_id, full_name, email, phone, github_url,
            linkedin_url, location, resume_text, bio, submitted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.job_id)
    .bind(&snapshot.session_id)
    .bind(&snapshot.full_name)
    .bind(&snapshot.email)
    .bind(&snapshot.phone)
    .bind(&snapshot.github_url)
    .bind(&snapshot.linkedin_url)
    .bind(&snapshot.location)
    .bind(&snapshot.resume_text)
    .bind(&snapshot.bio)
    .bind(to_db_time(&snapshot.submitted_at))
    .execute(pool)
    .await?;

    tracing::info!(
        job_id = snapshot.job_id,
        session_id = %snapshot.session_id,
        "Submission snapshot recorded"
    );

    Ok(result.last_insert_rowid())
}

/// All submissions recorded for a job, oldest first
pub async fn list_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<SubmissionSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT job_id, session_id, full_name, email, phone, github_url,
               linkedin_url, location, resume_text, bio, submitted_at
        FROM application_submissions
        WHERE job_id = ?
        ORDER BY id
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<SubmissionSnapshot> {
            let submitted_at: String = row.try_get("submitted_at")?;
            Ok(SubmissionSnapshot {
                job_id: row.try_get("job_id")?,
                session_id: row.try_get("session_id")?,
                full_name: row.try_get("full_name")?,
                email: row.try_get("email")?,
                phone: row.try_get("phone")?,
                github_url: row.try_get("github_url")?,
                linkedin_url: row.try_get("linkedin_url")?,
                location: row.try_get("location")?,
                resume_text: row.try_get("resume_text")?,
                bio: row.try_get("bio")?,
                submitted_at: from_db_time("submitted_at", &submitted_at)?,
            })
        })
        .collect()
}
