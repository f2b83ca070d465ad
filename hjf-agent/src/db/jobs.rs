//! Job posting database operations
//!
//! Postings are created by ingestion, mutated only through
//! [`transition_status`], and deleted only by the retention sweep.

use chrono::{DateTime, Utc};
use hjf_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{from_db_time, to_db_time};
use crate::models::{JobFilter, JobPosting, JobStatus, NewJobPosting, StatusChange, TransitionError};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const JOB_COLUMNS: &str = "id, url, company, title, description, fingerprint, source, \
                           match_score, status, posted_at, created_at";

/// Insert a new posting with status `new`
///
/// A duplicate URL or fingerprint surfaces as a database error for which
/// [`Error::is_unique_violation`] is true; no row is written.
pub async fn insert_job(pool: &SqlitePool, job: &NewJobPosting) -> Result<i64> {
    let created_at = to_db_time(&Utc::now());
    let posted_at = job.posted_at.as_ref().map(to_db_time);
    let match_score = job.match_score.map(i64::from);

    retry_on_lock("insert_job", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                url, company, title, description, fingerprint, source,
                match_score, status, posted_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'new', ?, ?)
            "#,
        )
        .bind(&job.url)
        .bind(&job.company)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.fingerprint)
        .bind(&job.source)
        .bind(match_score)
        .bind(&posted_at)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    })
    .await
}

/// Load one posting
pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Option<JobPosting>> {
    let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// List postings, newest first, best match first within the same instant
pub async fn list_jobs(pool: &SqlitePool, filter: &JobFilter) -> Result<Vec<JobPosting>> {
    let mut sql = format!("SELECT {} FROM jobs WHERE 1 = 1", JOB_COLUMNS);
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if filter.min_score.is_some() {
        sql.push_str(" AND match_score >= ?");
    }
    sql.push_str(" ORDER BY created_at DESC, match_score DESC");

    let mut query = sqlx::query(&sql);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(min_score) = filter.min_score {
        query = query.bind(i64::from(min_score));
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_job).collect()
}

/// True if a posting with this fingerprint is stored
pub async fn fingerprint_exists(pool: &SqlitePool, fingerprint: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE fingerprint = ? LIMIT 1")
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// True if a posting with this URL is stored
pub async fn url_exists(pool: &SqlitePool, url: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE url = ? LIMIT 1")
        .bind(url)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

enum CasOutcome {
    Applied(JobStatus),
    Missing,
    Illegal(JobStatus),
}

/// Move a posting to `to`, validated against the workflow table
///
/// Reads the current status and writes the new one inside a single
/// transaction. The write is conditional on the status still being the
/// one that was validated, so a rejected or lost race writes nothing.
pub async fn transition_status(
    pool: &SqlitePool,
    job_id: i64,
    to: JobStatus,
) -> std::result::Result<StatusChange, TransitionError> {
    let outcome = retry_on_lock("transition_status", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(current) = current else {
            return Ok(CasOutcome::Missing);
        };
        let from: JobStatus = current
            .parse()
            .map_err(|e: crate::models::InvalidStatus| Error::Internal(e.to_string()))?;

        if !from.can_transition_to(to) {
            return Ok(CasOutcome::Illegal(from));
        }

        let updated = sqlx::query("UPDATE jobs SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(job_id)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() != 1 {
            // Dropping tx rolls back
            return Err(Error::Internal(format!(
                "Job {} status changed concurrently",
                job_id
            )));
        }

        tx.commit().await?;
        Ok(CasOutcome::Applied(from))
    })
    .await?;

    match outcome {
        CasOutcome::Applied(from) => {
            tracing::info!(job_id, from = %from, to = %to, "Job status updated");
            Ok(StatusChange { job_id, from, to })
        }
        CasOutcome::Missing => Err(TransitionError::NotFound(job_id)),
        CasOutcome::Illegal(from) => {
            tracing::warn!(job_id, from = %from, to = %to, "Rejected invalid status transition");
            Err(TransitionError::Invalid { from, to })
        }
    }
}

const STALE_PREDICATE: &str = "(posted_at IS NOT NULL AND posted_at < ?) \
                               OR (posted_at IS NULL AND created_at < ?)";

/// Delete postings older than `cutoff`
///
/// Age is `posted_at` when known, otherwise `created_at`.
pub async fn delete_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff = to_db_time(&cutoff);
    let result = sqlx::query(&format!("DELETE FROM jobs WHERE {}", STALE_PREDICATE))
        .bind(&cutoff)
        .bind(&cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Count postings [`delete_older_than`] would remove
pub async fn count_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff = to_db_time(&cutoff);
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM jobs WHERE {}", STALE_PREDICATE))
        .bind(&cutoff)
        .bind(&cutoff)
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

fn row_to_job(row: &SqliteRow) -> Result<JobPosting> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| Error::Internal(e.to_string()))?;

    let match_score: Option<i64> = row.try_get("match_score")?;
    let posted_at: Option<String> = row.try_get("posted_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(JobPosting {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        company: row.try_get("company")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        fingerprint: row.try_get("fingerprint")?,
        source: row.try_get("source")?,
        match_score: match_score.map(|s| s.clamp(0, 100) as u8),
        status,
        posted_at: posted_at
            .map(|s| from_db_time("posted_at", &s))
            .transpose()?,
        created_at: from_db_time("created_at", &created_at)?,
    })
}
