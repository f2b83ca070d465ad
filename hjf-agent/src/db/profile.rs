//! Candidate profile persistence (single row, id = 1)

use chrono::Utc;
use hjf_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use super::{from_db_time, to_db_time};
use crate::models::{CandidateProfile, ProfileUpdate, StructuredProfile};

/// Load the profile, if one has been saved
pub async fn get_profile(pool: &SqlitePool) -> Result<Option<CandidateProfile>> {
    let row = sqlx::query(
        r#"
        SELECT full_name, email, phone, github_url, linkedin_url, location,
               resume_text, structured_data, bio, desired_job_titles,
               desired_locations, created_at, updated_at
        FROM user_profile
        WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let structured: Option<String> = row.try_get("structured_data")?;
    let structured_data = structured
        .map(|s| serde_json::from_str::<StructuredProfile>(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize structured_data: {}", e)))?;

    let titles: String = row.try_get("desired_job_titles")?;
    let locations: String = row.try_get("desired_locations")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Some(CandidateProfile {
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        github_url: row.try_get("github_url")?,
        linkedin_url: row.try_get("linkedin_url")?,
        location: row.try_get("location")?,
        resume_text: row.try_get("resume_text")?,
        bio: row.try_get("bio")?,
        structured_data,
        desired_job_titles: parse_string_list("desired_job_titles", &titles)?,
        desired_locations: parse_string_list("desired_locations", &locations)?,
        created_at: from_db_time("created_at", &created_at)?,
        updated_at: from_db_time("updated_at", &updated_at)?,
    }))
}

/// Create or replace the profile
///
/// Structured data is kept across updates; it is rewritten only by
/// [`set_structured_data`].
pub async fn upsert_profile(pool: &SqlitePool, update: &ProfileUpdate) -> Result<CandidateProfile> {
    let now = to_db_time(&Utc::now());
    let titles = to_json_list(&update.desired_job_titles)?;
    let locations = to_json_list(&update.desired_locations)?;

    sqlx::query(
        r#"
        INSERT INTO user_profile (
            id, full_name, email, phone, github_url, linkedin_url, location,
            resume_text, bio, desired_job_titles, desired_locations,
            created_at, updated_at
        ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            email = excluded.email,
            phone = excluded.phone,
            github_url = excluded.github_url,
            linkedin_url = excluded.linkedin_url,
            location = excluded.location,
            resume_text = excluded.resume_text,
            bio = excluded.bio,
            desired_job_titles = excluded.desired_job_titles,
            desired_locations = excluded.desired_locations,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(update.full_name.trim())
    .bind(update.email.trim())
    .bind(&update.phone)
    .bind(&update.github_url)
    .bind(&update.linkedin_url)
    .bind(&update.location)
    .bind(&update.resume_text)
    .bind(&update.bio)
    .bind(&titles)
    .bind(&locations)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_profile(pool)
        .await?
        .ok_or_else(|| Error::Internal("Profile missing after upsert".to_string()))
}

/// Store oracle-structured resume data on the existing profile
pub async fn set_structured_data(pool: &SqlitePool, data: &StructuredProfile) -> Result<()> {
    let json = serde_json::to_string(data)
        .map_err(|e| Error::Internal(format!("Failed to serialize structured_data: {}", e)))?;

    let result = sqlx::query("UPDATE user_profile SET structured_data = ?, updated_at = ? WHERE id = 1")
        .bind(&json)
        .bind(to_db_time(&Utc::now()))
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("Profile not found".to_string()));
    }
    Ok(())
}

fn parse_string_list(column: &str, value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

fn to_json_list(values: &[String]) -> Result<String> {
    serde_json::to_string(values)
        .map_err(|e| Error::Internal(format!("Failed to serialize list: {}", e)))
}
