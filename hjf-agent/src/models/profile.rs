//! Candidate profile and submission snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted resume text length, in characters
pub const MAX_RESUME_CHARS: usize = 50_000;

/// The single candidate profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    pub resume_text: String,
    pub bio: Option<String>,
    pub structured_data: Option<StructuredProfile>,
    #[serde(default)]
    pub desired_job_titles: Vec<String>,
    #[serde(default)]
    pub desired_locations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateProfile {
    /// Text the match scorer compares postings against
    pub fn scoring_text(&self) -> String {
        let mut text = self.resume_text.clone();
        if !self.desired_job_titles.is_empty() {
            text.push_str("\n\nDesired roles: ");
            text.push_str(&self.desired_job_titles.join(", "));
        }
        if !self.desired_locations.is_empty() {
            text.push_str("\nDesired locations: ");
            text.push_str(&self.desired_locations.join(", "));
        }
        text
    }

    /// Value used to fill a form field of the given kind
    pub fn value_for(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::FullName => Some(self.full_name.as_str()),
            ProfileField::Email => Some(self.email.as_str()),
            ProfileField::Phone => self.phone.as_deref(),
            ProfileField::GithubUrl => self.github_url.as_deref(),
            ProfileField::LinkedinUrl => self.linkedin_url.as_deref(),
            ProfileField::Location => self.location.as_deref(),
            ProfileField::Resume => Some(self.resume_text.as_str()),
        }
        .filter(|v| !v.trim().is_empty())
    }
}

/// Profile fields a form field label can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FullName,
    Email,
    Phone,
    GithubUrl,
    LinkedinUrl,
    Location,
    /// Uploaded as a file, not typed
    Resume,
}

impl ProfileField {
    /// Map a detected field label onto a profile field
    ///
    /// Unknown labels return `None` and are left untouched.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "name" | "full_name" | "fullname" => Some(ProfileField::FullName),
            "email" | "email_address" => Some(ProfileField::Email),
            "phone" | "phone_number" => Some(ProfileField::Phone),
            "github" | "github_url" | "portfolio" => Some(ProfileField::GithubUrl),
            "linkedin" | "linkedin_url" => Some(ProfileField::LinkedinUrl),
            "location" | "city" => Some(ProfileField::Location),
            "resume" | "cv" => Some(ProfileField::Resume),
            _ => None,
        }
    }
}

/// Structured resume data produced by the oracle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredProfile {
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkExperience {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub graduation_date: Option<String>,
}

/// Profile create/replace payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub resume_text: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub desired_job_titles: Vec<String>,
    #[serde(default)]
    pub desired_locations: Vec<String>,
}

/// Rejected profile payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileValidationError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Resume text must be under 50000 characters")]
    ResumeTooLong,
}

impl ProfileValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ProfileValidationError::MissingFields(_) => "VALIDATION_ERROR",
            ProfileValidationError::InvalidEmail => "INVALID_EMAIL",
            ProfileValidationError::ResumeTooLong => "RESUME_TOO_LONG",
        }
    }
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        let missing: Vec<&str> = [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("resume_text", &self.resume_text),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ProfileValidationError::MissingFields(missing.join(", ")));
        }
        if !is_valid_email(&self.email) {
            return Err(ProfileValidationError::InvalidEmail);
        }
        if self.resume_text.chars().count() > MAX_RESUME_CHARS {
            return Err(ProfileValidationError::ResumeTooLong);
        }
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace and exactly one `@`
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Immutable audit record written when a submission is confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    pub job_id: i64,
    pub session_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    pub resume_text: String,
    pub bio: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionSnapshot {
    /// Capture the profile as it is at this instant
    pub fn capture(profile: &CandidateProfile, job_id: i64, session_id: &str) -> Self {
        Self {
            job_id,
            session_id: session_id.to_string(),
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            github_url: profile.github_url.clone(),
            linkedin_url: profile.linkedin_url.clone(),
            location: profile.location.clone(),
            resume_text: profile.resume_text.clone(),
            bio: profile.bio.clone(),
            submitted_at: Utc::now(),
        }
    }
}
