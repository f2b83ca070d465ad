//! Job posting workflow state machine
//!
//! Postings move one way through `new → approved → applied`, or
//! `new → rejected`. Nothing ever returns to `new`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Workflow status of a stored job posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Freshly ingested, awaiting human review
    New,
    /// Approved by a human, eligible for automation
    Approved,
    /// Rejected by a human
    Rejected,
    /// Application submitted
    Applied,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::New,
        JobStatus::Approved,
        JobStatus::Rejected,
        JobStatus::Applied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Approved => "approved",
            JobStatus::Rejected => "rejected",
            JobStatus::Applied => "applied",
        }
    }

    /// Legal edges of the workflow table
    ///
    /// `approved → approved` is allowed so re-approval is idempotent.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::New, JobStatus::Approved)
                | (JobStatus::New, JobStatus::Rejected)
                | (JobStatus::Approved, JobStatus::Approved)
                | (JobStatus::Approved, JobStatus::Applied)
        )
    }

    /// Terminal states have no outgoing edges
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Rejected | JobStatus::Applied)
    }

    /// Validate `self → to` against the table
    pub fn validate_transition(self, to: JobStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError::Invalid { from: self, to })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized status string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid status '{0}'. Must be one of: new, approved, rejected, applied")]
pub struct InvalidStatus(pub String);

impl FromStr for JobStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobStatus::New),
            "approved" => Ok(JobStatus::Approved),
            "rejected" => Ok(JobStatus::Rejected),
            "applied" => Ok(JobStatus::Applied),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// Failure to move a posting along its workflow
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Cannot transition from '{from}' to '{to}'")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error("Job {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] hjf_common::Error),
}

impl TransitionError {
    /// Stable error code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::Invalid { .. } => "INVALID_STATE_TRANSITION",
            TransitionError::NotFound(_) => "JOB_NOT_FOUND",
            TransitionError::Storage(_) => "DATABASE_ERROR",
        }
    }
}

/// Applied status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub job_id: i64,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Stored job posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub url: String,
    pub company: String,
    pub title: String,
    pub description: String,
    /// Canonical (company, title) fingerprint
    pub fingerprint: String,
    /// Connector that produced the posting
    pub source: String,
    /// 0-100, absent when scoring was unavailable
    pub match_score: Option<u8>,
    pub status: JobStatus,
    /// Source-reported posting time
    pub posted_at: Option<DateTime<Utc>>,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
}

/// Posting ready for insertion
#[derive(Debug, Clone)]
pub struct NewJobPosting {
    pub url: String,
    pub company: String,
    pub title: String,
    pub description: String,
    pub fingerprint: String,
    pub source: String,
    pub match_score: Option<u8>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Query filter for listing postings
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub min_score: Option<u8>,
}
