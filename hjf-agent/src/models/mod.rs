//! Data models for the job filer agent

pub mod job;
pub mod profile;
pub mod session;

pub use job::{
    InvalidStatus, JobFilter, JobPosting, JobStatus, NewJobPosting, StatusChange, TransitionError,
};
pub use profile::{
    CandidateProfile, ProfileField, ProfileUpdate, ProfileValidationError, StructuredProfile,
    SubmissionSnapshot, MAX_RESUME_CHARS,
};
pub use session::{session_id_for, SessionStatus, SessionSummary, SessionTransition};
