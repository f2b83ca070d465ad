//! Resume structuring
//!
//! Turns free-form resume text into [`StructuredProfile`] via the oracle.

use std::sync::Arc;
use thiserror::Error;

use super::oracle::{extract_json_object, ChatRequest, ClassificationOracle, OracleError};
use crate::models::StructuredProfile;
use crate::utils::text::truncate_chars;

/// Longest resume excerpt sent to the oracle
const MAX_RESUME_PROMPT_CHARS: usize = 15_000;

const SYSTEM_PROMPT: &str = "Extract structured data from the resume. Respond with JSON only, \
shaped as {\"workExperience\": [{\"company\", \"title\", \"startDate\", \"endDate\", \
\"description\", \"technologies\": []}], \"skills\": [], \"education\": [{\"institution\", \
\"degree\", \"field\", \"graduationDate\"}], \"certifications\": [], \"languages\": []}.";

#[derive(Debug, Error)]
pub enum StructureError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("oracle returned no JSON object")]
    NoJson,

    #[error("invalid structured profile: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub struct ResumeStructurer {
    oracle: Arc<dyn ClassificationOracle>,
}

impl ResumeStructurer {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { oracle }
    }

    pub async fn structure(&self, resume_text: &str) -> Result<StructuredProfile, StructureError> {
        let reply = self
            .oracle
            .complete(ChatRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: truncate_chars(resume_text, MAX_RESUME_PROMPT_CHARS),
                temperature: 0.1,
                max_tokens: 2000,
            })
            .await?;

        let json = extract_json_object(&reply).ok_or(StructureError::NoJson)?;
        let profile: StructuredProfile = serde_json::from_str(json)?;

        tracing::info!(
            jobs = profile.work_experience.len(),
            skills = profile.skills.len(),
            "Resume structured"
        );
        Ok(profile)
    }
}
