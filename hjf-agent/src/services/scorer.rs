//! Match scorer
//!
//! Asks the oracle how well a posting fits the candidate and parses a
//! single integer in `[0, 100]`. Scoring never fails the caller: when the
//! oracle is unavailable the posting is stored unscored.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::oracle::{ChatRequest, ClassificationOracle, OracleError};

/// Oracle attempts per posting
pub const SCORER_MAX_ATTEMPTS: u32 = 3;

/// Waits before retries; the delay before attempt n is entry n-2
pub const SCORER_BACKOFF_MS: [u64; 3] = [5_000, 10_000, 20_000];

const SYSTEM_PROMPT: &str = "You are a job matching assistant. Compare the job posting with the \
candidate profile and rate the fit from 0 to 100, where 0 is no match and 100 is a perfect \
match. Respond with the number only.";

#[derive(Debug, thiserror::Error)]
enum ScoreError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("unparseable score: {0:?}")]
    Unparseable(String),
}

pub struct MatchScorer {
    oracle: Arc<dyn ClassificationOracle>,
    backoff: Vec<Duration>,
}

impl MatchScorer {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self::with_backoff(
            oracle,
            SCORER_BACKOFF_MS.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        )
    }

    pub fn with_backoff(oracle: Arc<dyn ClassificationOracle>, backoff: Vec<Duration>) -> Self {
        Self { oracle, backoff }
    }

    /// Score a posting against a profile, `None` when unscored
    pub async fn score(&self, posting_text: &str, profile_text: &str) -> Option<u8> {
        let request = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "Job posting:\n{}\n\nCandidate profile:\n{}\n\nMatch score (0-100):",
                posting_text, profile_text
            ),
            temperature: 0.3,
            max_tokens: 10,
        };

        for attempt in 1..=SCORER_MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = self
                    .backoff
                    .get(attempt as usize - 2)
                    .copied()
                    .unwrap_or_default();
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying match score");
                tokio::time::sleep(delay).await;
            }

            match self.try_score(request.clone()).await {
                Ok(score) => return Some(score),
                Err(ScoreError::Oracle(e)) if e.is_authentication() => {
                    error!(error = %e, "Oracle authentication failed, posting left unscored");
                    return None;
                }
                Err(e) => {
                    warn!(attempt, of = SCORER_MAX_ATTEMPTS, error = %e, "Match scoring attempt failed");
                }
            }
        }

        warn!("Match scoring gave up, posting left unscored");
        None
    }

    async fn try_score(&self, request: ChatRequest) -> Result<u8, ScoreError> {
        let reply = self.oracle.complete(request).await?;
        parse_score(&reply).ok_or(ScoreError::Unparseable(reply))
    }
}

/// Leading integer of the reply, if it is within 0..=100
pub fn parse_score(reply: &str) -> Option<u8> {
    let trimmed = reply.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value: u32 = digits.parse().ok()?;
    (value <= 100).then_some(value as u8)
}
