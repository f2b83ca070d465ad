//! Automation session state machine
//!
//! FILLING → PAUSED → SUBMITTED | CANCELLED, FILLING → CANCELLED,
//! any non-terminal state → ERROR. Submission is only reachable from
//! PAUSED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Automation session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Navigating, detecting and filling form fields
    Filling,
    /// Form filled, submit control highlighted, waiting for confirmation
    Paused,
    /// Submit control clicked after confirmation
    Submitted,
    /// Cancelled by operator or kill switch
    Cancelled,
    /// Failed; browser released
    Error,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Filling,
        SessionStatus::Paused,
        SessionStatus::Submitted,
        SessionStatus::Cancelled,
        SessionStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Filling => "filling",
            SessionStatus::Paused => "paused",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Submitted | SessionStatus::Cancelled | SessionStatus::Error
        )
    }

    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        match (self, to) {
            (SessionStatus::Filling, SessionStatus::Paused) => true,
            (SessionStatus::Filling, SessionStatus::Cancelled) => true,
            (SessionStatus::Paused, SessionStatus::Submitted) => true,
            (SessionStatus::Paused, SessionStatus::Cancelled) => true,
            (from, SessionStatus::Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session status change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub session_id: String,
    pub old_status: SessionStatus,
    pub new_status: SessionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Session listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub job_id: i64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Session identifier derived from the job and creation instant
pub fn session_id_for(job_id: i64, created_at: DateTime<Utc>) -> String {
    format!("auto-{}-{}", job_id, created_at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_only_paused_reaches_submitted() {
        for from in SessionStatus::ALL {
            assert_eq!(
                from.can_transition_to(SessionStatus::Submitted),
                from == SessionStatus::Paused,
                "{} -> submitted",
                from
            );
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in SessionStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in SessionStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_error_reachable_from_every_live_state() {
        assert!(SessionStatus::Filling.can_transition_to(SessionStatus::Error));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Error));
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Filling));
        assert!(!SessionStatus::Filling.can_transition_to(SessionStatus::Filling));
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Paused));
    }

    #[test]
    fn test_session_id_format() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(session_id_for(42, created), "auto-42-1700000000123");
    }
}
