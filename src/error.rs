use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::PolicyName;
use crate::state_machine::JobState;

pub type Result<T> = std::result::Result<T, DeckgateError>;

/// Errors returned by the core.
///
/// An unreachable or slow translation engine is not an error here: it fails
/// the job with [`FailureKind::UpstreamUnavailable`].
#[derive(Debug, Error)]
pub enum DeckgateError {
    #[error("Rate limited by policy {policy}: limit {limit}, retry after {retry_after_secs}s")]
    RateLimited {
        policy: PolicyName,
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Internal only. The broadcaster turns this into a silent unregistration.
    #[error("Subscriber gone for job {0}")]
    SubscriberGone(String),
}

impl DeckgateError {
    /// Whether the condition is an expected, user-facing one that should be
    /// surfaced verbatim rather than logged as a fault.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DeckgateError::RateLimited { .. } | DeckgateError::JobNotFound(_)
        )
    }
}

/// Stable classification of why a job ended in `Failed`.
///
/// Serialized in snake_case so clients can branch on it without parsing the
/// free-text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine could not be reached or did not answer in time.
    UpstreamUnavailable,
    /// The engine answered but refused or failed the work.
    EngineRejected,
    /// The job was canceled before the engine finished.
    Canceled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::UpstreamUnavailable => write!(f, "upstream_unavailable"),
            FailureKind::EngineRejected => write!(f, "engine_rejected"),
            FailureKind::Canceled => write!(f, "canceled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::UpstreamUnavailable).unwrap();
        assert_eq!(json, r#""upstream_unavailable""#);
        let back: FailureKind = serde_json::from_str(r#""canceled""#).unwrap();
        assert_eq!(back, FailureKind::Canceled);
    }

    #[test]
    fn failure_kind_display_matches_wire_name() {
        assert_eq!(FailureKind::EngineRejected.to_string(), "engine_rejected");
    }

    #[test]
    fn user_facing_classification() {
        assert!(DeckgateError::JobNotFound("x".into()).is_user_facing());
        assert!(!DeckgateError::SubscriberGone("j".into()).is_user_facing());
        assert!(
            !DeckgateError::InvalidTransition {
                job_id: "j".into(),
                from: JobState::Completed,
                to: JobState::Processing,
            }
            .is_user_facing()
        );
    }

    #[test]
    fn job_not_found_display() {
        let err = DeckgateError::JobNotFound("abc".into());
        assert_eq!(err.to_string(), "Job not found: abc");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeckgateError>();
    }
}
