use std::fmt;

use serde::{Deserialize, Serialize};

/// The four states of a translation job.
///
/// Each job flows through: PENDING → PROCESSING → COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Processing => write!(f, "PROCESSING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a requested transition was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionRejection {
    #[error("job is already terminal ({0})")]
    AlreadyTerminal(JobState),
    #[error("cannot re-enter PENDING from {0}")]
    BackToPending(JobState),
}

/// Validates state changes for a job.
pub struct StateMachine;

impl StateMachine {
    /// Check whether `from -> to` is a legal move.
    ///
    /// - Any move out of a terminal state is rejected.
    /// - Entering `Pending` is rejected (a job only starts there).
    /// - `Pending` may jump straight to a terminal state.
    /// - `Processing -> Processing` is a progress update.
    pub fn check(from: JobState, to: JobState) -> Result<(), TransitionRejection> {
        if from.is_terminal() {
            return Err(TransitionRejection::AlreadyTerminal(from));
        }
        if to == JobState::Pending {
            return Err(TransitionRejection::BackToPending(from));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(StateMachine::check(JobState::Pending, JobState::Processing).is_ok());
        assert!(StateMachine::check(JobState::Processing, JobState::Processing).is_ok());
        assert!(StateMachine::check(JobState::Processing, JobState::Completed).is_ok());
        assert!(StateMachine::check(JobState::Processing, JobState::Failed).is_ok());
    }

    #[test]
    fn pending_can_fast_complete_or_fail() {
        assert!(StateMachine::check(JobState::Pending, JobState::Completed).is_ok());
        assert!(StateMachine::check(JobState::Pending, JobState::Failed).is_ok());
    }

    #[test]
    fn terminal_states_are_final() {
        for to in [
            JobState::Pending,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(
                StateMachine::check(JobState::Completed, to),
                Err(TransitionRejection::AlreadyTerminal(JobState::Completed))
            );
            assert_eq!(
                StateMachine::check(JobState::Failed, to),
                Err(TransitionRejection::AlreadyTerminal(JobState::Failed))
            );
        }
    }

    #[test]
    fn pending_cannot_be_reentered() {
        assert_eq!(
            StateMachine::check(JobState::Processing, JobState::Pending),
            Err(TransitionRejection::BackToPending(JobState::Processing))
        );
        assert!(StateMachine::check(JobState::Pending, JobState::Pending).is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(JobState::Pending.to_string(), "PENDING");
        assert_eq!(JobState::Processing.to_string(), "PROCESSING");
        assert_eq!(JobState::Completed.to_string(), "COMPLETED");
        assert_eq!(JobState::Failed.to_string(), "FAILED");
    }
}
