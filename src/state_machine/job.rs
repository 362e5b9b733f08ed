use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{JobState, StateMachine, TransitionRejection};
use crate::error::FailureKind;

/// Target language used when a submission does not name one.
pub const DEFAULT_TARGET_LANGUAGE: &str = "ja";

/// What the external engine is asked to translate. Passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub file_id: String,
    pub target_language: String,
}

impl JobPayload {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
        }
    }

    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = language.into();
        self
    }
}

/// Error detail attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A requested state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: JobState,
    pub progress: u8,
    pub message: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<JobError>,
}

impl Transition {
    pub fn new(state: JobState, progress: u8, message: Option<String>) -> Self {
        Self {
            state,
            progress,
            message,
            result_url: None,
            error: None,
        }
    }

    pub fn processing(progress: u8, message: impl Into<String>) -> Self {
        Self::new(JobState::Processing, progress, Some(message.into()))
    }

    pub fn completed(result_url: impl Into<String>) -> Self {
        Self {
            result_url: Some(result_url.into()),
            ..Self::new(JobState::Completed, 100, None)
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        let error = JobError::new(kind, message);
        Self {
            message: Some(error.message.clone()),
            error: Some(error),
            ..Self::new(JobState::Failed, 0, None)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The subscriber- and client-facing view of a job. Pull and push share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One translation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub client_id: String,
    pub payload: JobPayload,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub progress: u8,
    pub message: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(client_id: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            payload,
            state: JobState::Pending,
            state_history: Vec::new(),
            progress: 0,
            message: None,
            result_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a transition, returning the resulting snapshot.
    ///
    /// Progress never goes backwards: a lower value is clamped to the current
    /// maximum, values above 100 are capped, and `Completed` always reports 100.
    pub fn apply(&mut self, transition: Transition) -> Result<JobSnapshot, TransitionRejection> {
        StateMachine::check(self.state, transition.state)?;

        let requested = transition.progress.min(100);
        let progress = match transition.state {
            JobState::Completed => 100,
            _ => requested.max(self.progress),
        };

        self.state_history.push(self.state);
        self.state = transition.state;
        self.progress = progress;
        if transition.message.is_some() {
            self.message = transition.message;
        }
        if transition.result_url.is_some() {
            self.result_url = transition.result_url;
        }
        if transition.error.is_some() {
            self.error = transition.error;
        }
        self.updated_at = Utc::now();

        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            state: self.state,
            progress: self.progress,
            message: self.message.clone(),
            result_url: self.result_url.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}
