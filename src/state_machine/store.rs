use chrono::{Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, error};

use super::job::{JobPayload, JobRecord, JobSnapshot, Transition};
use crate::error::{DeckgateError, Result};

/// In-memory table of job records.
///
/// Each record sits in its own dashmap entry, so a transition on one job only
/// holds that entry's shard lock and never blocks the whole table.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<String, JobRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `Pending` job and return its snapshot.
    pub fn create(&self, client_id: &str, payload: JobPayload) -> JobSnapshot {
        let record = JobRecord::new(client_id, payload);
        let snapshot = record.snapshot();
        debug!(job_id = %record.id, client_id, "job created");
        self.jobs.insert(record.id.clone(), record);
        snapshot
    }

    /// Apply a transition to a job.
    ///
    /// A rejected transition leaves the record untouched and is logged at error
    /// level: it means the caller drove the job out of order.
    pub fn transition(&self, job_id: &str, transition: Transition) -> Result<JobSnapshot> {
        let mut record = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DeckgateError::JobNotFound(job_id.to_string()))?;
        Self::apply(job_id, &mut record, transition)
    }

    /// Like [`transition`](Self::transition), but a job that already finished
    /// is left alone quietly and `None` is returned. The check and the update
    /// happen under the same entry lock.
    ///
    /// For results that can legitimately lose a race, such as an engine
    /// answer arriving after a cancel.
    pub fn transition_if_active(
        &self,
        job_id: &str,
        transition: Transition,
    ) -> Result<Option<JobSnapshot>> {
        let mut record = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DeckgateError::JobNotFound(job_id.to_string()))?;
        if record.state.is_terminal() {
            debug!(job_id, state = %record.state, to = %transition.state, "job already finished, dropping transition");
            return Ok(None);
        }
        Self::apply(job_id, &mut record, transition).map(Some)
    }

    fn apply(job_id: &str, record: &mut JobRecord, transition: Transition) -> Result<JobSnapshot> {
        let to = transition.state;
        match record.apply(transition) {
            Ok(snapshot) => {
                debug!(job_id, state = %snapshot.state, progress = snapshot.progress, "job transitioned");
                Ok(snapshot)
            }
            Err(reason) => {
                let from = record.state;
                error!(job_id, %from, %to, %reason, "rejected job transition");
                Err(DeckgateError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from,
                    to,
                })
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Result<JobSnapshot> {
        self.jobs
            .get(job_id)
            .map(|record| record.snapshot())
            .ok_or_else(|| DeckgateError::JobNotFound(job_id.to_string()))
    }

    /// Full record, including owner and payload.
    pub fn record(&self, job_id: &str) -> Result<JobRecord> {
        self.jobs
            .get(job_id)
            .map(|record| record.clone())
            .ok_or_else(|| DeckgateError::JobNotFound(job_id.to_string()))
    }

    /// Drop terminal jobs last updated more than `retention` ago and return
    /// their ids. Jobs that are still running are never touched.
    pub fn purge_terminal(&self, retention: Duration) -> Vec<String> {
        let cutoff = Utc::now() - retention;
        let mut removed = Vec::new();
        self.jobs.retain(|id, record| {
            let expired = record.state.is_terminal() && record.updated_at <= cutoff;
            if expired {
                removed.push(id.clone());
            }
            !expired
        });
        if !removed.is_empty() {
            debug!(removed = removed.len(), "purged finished jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
