use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{EngineProgress, ProgressReporter, TranslationEngine};
use crate::error::{FailureKind, Result};
use crate::progress::{ProgressBroadcaster, Subscription};
use crate::state_machine::{JobPayload, JobSnapshot, JobStore, Transition};

/// Progress updates buffered between the engine and the orchestrator.
const ENGINE_PROGRESS_BUFFER: usize = 32;

/// Default upper bound on a single engine call.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(600);

/// Drives translation jobs from submission to a terminal state.
///
/// `submit` returns as soon as the job exists; the engine call runs on its own
/// task and every accepted transition is published to the broadcaster.
pub struct JobOrchestrator<E> {
    store: Arc<JobStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    engine: Arc<E>,
    running: Arc<DashMap<String, CancellationToken>>,
    timeout: Duration,
}

impl<E> Clone for JobOrchestrator<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            broadcaster: Arc::clone(&self.broadcaster),
            engine: Arc::clone(&self.engine),
            running: Arc::clone(&self.running),
            timeout: self.timeout,
        }
    }
}

impl<E: TranslationEngine> JobOrchestrator<E> {
    pub fn new(store: Arc<JobStore>, broadcaster: Arc<ProgressBroadcaster>, engine: Arc<E>) -> Self {
        Self {
            store,
            broadcaster,
            engine,
            running: Arc::new(DashMap::new()),
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    /// Give up on the engine after `timeout` and fail the job as unavailable.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    /// Create a job, publish it as `Pending` and start the engine call.
    /// Must be called within a tokio runtime.
    pub fn submit(&self, client_id: &str, payload: JobPayload) -> String {
        let snapshot = self.store.create(client_id, payload.clone());
        let job_id = snapshot.job_id.clone();
        self.broadcaster.publish(&job_id, snapshot);

        let cancel = CancellationToken::new();
        self.running.insert(job_id.clone(), cancel.clone());
        info!(job_id = %job_id, client_id, file_id = %payload.file_id, "translation job submitted");

        let this = self.clone();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            this.drive(&task_job_id, payload, cancel).await;
            this.running.remove(&task_job_id);
        });

        job_id
    }

    /// Current snapshot of a job.
    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        self.store.get(job_id)
    }

    /// Subscribe to a job's live progress.
    pub fn watch(&self, job_id: &str) -> Result<Subscription> {
        let current = self.store.get(job_id)?;
        Ok(self.broadcaster.subscribe_from(job_id, Some(current)))
    }

    /// Whether the engine call for `job_id` is still in flight.
    pub fn is_running(&self, job_id: &str) -> bool {
        self.running.contains_key(job_id)
    }

    /// Fail the job as canceled and stop driving its engine call.
    /// Canceling a finished job changes nothing.
    pub fn cancel(&self, job_id: &str) -> Result<JobSnapshot> {
        let canceled = Transition::failed(FailureKind::Canceled, "Job canceled");
        let Some(snapshot) = self.store.transition_if_active(job_id, canceled)? else {
            return self.store.get(job_id);
        };

        self.broadcaster.publish(job_id, snapshot.clone());
        if let Some((_, token)) = self.running.remove(job_id) {
            token.cancel();
        }
        info!(job_id, "translation job canceled");
        Ok(snapshot)
    }

    /// Apply a transition and publish it if accepted. A job that finished in
    /// the meantime (canceled, timed out) keeps its terminal state.
    fn advance(&self, job_id: &str, transition: Transition) {
        match self.store.transition_if_active(job_id, transition) {
            Ok(Some(snapshot)) => {
                self.broadcaster.publish(job_id, snapshot);
            }
            Ok(None) => {}
            Err(err) => debug!(job_id, error = %err, "job transition not applied"),
        }
    }

    fn apply_progress(&self, job_id: &str, update: EngineProgress) {
        self.advance(job_id, Transition::processing(update.percent, update.message));
    }

    async fn drive(&self, job_id: &str, payload: JobPayload, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::channel(ENGINE_PROGRESS_BUFFER);
        let call = tokio::time::timeout(
            self.timeout,
            self.engine.submit(payload, ProgressReporter::new(tx)),
        );
        tokio::pin!(call);

        let mut progress_open = true;
        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                update = rx.recv(), if progress_open => match update {
                    Some(update) => self.apply_progress(job_id, update),
                    None => progress_open = false,
                },
                result = &mut call => break Some(result),
            }
        };

        let Some(outcome) = outcome else {
            debug!(job_id, "engine call abandoned after cancel");
            return;
        };

        while let Ok(update) = rx.try_recv() {
            self.apply_progress(job_id, update);
        }

        let transition = match outcome {
            Ok(Ok(output)) => {
                info!(job_id, result_url = %output.result_url, "translation completed");
                Transition::completed(output.result_url.clone()).with_message(output.summary())
            }
            Ok(Err(err)) => {
                warn!(job_id, error = %err, "translation failed");
                Transition::failed(err.failure_kind(), err.to_string())
            }
            Err(_) => {
                warn!(job_id, timeout = ?self.timeout, "translation engine timed out");
                Transition::failed(
                    FailureKind::UpstreamUnavailable,
                    format!("translation engine did not answer within {:?}", self.timeout),
                )
            }
        };

        self.advance(job_id, transition);
    }
}
