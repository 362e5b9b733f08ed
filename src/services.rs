//! Wires the core components together from configuration.
//!
//! Every piece of shared state hangs off one explicitly constructed
//! [`Deckgate`] value, so each test (or each embedding web layer) gets its
//! own isolated instance.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admission::{AdmissionController, Decision, PolicyName};
use crate::config::DeckgateConfig;
use crate::engine::TranslationEngine;
use crate::error::Result;
use crate::orchestrator::JobOrchestrator;
use crate::progress::ProgressBroadcaster;
use crate::state_machine::{JobPayload, JobStore};

/// What one housekeeping pass reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub expired_rate_limit_keys: usize,
    pub purged_jobs: usize,
    pub forgotten_topics: usize,
}

/// The admission-control and job-progress core.
pub struct Deckgate<E> {
    admission: Arc<AdmissionController>,
    orchestrator: JobOrchestrator<E>,
    retention: Duration,
    default_target_language: String,
}

impl<E: TranslationEngine> Deckgate<E> {
    pub fn new(config: &DeckgateConfig, engine: E) -> Self {
        let admission = AdmissionController::new(config.rate_limit.policies())
            .disabled(config.rate_limit.disabled);
        let broadcaster =
            ProgressBroadcaster::new(config.jobs.subscriber_buffer, config.jobs.max_tracked_jobs);
        let orchestrator = JobOrchestrator::new(
            Arc::new(JobStore::new()),
            Arc::new(broadcaster),
            Arc::new(engine),
        )
        .with_timeout(config.engine.timeout());

        Self {
            admission: Arc::new(admission),
            orchestrator,
            retention: config.jobs.retention(),
            default_target_language: config.jobs.default_target_language.clone(),
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn orchestrator(&self) -> &JobOrchestrator<E> {
        &self.orchestrator
    }

    /// Check `client_key` against `policy`, failing with `RateLimited` on denial.
    pub fn admit(&self, policy: PolicyName, client_key: &str) -> Result<Decision> {
        self.admission.admit(policy, client_key, None).into_result()
    }

    /// Admit under the `translate` policy, then start a job for `file_id`.
    ///
    /// `target_language` falls back to the configured default.
    pub fn submit_translation(
        &self,
        client_key: &str,
        client_id: &str,
        file_id: &str,
        target_language: Option<&str>,
    ) -> Result<String> {
        self.admit(PolicyName::Translate, client_key)?;
        let language = target_language.unwrap_or(self.default_target_language.as_str());
        let payload = JobPayload::new(file_id).with_target_language(language);
        Ok(self.orchestrator.submit(client_id, payload))
    }

    /// Reclaim memory: idle rate-limit keys, finished jobs past retention and
    /// their progress topics. Running or watched jobs are left alone.
    pub fn housekeeping(&self) -> HousekeepingReport {
        let expired_rate_limit_keys = self.admission.purge_expired();
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let purged = self.orchestrator.store().purge_terminal(retention);
        let forgotten_topics = purged
            .iter()
            .filter(|id| self.orchestrator.broadcaster().forget(id))
            .count();

        let report = HousekeepingReport {
            expired_rate_limit_keys,
            purged_jobs: purged.len(),
            forgotten_topics,
        };
        debug!(?report, "housekeeping pass");
        report
    }

    /// Run [`housekeeping`](Self::housekeeping) every `interval` until
    /// `cancel` fires.
    pub fn spawn_housekeeping(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("housekeeping task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        this.housekeeping();
                    }
                }
            }
        })
    }
}
