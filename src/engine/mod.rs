//! The external translation engine, seen as an opaque collaborator.

pub mod client;
pub mod error;
pub mod simulated;
pub mod types;

use std::future::Future;

use tokio::sync::mpsc;

use crate::state_machine::JobPayload;

pub use client::HttpTranslationEngine;
pub use error::EngineError;
pub use simulated::SimulatedEngine;
pub use types::{EngineProgress, TranslateRequest, TranslationOutput};

/// Something that can translate a slide deck.
///
/// Called once per job; the core never retries. Progress is reported through
/// the given [`ProgressReporter`] while the call runs.
pub trait TranslationEngine: Send + Sync + 'static {
    fn submit(
        &self,
        payload: JobPayload,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<TranslationOutput, EngineError>> + Send;
}

/// Lets an engine push progress back to the orchestrator without waiting.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: mpsc::Sender<EngineProgress>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<EngineProgress>) -> Self {
        Self { tx }
    }

    /// Report progress. Updates are dropped if the orchestrator is behind or
    /// no longer listening; the next one supersedes them anyway.
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        let _ = self.tx.try_send(EngineProgress {
            percent,
            message: message.into(),
        });
    }
}
