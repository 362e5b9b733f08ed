use std::time::Duration;

use tokio::time::sleep;

use super::{EngineError, ProgressReporter, TranslationEngine, TranslationOutput};
use crate::state_machine::JobPayload;

/// How a simulated run should go wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// The engine stops answering.
    Unavailable,
    /// The engine refuses the deck.
    Rejected,
}

/// Stand-in engine that "translates" a fixed number of texts with a delay
/// between each one, reporting `Translating: i/n` as it goes.
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    slides: u32,
    texts: u32,
    step: Duration,
    failure: Option<(u32, SimulatedFailure)>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(8, 24, Duration::from_millis(150))
    }
}

impl SimulatedEngine {
    pub fn new(slides: u32, texts: u32, step: Duration) -> Self {
        Self {
            slides,
            texts: texts.max(1),
            step,
            failure: None,
        }
    }

    /// Fail right after translating `after` texts.
    pub fn failing(mut self, after: u32, failure: SimulatedFailure) -> Self {
        self.failure = Some((after, failure));
        self
    }
}

impl TranslationEngine for SimulatedEngine {
    async fn submit(
        &self,
        payload: JobPayload,
        progress: ProgressReporter,
    ) -> Result<TranslationOutput, EngineError> {
        for done in 1..=self.texts {
            sleep(self.step).await;

            if let Some((after, failure)) = self.failure
                && done > after
            {
                return Err(match failure {
                    SimulatedFailure::Unavailable => {
                        EngineError::Unavailable("simulated engine went away".into())
                    }
                    SimulatedFailure::Rejected => EngineError::Rejected {
                        status: 422,
                        message: format!("{} is not a readable deck", payload.file_id),
                    },
                });
            }

            let percent = (done * 95 / self.texts) as u8;
            progress.report(percent, format!("Translating: {done}/{}", self.texts));
        }

        Ok(TranslationOutput {
            result_url: format!(
                "/downloads/{}_{}.pptx",
                payload.file_id, payload.target_language
            ),
            slide_count: self.slides,
            text_count: self.texts,
            translated_count: self.texts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn reports_each_text_and_returns_locator() {
        let (tx, mut rx) = mpsc::channel(16);
        let engine = SimulatedEngine::new(2, 4, Duration::from_millis(10));
        let out = engine
            .submit(
                JobPayload::new("deck").with_target_language("fr"),
                ProgressReporter::new(tx),
            )
            .await
            .unwrap();

        assert_eq!(out.result_url, "/downloads/deck_fr.pptx");
        assert_eq!(out.translated_count, 4);

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.percent);
        }
        assert_eq!(seen, vec![23, 47, 71, 95]);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_after_configured_step() {
        let (tx, mut rx) = mpsc::channel(16);
        let engine = SimulatedEngine::new(1, 5, Duration::from_millis(10))
            .failing(2, SimulatedFailure::Rejected);
        let err = engine
            .submit(JobPayload::new("bad"), ProgressReporter::new(tx))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected { status: 422, .. }));

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
