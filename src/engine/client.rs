use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use super::error::EngineError;
use super::types::{TranslateRequest, TranslationOutput};
use super::{ProgressReporter, TranslationEngine};
use crate::state_machine::JobPayload;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// Reported as soon as the request goes out, so the job leaves `Pending`.
const SUBMITTED_PERCENT: u8 = 5;

/// Translation engine reached over HTTP: `POST {base_url}/translate`.
pub struct HttpTranslationEngine {
    client: Client,
    endpoint: String,
}

impl HttpTranslationEngine {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Self::with_timeouts(base_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: &str,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TranslationEngine for HttpTranslationEngine {
    async fn submit(
        &self,
        payload: JobPayload,
        progress: ProgressReporter,
    ) -> Result<TranslationOutput, EngineError> {
        let req = TranslateRequest {
            file_id: payload.file_id,
            target_language: payload.target_language,
        };
        debug!(endpoint = %self.endpoint, file_id = %req.file_id, "submitting to translation engine");
        progress.report(SUBMITTED_PERCENT, "Submitted to translation engine");

        let response = self.client.post(&self.endpoint).json(&req).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::Unavailable(format!(
                "status {}: {message}",
                status.as_u16()
            )));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        progress.report(90, "Downloading translated deck");
        let output = response.json::<TranslationOutput>().await?;
        Ok(output)
    }
}
