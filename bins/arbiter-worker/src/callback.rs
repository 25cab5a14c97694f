// Outbound orchestrator callback.
//
// Fire-and-forget by contract: delivery success or failure is logged, never
// retried, and never influences the evaluation result.
use arbiter_common::types::BatchResult;
use tracing::{info, warn};

use crate::config::Settings;

const CALLBACK_PATH: &str = "/api/evaluate/container-submit";

#[derive(Clone)]
pub struct OrchestratorClient {
    client: reqwest::Client,
    url: String,
    api_header_name: String,
    api_key: String,
}

impl OrchestratorClient {
    pub fn new(settings: &Settings) -> Self {
        OrchestratorClient {
            client: reqwest::Client::new(),
            url: format!(
                "{}{CALLBACK_PATH}",
                settings.orchestrator_address.trim_end_matches('/')
            ),
            api_header_name: settings.api_header_name.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    pub async fn deliver(&self, result: &BatchResult) {
        let send = self
            .client
            .post(&self.url)
            .header(self.api_header_name.as_str(), self.api_key.as_str())
            .json(result)
            .send()
            .await;

        match send {
            Ok(response) if response.status().is_success() => {
                info!(
                    submission_id = result.submission_id,
                    status = %response.status(),
                    "batch result delivered"
                );
            }
            Ok(response) => {
                warn!(
                    submission_id = result.submission_id,
                    status = %response.status(),
                    "orchestrator rejected batch result"
                );
            }
            Err(e) => {
                warn!(
                    submission_id = result.submission_id,
                    error = %e,
                    "failed to deliver batch result"
                );
            }
        }
    }
}
