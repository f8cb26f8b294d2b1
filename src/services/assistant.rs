use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{LearningOsError, Result};
use crate::interfaces::providers::TextProvider;
use crate::ratelimit::RequestGate;
use crate::usage::UsageStore;

const ROLLING_WINDOW_SECS: i64 = 60;
const DEFAULT_EMPTY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The one call pattern behind every AI-backed feature: gate, generate,
/// retry once on an empty response, account for the request either way.
pub struct AssistantService {
    provider: Arc<dyn TextProvider>,
    gate: RequestGate,
    usage: Arc<UsageStore>,
    empty_retry_delay: Duration,
}

impl AssistantService {
    pub fn new(provider: Arc<dyn TextProvider>, gate: RequestGate, usage: Arc<UsageStore>) -> Self {
        Self {
            provider,
            gate,
            usage,
            empty_retry_delay: DEFAULT_EMPTY_RETRY_DELAY,
        }
    }

    pub fn with_empty_retry_delay(mut self, delay: Duration) -> Self {
        self.empty_retry_delay = delay;
        self
    }

    pub fn usage(&self) -> &UsageStore {
        &self.usage
    }

    pub async fn request(&self, prompt: &str, endpoint_type: &str) -> Result<String> {
        let recent = self
            .usage
            .count_since(crate::usage::now_ts() - ROLLING_WINDOW_SECS)
            .await?;
        self.gate.acquire(recent).await?;

        debug!(endpoint_type, prompt_len = prompt.len(), "dispatching generation request");
        match self.provider.generate(prompt).await {
            Ok(text) => {
                self.record(endpoint_type, true, text.len()).await;
                Ok(text)
            }
            Err(LearningOsError::EmptyResponse(first)) => {
                // One blind retry; empty responses are often transient.
                self.record(endpoint_type, false, 0).await;
                warn!(endpoint_type, "empty response, retrying once: {first}");
                tokio::time::sleep(self.empty_retry_delay).await;
                match self.provider.generate(prompt).await {
                    Ok(text) => {
                        self.record(endpoint_type, true, text.len()).await;
                        Ok(text)
                    }
                    Err(err) => {
                        self.record(endpoint_type, false, 0).await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.record(endpoint_type, false, 0).await;
                Err(err)
            }
        }
    }

    pub async fn validate_key(&self) -> Result<()> {
        self.provider.validate_key().await
    }

    /// Accounting must never mask the request outcome.
    async fn record(&self, endpoint_type: &str, success: bool, tokens: usize) {
        if let Err(err) = self.usage.record(endpoint_type, success, tokens).await {
            warn!(endpoint_type, "failed to record api usage: {err}");
        }
    }
}
