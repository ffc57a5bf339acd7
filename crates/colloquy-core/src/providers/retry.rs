//! Retry with exponential backoff around any provider

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::is_retryable;
use super::types::{ChatMessage, ChatResponse, DeltaCallback, LlmProvider};

/// Longest pause between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retries transient provider failures before giving up
pub struct RetryingProvider {
    inner: Box<dyn LlmProvider>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Box<dyn LlmProvider>) -> Self {
        Self {
            inner,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Total attempts including the first (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Decide what to do after a failed attempt; `Ok` means sleep then retry
    fn on_failure(&self, attempt: u32, err: anyhow::Error) -> Result<Duration> {
        let retryable = is_retryable(&err);
        warn!(
            "Provider {} ({}) failed (attempt {}/{}, retryable={}): {}",
            self.inner.provider_name(),
            self.inner.model(),
            attempt + 1,
            self.max_attempts,
            retryable,
            err
        );
        if !retryable || attempt + 1 >= self.max_attempts {
            return Err(err);
        }
        let delay = self.backoff(attempt);
        debug!("Backing off for {:?} before retry", delay);
        Ok(delay)
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse> {
        for attempt in 0..self.max_attempts {
            match self.inner.chat(messages, system).await {
                Ok(response) => return Ok(response),
                Err(e) => tokio::time::sleep(self.on_failure(attempt, e)?).await,
            }
        }
        Err(anyhow!("{} gave no response", self.inner.provider_name()))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        system: &str,
        on_delta: DeltaCallback<'_>,
    ) -> Result<ChatResponse> {
        // A stream that fails midway has already emitted text. Retrying would
        // print it twice, so only failures before the first delta are retried.
        for attempt in 0..self.max_attempts {
            let mut emitted = false;
            let result = {
                let mut forward = |text: &str| {
                    emitted = true;
                    on_delta(text);
                };
                self.inner.chat_stream(messages, system, &mut forward).await
            };
            match result {
                Ok(response) => return Ok(response),
                Err(e) if emitted => return Err(e),
                Err(e) => tokio::time::sleep(self.on_failure(attempt, e)?).await,
            }
        }
        Err(anyhow!("{} gave no response", self.inner.provider_name()))
    }
}
