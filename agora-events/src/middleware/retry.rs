//! Retry stage with exponential backoff
//!
//! Only *total* failures are retried: the rest of the chain ran, no handler
//! succeeded and at least one failed. With error containment off this means
//! a propagated handler error from a dispatch where no handler succeeded. A
//! partial failure, contained or propagated, is returned as-is, since
//! replaying it would repeat the side effects of the handlers that already
//! succeeded.
//!
//! A retry replays the whole dispatch, so every handler for the event type
//! runs again. Handlers that are not naturally idempotent (sending email,
//! push notifications) must deduplicate on the event ID themselves.

use super::{Middleware, Next, RETRY_PRIORITY};
use crate::bus::PublicationResult;
use crate::config::env_parse;
use crate::error::{EventError, Result};
use crate::event::DomainEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Create new retry configuration
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Override with `AGORA_EVENTS_MAX_RETRIES`, `AGORA_EVENTS_RETRY_BASE_DELAY_MS`
    /// and `AGORA_EVENTS_RETRY_MAX_DELAY_MS` when set
    pub fn merge_env(mut self) -> Self {
        if let Some(retries) = env_parse("AGORA_EVENTS_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(ms) = env_parse::<u64>("AGORA_EVENTS_RETRY_BASE_DELAY_MS") {
            self.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("AGORA_EVENTS_RETRY_MAX_DELAY_MS") {
            self.max_delay = Duration::from_millis(ms);
        }
        self
    }

    /// Delay before retry number `retry` (0-indexed): `base * 2^retry`, capped
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Replays the remainder of the chain on total failure
#[derive(Debug, Clone, Default)]
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

enum Attempt {
    Done(Result<PublicationResult>),
    TotalFailure(Vec<String>),
}

fn classify(outcome: Result<PublicationResult>) -> Attempt {
    match outcome {
        Ok(result) if result.is_total_failure() => {
            Attempt::TotalFailure(result.errors.iter().map(ToString::to_string).collect())
        }
        Err(e) if e.is_total_handler_failure() => Attempt::TotalFailure(vec![e.to_string()]),
        other => Attempt::Done(other),
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn priority(&self) -> i32 {
        RETRY_PRIORITY
    }

    async fn process(&self, event: Arc<DomainEvent>, next: Next<'_>) -> Result<PublicationResult> {
        let mut attempt = 0;
        loop {
            let errors = match classify(next.run(event.clone()).await) {
                Attempt::Done(outcome) => return outcome,
                Attempt::TotalFailure(errors) => errors,
            };

            if attempt >= self.config.max_retries {
                warn!(
                    event_type = %event.event_type(),
                    event_id = %event.event_id(),
                    attempts = attempt + 1,
                    "Retry budget exhausted"
                );
                return Err(EventError::RetryExhausted {
                    attempts: attempt + 1,
                    errors,
                });
            }

            let delay = self.config.delay_for_retry(attempt);
            debug!(
                event_type = %event.event_type(),
                event_id = %event.event_id(),
                retry = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Total failure, retrying dispatch"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
