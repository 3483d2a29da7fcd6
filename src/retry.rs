//! Attempt budget, failure classification and backoff for outbound calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{HttpConfig, RetryModeSetting};

/// How failures are sorted into retry / give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Transport errors, timeouts, 5xx, 408 and 429 retry; other 4xx do not
    Classified,
    /// Every failure is retried until the budget runs out
    Uniform,
}

impl From<RetryModeSetting> for RetryMode {
    fn from(setting: RetryModeSetting) -> Self {
        match setting {
            RetryModeSetting::Classified => RetryMode::Classified,
            RetryModeSetting::Uniform => RetryMode::Uniform,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

impl FailureClass {
    pub fn for_status(status: u16) -> Self {
        match status {
            408 | 429 => FailureClass::Retryable,
            500..=599 => FailureClass::Retryable,
            _ => FailureClass::Permanent,
        }
    }
}

/// Implemented by per-attempt failures so the policy can classify them
pub trait Classify {
    fn failure_class(&self) -> FailureClass;
}

#[derive(Debug)]
pub enum RetryError<E> {
    Failed { error: E, attempts: u32 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    pub mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            mode: RetryMode::Classified,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            mode: config.retry_mode.into(),
        }
    }

    /// No delay between attempts. Mostly for tests.
    pub fn immediate(max_attempts: u32, mode: RetryMode) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_enabled: false,
            mode,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }

    /// `attempts` is the number of attempts already made
    pub fn should_retry(&self, class: FailureClass, attempts: u32) -> bool {
        if attempts >= self.max_attempts {
            return false;
        }
        match self.mode {
            RetryMode::Uniform => true,
            RetryMode::Classified => class == FailureClass::Retryable,
        }
    }

    /// Delay before the retry that follows attempt number `attempts`
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let base_millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base_millis.min(self.max_delay.as_millis() as f64);

        if self.jitter_enabled && capped > 0.0 {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            Duration::from_millis((capped * jitter_factor) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts the
    /// budget, or `cancel` fires.
    pub async fn run<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = operation(attempts) => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.should_retry(error.failure_class(), attempts) {
                return Err(RetryError::Failed { error, attempts });
            }

            let delay = self.next_delay(attempts);
            tracing::warn!(
                "Attempt {}/{} failed, retrying in {:?}: {}",
                attempts,
                self.max_attempts,
                delay,
                error
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
