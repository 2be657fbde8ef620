/// Bounded retry and polling helpers
///
/// Used wherever the hosted backend is eventually consistent: profile rows
/// created by a signup trigger, sessions established by an OAuth redirect.
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Errors that can tell whether another attempt might succeed
pub trait RetryableError {
    /// The row or resource does not exist (yet)
    fn is_not_found(&self) -> bool;

    /// Network, timeout or 5xx class failure
    fn is_transient(&self) -> bool;

    fn is_retryable(&self) -> bool {
        self.is_not_found() || self.is_transient()
    }
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { max_delay: Duration },
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(5, Duration::from_millis(200))
    }
}

impl RetryConfig {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Double the delay after each attempt, capped at `max_delay`
    pub fn with_exponential_backoff(mut self, max_delay: Duration) -> Self {
        self.backoff = Backoff::Exponential { max_delay };
        self
    }

    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let multiplier = 2u32.saturating_pow(attempt);
                self.delay.saturating_mul(multiplier).min(max_delay)
            }
        }
    }
}

/// Run `operation` until it succeeds, returns an error `should_retry` rejects,
/// or `max_attempts` is exhausted. No sleep follows the final attempt.
pub async fn with_retry<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, max_attempts, ?delay, "Retrying after failed attempt");
                sleep(delay).await;
            }
        }
    }
}

/// Retry using the error's own classification
pub async fn retry_retryable<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    with_retry(config, |e: &E| e.is_retryable(), operation).await
}

/// Poll `probe` every `interval` until it yields `Some` or `window` elapses.
/// The probe always runs at least once.
pub async fn poll_until<F, Fut, T>(window: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + window;

    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}
