//! Retry policy with exponential backoff, and time-boxed execution.
//!
//! [`execute`] drives a whole retry loop for a side-effect-free call.
//! [`RetryState`] lets a call site run its own loop and only ask the policy
//! whether to retry and how long to wait.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use trendwire_core::config::RetryConfig;

use crate::error::{CollaboratorError, TimeoutError};

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retriable,
    Fatal,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(retry as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn state(&self) -> RetryState {
        RetryState {
            policy: self.clone(),
            retries: 0,
        }
    }
}

/// Per-call retry bookkeeping for caller-driven loops.
///
/// Iterating yields the delay before each permitted retry, then `None`.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    retries: u32,
}

impl RetryState {
    /// Retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attempt number of the next call (1-based).
    pub fn next_attempt(&self) -> u32 {
        self.retries + 1
    }

    /// After a failure: the delay to wait before retrying, or `None` when the
    /// error is fatal or retries are exhausted.
    pub fn on_failure(&mut self, decision: RetryDecision) -> Option<Duration> {
        match decision {
            RetryDecision::Fatal => None,
            RetryDecision::Retriable => self.next(),
        }
    }
}

impl Iterator for RetryState {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(self.retries);
        self.retries += 1;
        Some(delay)
    }
}

/// Run `operation` until it succeeds, `classify` calls its error fatal, or
/// the policy's retries are exhausted. The last error is returned unchanged.
pub async fn execute<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut operation: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
    E: Display,
{
    let mut state = policy.state();
    loop {
        let attempt = state.next_attempt();
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let decision = classify(&e);
                match state.on_failure(decision) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retriable failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None if decision == RetryDecision::Fatal => {
                        warn!(attempt, error = %e, "Non-retriable failure");
                        return Err(e);
                    }
                    None => {
                        error!(attempt, error = %e, "Retries exhausted");
                        return Err(e);
                    }
                }
            }
        }
    }
}

const RETRIABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Default classification of collaborator errors.
///
/// Network, timeout and connection failures and HTTP 429/500/502/503/504 are
/// retriable. Everything else, worker panics and unrecognized errors
/// included, is fatal.
pub fn default_classify(error: &CollaboratorError) -> RetryDecision {
    match error {
        CollaboratorError::Network(_)
        | CollaboratorError::Timeout(_)
        | CollaboratorError::Connection(_) => RetryDecision::Retriable,
        CollaboratorError::Http { status, .. } if RETRIABLE_STATUS.contains(status) => {
            RetryDecision::Retriable
        }
        CollaboratorError::Http { .. }
        | CollaboratorError::InvalidInput(_)
        | CollaboratorError::WorkerFailed(_) => RetryDecision::Fatal,
        CollaboratorError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> RetryDecision {
    let lowered = message.to_lowercase();
    let transient_words = ["timeout", "timed out", "connection", "network", "temporarily"];
    if transient_words.iter().any(|w| lowered.contains(w)) {
        return RetryDecision::Retriable;
    }
    let has_retriable_status = lowered
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<u16>().ok())
        .any(|code| RETRIABLE_STATUS.contains(&code));
    if has_retriable_status {
        RetryDecision::Retriable
    } else {
        RetryDecision::Fatal
    }
}

/// Run `future` on a spawned task, giving up after `limit`.
///
/// On timeout the task is detached and keeps running; its result is dropped.
pub async fn run_with_timeout<F, T>(limit: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(future);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(TimeoutError::WorkerFailed(join_error.to_string())),
        Err(_) => Err(TimeoutError::Elapsed(limit)),
    }
}

/// Run a blocking closure on the blocking pool, giving up after `limit`.
///
/// On timeout the worker thread is abandoned, not interrupted.
pub async fn run_blocking_with_timeout<F, T>(limit: Duration, f: F) -> Result<T, TimeoutError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(TimeoutError::WorkerFailed(join_error.to_string())),
        Err(_) => Err(TimeoutError::Elapsed(limit)),
    }
}
