//! Bounded retry of a single remote call.

use std::future::Future;

use tracing::{info, warn};

use crate::constants::MAX_FETCH_ATTEMPTS;
use crate::error::{Error, Result};

/// How many times a call is attempted, and which failures are worth another try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    should_retry: fn(&Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_FETCH_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Retry transient failures, making at most `max_attempts` attempts.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            should_retry: Error::is_retryable,
        }
    }

    #[must_use]
    pub fn with_predicate(mut self, should_retry: fn(&Error) -> bool) -> Self {
        self.should_retry = should_retry;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Attempts follow each other immediately.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once every
    /// attempt has failed.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !(self.should_retry)(&e) => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(call = what, attempts = attempt, error = %e, "Giving up after repeated failures");
                    return Err(e);
                }
                Err(e) => {
                    warn!(call = what, error = %e, "Remote call failed");
                    attempt += 1;
                    info!(call = what, attempt, max = self.max_attempts, "Retrying");
                }
            }
        }
    }
}
