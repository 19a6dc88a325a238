//! Bounded retry for remote retrieval steps (token, catalog, track chunks).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::FatalError;

/// Consecutive failures tolerated before the session gives up.
pub const MAX_ATTEMPTS: u32 = 3;
/// Pause between two attempts.
pub const DELAY_AFTER_FAIL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            delay: DELAY_AFTER_FAIL,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or `max_attempts` consecutive attempts
    /// failed. `op` receives the 1-based attempt number. Every call starts a
    /// fresh count, so a success always resets it.
    pub async fn run<T, E, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, FatalError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op(attempts).await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("Retrieved {} on attempt {}", what, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if attempts >= self.max_attempts => {
                    error!("{} failed attempts when retrieving {}. Exiting.", attempts, what);
                    return Err(FatalError::RetriesExhausted {
                        what,
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Got error during retrieving {}: {}. Trying again after {} seconds.",
                        what,
                        e,
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
