//! # Retry & Lock Window
//!
//! Exponential backoff with jitter for adapter calls, plus a per-library
//! lock window that pauses every caller after a rate-limit response.

use crate::error::{Result, SyncError};
use bridge_traits::error::BridgeError;
use core_runtime::config::RetrySettings;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Backoff policy for one library's adapter calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), without jitter.
    ///
    /// `min(base * 2^(retry-1), max)`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff delay plus up to one base delay of random jitter, capped.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..base_ms))
        };
        (self.backoff_delay(retry) + jitter).min(self.max_delay)
    }
}

/// Library-wide pause shared by every concurrent caller.
///
/// Once any call hits a rate limit the window is engaged, and every attempt
/// against the same library waits for it to pass before going out.
#[derive(Debug)]
pub struct LockWindow {
    duration: Duration,
    locked_until: Mutex<Option<Instant>>,
}

impl LockWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            locked_until: Mutex::new(None),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start (or extend) the window from now.
    pub async fn engage(&self) {
        let until = Instant::now() + self.duration;
        let mut guard = self.locked_until.lock().await;
        if guard.map_or(true, |current| current < until) {
            *guard = Some(until);
        }
    }

    pub async fn is_engaged(&self) -> bool {
        let guard = self.locked_until.lock().await;
        guard.map_or(false, |until| until > Instant::now())
    }

    /// Sleep until the window, if any, has passed.
    pub async fn wait(&self) {
        loop {
            let until = {
                let guard = self.locked_until.lock().await;
                match *guard {
                    Some(until) if until > Instant::now() => until,
                    _ => return,
                }
            };
            debug!(
                remaining_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Waiting out lock window"
            );
            sleep_until(until).await;
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt ceiling is reached.
///
/// Every attempt first waits out `lock`. A rate-limited failure engages
/// `lock` before backing off.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    lock: &LockWindow,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BridgeError>>,
{
    let mut attempt = 0;

    loop {
        lock.wait().await;
        attempt += 1;

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(SyncError::Adapter(e)),
            Err(e) => e,
        };

        if attempt >= policy.max_attempts {
            warn!(label, attempts = attempt, error = %error, "Retries exhausted");
            return Err(SyncError::RetriesExhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        if error.is_rate_limited() {
            warn!(label, window_ms = lock.duration().as_millis() as u64, "Rate limited, engaging lock window");
            lock.engage().await;
        }

        let delay = policy.jittered_delay(attempt);
        debug!(
            label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after delay"
        );
        tokio::time::sleep(delay).await;
    }
}
