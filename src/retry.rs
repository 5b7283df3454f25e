// Exponential backoff retry for backend calls

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config with near-zero delays, for tests.
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Calls `f()` until it succeeds, `retryable` rejects the error, or
/// `config.max_attempts` attempts have been made. The delay between attempts
/// starts at `initial_delay` and is multiplied by `multiplier` after each
/// failure, capped at `max_delay`. A `max_attempts` of zero is treated as one.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Attempt {} succeeded", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if !retryable(&e) {
                    debug!("Not retrying after attempt {}: {}", attempt, e);
                    return Err(e);
                }
                if attempt >= max_attempts {
                    warn!("Giving up after {} attempts: {}", attempt, e);
                    return Err(e);
                }

                warn!(
                    "Attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;

                let next_ms = (delay.as_millis() as f64 * config.multiplier) as u64;
                delay = Duration::from_millis(next_ms).min(config.max_delay);
            }
        }
    }
}
