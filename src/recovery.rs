// Bounded auto-recovery for network-classified failures

use crate::api::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Policy for transparently retrying operations that failed for
/// network-related reasons. Other failures surface immediately.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Maximum number of recovery retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry; grows with the attempt count
    pub base_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RecoveryPolicy {
    /// Policy with near-zero delays, for tests.
    pub fn instant() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }
}

/// Run `op`, transparently retrying network-related failures.
///
/// The delay before retry `n` is `base_delay * n`. Returns the last error
/// once the retry budget is exhausted or immediately for failures that are
/// not network-related.
pub async fn run_with_recovery<F, Fut, T>(
    policy: &RecoveryPolicy,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("Recovered after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_network_related() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.base_delay * attempt;
                warn!(
                    "Network problem (retry {}/{} in {:?}): {}",
                    attempt, policy.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recovers_from_transient_network_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = run_with_recovery(&RecoveryPolicy::instant(), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ApiError::Network("connection reset".to_string()))
                } else {
                    Ok("rendered")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "rendered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_network_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), ApiError> = run_with_recovery(&RecoveryPolicy::instant(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Unauthorized)
            }
        })
        .await;

        assert!(matches!(result.unwrap_err(), ApiError::Unauthorized));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), ApiError> = run_with_recovery(&RecoveryPolicy::instant(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout)
            }
        })
        .await;

        assert!(matches!(result.unwrap_err(), ApiError::Timeout));
        // Initial attempt plus max_retries retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
