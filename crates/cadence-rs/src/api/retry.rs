//! Automatic retry with exponential backoff for transient network errors.
//!
//! Retries transient HTTP/API errors (429, 500, 502, 503, 504, network
//! timeouts) with configurable exponential backoff. Permanent failures —
//! 4xx responses and empty streams — fail immediately. Backoff sleeps are
//! cancellable so an interrupt never waits out a retry countdown.

use crate::cancel::CancelToken;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses sensible defaults.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed off the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                3 => 0.85,
                _ => 0.80,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error string indicates a transient (retryable) failure.
pub fn is_transient_error(error: &str) -> bool {
    let transient_statuses = ["408", "429", "500", "502", "503", "504"];
    if transient_statuses
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }

    let lower = error.to_lowercase();
    [
        "request failed:",
        "failed to read streaming chunk",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an error is a permanent (non-retryable) failure.
pub fn is_permanent_error(error: &str) -> bool {
    [
        "HTTP 400",
        "HTTP 401",
        "HTTP 403",
        "HTTP 404",
        "HTTP 422",
        "empty stream",
        "invalid",
        "unauthorized",
    ]
    .iter()
    .any(|p| error.contains(p))
}

/// Retry an async API call with exponential backoff for transient errors.
///
/// Runs `call` up to `1 + max_retries` times. `on_retry(attempt, delay)` is
/// invoked before each backoff sleep so the caller can surface a countdown.
/// Permanent errors and cancellation end the loop immediately.
pub async fn retry_api_call<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancelToken,
    mut call: F,
    mut on_retry: impl FnMut(u32, Duration),
) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt < config.max_retries
                    && is_transient_error(&e)
                    && !is_permanent_error(&e)
                    && !cancel.is_cancelled()
                {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "Transient error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                        attempt + 1,
                        config.max_retries,
                    );
                    on_retry(attempt + 1, delay);
                    if !cancel.sleep(delay).await {
                        return Err(format!("cancelled during retry backoff: {e}"));
                    }
                    attempt += 1;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_config(retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries: retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn with_retries_sets_count() {
        let config = RetryConfig::with_retries(5);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let with = RetryConfig {
            jitter: true,
            ..RetryConfig::with_retries(3)
        };
        let without = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        assert!(with.delay_for_attempt(2) <= without.delay_for_attempt(2));
    }

    #[test]
    fn transient_errors_detected() {
        assert!(is_transient_error("agent endpoint HTTP 429"));
        assert!(is_transient_error("usage API HTTP 502"));
        assert!(is_transient_error("query request failed: connection reset"));
        assert!(is_transient_error("request failed: timed out"));
    }

    #[test]
    fn permanent_errors_detected() {
        assert!(is_permanent_error("agent endpoint HTTP 400"));
        assert!(is_permanent_error("agent endpoint HTTP 401"));
        assert!(is_permanent_error("empty stream"));
        assert!(!is_transient_error("agent endpoint HTTP 400"));
    }

    #[tokio::test]
    async fn succeeds_on_final_attempt() {
        let attempts = Cell::new(0u32);
        let result = retry_api_call(
            &fast_config(3),
            &CancelToken::new(),
            || {
                let n = attempts.get() + 1;
                attempts.set(n);
                async move {
                    if n < 4 {
                        Err("request failed: timed out".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |_, _| {},
        )
        .await;
        assert_eq!(result, Ok(4));
        assert_eq!(attempts.get(), 4);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let attempts = Cell::new(0u32);
        let result: Result<(), String> = retry_api_call(
            &fast_config(2),
            &CancelToken::new(),
            || {
                attempts.set(attempts.get() + 1);
                async { Err("request failed: timed out".to_string()) }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let attempts = Cell::new(0u32);
        let result: Result<(), String> = retry_api_call(
            &fast_config(3),
            &CancelToken::new(),
            || {
                attempts.set(attempts.get() + 1);
                async { Err("agent endpoint HTTP 400".to_string()) }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test]
    async fn reports_retry_countdowns() {
        let attempts = Cell::new(0u32);
        let mut countdowns = Vec::new();
        let _: Result<(), String> = retry_api_call(
            &fast_config(2),
            &CancelToken::new(),
            || {
                attempts.set(attempts.get() + 1);
                async { Err("request failed: timed out".to_string()) }
            },
            |attempt, delay| countdowns.push((attempt, delay)),
        )
        .await;
        assert_eq!(countdowns.len(), 2);
        assert_eq!(countdowns[0].0, 1);
        assert_eq!(countdowns[1].0, 2);
    }
}
