//! Retry policy for judge and embedding calls.
//!
//! Rate limits, dropped connections and transport timeouts are retried.
//! Everything else goes straight back to the scorer.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::JudgeError;

impl JudgeError {
    /// Whether a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JudgeError::RateLimited { .. }
                | JudgeError::Connection { .. }
                | JudgeError::Timeout { .. }
        )
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based) after `err`, or `None`
    /// when `err` should be returned to the caller.
    pub fn next_delay(&self, attempt: u32, err: &JudgeError) -> Option<Duration> {
        if attempt >= self.max_retries || !err.is_transient() {
            return None;
        }
        let server_floor_ms = match err {
            JudgeError::RateLimited { retry_after_secs } => retry_after_secs.saturating_mul(1000),
            _ => 0,
        };
        Some(Duration::from_millis(
            self.backoff_ms(attempt).max(server_floor_ms),
        ))
    }

    fn backoff_ms(&self, attempt: u32) -> u64 {
        let grown = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let ms = grown.min(self.max_backoff_ms as f64) as u64;
        if self.jitter { ms + random_up_to(ms / 4) } else { ms }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    (Uuid::new_v4().as_u128() % (u128::from(max) + 1)) as u64
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, JudgeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, JudgeError>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(delay) = config.next_delay(attempt, &err) else {
            return Err(err);
        };
        attempt += 1;
        warn!(
            attempt,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Provider call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn connection_reset() -> JudgeError {
        JudgeError::Connection {
            message: "reset".into(),
        }
    }

    #[test]
    fn test_only_transient_errors_get_a_delay() {
        let config = quick(3);
        assert!(config.next_delay(0, &connection_reset()).is_some());
        assert!(
            config
                .next_delay(0, &JudgeError::Timeout { timeout_ms: 5000 })
                .is_some()
        );
        let auth = JudgeError::AuthFailed {
            provider: "openai".into(),
        };
        assert!(!auth.is_transient());
        assert_eq!(config.next_delay(0, &auth), None);
        let parse = JudgeError::ResponseParse {
            message: "bad".into(),
        };
        assert_eq!(config.next_delay(0, &parse), None);
    }

    #[test]
    fn test_no_delay_once_retries_are_spent() {
        let config = quick(2);
        assert!(config.next_delay(1, &connection_reset()).is_some());
        assert_eq!(config.next_delay(2, &connection_reset()), None);
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let delays: Vec<u64> = (0..4)
            .map(|n| config.next_delay(n, &connection_reset()).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500]);
    }

    #[test]
    fn test_jitter_adds_at_most_a_quarter() {
        let config = RetryConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            jitter: true,
            ..quick(1)
        };
        for _ in 0..50 {
            let ms = config.next_delay(0, &connection_reset()).unwrap().as_millis();
            assert!((1000..=1250).contains(&ms), "{ms}");
        }
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let config = quick(3);
        let limited = JudgeError::RateLimited {
            retry_after_secs: 2,
        };
        assert_eq!(
            config.next_delay(0, &limited),
            Some(Duration::from_millis(2000))
        );
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(&quick(3), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(connection_reset())
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_returned_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&quick(3), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JudgeError::AuthFailed {
                    provider: "openai".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(JudgeError::AuthFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_error_returned_when_retries_run_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&quick(2), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JudgeError::Timeout { timeout_ms: 1000 })
            }
        })
        .await;
        assert!(matches!(result, Err(JudgeError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
