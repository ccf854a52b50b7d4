//! Node-level error detection and caller-driven read retries.
//!
//! The assurance helpers never retry on their own. A caller that hits a lagging
//! node ("header not found") may opt in with [`retry_reads`]:
//!
//! ```ignore
//! let balance = retry_reads(RetryConfig::for_reads(), "balance_of", || async {
//!     token.balance_of(owner).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ProviderRpcError, SERVER_ERROR, TxError};

const HEADER_NOT_FOUND: &str = "header not found";

/// Default number of attempts for read retries.
pub const DEFAULT_READ_ATTEMPTS: u32 = 3;
/// Default delay between read retries, in milliseconds.
pub const DEFAULT_READ_RETRY_DELAY_MS: u64 = 500;

fn is_header_message(code: Option<i64>, message: Option<&str>) -> bool {
    code == Some(SERVER_ERROR)
        && message.is_some_and(|m| m.to_ascii_lowercase().contains(HEADER_NOT_FOUND))
}

/// Code -32000 with "header not found", at the top level or nested under `data`.
pub fn is_header_not_found(err: &ProviderRpcError) -> bool {
    is_header_message(Some(err.code), Some(&err.message))
        || err
            .data
            .as_ref()
            .is_some_and(|d| is_header_message(d.code, d.message.as_deref()))
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one. Must be at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
    /// 1.0 = fixed delay, 2.0 = double each time.
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_reads()
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn for_reads() -> Self {
        Self::fixed(
            Duration::from_millis(DEFAULT_READ_RETRY_DELAY_MS),
            DEFAULT_READ_ATTEMPTS,
        )
    }

    pub fn exponential(
        initial_delay: Duration,
        max_attempts: u32,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            delay: initial_delay,
            backoff_multiplier: multiplier,
            max_delay,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return self.delay;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exponent);
        // Infinite or out-of-range products fall back to the cap.
        let delay = Duration::try_from_secs_f64(self.delay.as_secs_f64() * multiplier)
            .unwrap_or(self.max_delay);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Retry `operation` while `is_retryable` accepts the error and attempts remain.
pub async fn retry_with_classifier<F, Fut, T, C>(
    config: RetryConfig,
    operation_name: &str,
    operation: F,
    is_retryable: C,
) -> Result<T, TxError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TxError>>,
    C: Fn(&TxError) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "Max retry attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Read failed on lagging node, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry a read only when the node reports "header not found".
pub async fn retry_reads<F, Fut, T>(
    config: RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, TxError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TxError>>,
{
    retry_with_classifier(config, operation_name, operation, TxError::is_header_not_found).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn header_not_found() -> TxError {
        ProviderRpcError::new(SERVER_ERROR, "header not found").into()
    }

    #[test]
    fn test_detects_top_level_header_not_found() {
        assert!(is_header_not_found(&ProviderRpcError::new(
            SERVER_ERROR,
            "header not found"
        )));
        assert!(!is_header_not_found(&ProviderRpcError::new(
            SERVER_ERROR,
            "nonce too low"
        )));
        assert!(!is_header_not_found(&ProviderRpcError::new(
            -32603,
            "header not found"
        )));
    }

    #[test]
    fn test_detects_nested_header_not_found() {
        let err = ProviderRpcError::new(-32603, "Internal JSON-RPC error.")
            .with_data(Some(SERVER_ERROR), Some("Header not found".into()));
        assert!(is_header_not_found(&err));
        assert!(TxError::Provider(err).is_header_not_found());
        assert!(!TxError::Generic("header not found".into()).is_header_not_found());
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let config = RetryConfig::exponential(
            Duration::from_secs(1),
            10,
            2.0,
            Duration::from_secs(60),
        );
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retry_reads_recovers_from_lagging_node() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Duration::ZERO, 3);

        let result = retry_reads(config, "balance_of", || {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(header_not_found())
                } else {
                    Ok(7u64)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_reads_does_not_retry_other_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Duration::ZERO, 5);

        let err = retry_reads(config, "allowance", || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>(TxError::Rpc("connection refused".into()))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TxError::Rpc(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_reads_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Duration::ZERO, 3);

        let err = retry_reads(config, "balance_of", || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>(header_not_found())
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_header_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
