//! Retry logic for transient provider errors.
//!
//! Provides exponential backoff for transcription requests that fail with
//! retryable errors (server 5xx, 429, network, known-transient 4xx).

use std::time::Duration;

use crate::protocol_constants::{RETRY_BACKOFF_BASE_MS, RETRY_BACKOFF_CAP_MS};
use crate::providers::ProviderResult;

/// Executes a provider request with retry logic for transient errors.
///
/// Retries up to `max_retries` times with exponential backoff starting at
/// 1 s and capped at 10 s. Terminal errors return immediately.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `max_retries` - Retries after the first attempt
/// * `operation` - Closure that performs the provider request
pub(crate) async fn with_retry<T, F, Fut>(
    action: &str,
    max_retries: u32,
    mut operation: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ProviderResult<T>>,
{
    let mut delay = Duration::from_millis(RETRY_BACKOFF_BASE_MS);
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            log::info!(
                "[Transcribe] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                max_retries + 1,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_millis(RETRY_BACKOFF_CAP_MS));
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Transcribe] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.expect("retry loop should have set last_error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ProviderError {
        ProviderError::Status {
            status: 500,
            message: "boom".into(),
        }
    }

    fn terminal() -> ProviderError {
        ProviderError::Status {
            status: 401,
            message: "unauthorized".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retry("test", 3, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_short_circuits() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<u32> = with_retry("test", 3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(terminal()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_on_persistent_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<u32> = with_retry("test", 3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_from_one_second() {
        // With paused time, measure the virtual time consumed by two retries:
        // 1s after the first failure, 2s after the second.
        let attempts = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let _ = with_retry("test", 2, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
