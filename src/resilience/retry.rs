use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use tracing::{info, warn};

use crate::config::settings::RetryConfig;
use crate::utils::constants::DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS,
            max_delay_ms: DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS,
        }
    }
}

impl From<Option<&RetryConfig>> for RetrySettings {
    fn from(retry: Option<&RetryConfig>) -> Self {
        let base_delay_ms = retry
            .and_then(|r| r.base_delay_ms)
            .unwrap_or(DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS);
        Self {
            base_delay_ms,
            max_delay_ms: retry
                .and_then(|r| r.max_delay_ms)
                .unwrap_or(base_delay_ms)
                .max(base_delay_ms),
        }
    }
}

impl RetrySettings {
    /// Retries `operation` until it succeeds; the delay starts at `base_delay_ms` and
    /// doubles up to `max_delay_ms`. Returns `None` only when `cancel` fires.
    pub async fn run_until_success<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay_ms;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return None,
                outcome = operation() => outcome,
            };
            match outcome {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!("Attempt {attempt} failed: {e}, next attempt in {delay} ms");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("retry loop cancelled after {attempt} attempts");
                            return None;
                        }
                        _ = sleep(Duration::from_millis(delay)) => {}
                    }
                    delay = delay.saturating_mul(2).min(self.max_delay_ms);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_operation_succeeds() {
        let retry = RetrySettings { base_delay_ms: 1, max_delay_ms: 4 };
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let result = retry
            .run_until_success(&cancel, || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(anyhow!("unreachable"))
                    } else {
                        Ok("token")
                    }
                }
            })
            .await;

        assert_eq!(result, Some("token"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let retry = RetrySettings { base_delay_ms: 60_000, max_delay_ms: 60_000 };
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        let result: Option<()> = retry
            .run_until_success(&cancel, || async { Err(anyhow!("down")) })
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn max_delay_never_below_base() {
        let cfg = RetryConfig { base_delay_ms: Some(500), max_delay_ms: None };
        let retry = RetrySettings::from(Some(&cfg));
        assert_eq!(retry.base_delay_ms, 500);
        assert_eq!(retry.max_delay_ms, 500);
        assert_eq!(RetrySettings::from(None).base_delay_ms, DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS);
    }
}
