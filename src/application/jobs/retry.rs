//! Bounded exponential backoff for transient pipeline failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Spread of the random factor applied to each sleep (±30%).
const JITTER_SPREAD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each sleep so concurrent workers do not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first failure is returned.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let next = current.as_millis() as f64 * self.backoff_multiplier;
        Duration::from_millis(next.min(self.max_backoff.as_millis() as f64) as u64)
    }

    fn sleep_for(&self, backoff: Duration) -> Duration {
        if !self.jitter {
            return backoff;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_SPREAD..JITTER_SPREAD);
        Duration::from_millis((backoff.as_millis() as f64 * factor) as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retry budget
/// is spent. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &'static str,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt >= config.max_retries {
                    return Err(err);
                }
                attempt += 1;

                let delay = config.sleep_for(backoff);
                metrics::counter!("vitrine_image_job_retries_total").increment(1);
                warn!(
                    target = "application::jobs::retry",
                    operation = operation_name,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; retrying"
                );

                tokio::time::sleep(delay).await;
                backoff = config.next_backoff(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast(3), "test", |_: &String| true, move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("temporary".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> =
            with_retry(&fast(5), "test", |_: &String| false, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("gone".to_string()) }
            })
            .await;

        assert_eq!(result, Err("gone".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> =
            with_retry(&fast(2), "test", |_: &String| true, move || {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {count}")) }
            })
            .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_capped() {
        let config = fast(10);
        assert_eq!(
            config.next_backoff(Duration::from_millis(1)),
            Duration::from_millis(2)
        );
        assert_eq!(
            config.next_backoff(Duration::from_millis(4)),
            Duration::from_millis(4)
        );
    }

    #[test]
    fn jitter_stays_within_spread() {
        let config = RetryConfig::default();
        let base = Duration::from_millis(1000);
        let delays: Vec<Duration> = (0..200).map(|_| config.sleep_for(base)).collect();

        assert!(delays.iter().all(|delay| {
            *delay >= Duration::from_millis(699) && *delay <= Duration::from_millis(1300)
        }));
        assert!(delays.iter().any(|delay| *delay != delays[0]));
        assert_eq!(fast(1).sleep_for(base), base);
    }
}
