//! Retry logic with exponential backoff and optional jitter.
//!
//! The executor retries only errors whose [`SourceError::retryable`] is true.
//! Attempts run strictly in sequence; the delay before attempt `n` (`n >= 2`)
//! is `min(unit * factor^n, max)`, attempt 1 starts immediately.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::data_source::SourceError;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between attempts.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
    },
    /// Uses an exponential delay between attempts.
    ///
    /// The delay before attempt `n` is `unit * factor^n`, capped at `max`.
    Exponential {
        /// Unit the exponential term is multiplied with.
        unit: Duration,
        /// The multiplicative factor for each subsequent attempt.
        factor: f64,
        /// The maximum duration to wait between attempts.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::capped(Duration::from_secs(30))
    }
}

impl Backoff {
    /// `min(2^n seconds, cap)` without jitter.
    pub const fn capped(cap: Duration) -> Self {
        Self::Exponential {
            unit: Duration::from_secs(1),
            factor: 2.0,
            max: cap,
            jitter: false,
        }
    }

    /// Delay to wait before the given 1-based attempt.
    pub fn delay_before_attempt(self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                unit,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = unit.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };

                let mut delay = Duration::from_secs_f64(capped_seconds.max(0.0));

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Configuration for the retry executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_attempts: u32, cap: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::capped(cap),
        }
    }

    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_before_attempt(attempt)
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub error: SourceError,
}

/// Every attempt of a call failed, or a non-retryable error stopped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustedFailure {
    pub label: String,
    pub attempts: Vec<AttemptRecord>,
    pub last_error: SourceError,
}

impl ExhaustedFailure {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

impl Display for ExhaustedFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.label,
            self.attempts.len(),
            self.last_error
        )
    }
}

impl std::error::Error for ExhaustedFailure {}

/// Runs a fallible async call with bounded retries and backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<T, F, Fut>(&self, label: &str, call: F) -> Result<T, ExhaustedFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.execute_with_attempts(label, self.config.max_attempts, call)
            .await
    }

    /// Like [`execute`](Self::execute) with an explicit attempt budget.
    /// A budget of zero still runs the call once.
    pub async fn execute_with_attempts<T, F, Fut>(
        &self,
        label: &str,
        max_attempts: u32,
        mut call: F,
    ) -> Result<T, ExhaustedFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            let delay = self.config.delay_before_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %error,
                        "attempt failed"
                    );
                    let retryable = error.retryable();
                    attempts.push(AttemptRecord { attempt, error });
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let last_error = attempts
            .last()
            .map(|record| record.error.clone())
            .unwrap_or_else(|| SourceError::internal("retry loop ran no attempts"));

        Err(ExhaustedFailure {
            label: label.to_owned(),
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn first_attempt_has_no_delay() {
        let backoff = Backoff::capped(Duration::from_secs(30));
        assert_eq!(backoff.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(backoff.delay_before_attempt(0), Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::capped(Duration::from_secs(10));

        assert_eq!(backoff.delay_before_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_before_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_before_attempt(4), Duration::from_secs(10));
        assert_eq!(backoff.delay_before_attempt(60), Duration::from_secs(10));
    }

    #[test]
    fn zero_cap_disables_waiting() {
        let backoff = Backoff::capped(Duration::ZERO);
        assert_eq!(backoff.delay_before_attempt(5), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_half_of_base() {
        let backoff = Backoff::Exponential {
            unit: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for attempt in 2..6 {
                let delay_ms = backoff.delay_before_attempt(attempt).as_millis() as f64;
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
                assert!(delay_ms >= expected * 0.49, "attempt={attempt}, delay_ms={delay_ms}");
                assert!(delay_ms <= expected * 1.51, "attempt={attempt}, delay_ms={delay_ms}");
            }
        }
    }

    #[test]
    fn fixed_backoff_skips_first_attempt() {
        let config = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::Fixed {
                delay: Duration::from_millis(500),
            },
        };
        assert_eq!(config.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_before_attempt(2), Duration::from_millis(500));
        assert_eq!(config.delay_before_attempt(3), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let executor = RetryExecutor::new(RetryConfig::exponential(3, Duration::from_secs(30)));
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let value = executor
            .execute("index sh000001", move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Err(SourceError::transient("connection reset"))
                } else {
                    Ok(42)
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 4s before attempt 2, 8s before attempt 3.
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::new(RetryConfig::exponential(5, Duration::from_secs(30)));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let failure = executor
            .execute("quote sh600519", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SourceError::malformed("unexpected token"))
            })
            .await
            .expect_err("malformed payload is final");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.attempt_count(), 1);
        assert_eq!(failure.last_error, SourceError::malformed("unexpected token"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_lists_every_attempt() {
        let executor = RetryExecutor::new(RetryConfig::exponential(3, Duration::from_secs(1)));

        let failure = executor
            .execute_with_attempts("breadth", 2, || async {
                Err::<(), _>(SourceError::rate_limited("429"))
            })
            .await
            .expect_err("all attempts fail");

        assert_eq!(failure.label, "breadth");
        assert_eq!(
            failure.attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            failure.to_string(),
            "breadth failed after 2 attempt(s): 429 (source.rate_limited)"
        );
    }
}
