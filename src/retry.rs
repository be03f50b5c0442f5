//! Bounded exponential backoff around fallible asynchronous operations.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ErrorKind, SessionError};

/// Asynchronous sleep, injectable so that delays can be observed in tests.
pub trait Sleep: Clone + Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// [`Sleep`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Retry limits. A fresh attempt counter is used for every
/// [`Retrier::execute`] call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random factor `[1.0, 1.0 + jitter_fraction]`
    /// each delay is multiplied by.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_fraction <= 0.0 {
            return delay;
        }
        delay.mul_f64(rand::rng().random_range(1.0..=1.0 + self.jitter_fraction))
    }
}

/// Executes operations, retrying transient failures with exponential backoff.
///
/// Operations handed to [`Retrier::execute`] may be invoked more than once and
/// must be safe to repeat.
#[derive(Clone, Debug, Default)]
pub struct Retrier<S = TokioSleep> {
    sleep: S,
}

impl<S: Sleep> Retrier<S> {
    pub fn new(sleep: S) -> Self {
        Self { sleep }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleep
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error or the
    /// policy runs out of attempts.
    ///
    /// Rate limiting is surfaced immediately: moving away from a throttling
    /// endpoint is up to the caller. Exhausted retries are reported as
    /// [`SessionError::RetryExhausted`] wrapping the last error.
    ///
    /// Once `cancel` fires no further attempt is started and a pending
    /// backoff is cut short; [`SessionError::Cancelled`] is returned instead
    /// of the operation's error.
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, SessionError>> + Send,
        T: Send,
    {
        let attempts = policy.attempts();
        let mut prev_delay = Duration::ZERO;
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(_) if cancel.is_cancelled() => return Err(SessionError::Cancelled),
                Err(err) => err,
            };

            let kind = err.kind();
            if kind == ErrorKind::RateLimited || kind == ErrorKind::Rejected {
                warn!(%label, attempt, %err, "Endpoint refused to serve, giving up on it");
                return Err(err);
            }
            if !kind.is_retryable() {
                debug!(%label, attempt, ?kind, %err, "Non-retryable error");
                return Err(err);
            }
            if attempt >= attempts {
                warn!(%label, attempts, %err, "Max retries reached");
                return Err(SessionError::RetryExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = policy.jittered(policy.base_delay(attempt)).max(prev_delay);
            prev_delay = delay;
            warn!(%label, attempt, max_attempts = attempts, ?delay, %err, "Retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = self.sleep.sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::testing::RecordingSleep;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter_fraction: 0.2,
        }
    }

    #[test]
    fn test_base_delay_doubles_up_to_cap() {
        let policy = policy(10);
        let delays: Vec<_> = (1..=6).map(|a| policy.base_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(policy.base_delay(64), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_success_without_delay() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());

        let result = retrier.execute(&policy(3), "A", &CancellationToken::new(), || async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert!(sleep.delays().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retrier
            .execute(&policy(5), "A", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::RateLimited("429 Too Many Requests".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleep.delays().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retrier
            .execute(&policy(5), "A", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::Fatal("malformed client".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleep.delays().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        for k in 0..5u32 {
            let sleep = RecordingSleep::default();
            let retrier = Retrier::new(sleep.clone());
            let calls = &AtomicU32::new(0);

            let result = retrier
                .execute(&policy(5), "A", &CancellationToken::new(), move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < k {
                        Err(SessionError::Transient("connection reset".into()))
                    } else {
                        Ok("ok")
                    }
                })
                .await;

            assert_eq!(result.unwrap(), "ok");
            assert_eq!(calls.load(Ordering::SeqCst), k + 1);
            let delays = sleep.delays();
            assert_eq!(delays.len(), k as usize);
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
            assert!(delays.iter().all(|d| *d <= Duration::from_millis(1201)), "{delays:?}");
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retrier
            .execute(&policy(3), "A", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::Timeout(Duration::from_secs(1)))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, SessionError::RetryExhausted { attempts: 3, .. }));
        assert!(matches!(err.root_cause(), SessionError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleep.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retrier
            .execute(&policy(0), "A", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::Transient("boom".into()))
            })
            .await;

        assert!(matches!(result, Err(SessionError::RetryExhausted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleep.delays().is_empty());
    }

    #[tokio::test]
    async fn test_no_jitter_gives_exact_delays() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let policy = RetryPolicy {
            jitter_fraction: 0.0,
            ..policy(4)
        };

        let _ = retrier
            .execute(&policy, "A", &CancellationToken::new(), || async {
                Err::<(), _>(SessionError::NullState("client connection is null".into()))
            })
            .await;

        assert_eq!(
            sleep.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = Retrier::new(RecordingSleep::default())
            .execute(&policy(5), "A", &cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let sleep = RecordingSleep::default();
        let retrier = Retrier::new(sleep.clone());
        let cancel = &CancellationToken::new();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retrier
            .execute(&policy(5), "A", cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Err(SessionError::Transient("connection reset".into()))
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleep.delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_cuts_backoff_short() {
        let retrier = Retrier::new(TokioSleep);
        let cancel = CancellationToken::new();
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            ..policy(5)
        };

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        };
        let started = tokio::time::Instant::now();
        let (result, ()) = tokio::join!(
            retrier.execute(&policy, "A", &cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SessionError::Transient("connection reset".into()))
            }),
            canceller
        );

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }
}
