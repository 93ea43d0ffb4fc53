use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use noxy_core::{BridgeError, TransportError};

/// Backoff parameters shared by every bridge instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. One more failure is fatal.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `initial * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last: E },
    Cancelled,
}

impl From<RetryError<TransportError>> for BridgeError {
    fn from(e: RetryError<TransportError>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted { attempts, last },
            RetryError::Cancelled => Self::Cancelled,
        }
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or `cancel` fires.
///
/// `op` receives the zero-based attempt number. Waiting between attempts is
/// interrupted as soon as the token is cancelled.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        attempt += 1;
        if attempt > policy.max_retries {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[test]
    fn delay_sequence_is_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![4, 8, 16, 32, 60]);
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_failure_is_fatal() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result: Result<(), _> = retry_with_backoff(&policy, &cancel, |_| {
            let stamps = stamps.clone();
            async move {
                stamps.lock().push(start.elapsed().as_secs());
                Err::<(), _>("refused")
            }
        })
        .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 6,
                last: "refused"
            })
        );
        assert_eq!(*stamps.lock(), vec![0, 4, 12, 28, 60, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let value = retry_with_backoff(&policy, &cancel, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err("down")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result: Result<(), _> =
            retry_with_backoff(&policy, &cancel, |_| async { Err::<(), _>("down") }).await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn exhaustion_maps_to_fatal_bridge_error() {
        let err: BridgeError = RetryError::Exhausted {
            attempts: 6,
            last: TransportError::NotConnected,
        }
        .into();
        assert!(err.is_fatal());
    }
}
