use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Outcome of a bounded polling loop. Callers branch on readiness instead of
/// decoding a null result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> RetryOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            RetryOutcome::Ready(value) => Some(value),
            RetryOutcome::TimedOut => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RetryOutcome::Ready(_))
    }
}

/// Run `probe` up to `max_attempts` times, `delay` apart, until it yields a
/// value. The delay sits between attempts, not before the first one, so a
/// ready probe resolves immediately.
pub async fn poll_until<T, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut probe: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_attempts {
        if let Some(value) = probe().await {
            return RetryOutcome::Ready(value);
        }
        if attempt < max_attempts {
            debug!(attempt, max_attempts, "probe not ready, retrying");
            sleep(delay).await;
        }
    }
    RetryOutcome::TimedOut
}
