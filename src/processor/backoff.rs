use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Delay policy applied between a failed `get_updates` call and the next attempt.
///
/// With a zero initial delay the fetch loop re-fetches immediately and only yields
/// to the scheduler between attempts. A persistently failing source then turns
/// into a tight retry loop; set a non-zero initial delay to trade that for
/// doubling waits capped at `max_delay`.
#[derive(Debug, Clone)]
pub(crate) struct FetchRetryBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current: Duration,
}

pub(crate) enum RetryWait {
    Elapsed,
    Cancelled,
}

impl FetchRetryBackoff {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            current: initial_delay,
        }
    }

    /// Delay the next failure will wait for.
    pub(crate) fn next_delay(&self) -> Duration {
        self.current
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial_delay;
    }

    /// Waits out the current delay (racing `shutdown`) and doubles it for the next failure.
    pub(crate) async fn wait(&mut self, shutdown: &CancellationToken) -> RetryWait {
        let delay = self.current;
        self.current = next_backoff(self.current, self.max_delay);

        if delay.is_zero() {
            yield_now().await;
            return RetryWait::Elapsed;
        }

        tokio::select! {
            _ = shutdown.cancelled() => RetryWait::Cancelled,
            _ = sleep(delay) => RetryWait::Elapsed,
        }
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return Duration::ZERO;
    }

    let next = current.saturating_mul(2);
    if next > max_backoff {
        max_backoff
    } else {
        next
    }
}
