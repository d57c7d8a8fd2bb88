use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters describing poller activity.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetch_calls: AtomicU64,
    empty_batches: AtomicU64,
    fetched_updates: AtomicU64,
    skipped_updates: AtomicU64,
    forwarded_updates: AtomicU64,
    dispatched_updates: AtomicU64,
    fetch_errors: AtomicU64,
    fetch_timeouts: AtomicU64,
}

impl Telemetry {
    pub fn record_fetch_call(&self) {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, len: usize) {
        if len == 0 {
            self.empty_batches.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.fetched_updates.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.skipped_updates.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_timeout(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetch_calls: self.fetch_calls.load(Ordering::Relaxed),
            empty_batches: self.empty_batches.load(Ordering::Relaxed),
            fetched_updates: self.fetched_updates.load(Ordering::Relaxed),
            skipped_updates: self.skipped_updates.load(Ordering::Relaxed),
            forwarded_updates: self.forwarded_updates.load(Ordering::Relaxed),
            dispatched_updates: self.dispatched_updates.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    pub fn dispatched_updates(&self) -> u64 {
        self.dispatched_updates.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetch_calls: u64,
    pub empty_batches: u64,
    pub fetched_updates: u64,
    pub skipped_updates: u64,
    pub forwarded_updates: u64,
    pub dispatched_updates: u64,
    pub fetch_errors: u64,
    pub fetch_timeouts: u64,
}

/// Spawns a background task that periodically logs dispatch throughput and fetch errors.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "longpoller::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let dispatched_delta = current_snapshot
                        .dispatched_updates
                        .saturating_sub(last_snapshot.dispatched_updates);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        dispatched_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "longpoller::metrics",
                        throughput = format!("{throughput:.2}"),
                        fetch_calls = current_snapshot.fetch_calls,
                        fetched = current_snapshot.fetched_updates,
                        skipped = current_snapshot.skipped_updates,
                        dispatched = current_snapshot.dispatched_updates,
                        fetch_errors = current_snapshot.fetch_errors,
                        fetch_timeouts = current_snapshot.fetch_timeouts,
                        "poller metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
