use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use longpoller::{CancellationToken, Poller, PollerOptions};
use once_cell::sync::Lazy;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use super::scripted_source::{update_id, ScriptedSource};

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn test_options(skip_pending: bool) -> PollerOptions {
    PollerOptions::builder()
        .skip_pending(skip_pending)
        .timeout(Duration::from_secs(1))
        .build()
        .expect("test options should build")
}

/// Starts polling on a background task and returns the token that stops it.
pub fn spawn_polling(
    source: &ScriptedSource,
    options: PollerOptions,
) -> (Poller<ScriptedSource>, CancellationToken, JoinHandle<()>) {
    let poller = Poller::new(source.clone(), update_id);
    let shutdown = CancellationToken::new();
    let handle = {
        let poller = poller.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { poller.start_polling(shutdown, &options).await })
    };
    (poller, shutdown, handle)
}

pub async fn stop_polling(shutdown: CancellationToken, handle: JoinHandle<()>) -> Result<()> {
    shutdown.cancel();
    match tokio::time::timeout(Duration::from_secs(3), handle).await {
        Ok(joined) => {
            joined?;
            Ok(())
        }
        Err(_) => bail!("start_polling did not return after cancellation"),
    }
}

pub async fn wait_for_started(source: &ScriptedSource, count: usize, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        let started = source.started().len();
        if started >= count {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("only {started} handler(s) started within {timeout:?}, expected {count}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_fetch_calls(
    source: &ScriptedSource,
    count: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let calls = source.fetch_calls();
        if calls >= count {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("only {calls} fetch call(s) within {timeout:?}, expected {count}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn assert_non_decreasing(offsets: &[i64]) {
    for window in offsets.windows(2) {
        assert!(
            window[0] <= window[1],
            "offsets must never decrease, saw {} then {}",
            window[0],
            window[1]
        );
    }
}
