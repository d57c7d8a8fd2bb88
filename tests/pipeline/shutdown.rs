use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::support::{
    helpers::{
        init_tracing, spawn_polling, stop_polling, test_options, wait_for_fetch_calls,
        wait_for_started,
    },
    scripted_source::{ScriptedSource, Step},
};
use anyhow::Result;
use longpoller::{
    CancellationToken, FetchFuture, HandleFuture, Poller, PollerOptions, UpdateProtocol,
};
use tokio::time::{sleep, timeout};

/// Long-polls for the full timeout no matter what the cancellation token says.
#[derive(Clone, Default)]
struct StubbornSource {
    calls: Arc<AtomicUsize>,
}

impl UpdateProtocol for StubbornSource {
    type Update = i64;

    fn get_updates<'a>(
        &'a self,
        _offset: i64,
        timeout_secs: u64,
        _shutdown: &'a CancellationToken,
    ) -> FetchFuture<'a, i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            sleep(Duration::from_secs(timeout_secs)).await;
            Ok(Vec::new())
        })
    }

    fn handle_update(&self, _update: i64, _shutdown: CancellationToken) -> HandleFuture {
        Box::pin(async {})
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_both_loops() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new(vec![Step::ids(&[1, 2])]);

    let (poller, shutdown, handle) = spawn_polling(&source, test_options(false));
    wait_for_started(&source, 2, Duration::from_secs(3)).await?;
    wait_for_fetch_calls(&source, 2, Duration::from_secs(3)).await?;

    let started = Instant::now();
    stop_polling(shutdown, handle).await?;
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "cooperative fetch should release shutdown promptly"
    );

    let calls = source.fetch_calls();
    let dispatched = poller.telemetry().dispatched_updates();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.fetch_calls(), calls, "no fetch after shutdown");
    assert_eq!(
        poller.telemetry().dispatched_updates(),
        dispatched,
        "no handler start after shutdown"
    );
    assert_eq!(source.calls_after_cancel(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_waits_at_most_one_timeout_for_uncooperative_fetch() -> Result<()> {
    init_tracing();
    let source = StubbornSource::default();
    let poller = Poller::new(source.clone(), |update: &i64| *update);
    let options = PollerOptions::builder()
        .timeout(Duration::from_secs(1))
        .build()?;

    let shutdown = CancellationToken::new();
    let polling = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { poller.start_polling(shutdown, &options).await })
    };

    sleep(Duration::from_millis(100)).await;
    let cancelled_at = Instant::now();
    shutdown.cancel();
    timeout(Duration::from_secs(3), polling)
        .await
        .expect("start_polling should return once the in-flight fetch times out")?;

    assert!(cancelled_at.elapsed() <= Duration::from_millis(1_500));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offset_is_not_persisted_across_runs() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new(vec![Step::ids(&[5, 6])]);
    let poller = Poller::new(source.clone(), crate::support::scripted_source::update_id);
    let options = test_options(false);

    let first = CancellationToken::new();
    {
        let poller = poller.clone();
        let token = first.clone();
        let options = options.clone();
        let handle = tokio::spawn(async move { poller.start_polling(token, &options).await });
        wait_for_fetch_calls(&source, 2, Duration::from_secs(3)).await?;
        stop_polling(first, handle).await?;
    }

    let second = CancellationToken::new();
    let handle = {
        let second = second.clone();
        tokio::spawn(async move { poller.start_polling(second, &options).await })
    };
    wait_for_fetch_calls(&source, 3, Duration::from_secs(3)).await?;
    stop_polling(second, handle).await?;

    assert_eq!(&source.offsets()[..3], &[0, 7, 0]);
    Ok(())
}
