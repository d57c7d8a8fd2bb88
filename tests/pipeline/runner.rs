use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, test_options, wait_for_fetch_calls, wait_for_started},
    scripted_source::{update_id, ScriptedSource, Step},
};
use anyhow::{Context, Result};
use longpoller::{CancellationToken, Poller, Runner};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_returns_when_token_is_cancelled() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new(vec![Step::ids(&[1, 2, 3])]);
    let mut runner = Runner::new(Poller::new(source.clone(), update_id), test_options(false));

    let token = runner.cancellation_token();
    let watcher = {
        let source = source.clone();
        tokio::spawn(async move {
            let outcome = wait_for_started(&source, 3, Duration::from_secs(3)).await;
            token.cancel();
            outcome
        })
    };

    timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after the token is cancelled")??;
    watcher.await??;

    assert_eq!(source.started_ids(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_exposes_its_poller_and_options() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new(vec![Step::ids(&[1, 2])]);
    let mut runner = Runner::new(Poller::new(source.clone(), update_id), test_options(true));

    assert!(runner.options().skip_pending());
    assert_eq!(runner.options().timeout_secs(), 1);

    let watcher = spawn_cancel_after_fetches(&source, 2, runner.cancellation_token());
    timeout(Duration::from_secs(5), runner.run())
        .await
        .context("run should stop")?;
    watcher.await??;

    // The accessor hands back the same protocol instance the loops drove.
    assert_eq!(runner.poller().protocol().fetch_calls(), source.fetch_calls());
    let snapshot = runner.poller().telemetry().snapshot();
    assert_eq!(snapshot.skipped_updates, 2);
    assert_eq!(snapshot.dispatched_updates, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_can_restart_after_stop() -> Result<()> {
    init_tracing();
    let source = ScriptedSource::new(vec![Step::ids(&[10])]);
    let mut runner = Runner::new(Poller::new(source.clone(), update_id), test_options(true));

    let watcher = spawn_cancel_after_fetches(&source, 2, runner.cancellation_token());
    timeout(Duration::from_secs(5), runner.run())
        .await
        .context("first run should stop")?;
    watcher.await??;

    let token = runner.cancellation_token();
    assert!(!token.is_cancelled(), "runner should hand out a fresh token");
    source.extend(vec![Step::ids(&[11])]);

    let watcher = spawn_cancel_after_fetches(&source, 4, token);
    timeout(Duration::from_secs(5), runner.run())
        .await
        .context("second run should stop")?;
    watcher.await??;

    // Each run starts from offset 0 and re-arms the skip-pending gate.
    assert_eq!(&source.offsets()[..4], &[0, 11, 0, 12]);
    assert!(source.started_ids().is_empty());
    Ok(())
}

fn spawn_cancel_after_fetches(
    source: &ScriptedSource,
    calls: usize,
    token: CancellationToken,
) -> JoinHandle<Result<()>> {
    let source = source.clone();
    tokio::spawn(async move {
        let outcome = wait_for_fetch_calls(&source, calls, Duration::from_secs(3)).await;
        token.cancel();
        outcome
    })
}
