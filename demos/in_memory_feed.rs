use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use longpoller::{
    CancellationToken, FetchError, FetchFuture, HandleFuture, Poller, PollerOptions, Runner,
    UpdateProtocol,
};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

const ENV_PREFIX: &str = "LONGPOLLER";
const DEFAULT_LOG_DIRECTIVE: &str = "info";
const PRODUCER_INTERVAL: Duration = Duration::from_millis(700);
const MAX_BATCH: usize = 10;

#[derive(Debug, Clone)]
struct ChatMessage {
    update_id: i64,
    text: String,
}

/// Stands in for a remote bot API: messages accumulate in memory and
/// `get_updates` long-polls on them.
#[derive(Clone, Default)]
struct InMemoryFeed {
    state: Arc<Mutex<FeedState>>,
    arrived: Arc<Notify>,
}

#[derive(Default)]
struct FeedState {
    last_id: i64,
    messages: BTreeMap<i64, ChatMessage>,
}

impl InMemoryFeed {
    fn publish(&self, text: String) -> Result<i64> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("feed lock poisoned"))?;
        state.last_id += 1;
        let update_id = state.last_id;
        state
            .messages
            .insert(update_id, ChatMessage { update_id, text });
        drop(state);
        self.arrived.notify_waiters();
        Ok(update_id)
    }

    fn pending_from(&self, offset: i64) -> Result<Vec<ChatMessage>, FetchError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| FetchError::transport(anyhow!("feed lock poisoned")))?;
        // Requesting an offset confirms everything below it.
        state.messages.retain(|id, _| *id >= offset);
        Ok(state.messages.values().take(MAX_BATCH).cloned().collect())
    }
}

impl UpdateProtocol for InMemoryFeed {
    type Update = ChatMessage;

    fn get_updates<'a>(
        &'a self,
        offset: i64,
        timeout_secs: u64,
        shutdown: &'a CancellationToken,
    ) -> FetchFuture<'a, ChatMessage> {
        Box::pin(async move {
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            let batch = self.pending_from(offset)?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(Vec::new()),
                _ = timeout(Duration::from_secs(timeout_secs), arrived) => {}
            }
            self.pending_from(offset)
        })
    }

    fn handle_update(&self, update: ChatMessage, shutdown: CancellationToken) -> HandleFuture {
        Box::pin(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(update_id = update.update_id, "handler cancelled");
                }
                _ = sleep(Duration::from_millis(250)) => {
                    tracing::info!(update_id = update.update_id, text = %update.text, "handled message");
                }
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let options = PollerOptions::from_env(ENV_PREFIX)?;
    let feed = InMemoryFeed::default();
    for text in ["stale greeting", "stale question"] {
        feed.publish(text.to_owned())?;
    }

    let poller = Poller::new(feed.clone(), |message: &ChatMessage| message.update_id);
    let telemetry = poller.telemetry();
    let mut runner = Runner::new(poller, options);

    let producer = {
        let feed = feed.clone();
        let shutdown = runner.cancellation_token();
        tokio::spawn(async move {
            let mut sequence = 0u64;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(PRODUCER_INTERVAL) => {
                        sequence += 1;
                        if let Err(err) = feed.publish(format!("message #{sequence}")) {
                            tracing::warn!(error = %err, "failed to publish message");
                        }
                    }
                }
            }
        })
    };

    let outcome = runner.run_until_ctrl_c().await;
    producer.abort();

    let snapshot = telemetry.snapshot();
    tracing::info!(
        fetched = snapshot.fetched_updates,
        skipped = snapshot.skipped_updates,
        dispatched = snapshot.dispatched_updates,
        fetch_errors = snapshot.fetch_errors,
        "in-memory feed stopped"
    );
    outcome
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    longpoller::init_tracing();
}
