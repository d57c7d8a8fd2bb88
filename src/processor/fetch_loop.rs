//! Long-poll fetch loop: drives `get_updates`, advances the offset and feeds the
//! hand-off channel in arrival order.

use super::backoff::{FetchRetryBackoff, RetryWait};
use super::handoff::{HandoffSender, SendOutcome};
use super::offset::{BatchDisposition, OffsetTracker};
use crate::runtime::config::PollerOptions;
use crate::runtime::protocol::{UpdateIdGetter, UpdateProtocol};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct FetchLoop<P: UpdateProtocol> {
    protocol: Arc<P>,
    update_id: Arc<UpdateIdGetter<P::Update>>,
    handoff: HandoffSender<P::Update>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    skip_pending: bool,
    timeout_secs: u64,
    backoff: FetchRetryBackoff,
}

pub(crate) struct FetchLoopParams<P: UpdateProtocol> {
    pub protocol: Arc<P>,
    pub update_id: Arc<UpdateIdGetter<P::Update>>,
    pub handoff: HandoffSender<P::Update>,
    pub telemetry: Arc<Telemetry>,
    pub shutdown: CancellationToken,
}

enum ForwardOutcome {
    Completed,
    Stopped,
}

impl<P: UpdateProtocol> FetchLoop<P> {
    pub(crate) fn new(params: FetchLoopParams<P>, options: &PollerOptions) -> Self {
        let FetchLoopParams {
            protocol,
            update_id,
            handoff,
            telemetry,
            shutdown,
        } = params;

        Self {
            protocol,
            update_id,
            handoff,
            telemetry,
            shutdown,
            skip_pending: options.skip_pending(),
            timeout_secs: options.timeout_secs(),
            backoff: FetchRetryBackoff::new(
                options.fetch_retry_initial_delay(),
                options.fetch_retry_max_delay(),
            ),
        }
    }

    #[tracing::instrument(name = "fetch_loop", skip_all)]
    pub(crate) async fn run(mut self) {
        tracing::info!(
            skip_pending = self.skip_pending,
            timeout_secs = self.timeout_secs,
            "started polling updates"
        );

        let mut offset = OffsetTracker::new(self.skip_pending);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let requested = offset.current();
            self.telemetry.record_fetch_call();
            let batch = match self
                .protocol
                .get_updates(requested, self.timeout_secs, &self.shutdown)
                .await
            {
                Ok(batch) => {
                    self.backoff.reset();
                    batch
                }
                Err(err) => {
                    if err.is_timeout() {
                        self.telemetry.record_fetch_timeout();
                    } else {
                        self.telemetry.record_fetch_error();
                    }
                    tracing::warn!(
                        offset = requested,
                        kind = ?err.kind(),
                        error = %err,
                        retry_in_ms = self.backoff.next_delay().as_millis() as u64,
                        "error while getting updates; retrying"
                    );
                    if let RetryWait::Cancelled = self.backoff.wait(&self.shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.telemetry.record_batch(batch.len());
            let update_id = &*self.update_id;
            match offset.observe(&batch, update_id) {
                BatchDisposition::Skip => {
                    self.telemetry.record_skipped(batch.len());
                    tracing::info!(
                        skipped = batch.len(),
                        next_offset = offset.current(),
                        "skipped updates pending at startup"
                    );
                    continue;
                }
                BatchDisposition::Forward => {}
            }

            if !batch.is_empty() {
                tracing::debug!(
                    updates = batch.len(),
                    offset = requested,
                    next_offset = offset.current(),
                    "received update batch"
                );
            }

            if let ForwardOutcome::Stopped = self.forward(batch).await {
                break;
            }
        }

        tracing::info!("stopped polling updates");
    }

    /// Pushes the batch into the hand-off channel one update at a time. Remaining
    /// updates are dropped when shutdown wins a send.
    async fn forward(&self, batch: Vec<P::Update>) -> ForwardOutcome {
        let total = batch.len();
        for (index, update) in batch.into_iter().enumerate() {
            let id = (self.update_id)(&update);
            match self.handoff.send(update, &self.shutdown).await {
                SendOutcome::Delivered => {
                    self.telemetry.record_forwarded();
                    tracing::trace!(update_id = id, "forwarded update");
                }
                SendOutcome::Cancelled => {
                    tracing::debug!(
                        update_id = id,
                        dropped = total - index,
                        "shutdown requested while forwarding; dropping rest of batch"
                    );
                    return ForwardOutcome::Stopped;
                }
                SendOutcome::Closed => {
                    tracing::warn!(
                        update_id = id,
                        dropped = total - index,
                        "dispatch loop is gone; stopping fetch loop"
                    );
                    return ForwardOutcome::Stopped;
                }
            }
        }
        ForwardOutcome::Completed
    }
}
