//! Dispatch loop: takes updates off the hand-off channel and spawns one handler
//! task per update without awaiting it.

use super::handoff::HandoffReceiver;
use crate::runtime::protocol::UpdateProtocol;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct DispatchLoop<P: UpdateProtocol> {
    protocol: Arc<P>,
    handoff: HandoffReceiver<P::Update>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl<P: UpdateProtocol> DispatchLoop<P> {
    pub(crate) fn new(
        protocol: Arc<P>,
        handoff: HandoffReceiver<P::Update>,
        telemetry: Arc<Telemetry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            handoff,
            telemetry,
            shutdown,
        }
    }

    #[tracing::instrument(name = "dispatch_loop", skip_all)]
    pub(crate) async fn run(mut self) {
        tracing::info!("started listening updates");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.handoff.recv() => match next {
                    Some(update) => self.dispatch(update),
                    None => {
                        tracing::debug!("hand-off channel closed by fetch loop");
                        break;
                    }
                },
            }
        }

        tracing::info!("stopped listening updates");
    }

    // Handler tasks are detached: the count is unbounded and they are never joined.
    fn dispatch(&self, update: P::Update) {
        let invocation = self
            .protocol
            .handle_update(update, self.shutdown.clone());
        self.telemetry.record_dispatched();
        tokio::spawn(invocation);
    }
}
