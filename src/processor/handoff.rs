//! Rendezvous channel between the fetch loop and the dispatch loop.
//!
//! Tokio has no zero-capacity channel, so every item travels with a oneshot
//! acknowledgement: `send` only completes once the receiver has taken the item
//! out of the channel, which keeps at most one in-flight update between the two
//! loops and ties fetch cadence to the dispatcher's readiness.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

struct Envelope<T> {
    item: T,
    ack: oneshot::Sender<()>,
}

pub(crate) struct HandoffSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

pub(crate) struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Delivered,
    Cancelled,
    Closed,
}

pub(crate) fn handoff_channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

impl<T> HandoffSender<T> {
    /// Hands `item` over, racing every wait against `shutdown`. Cancellation is
    /// checked first whenever both sides are ready, except that an item the
    /// receiver already took is always reported as delivered.
    pub(crate) async fn send(&self, item: T, shutdown: &CancellationToken) -> SendOutcome {
        let (ack_tx, mut ack_rx) = oneshot::channel();
        let envelope = Envelope { item, ack: ack_tx };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return SendOutcome::Cancelled,
            sent = self.tx.send(envelope) => {
                if sent.is_err() {
                    return SendOutcome::Closed;
                }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            acked = &mut ack_rx => {
                return match acked {
                    Ok(()) => SendOutcome::Delivered,
                    Err(_) => SendOutcome::Closed,
                };
            }
        }

        // The receiver may have taken the item just before shutdown was requested.
        match ack_rx.try_recv() {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => SendOutcome::Cancelled,
        }
    }
}

impl<T> HandoffReceiver<T> {
    /// Waits for the next item and acknowledges it to the sender. Returns `None`
    /// once the sender is gone. Cancel safe.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        let Envelope { item, ack } = self.rx.recv().await?;
        let _ = ack.send(());
        Some(item)
    }
}
