//! Long-poll orchestration.
//!
//! `Poller` wires two tasks together for the duration of one
//! [`Poller::start_polling`] call:
//! - `fetch_loop` calls [`UpdateProtocol::get_updates`] with the current offset,
//!   advances it past each batch, applies the skip-pending gate and forwards
//!   updates one by one.
//! - `dispatch_loop` receives each forwarded update and spawns
//!   [`UpdateProtocol::handle_update`] for it without waiting for completion.
//!
//! The two loops meet at a rendezvous hand-off channel (`handoff`) and share the
//! caller's cancellation token, which is the only way to stop them.

use super::dispatch_loop::DispatchLoop;
use super::fetch_loop::{FetchLoop, FetchLoopParams};
use super::handoff::handoff_channel;
use super::lifecycle::LifecycleHandles;
use crate::runtime::config::PollerOptions;
use crate::runtime::protocol::{UpdateIdGetter, UpdateProtocol};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Poller<P: UpdateProtocol> {
    protocol: Arc<P>,
    update_id: Arc<UpdateIdGetter<P::Update>>,
    telemetry: Arc<Telemetry>,
}

impl<P: UpdateProtocol> Clone for Poller<P> {
    fn clone(&self) -> Self {
        Self {
            protocol: Arc::clone(&self.protocol),
            update_id: Arc::clone(&self.update_id),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

impl<P: UpdateProtocol> Poller<P> {
    /// Binds an update source to the identifier accessor used for offset tracking.
    ///
    /// `update_id` must be pure and agree with the remote ordering: identifiers are
    /// expected to increase across a batch. Construction performs no I/O.
    pub fn new<F>(protocol: P, update_id: F) -> Self
    where
        F: Fn(&P::Update) -> i64 + Send + Sync + 'static,
    {
        Self::with_shared_protocol(Arc::new(protocol), update_id)
    }

    /// Same as [`Self::new`] for callers that keep their own handle to the protocol.
    pub fn with_shared_protocol<F>(protocol: Arc<P>, update_id: F) -> Self
    where
        F: Fn(&P::Update) -> i64 + Send + Sync + 'static,
    {
        Self {
            protocol,
            update_id: Arc::new(update_id),
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    /// Returns a reference to the shared protocol instance.
    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs the fetch and dispatch loops until `shutdown` is cancelled and both
    /// loops have returned.
    ///
    /// Nothing is returned: fetch failures are logged and retried, handler
    /// outcomes are never observed. Each fetched update gets its own spawned
    /// handler task and the number of concurrently running handlers is not
    /// bounded; rate-sensitive handlers must throttle themselves. Handler tasks
    /// may still be running when this returns.
    pub async fn start_polling(&self, shutdown: CancellationToken, options: &PollerOptions) {
        debug_assert!(
            options.validate().is_ok(),
            "PollerOptions should have been validated at construction time"
        );

        let (handoff_tx, handoff_rx) = handoff_channel();
        let lifecycle = LifecycleHandles::spawn(
            &shutdown,
            self.telemetry.clone(),
            options.metrics_interval(),
        );

        let fetch_loop = FetchLoop::new(
            FetchLoopParams {
                protocol: self.protocol.clone(),
                update_id: self.update_id.clone(),
                handoff: handoff_tx,
                telemetry: self.telemetry.clone(),
                shutdown: shutdown.clone(),
            },
            options,
        );
        let dispatch_loop = DispatchLoop::new(
            self.protocol.clone(),
            handoff_rx,
            self.telemetry.clone(),
            shutdown.clone(),
        );

        let fetch_handle = tokio::spawn(fetch_loop.run());
        let dispatch_handle = tokio::spawn(dispatch_loop.run());

        let (fetch_result, dispatch_result) = tokio::join!(fetch_handle, dispatch_handle);
        if let Err(err) = fetch_result {
            tracing::error!(error = %err, "fetch loop task failed");
        }
        if let Err(err) = dispatch_result {
            tracing::error!(error = %err, "dispatch loop task failed");
        }

        lifecycle.shutdown().await;
        tracing::info!("poller stopped");
    }
}
