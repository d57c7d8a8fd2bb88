use crate::{Poller, PollerOptions, UpdateProtocol};
use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives a [`Poller`] with a fixed set of options and handles OS signals for graceful shutdowns.
pub struct Runner<P: UpdateProtocol> {
    poller: Poller<P>,
    options: PollerOptions,
    shutdown: CancellationToken,
}

impl<P: UpdateProtocol> Runner<P> {
    pub fn new(poller: Poller<P>, options: PollerOptions) -> Self {
        Self {
            poller,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn poller(&self) -> &Poller<P> {
        &self.poller
    }

    pub fn options(&self) -> &PollerOptions {
        &self.options
    }

    /// Polls until the shutdown token is cancelled elsewhere.
    pub async fn run(&mut self) {
        self.poller
            .start_polling(self.shutdown.clone(), &self.options)
            .await;
        self.reinitialize_shutdown_token();
    }

    /// Polls until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");
        let outcome =
            poll_until_ctrl_c(&self.poller, &self.options, self.shutdown.clone()).await;
        self.reinitialize_shutdown_token();
        outcome
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
    }
}

async fn poll_until_ctrl_c<P: UpdateProtocol>(
    poller: &Poller<P>,
    options: &PollerOptions,
    shutdown: CancellationToken,
) -> Result<()> {
    let polling = poller.start_polling(shutdown.clone(), options);
    tokio::pin!(polling);

    let signal_result = tokio::select! {
        _ = &mut polling => return Ok(()),
        result = signal::ctrl_c() => {
            if result.is_ok() {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            result
        }
        _ = shutdown.cancelled() => {
            tracing::info!("runner shutdown token cancelled");
            Ok(())
        }
    };

    shutdown.cancel();
    polling.await;
    signal_result.context("failed to listen for Ctrl-C")
}
