//! Run-scoped background tasks for `Poller::start_polling`.

use crate::runtime::telemetry::{self, Telemetry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    run_token: CancellationToken,
    metrics_handle: Option<JoinHandle<()>>,
}

impl LifecycleHandles {
    /// Derives a run token from `shutdown` and starts the metrics reporter when an
    /// interval is configured.
    pub(crate) fn spawn(
        shutdown: &CancellationToken,
        telemetry: Arc<Telemetry>,
        metrics_interval: Option<Duration>,
    ) -> Self {
        let run_token = shutdown.child_token();
        let metrics_handle = metrics_interval.map(|interval| {
            telemetry::spawn_metrics_reporter(telemetry, run_token.clone(), interval)
        });

        Self {
            run_token,
            metrics_handle,
        }
    }

    pub(crate) async fn shutdown(mut self) {
        self.run_token.cancel();

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }
    }
}
