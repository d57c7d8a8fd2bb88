//! Offset-tracking long-poll update fetcher with concurrent fire-and-forget dispatch.

pub mod processor;
pub mod runtime;

pub use processor::poller::Poller;
pub use runtime::config::{PollerOptions, PollerOptionsBuilder, PollerOptionsParams};
pub use runtime::protocol::{
    FetchError, FetchErrorKind, FetchFuture, HandleFuture, UpdateIdGetter, UpdateProtocol,
};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use tokio_util::sync::CancellationToken;
