use anyhow::Error as AnyError;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

pub type FetchFuture<'a, U> = BoxFuture<'a, Result<Vec<U>, FetchError>>;
pub type HandleFuture = BoxFuture<'static, ()>;

/// Pure accessor extracting the numeric identifier of an update.
pub type UpdateIdGetter<U> = dyn Fn(&U) -> i64 + Send + Sync + 'static;

/// Broad classification of a failed `get_updates` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Transport,
    Decode,
}

/// Error surfaced by [`UpdateProtocol::get_updates`]. Never fatal to the poller.
#[derive(Debug)]
pub struct FetchError {
    kind: FetchErrorKind,
    source: AnyError,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, source: AnyError) -> Self {
        Self { kind, source }
    }

    pub fn timeout(source: AnyError) -> Self {
        Self::new(FetchErrorKind::Timeout, source)
    }

    pub fn transport(source: AnyError) -> Self {
        Self::new(FetchErrorKind::Transport, source)
    }

    pub fn decode(source: AnyError) -> Self {
        Self::new(FetchErrorKind::Decode, source)
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FetchErrorKind::Timeout
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} fetch error: {}", self.kind, self.source)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<AnyError> for FetchError {
    fn from(source: AnyError) -> Self {
        Self::transport(source)
    }
}

/// Trait implemented by the remote update source a [`crate::Poller`] drives.
///
/// The poller owns no transport of its own: `get_updates` performs the long-poll
/// call and `handle_update` consumes one update. Both receive the shared
/// cancellation token and are expected to observe it cooperatively; the poller
/// never aborts either of them.
pub trait UpdateProtocol: Send + Sync + 'static {
    type Update: Send + 'static;

    /// Requests updates whose identifier is at least `offset`, waiting up to
    /// `timeout_secs` seconds when none are available yet. An empty batch is a
    /// valid answer.
    fn get_updates<'a>(
        &'a self,
        offset: i64,
        timeout_secs: u64,
        shutdown: &'a CancellationToken,
    ) -> FetchFuture<'a, Self::Update>;

    /// Processes a single update. The returned future is spawned and never
    /// awaited by the poller, so failures must be handled inside it.
    fn handle_update(&self, update: Self::Update, shutdown: CancellationToken) -> HandleFuture;
}
