use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FETCH_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Polling options consumed read-only by [`crate::Poller::start_polling`].
///
/// All instances must be constructed via [`PollerOptions::builder`] or [`PollerOptions::new`]
/// so invariants are validated before the loops observe the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerOptions {
    skip_pending: bool,
    timeout: Duration,
    metrics_interval: Option<Duration>,
    fetch_retry_initial_delay: Duration,
    fetch_retry_max_delay: Duration,
}

pub struct PollerOptionsParams {
    pub skip_pending: bool,
    pub timeout: Duration,
    pub metrics_interval: Option<Duration>,
    pub fetch_retry_initial_delay: Duration,
    pub fetch_retry_max_delay: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            skip_pending: false,
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            metrics_interval: None,
            fetch_retry_initial_delay: Duration::ZERO,
            fetch_retry_max_delay: Duration::from_millis(DEFAULT_FETCH_RETRY_MAX_DELAY_MS),
        }
    }
}

impl PollerOptions {
    /// Returns a builder to incrementally construct and validate options.
    pub fn builder() -> PollerOptionsBuilder {
        PollerOptionsBuilder::default()
    }

    /// Constructs options directly from the provided values, running validation.
    pub fn new(params: PollerOptionsParams) -> Result<Self> {
        let PollerOptionsParams {
            skip_pending,
            timeout,
            metrics_interval,
            fetch_retry_initial_delay,
            fetch_retry_max_delay,
        } = params;

        let options = Self {
            skip_pending,
            timeout,
            metrics_interval,
            fetch_retry_initial_delay,
            fetch_retry_max_delay,
        };

        options.validate()?;
        Ok(options)
    }

    /// Discard the first successfully fetched batch (updates already pending at startup).
    pub fn skip_pending(&self) -> bool {
        self.skip_pending
    }

    /// Long-poll wait requested from the remote source.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whole seconds of [`Self::timeout`] as passed to `get_updates`.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }

    /// Interval of the periodic metrics log line. `None` disables the reporter.
    pub fn metrics_interval(&self) -> Option<Duration> {
        self.metrics_interval
    }

    /// Delay before the first re-fetch after an error. Zero re-fetches immediately.
    pub fn fetch_retry_initial_delay(&self) -> Duration {
        self.fetch_retry_initial_delay
    }

    /// Upper bound for the doubling retry delay.
    pub fn fetch_retry_max_delay(&self) -> Duration {
        self.fetch_retry_max_delay
    }

    /// Performs validation on an existing options instance.
    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.metrics_interval {
            if interval.is_zero() {
                bail!("metrics_interval must be greater than 0 when set");
            }
        }

        if self.fetch_retry_max_delay < self.fetch_retry_initial_delay {
            bail!(
                "fetch_retry_max_delay ({:?}) must not be smaller than fetch_retry_initial_delay ({:?})",
                self.fetch_retry_max_delay,
                self.fetch_retry_initial_delay,
            );
        }

        Ok(())
    }

    /// Loads options from a JSON document. Missing fields fall back to the builder defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read options file {}", path.display()))?;
        let file: OptionsFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse options file {}", path.display()))?;
        file.into_builder()
            .build()
            .with_context(|| format!("invalid options in {}", path.display()))
    }

    /// Loads options from `{prefix}_*` environment variables.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let key = |suffix: &str| format!("{prefix}_{suffix}");

        let mut builder = Self::builder();
        if let Some(skip) = parse_env_bool(&key("SKIP_PENDING"))? {
            builder = builder.skip_pending(skip);
        }
        if let Some(secs) = parse_env::<u64>(&key("TIMEOUT_SECS"))? {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64>(&key("METRICS_INTERVAL_SECS"))? {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_env::<u64>(&key("FETCH_RETRY_INITIAL_DELAY_MS"))? {
            builder = builder.fetch_retry_initial_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_env::<u64>(&key("FETCH_RETRY_MAX_DELAY_MS"))? {
            builder = builder.fetch_retry_max_delay(Duration::from_millis(ms));
        }

        builder
            .build()
            .with_context(|| format!("invalid options in {prefix}_* environment"))
    }
}

#[derive(Debug, Default, Clone)]
pub struct PollerOptionsBuilder {
    skip_pending: Option<bool>,
    timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    fetch_retry_initial_delay: Option<Duration>,
    fetch_retry_max_delay: Option<Duration>,
}

impl PollerOptionsBuilder {
    pub fn skip_pending(mut self, skip: bool) -> Self {
        self.skip_pending = Some(skip);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn fetch_retry_initial_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_initial_delay = Some(delay);
        self
    }

    pub fn fetch_retry_max_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_max_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<PollerOptions> {
        let defaults = PollerOptions::default();
        let fetch_retry_initial_delay = self
            .fetch_retry_initial_delay
            .unwrap_or(defaults.fetch_retry_initial_delay);
        // An explicit initial delay above the default cap lifts the cap with it.
        let fetch_retry_max_delay = self
            .fetch_retry_max_delay
            .unwrap_or_else(|| defaults.fetch_retry_max_delay.max(fetch_retry_initial_delay));

        PollerOptions::new(PollerOptionsParams {
            skip_pending: self.skip_pending.unwrap_or(defaults.skip_pending),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            metrics_interval: self.metrics_interval,
            fetch_retry_initial_delay,
            fetch_retry_max_delay,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    skip_pending: Option<bool>,
    timeout_secs: Option<u64>,
    metrics_interval_secs: Option<u64>,
    fetch_retry_initial_delay_ms: Option<u64>,
    fetch_retry_max_delay_ms: Option<u64>,
}

impl OptionsFile {
    fn into_builder(self) -> PollerOptionsBuilder {
        let mut builder = PollerOptions::builder();
        if let Some(skip) = self.skip_pending {
            builder = builder.skip_pending(skip);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.metrics_interval_secs {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(ms) = self.fetch_retry_initial_delay_ms {
            builder = builder.fetch_retry_initial_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.fetch_retry_max_delay_ms {
            builder = builder.fetch_retry_max_delay(Duration::from_millis(ms));
        }
        builder
    }
}

fn read_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_owned())),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match read_env(key)? {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        None => Ok(None),
    }
}

fn parse_env_bool(key: &str) -> Result<Option<bool>> {
    let Some(value) = read_env(key)? else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => bail!("failed to parse {key}='{value}' as a boolean"),
    }
}
