//! # Stream Settings
//!
//! TOML settings for an [`EventStream`](crate::EventStream), with environment
//! overrides for the two endpoints.
//!
//! ```toml
//! rpc_url = "http://localhost:1769"
//! push_retry_interval_ms = 60000
//!
//! [push]
//! url = "wss://api.testnet.iota.cafe/graphql"
//! max_attempts = 5
//!
//! [poll]
//! interval_ms = 4000
//!
//! [filter]
//! package_id = "0xABC"
//! module = "party"
//! activity_id = "0x1"
//! ```

use std::path::Path;
use std::time::Duration;

use partyline_networking::{BackoffPolicy, SessionConfig};
use partyline_shared::constants::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, DEFAULT_PUSH_URL, DEFAULT_RPC_URL, POLL_PAGE_LIMIT, STREAM_MAX_DELAY,
};
use partyline_shared::EventFilter;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::listener::StreamConfig;
use crate::poller::PollerConfig;

/// Overrides `push.url`.
pub const PUSH_URL_ENV: &str = "PARTYLINE_GRAPHQL_WS_URL";
/// Overrides `rpc_url`.
pub const RPC_URL_ENV: &str = "PARTYLINE_RPC_URL";

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Top-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// JSON-RPC endpoint for polling.
    pub rpc_url: String,
    /// Log every frame.
    pub debug: bool,
    /// Push retry interval after failover. Absent means never.
    pub push_retry_interval_ms: Option<u64>,
    /// Push session.
    pub push: PushSettings,
    /// Poller.
    pub poll: PollSettings,
    /// Event selection.
    pub filter: FilterSettings,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            debug: false,
            push_retry_interval_ms: None,
            push: PushSettings::default(),
            poll: PollSettings::default(),
            filter: FilterSettings::default(),
        }
    }
}

/// `[push]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    /// GraphQL websocket endpoint.
    pub url: String,
    /// Time allowed for the connection ack.
    pub ack_timeout_ms: u64,
    /// Time allowed for the socket handshake.
    pub connect_timeout_ms: u64,
    /// First reconnect delay.
    pub initial_delay_ms: u64,
    /// Reconnect delay cap.
    pub max_delay_ms: u64,
    /// Reconnects before giving up.
    pub max_attempts: u32,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUSH_URL.to_owned(),
            ack_timeout_ms: millis(DEFAULT_ACK_TIMEOUT),
            connect_timeout_ms: millis(DEFAULT_CONNECT_TIMEOUT),
            initial_delay_ms: millis(DEFAULT_INITIAL_DELAY),
            max_delay_ms: millis(STREAM_MAX_DELAY),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// `[poll]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Pause between ticks.
    pub interval_ms: u64,
    /// Skip history present at start.
    pub start_from_latest: bool,
    /// Page size.
    pub page_limit: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: millis(DEFAULT_POLL_INTERVAL),
            start_from_latest: true,
            page_limit: POLL_PAGE_LIMIT,
        }
    }
}

/// `[filter]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Package id, required.
    pub package_id: String,
    /// Module name, required.
    pub module: String,
    /// Only events of this activity.
    pub activity_id: Option<String>,
    /// Only these struct names. Empty means all.
    pub struct_names: Vec<String>,
}

impl StreamSettings {
    /// Parses settings from TOML text. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a settings file, applies the environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::parse(&content)?;
        settings.apply_process_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Applies endpoint overrides from `lookup`. Blank values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = value(PUSH_URL_ENV) {
            self.push.url = url.trim().to_owned();
        }
        if let Some(url) = value(RPC_URL_ENV) {
            self.rpc_url = url.trim().to_owned();
        }
    }

    /// Applies endpoint overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Checks every value a stream depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.filter.package_id.trim().is_empty() {
            return Err(invalid("filter.package_id", "must not be empty"));
        }
        if self.filter.module.trim().is_empty() {
            return Err(invalid("filter.module", "must not be empty"));
        }

        check_scheme("push.url", &self.push.url, &["ws", "wss"])?;
        check_scheme("rpc_url", &self.rpc_url, &["http", "https"])?;

        let non_zero = [
            ("push.ack_timeout_ms", self.push.ack_timeout_ms),
            ("push.connect_timeout_ms", self.push.connect_timeout_ms),
            ("push.initial_delay_ms", self.push.initial_delay_ms),
            ("push.max_delay_ms", self.push.max_delay_ms),
            ("poll.interval_ms", self.poll.interval_ms),
            ("poll.page_limit", u64::try_from(self.poll.page_limit).unwrap_or(u64::MAX)),
            (
                "push_retry_interval_ms",
                self.push_retry_interval_ms.unwrap_or(1),
            ),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        if self.push.initial_delay_ms > self.push.max_delay_ms {
            return Err(invalid(
                "push.initial_delay_ms",
                "must not exceed push.max_delay_ms",
            ));
        }

        Ok(())
    }

    /// The event filter these settings describe.
    #[must_use]
    pub fn filter(&self) -> EventFilter {
        let mut filter = EventFilter::new(&self.filter.package_id, &self.filter.module)
            .with_struct_names(self.filter.struct_names.iter().cloned());
        if let Some(activity_id) = &self.filter.activity_id {
            filter = filter.with_activity_id(activity_id);
        }
        filter
    }

    /// Validates and converts into a [`StreamConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when validation fails.
    pub fn to_stream_config(&self) -> ConfigResult<StreamConfig> {
        self.validate()?;

        let push = &self.push;
        let session = SessionConfig::new(&push.url)
            .with_ack_timeout(Duration::from_millis(push.ack_timeout_ms))
            .with_connect_timeout(Duration::from_millis(push.connect_timeout_ms))
            .with_backoff(BackoffPolicy::new(
                Duration::from_millis(push.initial_delay_ms),
                Duration::from_millis(push.max_delay_ms),
            ))
            .with_max_attempts(push.max_attempts)
            .with_debug(self.debug);

        let poller = PollerConfig {
            interval: Duration::from_millis(self.poll.interval_ms),
            page_limit: self.poll.page_limit,
            start_from_latest: self.poll.start_from_latest,
        };

        Ok(StreamConfig::new(self.filter())
            .with_session(session)
            .with_poller(poller)
            .with_push_retry_interval(self.push_retry_interval_ms.map(Duration::from_millis)))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_scheme(field: &'static str, value: &str, schemes: &[&str]) -> ConfigResult<()> {
    let url = Url::parse(value).map_err(|e| invalid(field, format!("{value}: {e}")))?;
    if schemes.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("scheme {} is not one of {}", url.scheme(), schemes.join(", ")),
        ))
    }
}
