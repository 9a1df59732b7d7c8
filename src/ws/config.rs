#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;
use regex::Regex;
use serde_json::{Map, Value};

use super::message::{Outgoing, Payload};
use super::traits::BinaryType;
use crate::Result;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(3);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(3);
const DEFAULT_PING: &str = "ping";

/// Configuration for a [`ResilientSocket`](super::ResilientSocket).
///
/// Every field has a default, so `Config::default()` is a working configuration:
///
/// ```
/// use std::time::Duration;
///
/// use resilient_ws::ws::config::{Config, HeartbeatConfig, ReconnectConfig};
/// use serde_json::json;
///
/// let config = Config::builder()
///     .query(json!({ "token": "abc" }))
///     .heartbeat(
///         HeartbeatConfig::builder()
///             .interval(Duration::from_secs(10))
///             .pong_match("pong")
///             .timeout(Duration::from_secs(2))
///             .timeout_count(3)
///             .build(),
///     )
///     .reconnect(ReconnectConfig::builder().retry_count(5).build())
///     .build();
///
/// assert!(config.immediate);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Parameters appended to the query string of the URL. Only the entries of a JSON object
    /// are used; nested objects become `key[sub]=value`.
    #[builder(default = Value::Object(Map::new()))]
    pub query: Value,
    /// Connect as soon as the socket is created
    #[builder(default = true)]
    pub immediate: bool,
    /// Rewrite `http://` to `ws://` and `https://` to `wss://`
    #[builder(default = true)]
    pub transform_protocol: bool,
    /// Sub-protocols offered to the server
    #[builder(default)]
    pub protocols: Vec<String>,
    /// Representation of incoming binary frames, left to the transport when unset
    pub binary_type: Option<BinaryType>,
    #[builder(default)]
    pub heartbeat: HeartbeatConfig,
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Application-level heartbeat settings.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct HeartbeatConfig {
    /// Interval between probes. Zero disables the heartbeat entirely.
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub interval: Duration,
    /// Probe sent on every tick
    #[builder(default, into)]
    pub ping: Ping,
    /// How replies to the probe are recognized
    #[builder(into)]
    pub pong_match: Option<PongMatch>,
    /// How long a probe may go unanswered before it counts as missed
    #[builder(default)]
    pub timeout: Duration,
    /// Missed probes tolerated before the connection is dropped
    #[builder(default)]
    pub timeout_count: u32,
    /// Keep recognized replies away from `message` listeners
    #[builder(default = true)]
    pub ignore: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HeartbeatConfig {
    /// Whether probes are sent at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Per-probe timeout and miss threshold, present only when both are positive.
    #[must_use]
    pub fn timeout_policy(&self) -> Option<(Duration, u32)> {
        (!self.timeout.is_zero() && self.timeout_count > 0)
            .then_some((self.timeout, self.timeout_count))
    }

    /// Whether `payload` is a reply to a probe.
    #[must_use]
    pub fn is_pong(&self, payload: &Payload) -> bool {
        self.pong_match
            .as_ref()
            .is_some_and(|pong_match| pong_match.matches(payload))
    }
}

/// Heartbeat probe.
#[non_exhaustive]
#[derive(Clone)]
pub enum Ping {
    /// The same message on every tick
    Static(Outgoing),
    /// A fresh message built on every tick
    Generated(Arc<dyn Fn() -> Outgoing + Send + Sync>),
}

impl Ping {
    pub fn generated<F>(build: F) -> Self
    where
        F: Fn() -> Outgoing + Send + Sync + 'static,
    {
        Self::Generated(Arc::new(build))
    }

    pub(crate) fn next(&self) -> Outgoing {
        match self {
            Self::Static(message) => message.clone(),
            Self::Generated(build) => build(),
        }
    }
}

impl Default for Ping {
    fn default() -> Self {
        Self::Static(Outgoing::from(DEFAULT_PING))
    }
}

impl fmt::Debug for Ping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(message) => f.debug_tuple("Static").field(message).finish(),
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

impl From<&str> for Ping {
    fn from(text: &str) -> Self {
        Self::Static(text.into())
    }
}

impl From<String> for Ping {
    fn from(text: String) -> Self {
        Self::Static(text.into())
    }
}

impl From<Outgoing> for Ping {
    fn from(message: Outgoing) -> Self {
        Self::Static(message)
    }
}

/// Rule recognizing heartbeat replies.
///
/// Matching runs against the parsed [`Payload`]. Patterns and literals only ever match
/// payloads that have a string form, see [`Payload::as_str`].
#[non_exhaustive]
#[derive(Clone)]
pub enum PongMatch {
    Predicate(Arc<dyn Fn(&Payload) -> bool + Send + Sync>),
    Pattern(Regex),
    Literal(String),
}

impl PongMatch {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn literal<S: Into<String>>(literal: S) -> Self {
        Self::Literal(literal.into())
    }

    #[must_use]
    pub fn matches(&self, payload: &Payload) -> bool {
        match self {
            Self::Predicate(predicate) => predicate(payload),
            Self::Pattern(regex) => payload.as_str().is_some_and(|text| regex.is_match(text)),
            Self::Literal(literal) => payload.as_str() == Some(literal.as_str()),
        }
    }
}

impl fmt::Debug for PongMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Literal(literal) => f.debug_tuple("Literal").field(literal).finish(),
        }
    }
}

impl From<&str> for PongMatch {
    fn from(literal: &str) -> Self {
        Self::literal(literal)
    }
}

impl From<String> for PongMatch {
    fn from(literal: String) -> Self {
        Self::Literal(literal)
    }
}

impl From<Regex> for PongMatch {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt
    #[builder(default = DEFAULT_RECONNECT_INTERVAL_DURATION)]
    pub interval: Duration,
    /// Maximum number of attempts per disconnection. `None` retries forever, `Some(0)`
    /// closes the socket on the first unexpected disconnect.
    pub retry_count: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&ReconnectConfig> for Constant {
    fn from(config: &ReconnectConfig) -> Self {
        Constant::new(config.interval)
    }
}
