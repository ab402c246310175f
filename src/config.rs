use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Default WebSocket port of the speaker control API
pub const DEFAULT_WS_PORT: u16 = 8768;

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
const DEFAULT_UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Configuration for a [`Session`](crate::Session)
///
/// Only the host is required. Everything else defaults to what the speakers
/// expect. Durations deserialize from a number of seconds.
///
/// ```
/// use dutchdutch_8c::SessionConfig;
///
/// let config: SessionConfig = serde_json::from_str(r#"{"host": "192.168.1.50"}"#).unwrap();
/// assert_eq!(config.ws_port, 8768);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Address of either speaker of the pair
    pub host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port used before the master's own port is known
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    #[serde(default = "default_probe_timeout", deserialize_with = "secs")]
    pub probe_timeout: Duration,

    /// Ping interval; the socket is dropped when a pong is overdue by half of it
    #[serde(default = "default_heartbeat", deserialize_with = "secs")]
    pub heartbeat: Duration,

    /// Upper bound for correlated bootstrap reads; `None` relies on the heartbeat
    #[serde(default, deserialize_with = "opt_secs")]
    pub request_timeout: Option<Duration>,

    /// Buffer size of the state update broadcast channel
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,
}

impl SessionConfig {
    /// Configuration with defaults for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http_port: DEFAULT_HTTP_PORT,
            ws_port: DEFAULT_WS_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
            request_timeout: None,
            update_channel_capacity: DEFAULT_UPDATE_CHANNEL_CAPACITY,
        }
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = port;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// URL of the liveness probe
    pub fn probe_url(&self) -> String {
        format!("http://{}:{}/clerkip.js", self.host, self.http_port)
    }

    /// WebSocket URL used before the master is resolved
    pub fn default_ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.ws_port)
    }
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_ws_port() -> u16 {
    DEFAULT_WS_PORT
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_heartbeat() -> Duration {
    DEFAULT_HEARTBEAT
}

fn default_update_channel_capacity() -> usize {
    DEFAULT_UPDATE_CHANNEL_CAPACITY
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

fn opt_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}
