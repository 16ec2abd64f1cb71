use std::time::Duration;

use crate::error::{Error, Result};
use crate::reconnect::{ReconnectionPolicy, DEFAULT_HANDSHAKE_RETRY_DELAY};

/// Timeout for the hub's READY frame after the upgrade succeeds.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub endpoint, e.g. `http://localhost:5080/notificationHub`.
    /// `http(s)://` is rewritten to `ws(s)://` when connecting.
    pub url: String,
    /// Retry failed handshakes and resume dropped sessions automatically.
    pub automatic_reconnect: bool,
    /// Fixed delay before retrying a failed handshake.
    pub handshake_retry_delay: Duration,
    pub handshake_timeout: Duration,
    /// Backoff for sessions that drop after being established.
    pub reconnect_policy: ReconnectionPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            automatic_reconnect: true,
            handshake_retry_delay: DEFAULT_HANDSHAKE_RETRY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect_policy: ReconnectionPolicy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `NOTIFY_HUB_URL` is required; `NOTIFY_AUTOMATIC_RECONNECT` and
    /// `NOTIFY_HANDSHAKE_RETRY_MS` are optional.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("NOTIFY_HUB_URL")
            .map_err(|_| Error::Config("NOTIFY_HUB_URL env var is required".to_string()))?;

        let mut config = Self::new(url);
        if let Some(enabled) = std::env::var("NOTIFY_AUTOMATIC_RECONNECT")
            .ok()
            .and_then(|v| parse_bool(&v))
        {
            config.automatic_reconnect = enabled;
        }
        if let Some(ms) = std::env::var("NOTIFY_HANDSHAKE_RETRY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.handshake_retry_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn automatic_reconnect(mut self, enabled: bool) -> Self {
        self.automatic_reconnect = enabled;
        self
    }

    pub fn handshake_retry_delay(mut self, delay: Duration) -> Self {
        self.handshake_retry_delay = delay;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// The endpoint as a WebSocket URL.
    pub fn ws_url(&self) -> Result<String> {
        let url = self.url.trim();
        if let Some(rest) = url.strip_prefix("http://") {
            Ok(format!("ws://{rest}"))
        } else if let Some(rest) = url.strip_prefix("https://") {
            Ok(format!("wss://{rest}"))
        } else if url.starts_with("ws://") || url.starts_with("wss://") {
            Ok(url.to_string())
        } else {
            Err(Error::Config(format!("unsupported hub url scheme: '{url}'")))
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
