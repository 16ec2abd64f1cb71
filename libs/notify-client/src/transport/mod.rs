//! The push channel as seen by the connection manager.
//!
//! A [`Transport`] performs the authenticated handshake and hands back a
//! [`Channel`] that carries protocol frames until it closes. The manager owns
//! all retry and reconnect decisions; transports never retry on their own.

pub mod ws;

use std::time::Duration;

use async_trait::async_trait;
use notify_common::{ClientMessage, ServerMessage};

use crate::error::Result;

pub use ws::WebSocketTransport;

/// A completed handshake.
pub struct Handshake {
    pub channel: Box<dyn Channel>,
    /// Hub-assigned identifier of this physical connection.
    pub connection_id: String,
    /// How often the hub expects a HEARTBEAT.
    pub heartbeat_interval: Duration,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("connection_id", &self.connection_id)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a channel to `url`, authenticating with `token` when present.
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<Handshake>;
}

/// One live, authenticated connection.
#[async_trait]
pub trait Channel: Send + 'static {
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Next frame from the hub, or `None` once the connection has closed.
    async fn recv(&mut self) -> Option<Result<ServerMessage>>;

    async fn close(&mut self) -> Result<()>;
}
