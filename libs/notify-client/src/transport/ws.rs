//! WebSocket transport backed by `tokio-tungstenite`.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use notify_common::protocol::{EventName, ReadyPayload, OP_DISPATCH};
use notify_common::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Channel, Handshake, Transport};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

/// `wss://` hubs need a process-wide rustls provider. Another crate may
/// have installed one already, which is fine.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

/// Connects to the hub over WebSocket, sending the token as
/// `Authorization: Bearer <token>` on the upgrade request.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<Handshake> {
        ensure_crypto_provider();

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Handshake(e.to_string()))?;

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Handshake("Invalid access token".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;

        let mut channel = WebSocketChannel { stream };

        // The hub's first frame must be READY.
        let ready = match channel.recv().await {
            Some(Ok(msg)) if msg.op == OP_DISPATCH && msg.t.as_deref() == Some(EventName::READY) => {
                serde_json::from_value::<ReadyPayload>(msg.d)?
            }
            Some(Ok(msg)) => {
                return Err(Error::Protocol(format!("expected READY, got op {}", msg.op)));
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Handshake("connection closed before READY".to_string())),
        };

        tracing::debug!(connection_id = %ready.connection_id, "hub handshake complete");

        Ok(Handshake {
            channel: Box::new(channel),
            connection_id: ready.connection_id,
            heartbeat_interval: Duration::from_millis(ready.heartbeat_interval),
        })
    }
}

/// Map an upgrade failure to the text a status indicator shows.
fn handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            Error::Handshake(reason)
        }
        other => Error::Handshake(other.to_string()),
    }
}

struct WebSocketChannel {
    stream: WsStream,
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(m) => m,
                Err(e) => return Some(Err(Error::Transport(e.to_string()))),
            };

            match msg {
                Message::Text(text) => {
                    return Some(
                        serde_json::from_str(text.as_str())
                            .map_err(|e| Error::Protocol(format!("invalid frame: {e}"))),
                    );
                }
                Message::Close(frame) => {
                    if let Some(frame) = frame {
                        tracing::debug!(code = u16::from(frame.code), reason = %frame.reason.as_str(), "hub closed connection");
                    }
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Binary(_) => {
                    tracing::debug!("ignoring binary frame");
                    continue;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}
