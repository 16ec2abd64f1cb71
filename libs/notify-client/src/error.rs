use thiserror::Error;

/// Errors surfaced by the notification client.
///
/// `start()`/`stop()` never return these; they are recorded on the manager's
/// status instead. Outbound operations (`send`, `join_group`, `leave_group`)
/// return them directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection not established")]
    NotConnected,

    /// The handshake was rejected or could not be completed. The message is
    /// what a status indicator shows (e.g. `Unauthorized`).
    #[error("{0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection lost")]
    ConnectionLost,

    /// The hub completed an invocation with an error.
    #[error("rejected by hub: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
