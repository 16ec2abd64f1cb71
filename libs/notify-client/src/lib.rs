//! Client side of the storefront's real-time notification channel.
//!
//! Wiring is explicit: build a [`NotificationDispatcher`], attach consumers
//! to it, and hand it to a [`ConnectionManager`] that feeds it.

pub mod auth;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod reconnect;
pub mod transport;

pub use auth::{Anonymous, AuthTokenProvider, StaticToken, TokenStore};
pub use config::ClientConfig;
pub use dispatcher::{NotificationDispatcher, Subscription};
pub use error::{Error, Result};
pub use manager::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use notify_common::NotificationContent;
pub use reconnect::ReconnectionPolicy;
