//! Connect to a notification hub and print every notification as a toast.
//!
//! Configuration comes from the environment (see `ClientConfig::from_env`);
//! `NOTIFY_ACCESS_TOKEN` authenticates and `NOTIFY_GROUPS` is a
//! comma-separated list of groups joined on every (re)connect.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_client::consumer::{NotificationHistory, ToastSurface};
use notify_client::{
    Anonymous, AuthTokenProvider, ClientConfig, ConnectionManager, ConnectionState,
    NotificationDispatcher, TokenStore,
};

#[tokio::main]
async fn main() -> notify_client::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;

    let auth: Arc<dyn AuthTokenProvider> = match std::env::var("NOTIFY_ACCESS_TOKEN") {
        Ok(token) if !token.is_empty() => Arc::new(TokenStore::with_token(token)),
        _ => Arc::new(Anonymous),
    };

    let groups: Vec<String> = std::env::var("NOTIFY_GROUPS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect();

    let dispatcher = NotificationDispatcher::new();
    let toasts = ToastSurface::new().on_show(|toast| println!("{toast}"));
    let history = NotificationHistory::new();
    let _toast_sub = toasts.attach(&dispatcher);
    let _history_sub = history.attach(&dispatcher);

    tracing::info!(url = %config.url, groups = ?groups, "notify-listen starting");

    let manager = Arc::new(ConnectionManager::websocket(config, auth, dispatcher));
    let mut status = manager.watch_status();

    // Group membership does not survive a reconnect, so rejoin each time.
    let rejoin = {
        let manager = manager.clone();
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let current = status.borrow_and_update().clone();
                tracing::info!(status = %current, "connection status");
                if current.state != ConnectionState::Connected {
                    continue;
                }
                for group in &groups {
                    if let Err(e) = manager.join_group(group).await {
                        tracing::warn!(group = %group, error = %e, "failed to join group");
                    }
                }
            }
        })
    };

    manager.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }

    manager.stop().await;
    rejoin.abort();
    tracing::info!(received = history.len(), "notify-listen stopped");
    Ok(())
}
