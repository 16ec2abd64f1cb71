#![allow(dead_code)]

use std::net::SocketAddr;

use notify_hub::auth::tokens::{self, ADMIN_ROLE};
use notify_hub::config::Config;
use notify_hub::AppState;

pub const TEST_SECRET: &str = "notify-hub-test-secret";

/// Build a test AppState. Heartbeats are short so timeouts are quick to hit.
pub fn test_state() -> AppState {
    let mut config = Config::with_secret(TEST_SECRET);
    config.heartbeat_interval_ms = 1_000;
    AppState::new(config)
}

pub fn mint_token(user_id: &str) -> String {
    tokens::mint_access_token(TEST_SECRET, None, user_id, &[]).expect("mint test token")
}

pub fn mint_token_with_roles(user_id: &str, roles: &[&str]) -> String {
    tokens::mint_access_token(TEST_SECRET, None, user_id, roles).expect("mint role token")
}

pub fn mint_admin_token(user_id: &str) -> String {
    tokens::mint_access_token(TEST_SECRET, None, user_id, &[ADMIN_ROLE])
        .expect("mint admin token")
}

/// Start an actual TCP server. The server runs in the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = notify_hub::app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}
