//! End-to-end: the notification client against a live hub.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notify_client::consumer::{NotificationHistory, ToastIcon, ToastSurface};
use notify_client::{
    Anonymous, AuthTokenProvider, ClientConfig, ConnectionManager, ConnectionState,
    NotificationContent, NotificationDispatcher, StaticToken,
};
use tokio::time;

fn client(addr: SocketAddr, auth: impl AuthTokenProvider) -> (ConnectionManager, NotificationDispatcher) {
    let config = ClientConfig::new(format!("http://{addr}/notificationHub"));
    let dispatcher = NotificationDispatcher::new();
    let manager = ConnectionManager::websocket(config, Arc::new(auth), dispatcher.clone());
    (manager, dispatcher)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn client_connects_and_receives_announcement() {
    let state = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let (manager, dispatcher) = client(addr, StaticToken::new(common::mint_token("usr_admin")));
    let toasts = ToastSurface::new();
    let history = NotificationHistory::new();
    let _toast_sub = toasts.attach(&dispatcher);
    let _history_sub = history.attach(&dispatcher);

    manager.start().await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    let connection_id = manager.connection_id().unwrap();
    assert!(state.connections.get(&connection_id).is_some());

    manager.join_group("admins").await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/notification/announcement"))
        .bearer_auth(common::mint_admin_token("usr_ops"))
        .json(&serde_json::json!({ "title": "Stocktake", "message": "Tonight", "group": "admins" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["recipients"], 1);

    wait_until(|| history.len() == 1).await;
    assert_eq!(history.entries()[0].content.kind, "announcement");
    let toast = &toasts.visible()[0];
    assert_eq!(toast.title, "Stocktake");
    assert_eq!(toast.icon, ToastIcon::Info);

    manager.stop().await;
    wait_until(|| state.connections.is_empty()).await;
}

#[tokio::test]
async fn client_without_token_reports_unauthorized() {
    let addr = common::start_server(common::test_state()).await;
    let (manager, _) = client(addr, Anonymous);

    manager.start().await;

    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.error.as_deref(), Some("Unauthorized"));
    assert!(matches!(
        manager.join_group("admins").await,
        Err(notify_client::Error::NotConnected)
    ));

    manager.stop().await;
}

#[tokio::test]
async fn client_send_reaches_other_clients() {
    let addr = common::start_server(common::test_state()).await;

    let (sender, _) = client(addr, StaticToken::new(common::mint_token("usr_1")));
    let (receiver, receiver_dispatcher) = client(addr, StaticToken::new(common::mint_token("usr_2")));
    let history = NotificationHistory::new();
    let _sub = history.attach(&receiver_dispatcher);

    sender.start().await;
    receiver.start().await;

    sender
        .send(&NotificationContent::new("Reserved", "2 items held", "stock_reserved"))
        .await
        .unwrap();

    wait_until(|| history.len() == 1).await;
    assert_eq!(history.entries()[0].content.title, "Reserved");

    sender.stop().await;
    receiver.stop().await;
}

#[tokio::test]
async fn client_stays_connected_across_heartbeats() {
    let state = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let (manager, _) = client(addr, StaticToken::new(common::mint_token("usr_1")));

    manager.start().await;
    // Several hub heartbeat deadlines (1.5s each).
    time::sleep(Duration::from_millis(4_000)).await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(state.connections.len(), 1);
    manager.stop().await;
}
