use std::net::SocketAddr;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_hub::config::Config;
use notify_hub::AppState;

#[tokio::main]
async fn main() {
    // .env is optional; variables may come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        issuer = ?config.jwt_issuer,
        "notify-hub configured"
    );

    let app = notify_hub::app(AppState::new(config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "notify-hub listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("notify-hub shutting down");
}
