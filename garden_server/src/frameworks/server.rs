// Framework bootstrap for the garden server runtime.

use crate::domain::SystemClock;
use crate::frameworks::config;
use crate::interface_adapters::net::{presence_event_serializer, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::presence_task;

use axum::extract::ws::Utf8Bytes;
use axum::{Router, routing::get};
use std::io::Result;
use std::net::SocketAddr;
use tokio::sync::{broadcast, mpsc, watch};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state();

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> AppState {
    let (command_tx, command_rx) = mpsc::channel(config::COMMAND_CHANNEL_CAPACITY);
    let (updates_tx, updates_rx) = broadcast::channel(config::PRESENCE_BROADCAST_CAPACITY);
    let (event_bytes_tx, _) = broadcast::channel(config::EVENT_BYTES_CAPACITY);
    let (users_latest_tx, _) = watch::channel(Utf8Bytes::from(""));
    let (creatures_latest_tx, _) = watch::channel(Utf8Bytes::from(""));

    // Single authoritative presence task; connections only talk to it
    // through the command channel.
    let policy = config::registry_policy();
    tokio::spawn(presence_task(
        policy,
        SystemClock,
        command_rx,
        updates_tx,
    ));

    tokio::spawn(presence_event_serializer(
        updates_rx,
        event_bytes_tx.clone(),
        users_latest_tx.clone(),
        creatures_latest_tx.clone(),
    ));

    AppState {
        command_tx,
        event_bytes_tx,
        users_latest_tx,
        creatures_latest_tx,
    }
}
