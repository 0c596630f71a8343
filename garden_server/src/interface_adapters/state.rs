use axum::extract::ws::Utf8Bytes;
use tokio::sync::{broadcast, mpsc, watch};

use crate::use_cases::PresenceCommand;

#[derive(Clone)]
pub struct AppState {
    // Intents flowing from connections into the presence task.
    pub command_tx: mpsc::Sender<PresenceCommand>,
    // Serialized presence events, shared across all connections.
    pub event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    // Latest serialized users snapshot for lag recovery.
    pub users_latest_tx: watch::Sender<Utf8Bytes>,
    // Latest serialized creatures snapshot for lag recovery.
    pub creatures_latest_tx: watch::Sender<Utf8Bytes>,
}
