// Wire protocol for the persistent per-client message channel. Events are
// tagged by name with a `data` payload, mirroring the original transport.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Creature, Point, User};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full user snapshot; replaces the client's local map.
    #[serde(rename = "usersUpdate")]
    UsersUpdate(Vec<User>),
    /// Full creature snapshot, JSON-encoded as a string (transport quirk
    /// preserved from the original system; see `encode_creatures`).
    #[serde(rename = "creatures")]
    Creatures(String),
    /// Incremental patch of changed creature records.
    #[serde(rename = "creaturesUpdate")]
    CreaturesUpdate(HashMap<String, Creature>),
    /// An admin observer joined; non-admin clients reset their view.
    #[serde(rename = "adminConnectBroadcast")]
    AdminConnectBroadcast {},
    /// Triggers the evolve animation for one creature on every client.
    #[serde(rename = "creatureEvolveBroadcast")]
    CreatureEvolveBroadcast { id: String },
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Sent once, immediately after connect, by admin-designated clients.
    #[serde(rename = "adminConnect")]
    AdminConnect {},
    /// Move intent in garden-local coordinates.
    #[serde(rename = "gardenTap")]
    GardenTap(Point),
    /// Evolve intent for one creature.
    #[serde(rename = "creatureEvolve")]
    CreatureEvolve { id: String },
}

/// Encodes a creature map into the string-encoded snapshot payload.
pub fn encode_creatures(creatures: &HashMap<String, Creature>) -> String {
    serde_json::to_string(creatures).unwrap_or_else(|_| "{}".to_string())
}

/// Decodes a string-encoded creature snapshot. Malformed or partial
/// payloads reconcile to "no creatures" for the cycle rather than erroring.
pub fn decode_creatures(payload: &str) -> HashMap<String, Creature> {
    serde_json::from_str(payload).unwrap_or_default()
}
