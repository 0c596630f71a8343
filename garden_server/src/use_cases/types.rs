// Use-case level inputs/outputs for the presence task.

use std::collections::HashMap;

use garden_shared::{Creature, Point, User};
use tokio::sync::oneshot;

/// Commands flowing from connection handlers into the presence task.
#[derive(Debug)]
pub enum PresenceCommand {
    Connect {
        conn_id: u64,
        uid: String,
        creature_name: String,
        viewport: (f64, f64),
        /// Authoritative state at admission time, for the bootstrap send.
        reply: oneshot::Sender<ConnectSnapshot>,
    },
    Disconnect {
        conn_id: u64,
    },
    GardenTap {
        conn_id: u64,
        coords: Point,
    },
    Evolve {
        id: String,
    },
    AdminConnect {
        conn_id: u64,
    },
}

/// Snapshot returned to a connection right after admission.
#[derive(Debug, Clone)]
pub struct ConnectSnapshot {
    pub user: User,
    pub users: Vec<User>,
    pub creatures: HashMap<String, Creature>,
}

/// Updates produced by the presence task and fanned out to every
/// connection. Users and creatures travel as two independent messages;
/// receivers must tolerate either arriving first.
#[derive(Debug, Clone)]
pub enum PresenceUpdate {
    /// Full user set after a mutation.
    Users(Vec<User>),
    /// Changed creature records plus the full map for snapshot recovery.
    Creatures {
        changed: HashMap<String, Creature>,
        full: HashMap<String, Creature>,
    },
    /// An admin observer joined.
    AdminJoined,
    /// A creature evolved; clients run the evolve animation.
    Evolved { id: String },
}
