use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::domain::{
    Clock, ConnectOutcome, EvolveOutcome, PresenceRegistry, RegistryPolicy, TapOutcome,
};
use crate::use_cases::types::{ConnectSnapshot, PresenceCommand, PresenceUpdate};

/// The single authoritative presence loop. All registry mutations happen
/// here, one command at a time, so they appear atomic to every
/// connection; fan-out ordering between different users' intents is
/// last-write-wins by arrival.
pub async fn presence_task<C: Clock>(
    policy: RegistryPolicy,
    clock: C,
    mut command_rx: mpsc::Receiver<PresenceCommand>,
    updates_tx: broadcast::Sender<PresenceUpdate>,
) {
    let mut registry = PresenceRegistry::new(policy, clock);

    while let Some(command) = command_rx.recv().await {
        match command {
            PresenceCommand::Connect {
                conn_id,
                uid,
                creature_name,
                viewport,
                reply,
            } => {
                let ConnectOutcome {
                    user,
                    created,
                    replaced_conn,
                } = registry.connect(conn_id, &uid, &creature_name, viewport);
                if let Some(old) = replaced_conn {
                    info!(conn_id, old_conn = old, uid = %uid, "connection replaced");
                }
                info!(conn_id, uid = %user.uid, "user connected");

                let snapshot = ConnectSnapshot {
                    user,
                    users: registry.users_snapshot(),
                    creatures: registry.creatures_snapshot(),
                };
                // The handler may have gone away already; nothing to undo,
                // its Disconnect will clean the registry up.
                let _ = reply.send(snapshot);

                let changed = created
                    .into_iter()
                    .map(|c| (c.id.clone(), c))
                    .collect::<HashMap<_, _>>();
                publish_presence(&registry, &updates_tx, changed);
            }
            PresenceCommand::Disconnect { conn_id } => {
                if registry.disconnect(conn_id) {
                    info!(conn_id, "user disconnected");
                    // Removals carry no creature delta; clients drop
                    // orphans from the fresh user set.
                    publish_presence(&registry, &updates_tx, HashMap::new());
                }
            }
            PresenceCommand::GardenTap { conn_id, coords } => {
                match registry.apply_garden_tap(conn_id, coords) {
                    TapOutcome::Moved(changed) => {
                        debug!(conn_id, moved = changed.len(), "garden tap applied");
                        publish_creatures(&registry, &updates_tx, changed);
                    }
                    TapOutcome::Ignored => {
                        debug!(conn_id, "garden tap ignored");
                    }
                }
            }
            PresenceCommand::Evolve { id } => match registry.apply_evolve(&id) {
                EvolveOutcome::Evolved(creature) => {
                    info!(id = %id, tier = creature.appearance.tier, "creature evolved");
                    let changed = HashMap::from([(id.clone(), creature)]);
                    publish_creatures(&registry, &updates_tx, changed);
                    let _ = updates_tx.send(PresenceUpdate::Evolved { id });
                }
                EvolveOutcome::Ignored => {
                    debug!(id = %id, "evolve ignored");
                }
            },
            PresenceCommand::AdminConnect { conn_id } => {
                info!(conn_id, "admin observer joined");
                let _ = updates_tx.send(PresenceUpdate::AdminJoined);
            }
        }
    }

    debug!("command channel closed; presence task exiting");
}

fn publish_presence<C: Clock>(
    registry: &PresenceRegistry<C>,
    updates_tx: &broadcast::Sender<PresenceUpdate>,
    changed: HashMap<String, garden_shared::Creature>,
) {
    // Two independently delivered messages by design; clients must
    // tolerate either order.
    let _ = updates_tx.send(PresenceUpdate::Users(registry.users_snapshot()));
    let _ = updates_tx.send(PresenceUpdate::Creatures {
        changed,
        full: registry.creatures_snapshot(),
    });
}

fn publish_creatures<C: Clock>(
    registry: &PresenceRegistry<C>,
    updates_tx: &broadcast::Sender<PresenceUpdate>,
    changed: HashMap<String, garden_shared::Creature>,
) {
    let _ = updates_tx.send(PresenceUpdate::Creatures {
        changed,
        full: registry.creatures_snapshot(),
    });
}
