// Authoritative registry of connected users, their gardens and creatures.
// Owned exclusively by the presence task; all methods are synchronous and
// appear atomic to every connection.

use std::collections::{BTreeSet, HashMap};

use garden_shared::{
    AnimatedPosition, AnimatedProperties, Appearance, Creature, CreatureKind, FillColor, Point,
    Rect, User,
};
use uuid::Uuid;

use crate::domain::ports::Clock;

/// Tunable registry rules. Named policy values, not inline arithmetic.
#[derive(Debug, Clone)]
pub struct RegistryPolicy {
    /// Spacing between garden origins on the placement grid.
    pub garden_pitch: f64,
    /// Columns in the row-major placement grid.
    pub grid_columns: usize,
    /// Fixed tween duration stamped on move transitions, in seconds.
    pub move_duration_secs: f64,
    /// How long a creature stays locked after an evolve trigger.
    pub evolve_lock_millis: u64,
    /// Highest appearance tier an evolve can reach.
    pub max_tier: u8,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            garden_pitch: 1000.0,
            grid_columns: 4,
            move_duration_secs: 2.0,
            evolve_lock_millis: 2_000,
            max_tier: 3,
        }
    }
}

/// Result of admitting a connection.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub user: User,
    /// Creatures created for this user.
    pub created: Vec<Creature>,
    /// Connection that was displaced because it held the same uid.
    pub replaced_conn: Option<u64>,
}

/// Result of a move intent.
#[derive(Debug, Clone)]
pub enum TapOutcome {
    /// Creatures that received a fresh transition, keyed by id.
    Moved(HashMap<String, Creature>),
    /// Unknown connection or nothing transit-eligible; silently dropped.
    Ignored,
}

/// Result of an evolve intent.
#[derive(Debug, Clone)]
pub enum EvolveOutcome {
    Evolved(Creature),
    /// Unknown id or already mid-evolution; duplicate triggers are no-ops.
    Ignored,
}

struct Occupant {
    user: User,
    creature_ids: Vec<String>,
    slot: usize,
}

struct CreatureRecord {
    creature: Creature,
    /// Epoch millis until which evolve intents are ignored.
    evolving_until: u64,
}

pub struct PresenceRegistry<C: Clock> {
    policy: RegistryPolicy,
    clock: C,
    connections: HashMap<u64, Occupant>,
    creatures: HashMap<String, CreatureRecord>,
    // Freed garden slots, reused lowest-first.
    free_slots: BTreeSet<usize>,
    next_slot: usize,
}

impl<C: Clock> PresenceRegistry<C> {
    pub fn new(policy: RegistryPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
            connections: HashMap::new(),
            creatures: HashMap::new(),
            free_slots: BTreeSet::new(),
            next_slot: 0,
        }
    }

    /// Admits a connection, allocating a garden section and spawning the
    /// user's creature. A second connect with a live uid displaces the
    /// earlier connection (last-write-wins).
    pub fn connect(
        &mut self,
        conn_id: u64,
        uid: &str,
        creature_name: &str,
        viewport: (f64, f64),
    ) -> ConnectOutcome {
        let replaced_conn = self
            .connections
            .iter()
            .find(|(existing, occ)| occ.user.uid == uid && **existing != conn_id)
            .map(|(existing, _)| *existing);
        if let Some(old) = replaced_conn {
            self.disconnect(old);
        }

        let slot = self.take_slot();
        let origin = self.slot_origin(slot);
        let garden = Rect::new(origin.x, origin.y, viewport.0, viewport.1);

        let user = User {
            uid: uid.to_string(),
            creature_name: creature_name.to_string(),
            garden_section: garden,
        };

        let creature = self.spawn_creature(uid, garden.center());
        let creature_ids = vec![creature.id.clone()];
        self.creatures.insert(
            creature.id.clone(),
            CreatureRecord {
                creature: creature.clone(),
                evolving_until: 0,
            },
        );

        self.connections.insert(
            conn_id,
            Occupant {
                user: user.clone(),
                creature_ids,
                slot,
            },
        );

        ConnectOutcome {
            user,
            created: vec![creature],
            replaced_conn,
        }
    }

    /// Removes a connection, its user record and its creatures, freeing
    /// the garden slot for reuse.
    pub fn disconnect(&mut self, conn_id: u64) -> bool {
        let Some(occ) = self.connections.remove(&conn_id) else {
            return false;
        };
        for id in &occ.creature_ids {
            self.creatures.remove(id);
        }
        self.free_slots.insert(occ.slot);
        true
    }

    /// Move intent: resolves the garden-local tap into world coordinates
    /// and stamps a fresh transition on every transit-eligible creature
    /// the user owns. Creatures mid-evolution are skipped.
    pub fn apply_garden_tap(&mut self, conn_id: u64, local: Point) -> TapOutcome {
        let Some(occ) = self.connections.get(&conn_id) else {
            return TapOutcome::Ignored;
        };
        let garden = occ.user.garden_section;
        let target = Point::new(garden.x + local.x, garden.y + local.y);
        let now = self.clock.now_epoch_millis();
        let duration = self.policy.move_duration_secs;

        let mut changed = HashMap::new();
        for id in occ.creature_ids.clone() {
            let Some(record) = self.creatures.get_mut(&id) else {
                continue;
            };
            if record.evolving_until > now {
                continue;
            }
            let from = record.creature.animated_properties.position.to;
            record.creature.animated_properties.position = AnimatedPosition {
                from,
                to: target,
                teleport: from.midpoint(target),
                duration,
            };
            changed.insert(id, record.creature.clone());
        }

        if changed.is_empty() {
            TapOutcome::Ignored
        } else {
            TapOutcome::Moved(changed)
        }
    }

    /// Evolve intent: bumps the appearance tier once. Unknown ids and
    /// creatures already mid-evolution are no-ops so duplicate triggers
    /// from concurrent observers stay idempotent.
    pub fn apply_evolve(&mut self, id: &str) -> EvolveOutcome {
        let now = self.clock.now_epoch_millis();
        let Some(record) = self.creatures.get_mut(id) else {
            return EvolveOutcome::Ignored;
        };
        if record.evolving_until > now {
            return EvolveOutcome::Ignored;
        }

        let appearance = &mut record.creature.appearance;
        appearance.tier = appearance.tier.saturating_add(1).min(self.policy.max_tier);
        appearance.scale = 1.0 + f64::from(appearance.tier) * 0.1;
        record.evolving_until = now + self.policy.evolve_lock_millis;

        EvolveOutcome::Evolved(record.creature.clone())
    }

    pub fn users_snapshot(&self) -> Vec<User> {
        self.connections.values().map(|o| o.user.clone()).collect()
    }

    pub fn creatures_snapshot(&self) -> HashMap<String, Creature> {
        self.creatures
            .iter()
            .map(|(id, r)| (id.clone(), r.creature.clone()))
            .collect()
    }

    fn take_slot(&mut self) -> usize {
        if let Some(slot) = self.free_slots.pop_first() {
            slot
        } else {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        }
    }

    fn slot_origin(&self, slot: usize) -> Point {
        let col = slot % self.policy.grid_columns;
        let row = slot / self.policy.grid_columns;
        Point::new(
            col as f64 * self.policy.garden_pitch,
            row as f64 * self.policy.garden_pitch,
        )
    }

    fn spawn_creature(&self, owner_uid: &str, at: Point) -> Creature {
        let kind = kind_for_uid(owner_uid);
        Creature {
            id: Uuid::new_v4().to_string(),
            owner_uid: owner_uid.to_string(),
            appearance: Appearance {
                creature_type: kind,
                fill_color: kind_color(kind),
                radius: kind.base_radius(),
                scale: 1.0,
                tier: 0,
            },
            animated_properties: AnimatedProperties {
                position: AnimatedPosition::at_rest(at),
            },
        }
    }
}

/// Stable kind assignment so a uid keeps its creature kind across
/// reconnects without extra handshake fields.
fn kind_for_uid(uid: &str) -> CreatureKind {
    let hash = uid
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
    CreatureKind::ALL[(hash % 3) as usize]
}

fn kind_color(kind: CreatureKind) -> FillColor {
    match kind {
        CreatureKind::Moss => FillColor {
            r: 0.33,
            g: 0.60,
            b: 0.36,
        },
        CreatureKind::Lichen => FillColor {
            r: 0.61,
            g: 0.68,
            b: 0.54,
        },
        CreatureKind::Mushroom => FillColor {
            r: 0.76,
            g: 0.63,
            b: 0.47,
        },
    }
}
