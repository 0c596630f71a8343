use garden_shared::{Creature, Rect, User, decode_creatures};
use std::collections::HashMap;
use tracing::debug;

/// Authoritative-state mirror on the client. Server events replace or
/// patch the two keyed maps; everything the renderer sees derives from
/// here. Applying the same event twice converges to the same state.
#[derive(Debug)]
pub struct ReconciliationCache {
    self_uid: String,
    viewport: (f64, f64),
    online_users: HashMap<String, User>,
    online_creatures: HashMap<String, Creature>,
    self_garden: Option<Rect>,
    users_seen: bool,
    creatures_seen: bool,
}

impl ReconciliationCache {
    pub fn new(self_uid: &str, viewport: (f64, f64)) -> Self {
        Self {
            self_uid: self_uid.to_string(),
            viewport,
            online_users: HashMap::new(),
            online_creatures: HashMap::new(),
            self_garden: None,
            users_seen: false,
            creatures_seen: false,
        }
    }

    /// Full users snapshot: replaces the map and re-derives the viewer's
    /// own garden, with the local viewport extent overriding whatever
    /// the server recorded at handshake time.
    pub fn on_users_update(&mut self, users: Vec<User>) {
        self.online_users = users.into_iter().map(|u| (u.uid.clone(), u)).collect();
        self.self_garden = self.online_users.get(&self.self_uid).map(|own| {
            let mut garden = own.garden_section;
            garden.width = self.viewport.0;
            garden.height = self.viewport.1;
            garden
        });
        self.users_seen = true;
        self.filter_orphans();
    }

    /// Full creatures snapshot, string-encoded on the wire. Malformed or
    /// absent payloads reconcile to an empty set for this cycle.
    pub fn on_creatures_snapshot(&mut self, encoded: &str) {
        self.online_creatures = decode_creatures(encoded);
        self.creatures_seen = true;
        self.filter_orphans();
    }

    /// Incremental patch: upserts individual creature records.
    pub fn on_creatures_update(&mut self, changed: HashMap<String, Creature>) {
        self.online_creatures.extend(changed);
        self.filter_orphans();
    }

    // Snapshot kinds arrive independently, so either map may briefly
    // reference the other's missing entries. A creature with no owner in
    // the user map is never shown.
    fn filter_orphans(&mut self) {
        let users = &self.online_users;
        let before = self.online_creatures.len();
        self.online_creatures
            .retain(|_, creature| users.contains_key(&creature.owner_uid));
        let dropped = before - self.online_creatures.len();
        if dropped > 0 {
            debug!(dropped, "filtered orphaned creatures");
        }
    }

    /// Both snapshot kinds have arrived at least once.
    pub fn is_ready(&self) -> bool {
        self.users_seen && self.creatures_seen
    }

    /// Clears all state and re-arms the readiness gate. The next connect
    /// behaves as a fresh session.
    pub fn reset(&mut self) {
        self.online_users.clear();
        self.online_creatures.clear();
        self.self_garden = None;
        self.users_seen = false;
        self.creatures_seen = false;
    }

    pub fn self_uid(&self) -> &str {
        &self.self_uid
    }

    pub fn self_garden(&self) -> Option<Rect> {
        self.self_garden
    }

    pub fn users(&self) -> &HashMap<String, User> {
        &self.online_users
    }

    pub fn creatures(&self) -> &HashMap<String, Creature> {
        &self.online_creatures
    }

    pub fn owner_garden(&self, creature: &Creature) -> Option<Rect> {
        self.online_users
            .get(&creature.owner_uid)
            .map(|u| u.garden_section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_shared::{
        AnimatedPosition, AnimatedProperties, Appearance, CreatureKind, FillColor, Point,
        encode_creatures,
    };

    fn user(uid: &str, x: f64) -> User {
        User {
            uid: uid.to_string(),
            creature_name: format!("{uid}-creature"),
            garden_section: Rect::new(x, 0.0, 800.0, 600.0),
        }
    }

    fn creature(id: &str, owner: &str) -> Creature {
        Creature {
            id: id.to_string(),
            owner_uid: owner.to_string(),
            appearance: Appearance {
                creature_type: CreatureKind::Moss,
                fill_color: FillColor {
                    r: 0.2,
                    g: 0.6,
                    b: 0.3,
                },
                radius: 20.0,
                scale: 1.0,
                tier: 0,
            },
            animated_properties: AnimatedProperties {
                position: AnimatedPosition::at_rest(Point { x: 10.0, y: 10.0 }),
            },
        }
    }

    fn snapshot(creatures: &[Creature]) -> String {
        let map: HashMap<String, Creature> = creatures
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();
        encode_creatures(&map)
    }

    #[test]
    fn when_the_same_snapshots_arrive_twice_then_state_is_unchanged() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        let users = vec![user("a", 0.0), user("b", 1000.0)];
        let encoded = snapshot(&[creature("c1", "a"), creature("c2", "b")]);

        cache.on_users_update(users.clone());
        cache.on_creatures_snapshot(&encoded);
        let users_once = cache.users().clone();
        let creatures_once = cache.creatures().clone();

        cache.on_users_update(users);
        cache.on_creatures_snapshot(&encoded);

        assert_eq!(cache.users(), &users_once);
        assert_eq!(cache.creatures(), &creatures_once);
    }

    #[test]
    fn when_creatures_arrive_before_users_then_orphans_are_still_filtered() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        cache.on_creatures_snapshot(&snapshot(&[creature("c1", "a"), creature("gone", "ghost")]));
        assert!(cache.creatures().is_empty());

        cache.on_users_update(vec![user("a", 0.0)]);
        cache.on_creatures_snapshot(&snapshot(&[creature("c1", "a"), creature("gone", "ghost")]));
        assert_eq!(cache.creatures().len(), 1);
        assert!(cache.creatures().contains_key("c1"));
    }

    #[test]
    fn when_a_user_leaves_then_their_creatures_drop_on_the_next_users_update() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        cache.on_users_update(vec![user("a", 0.0), user("b", 1000.0)]);
        cache.on_creatures_snapshot(&snapshot(&[creature("c1", "a"), creature("c2", "b")]));
        assert_eq!(cache.creatures().len(), 2);

        cache.on_users_update(vec![user("a", 0.0)]);
        assert_eq!(cache.creatures().len(), 1);
        assert!(!cache.creatures().contains_key("c2"));
    }

    #[test]
    fn when_only_one_snapshot_kind_arrived_then_cache_is_not_ready() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        assert!(!cache.is_ready());
        cache.on_users_update(vec![user("a", 0.0)]);
        assert!(!cache.is_ready());
        cache.on_creatures_snapshot(&snapshot(&[]));
        assert!(cache.is_ready());
    }

    #[test]
    fn when_reset_then_the_readiness_gate_is_rearmed() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        cache.on_users_update(vec![user("a", 0.0)]);
        cache.on_creatures_snapshot(&snapshot(&[creature("c1", "a")]));
        assert!(cache.is_ready());

        cache.reset();
        assert!(!cache.is_ready());
        assert!(cache.users().is_empty());
        assert!(cache.creatures().is_empty());
        assert!(cache.self_garden().is_none());
    }

    #[test]
    fn when_self_is_present_then_the_local_viewport_overrides_the_garden_extent() {
        let mut cache = ReconciliationCache::new("a", (1920.0, 1080.0));
        cache.on_users_update(vec![user("a", 3000.0)]);
        let garden = cache.self_garden().expect("self garden");
        assert_eq!(garden.x, 3000.0);
        assert_eq!(garden.width, 1920.0);
        assert_eq!(garden.height, 1080.0);
    }

    #[test]
    fn when_the_snapshot_is_malformed_then_it_reconciles_to_empty() {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        cache.on_users_update(vec![user("a", 0.0)]);
        cache.on_creatures_snapshot("{not json");
        assert!(cache.creatures().is_empty());
        assert!(cache.is_ready());
    }
}
