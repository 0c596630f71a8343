use crate::cache::ReconciliationCache;
use crate::culling::CullPolicy;
use crate::interpolator::{Motion, MotionEvent};
use garden_shared::User;
use std::collections::HashMap;
use tracing::debug;

/// The culled, animated slice of the world the renderer draws.
///
/// Re-derived from the cache after every reconciliation pass: creatures
/// entering the interest set get a fresh [`Motion`], creatures leaving
/// it drop theirs, and changed movement targets restart the animation.
#[derive(Debug)]
pub struct WorldView {
    cull: CullPolicy,
    motions: HashMap<String, Motion>,
}

impl WorldView {
    pub fn new(admin: bool) -> Self {
        Self {
            cull: if admin {
                CullPolicy::admin()
            } else {
                CullPolicy::default()
            },
            motions: HashMap::new(),
        }
    }

    /// Rebuilds the interest set from the current cache contents.
    pub fn refresh(&mut self, cache: &ReconciliationCache) {
        let Some(own_garden) = cache.self_garden() else {
            // Nothing to anchor culling on yet.
            self.motions.clear();
            return;
        };

        let mut dropped = 0usize;
        self.motions.retain(|id, _| {
            let keep = cache
                .creatures()
                .get(id)
                .and_then(|c| cache.owner_garden(c))
                .is_some_and(|garden| self.cull.is_interested(&own_garden, &garden));
            if !keep {
                dropped += 1;
            }
            keep
        });
        if dropped > 0 {
            debug!(dropped, "creatures left the interest set");
        }

        for (id, creature) in cache.creatures() {
            let Some(garden) = cache.owner_garden(creature) else {
                continue;
            };
            if !self.cull.is_interested(&own_garden, &garden) {
                continue;
            }
            let target = creature.animated_properties.position;
            match self.motions.get_mut(id) {
                Some(motion) => {
                    if *motion.target() != target {
                        motion.retarget(target);
                    }
                }
                None => {
                    let mut motion = Motion::new(target);
                    motion.start_growth(creature.appearance.creature_type.growth_secs());
                    self.motions.insert(id.clone(), motion);
                }
            }
        }
    }

    /// Users whose gardens fall inside the interest band.
    pub fn visible_users<'a>(&self, cache: &'a ReconciliationCache) -> Vec<&'a User> {
        let Some(own_garden) = cache.self_garden() else {
            return Vec::new();
        };
        cache
            .users()
            .values()
            .filter(|u| self.cull.is_interested(&own_garden, &u.garden_section))
            .collect()
    }

    /// Advances every live animation; returns completions keyed by
    /// creature id.
    pub fn tick(&mut self, dt: f64) -> Vec<(String, MotionEvent)> {
        let mut events = Vec::new();
        for (id, motion) in &mut self.motions {
            if let Some(event) = motion.tick(dt) {
                events.push((id.clone(), event));
            }
        }
        events
    }

    /// Evolve broadcast for a creature outside the interest set (or long
    /// gone) is a no-op.
    pub fn on_evolve_broadcast(&mut self, id: &str) {
        if let Some(motion) = self.motions.get_mut(id) {
            motion.trigger_evolve();
        }
    }

    pub fn motion(&self, id: &str) -> Option<&Motion> {
        self.motions.get(id)
    }

    pub fn visible_creature_ids(&self) -> Vec<&str> {
        self.motions.keys().map(String::as_str).collect()
    }

    pub fn reset(&mut self) {
        self.motions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_shared::{
        AnimatedPosition, AnimatedProperties, Appearance, Creature, CreatureKind, FillColor,
        Point, Rect, User,
    };
    use std::collections::HashMap;

    fn user(uid: &str, x: f64) -> User {
        User {
            uid: uid.to_string(),
            creature_name: format!("{uid}-creature"),
            garden_section: Rect::new(x, 0.0, 800.0, 600.0),
        }
    }

    fn creature_at(id: &str, owner: &str, position: Point) -> Creature {
        Creature {
            id: id.to_string(),
            owner_uid: owner.to_string(),
            appearance: Appearance {
                creature_type: CreatureKind::Lichen,
                fill_color: FillColor {
                    r: 0.5,
                    g: 0.5,
                    b: 0.2,
                },
                radius: 20.0,
                scale: 1.0,
                tier: 0,
            },
            animated_properties: AnimatedProperties {
                position: AnimatedPosition::at_rest(position),
            },
        }
    }

    fn populated_cache() -> ReconciliationCache {
        let mut cache = ReconciliationCache::new("a", (800.0, 600.0));
        cache.on_users_update(vec![user("a", 0.0), user("b", 2000.0)]);
        let mut creatures = HashMap::new();
        creatures.insert(
            "ca".to_string(),
            creature_at("ca", "a", Point { x: 100.0, y: 100.0 }),
        );
        creatures.insert(
            "cb".to_string(),
            creature_at("cb", "b", Point { x: 2100.0, y: 100.0 }),
        );
        cache.on_creatures_update(creatures);
        cache
    }

    #[test]
    fn when_a_neighbor_is_far_away_then_their_garden_is_not_visible() {
        let cache = populated_cache();
        let mut view = WorldView::new(false);
        view.refresh(&cache);

        let visible: Vec<_> = view.visible_users(&cache).iter().map(|u| &u.uid).collect();
        assert!(visible.contains(&&"a".to_string()));
        assert!(!visible.contains(&&"b".to_string()));
        assert_eq!(view.visible_creature_ids(), vec!["ca"]);
    }

    #[test]
    fn when_the_viewer_is_admin_then_the_whole_world_is_visible() {
        let cache = populated_cache();
        let mut view = WorldView::new(true);
        view.refresh(&cache);

        assert_eq!(view.visible_users(&cache).len(), 2);
        let mut ids = view.visible_creature_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec!["ca", "cb"]);
    }

    #[test]
    fn when_a_creature_gets_a_new_target_then_its_motion_restarts() {
        let mut cache = populated_cache();
        let mut view = WorldView::new(false);
        view.refresh(&cache);
        assert!(view.motion("ca").expect("motion").is_idle());

        let mut moved = creature_at("ca", "a", Point { x: 100.0, y: 100.0 });
        moved.animated_properties.position = AnimatedPosition {
            from: Point { x: 100.0, y: 100.0 },
            to: Point { x: 300.0, y: 100.0 },
            teleport: Point { x: 200.0, y: 100.0 },
            duration: 2.0,
        };
        cache.on_creatures_update(HashMap::from([("ca".to_string(), moved)]));
        view.refresh(&cache);

        let motion = view.motion("ca").expect("motion");
        assert!(!motion.is_idle());
        assert_eq!(motion.target().to, Point { x: 300.0, y: 100.0 });
    }

    #[test]
    fn when_refreshed_with_unchanged_targets_then_motions_are_left_alone() {
        let cache = populated_cache();
        let mut view = WorldView::new(false);
        view.refresh(&cache);
        view.refresh(&cache);
        assert!(view.motion("ca").expect("motion").is_idle());
    }

    #[test]
    fn when_a_creature_leaves_the_interest_set_then_its_motion_is_dropped() {
        let mut cache = populated_cache();
        let mut view = WorldView::new(true);
        view.refresh(&cache);
        assert!(view.motion("cb").is_some());

        // Owner b disconnects; their creature is orphaned out of the
        // cache and its motion must go with it.
        cache.on_users_update(vec![user("a", 0.0)]);
        view.refresh(&cache);
        assert!(view.motion("cb").is_none());
        assert_eq!(view.visible_creature_ids(), vec!["ca"]);
    }

    #[test]
    fn when_a_creature_first_appears_then_it_grows_into_view() {
        let cache = populated_cache();
        let mut view = WorldView::new(false);
        view.refresh(&cache);

        // Lichen grows over 1.5s; freshly inserted it has no size yet.
        let motion = view.motion("ca").expect("motion");
        assert_eq!(motion.scale_multiplier(), 0.0);

        view.tick(1.5);
        assert_eq!(view.motion("ca").expect("motion").scale_multiplier(), 1.0);

        // A later refresh must not restart the ramp.
        view.refresh(&cache);
        assert_eq!(view.motion("ca").expect("motion").scale_multiplier(), 1.0);
    }

    #[test]
    fn when_an_evolve_broadcast_names_an_unknown_creature_then_nothing_happens() {
        let cache = populated_cache();
        let mut view = WorldView::new(false);
        view.refresh(&cache);

        view.on_evolve_broadcast("nope");
        view.on_evolve_broadcast("ca");
        assert!(view.motion("ca").expect("motion").is_evolving());
    }
}
