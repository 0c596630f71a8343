use garden_shared::{ClientEvent, Point};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TAP_COOLDOWN_MILLIS: u64 = 5000;

/// Time source port so the debounce law is testable with a fixed clock.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Throttles outbound intents. Garden taps are debounced per session;
/// evolve requests always go through, duplicate protection lives on the
/// server.
#[derive(Debug)]
pub struct InteractionGate<C: Clock> {
    clock: C,
    last_tap_millis: Option<u64>,
}

impl<C: Clock> InteractionGate<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_tap_millis: None,
        }
    }

    /// Returns the wire event when the tap is honored; within the
    /// cooldown the tap is silently dropped.
    pub fn try_garden_tap(&mut self, coords: Point) -> Option<ClientEvent> {
        let now = self.clock.now_epoch_millis();
        if let Some(last) = self.last_tap_millis {
            if now.saturating_sub(last) < TAP_COOLDOWN_MILLIS {
                return None;
            }
        }
        self.last_tap_millis = Some(now);
        Some(ClientEvent::GardenTap(coords))
    }

    pub fn try_evolve(&self, id: &str) -> ClientEvent {
        ClientEvent::CreatureEvolve { id: id.to_string() }
    }
}
