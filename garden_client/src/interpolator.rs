use garden_shared::{AnimatedPosition, Point};

pub const FADE_OUT_SECS: f64 = 1.0;
pub const FADE_IN_SECS: f64 = 0.5;
// Alpha floor while hidden; fully zero would let some renderers skip
// the sprite and miss the relocation.
const MIN_ALPHA: f64 = 0.001;
// Fraction of the heading error retained per 60 Hz frame.
const HEADING_RETAIN_PER_FRAME: f64 = 0.999;
const REFERENCE_FPS: f64 = 60.0;

pub const EVOLVE_PULSE_SECS: f64 = 0.8;
pub const EVOLVE_PULSE_PEAK: f64 = 1.4;

/// Emitted by [`Motion::tick`] when a tween runs to completion. A tween
/// cancelled by a newer target never emits one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    Arrived,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    FadingOut { elapsed: f64 },
    Teleported,
    FadingIn { elapsed: f64 },
    Tweening { elapsed: f64 },
}

/// Per-creature animation driven by a single cooperative timeline:
/// state changes only inside [`Motion::retarget`] and [`Motion::tick`].
///
/// Each new target replays the same sequence: fade out in place, jump
/// to the teleport waypoint, fade back in, then tween linearly to the
/// destination over the server-stamped duration.
#[derive(Debug, Clone)]
pub struct Motion {
    target: AnimatedPosition,
    position: Point,
    alpha: f64,
    heading: f64,
    heading_target: f64,
    phase: Phase,
    pulse: Option<f64>,
    growth: Option<(f64, f64)>,
    fade_from: f64,
}

fn ease_in_out_quart(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        8.0 * t * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(4) / 2.0
    }
}

fn lerp_point(a: Point, b: Point, t: f64) -> Point {
    Point {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

fn heading_of(from: Point, to: Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

impl Motion {
    /// Starts at rest on the target's destination, fully visible.
    pub fn new(target: AnimatedPosition) -> Self {
        let heading = heading_of(target.teleport, target.to);
        Self {
            position: target.to,
            target,
            alpha: 1.0,
            heading,
            heading_target: heading,
            phase: Phase::Idle,
            pulse: None,
            growth: None,
            fade_from: 1.0,
        }
    }

    /// Starts the spawn growth ramp: scale climbs from zero to full over
    /// `duration_secs`. Called once when a creature first appears.
    pub fn start_growth(&mut self, duration_secs: f64) {
        if duration_secs > 0.0 {
            self.growth = Some((0.0, duration_secs));
        }
    }

    /// Adopts a new server-stamped target. Always restarts at the fade,
    /// cancelling whatever was in flight; the newest update wins.
    pub fn retarget(&mut self, target: AnimatedPosition) {
        self.target = target;
        // A restart mid-fade ramps down from wherever opacity is now,
        // never back up through 1.0 first.
        self.fade_from = self.alpha;
        self.phase = Phase::FadingOut { elapsed: 0.0 };
    }

    /// Advances the timeline by `dt` seconds. Leftover time flows across
    /// phase boundaries so coarse frames stay on schedule.
    pub fn tick(&mut self, dt: f64) -> Option<MotionEvent> {
        let mut remaining = dt.max(0.0);
        let mut event = None;

        loop {
            match self.phase {
                Phase::Idle => {
                    remaining = 0.0;
                }
                Phase::FadingOut { elapsed } => {
                    let step = remaining.min(FADE_OUT_SECS - elapsed);
                    let elapsed = elapsed + step;
                    remaining -= step;
                    if elapsed >= FADE_OUT_SECS {
                        self.alpha = MIN_ALPHA;
                        self.position = self.target.teleport;
                        self.heading_target = heading_of(self.target.teleport, self.target.to);
                        self.phase = Phase::Teleported;
                    } else {
                        self.alpha = self.fade_from
                            - ease_in_out_quart(elapsed / FADE_OUT_SECS)
                                * (self.fade_from - MIN_ALPHA);
                        self.phase = Phase::FadingOut { elapsed };
                    }
                }
                Phase::Teleported => {
                    // The jump itself consumes no time.
                    self.phase = Phase::FadingIn { elapsed: 0.0 };
                }
                Phase::FadingIn { elapsed } => {
                    let step = remaining.min(FADE_IN_SECS - elapsed);
                    let elapsed = elapsed + step;
                    remaining -= step;
                    if elapsed >= FADE_IN_SECS {
                        self.alpha = 1.0;
                        self.phase = Phase::Tweening { elapsed: 0.0 };
                    } else {
                        self.alpha =
                            MIN_ALPHA + ease_in_out_quart(elapsed / FADE_IN_SECS) * (1.0 - MIN_ALPHA);
                        self.phase = Phase::FadingIn { elapsed };
                    }
                }
                Phase::Tweening { elapsed } => {
                    let duration = self.target.duration;
                    if duration <= 0.0 || elapsed + remaining >= duration {
                        let spent = (duration - elapsed).max(0.0);
                        remaining -= spent.min(remaining);
                        self.position = self.target.to;
                        self.phase = Phase::Idle;
                        event = Some(MotionEvent::Arrived);
                    } else {
                        let elapsed = elapsed + remaining;
                        remaining = 0.0;
                        self.position =
                            lerp_point(self.target.teleport, self.target.to, elapsed / duration);
                        self.phase = Phase::Tweening { elapsed };
                    }
                }
            }

            if remaining <= 0.0 && self.phase != Phase::Teleported {
                break;
            }
        }

        self.advance_pulse(dt);
        self.advance_growth(dt);
        self.blend_heading(dt);
        event
    }

    // Exponential smoothing toward the target heading every tick; the
    // heading never snaps, not even across a teleport.
    fn blend_heading(&mut self, dt: f64) {
        let retained = HEADING_RETAIN_PER_FRAME.powf(dt * REFERENCE_FPS);
        self.heading = self.heading_target + (self.heading - self.heading_target) * retained;
    }

    /// Starts the evolve scale pulse. Returns false while a pulse is
    /// already running, so duplicate broadcasts are no-ops.
    pub fn trigger_evolve(&mut self) -> bool {
        if self.pulse.is_some() {
            return false;
        }
        self.pulse = Some(0.0);
        true
    }

    fn advance_pulse(&mut self, dt: f64) {
        if let Some(elapsed) = &mut self.pulse {
            *elapsed += dt;
            if *elapsed >= 2.0 * EVOLVE_PULSE_SECS {
                self.pulse = None;
            }
        }
    }

    fn advance_growth(&mut self, dt: f64) {
        if let Some((elapsed, duration)) = &mut self.growth {
            *elapsed += dt;
            if *elapsed >= *duration {
                self.growth = None;
            }
        }
    }

    fn growth_multiplier(&self) -> f64 {
        match self.growth {
            None => 1.0,
            Some((elapsed, duration)) => ease_in_out_quart(elapsed / duration),
        }
    }

    /// Transient scale factor: the spawn growth ramp combined with the
    /// evolve pulse (up to the peak over the first half, back to 1.0
    /// over the second). 1.0 when neither is running.
    pub fn scale_multiplier(&self) -> f64 {
        self.growth_multiplier() * self.pulse_multiplier()
    }

    fn pulse_multiplier(&self) -> f64 {
        match self.pulse {
            None => 1.0,
            Some(elapsed) if elapsed < EVOLVE_PULSE_SECS => {
                1.0 + ease_in_out_quart(elapsed / EVOLVE_PULSE_SECS) * (EVOLVE_PULSE_PEAK - 1.0)
            }
            Some(elapsed) => {
                let t = (elapsed - EVOLVE_PULSE_SECS) / EVOLVE_PULSE_SECS;
                EVOLVE_PULSE_PEAK - ease_in_out_quart(t) * (EVOLVE_PULSE_PEAK - 1.0)
            }
        }
    }

    pub fn is_evolving(&self) -> bool {
        self.pulse.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn target(&self) -> &AnimatedPosition {
        &self.target
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(from: (f64, f64), to: (f64, f64), teleport: (f64, f64), duration: f64) -> AnimatedPosition {
        AnimatedPosition {
            from: Point {
                x: from.0,
                y: from.1,
            },
            to: Point { x: to.0, y: to.1 },
            teleport: Point {
                x: teleport.0,
                y: teleport.1,
            },
            duration,
        }
    }

    #[test]
    fn when_a_full_leg_plays_out_then_it_jumps_via_the_waypoint_and_lands_exactly() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (100.0, 50.0), (50.0, 25.0), 2.0));

        // Fade out completes; the creature is hidden at the waypoint.
        assert_eq!(motion.tick(1.0), None);
        assert_eq!(motion.position(), Point { x: 50.0, y: 25.0 });
        assert!(motion.alpha() < 0.01);

        // Fade in completes.
        assert_eq!(motion.tick(0.5), None);
        assert_eq!(motion.alpha(), 1.0);

        // Halfway through the tween the position is the linear midpoint.
        assert_eq!(motion.tick(1.0), None);
        assert_eq!(motion.position(), Point { x: 75.0, y: 37.5 });

        // Completion pins the position and reports it exactly once.
        assert_eq!(motion.tick(1.0), Some(MotionEvent::Arrived));
        assert_eq!(motion.position(), Point { x: 100.0, y: 50.0 });
        assert!(motion.is_idle());
        assert_eq!(motion.tick(1.0), None);
    }

    #[test]
    fn when_retargeted_mid_tween_then_the_new_target_wins_without_a_phantom_arrival() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (100.0, 0.0), (50.0, 0.0), 2.0));
        assert_eq!(motion.tick(1.0), None);
        assert_eq!(motion.tick(0.5), None);
        assert_eq!(motion.tick(1.0), None); // mid-tween at (75, 0)

        motion.retarget(leg((100.0, 0.0), (200.0, 0.0), (150.0, 0.0), 2.0));

        // The cancelled tween never completes; the restart fades out again.
        assert_eq!(motion.tick(1.0), None);
        assert_eq!(motion.position(), Point { x: 150.0, y: 0.0 });
        assert_eq!(motion.tick(0.5), None);
        assert_eq!(motion.tick(2.0), Some(MotionEvent::Arrived));
        assert_eq!(motion.position(), Point { x: 200.0, y: 0.0 });
    }

    #[test]
    fn when_a_coarse_frame_spans_phases_then_leftover_time_carries_over() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (100.0, 0.0), (50.0, 0.0), 1.0));

        // 1.0 fade out + 0.5 fade in + 1.0 tween, all in one tick.
        assert_eq!(motion.tick(2.5), Some(MotionEvent::Arrived));
        assert_eq!(motion.position(), Point { x: 100.0, y: 0.0 });
        assert!(motion.is_idle());
    }

    #[test]
    fn when_fading_out_then_alpha_ramps_down_monotonically() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (10.0, 0.0), (5.0, 0.0), 1.0));

        let mut last = 1.0;
        for _ in 0..9 {
            motion.tick(0.1);
            assert!(motion.alpha() < last);
            last = motion.alpha();
        }
    }

    #[test]
    fn when_duration_is_zero_then_the_tween_arrives_immediately() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (30.0, 40.0), (15.0, 20.0), 0.0));

        assert_eq!(motion.tick(1.5), Some(MotionEvent::Arrived));
        assert_eq!(motion.position(), Point { x: 30.0, y: 40.0 });
    }

    #[test]
    fn when_teleported_then_the_heading_drifts_toward_the_destination() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        // Destination straight up from the waypoint.
        motion.retarget(leg((0.0, 0.0), (50.0, 100.0), (50.0, 0.0), 60.0));
        motion.tick(1.5); // past both fades, into the tween

        let expected = std::f64::consts::FRAC_PI_2;
        let before = (motion.heading() - expected).abs();
        for _ in 0..3600 {
            motion.tick(1.0 / 60.0);
        }
        let after = (motion.heading() - expected).abs();
        assert!(after < before);
        assert!(after < 0.1, "heading should close in on the target");
    }

    #[test]
    fn when_growth_starts_then_scale_ramps_from_zero_to_full() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.start_growth(1.5);
        assert_eq!(motion.scale_multiplier(), 0.0);

        motion.tick(0.75);
        let halfway = motion.scale_multiplier();
        assert!(halfway > 0.0 && halfway < 1.0);

        motion.tick(0.75);
        assert_eq!(motion.scale_multiplier(), 1.0);
    }

    #[test]
    fn when_retargeted_mid_fade_then_alpha_never_snaps_back_up() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        motion.retarget(leg((0.0, 0.0), (100.0, 0.0), (50.0, 0.0), 2.0));
        motion.tick(0.5);
        let mid_fade = motion.alpha();
        assert!(mid_fade < 1.0);

        motion.retarget(leg((100.0, 0.0), (200.0, 0.0), (150.0, 0.0), 2.0));
        motion.tick(0.05);
        assert!(motion.alpha() <= mid_fade);
    }

    #[test]
    fn when_evolving_then_duplicate_triggers_are_ignored_until_the_pulse_ends() {
        let mut motion = Motion::new(AnimatedPosition::at_rest(Point { x: 0.0, y: 0.0 }));
        assert!(motion.trigger_evolve());
        assert!(!motion.trigger_evolve());

        motion.tick(EVOLVE_PULSE_SECS);
        assert_eq!(motion.scale_multiplier(), EVOLVE_PULSE_PEAK);
        assert!(motion.is_evolving());

        motion.tick(EVOLVE_PULSE_SECS);
        assert!(!motion.is_evolving());
        assert_eq!(motion.scale_multiplier(), 1.0);
        assert!(motion.trigger_evolve());
    }
}
