use garden_shared::Rect;

/// Distance-based interest filter between two garden sections.
///
/// The band is deliberately asymmetric: the axis the viewer's screen is
/// longest along gets the full `bound`, the other axis only the thin
/// remainder `bound - margin`. Neighbors line up along the long axis,
/// so that is where most of the visible world lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullPolicy {
    pub bound: f64,
    pub margin: f64,
}

impl Default for CullPolicy {
    fn default() -> Self {
        Self {
            bound: 1100.0,
            margin: 1000.0,
        }
    }
}

impl CullPolicy {
    /// Admin sessions watch the whole world; the predicate is always true.
    pub fn admin() -> Self {
        Self {
            bound: f64::INFINITY,
            margin: 0.0,
        }
    }

    pub fn is_interested(&self, own: &Rect, other: &Rect) -> bool {
        let d_x = (other.x - own.x).abs();
        let d_y = (other.y - own.y).abs();
        let (primary, secondary) = if own.is_wide() { (d_x, d_y) } else { (d_y, d_x) };
        primary <= self.bound && secondary <= self.bound - self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garden(x: f64, y: f64) -> Rect {
        // Wide viewport: x is the primary axis.
        Rect::new(x, y, 800.0, 600.0)
    }

    #[test]
    fn when_neighbor_sits_on_the_bound_then_it_is_interested() {
        let policy = CullPolicy::default();
        let own = garden(0.0, 0.0);
        assert!(policy.is_interested(&own, &garden(1100.0, 100.0)));
        assert!(policy.is_interested(&own, &garden(-1100.0, -100.0)));
    }

    #[test]
    fn when_neighbor_is_past_the_bound_then_it_is_culled() {
        let policy = CullPolicy::default();
        let own = garden(0.0, 0.0);
        assert!(!policy.is_interested(&own, &garden(1101.0, 0.0)));
        assert!(!policy.is_interested(&own, &garden(0.0, 101.0)));
    }

    #[test]
    fn when_viewport_is_tall_then_the_primary_axis_flips() {
        let policy = CullPolicy::default();
        let own = Rect::new(0.0, 0.0, 600.0, 800.0);
        assert!(policy.is_interested(&own, &Rect::new(100.0, 1100.0, 600.0, 800.0)));
        assert!(!policy.is_interested(&own, &Rect::new(1100.0, 100.0, 600.0, 800.0)));
    }

    #[test]
    fn when_policy_is_admin_then_everything_is_interested() {
        let policy = CullPolicy::admin();
        let own = garden(0.0, 0.0);
        assert!(policy.is_interested(&own, &garden(2000.0, 0.0)));
        assert!(policy.is_interested(&own, &garden(1e9, 1e9)));
    }
}
