// World data model. Wire names are camelCase to stay compatible with the
// original browser transport.

use serde::{Deserialize, Serialize};

/// A position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Midpoint between two points, used as the default teleport target.
    pub fn midpoint(self, other: Point) -> Point {
        Point {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

/// A garden section in world coordinates. Width and height are
/// client-viewport-derived; the server stores whatever the client
/// reported at connect and never recomputes them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    /// Wide viewports cull along the horizontal axis first.
    pub fn is_wide(&self) -> bool {
        self.width > self.height
    }
}

/// Creature variants. Kept as a tagged enum instead of free-form strings
/// so per-kind behavior lives behind methods rather than string switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatureKind {
    Moss,
    Lichen,
    Mushroom,
}

impl CreatureKind {
    pub const ALL: [CreatureKind; 3] = [Self::Moss, Self::Lichen, Self::Mushroom];

    /// Base rendering radius per kind.
    pub fn base_radius(self) -> f64 {
        match self {
            Self::Moss => 60.0,
            Self::Lichen => 45.0,
            Self::Mushroom => 50.0,
        }
    }

    /// Growth ramp duration when a creature first appears, in seconds.
    pub fn growth_secs(self) -> f64 {
        match self {
            Self::Moss => 1.0,
            Self::Lichen => 1.5,
            Self::Mushroom => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FillColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// Visual state of a creature. Evolution mutates this, never identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appearance {
    pub creature_type: CreatureKind,
    pub fill_color: FillColor,
    pub radius: f64,
    pub scale: f64,
    #[serde(default)]
    pub tier: u8,
}

/// One directed position transition. This is not a current position:
/// clients derive the on-screen position from it over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimatedPosition {
    pub from: Point,
    pub to: Point,
    pub teleport: Point,
    /// Tween duration in seconds.
    pub duration: f64,
}

impl AnimatedPosition {
    /// A transition that starts and ends at the same point, used when a
    /// creature first spawns.
    pub fn at_rest(p: Point) -> Self {
        Self {
            from: p,
            to: p,
            teleport: p,
            duration: 0.0,
        }
    }
}

/// Animated state carried on the wire. Extra keys in the original map
/// payload are tolerated and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimatedProperties {
    pub position: AnimatedPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creature {
    pub id: String,
    pub owner_uid: String,
    pub appearance: Appearance,
    pub animated_properties: AnimatedProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub creature_name: String,
    pub garden_section: Rect,
}
