// Shared world model and wire protocol for the garden presence system.
// Used by both the server and the client engine so the two sides cannot
// drift apart on field names or payload shapes.

pub mod protocol;
pub mod types;

pub use protocol::{ClientEvent, ServerEvent, decode_creatures, encode_creatures};
pub use types::{
    AnimatedPosition, AnimatedProperties, Appearance, Creature, CreatureKind, FillColor, Point,
    Rect, User,
};
