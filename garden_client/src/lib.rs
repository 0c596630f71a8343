//! Client-side engine for the shared garden: reconciles server presence
//! events into a local world model, culls it down to the viewer's
//! neighborhood, and animates creature movement between updates.

pub mod cache;
pub mod culling;
pub mod gate;
pub mod interpolator;
pub mod session;
pub mod view;
pub mod weather;

pub use cache::ReconciliationCache;
pub use culling::CullPolicy;
pub use gate::{Clock, InteractionGate, SystemClock};
pub use interpolator::{Motion, MotionEvent};
pub use session::{Intent, Session, SessionConfig, SessionEnd, SessionState};
pub use view::WorldView;
pub use weather::{Weather, spawn_weather_poller};
