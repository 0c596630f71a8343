// Domain layer: authoritative presence state and rules.

pub mod ports;
pub mod registry;

pub use ports::{Clock, SystemClock};
pub use registry::{ConnectOutcome, EvolveOutcome, PresenceRegistry, RegistryPolicy, TapOutcome};
