// Use cases layer: application workflows for the presence server.

pub mod presence;
pub mod types;

pub use presence::presence_task;
pub use types::{ConnectSnapshot, PresenceCommand, PresenceUpdate};
