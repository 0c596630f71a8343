use crate::domain::RegistryPolicy;
use std::env;

// Runtime/server constants (not garden tuning).

pub fn http_port() -> u16 {
    env::var("GARDEN_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
}

pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;
pub const PRESENCE_BROADCAST_CAPACITY: usize = 128;
pub const EVENT_BYTES_CAPACITY: usize = 256;

pub fn registry_policy() -> RegistryPolicy {
    let mut policy = RegistryPolicy::default();
    if let Some(pitch) = env::var("GARDEN_PITCH")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
    {
        policy.garden_pitch = pitch;
    }
    if let Some(columns) = env::var("GARDEN_GRID_COLUMNS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
    {
        policy.grid_columns = columns;
    }
    policy
}
