// Interface adapters: wire handling and connection lifecycle.

pub mod net;
pub mod state;
