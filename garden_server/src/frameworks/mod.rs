pub mod config;
pub mod server;

pub use config::http_port;
pub use server::{run, run_with_config};
