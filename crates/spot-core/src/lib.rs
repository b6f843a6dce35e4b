pub mod config;
pub mod types;

pub use config::{ConfigError, SpotConfig};
pub use types::*;
