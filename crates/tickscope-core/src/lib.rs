pub mod config;
pub mod error;
pub mod types;

pub use config::TickscopeConfig;
pub use error::{BoundariesError, ConfigError};
pub use types::*;
