// redq Core - Queue listener engine & lock coordination
// NO infrastructure dependencies: the external store is reached through ports

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::Settings;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
