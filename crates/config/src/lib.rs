//! Configuration for evaluation sessions.

mod settings;

pub use settings::{BackendSettings, ConfigError, Settings};
