//! Engine configuration.
//!
//! Loaded from TOML (see [`Config::load`]) and carried by every
//! [`LifecycleScope`](crate::lifecycle::LifecycleScope); builders read their
//! defaults from the scope's config.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{
    CommandDefaults, Config, DiagnosticsConfig, ExecutionPolicy, InteractionConfig,
    UnattendedPolicy,
};
