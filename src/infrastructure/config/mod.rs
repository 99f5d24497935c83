//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading (user, project, local)
//! - Environment variable overrides
//! - Configuration validation

/// Layered loading and validation
pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
