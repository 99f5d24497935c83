//! Packsync - pack-driven environment convergence
//!
//! Packsync installs "packs" (bundles of MCP servers, files, settings
//! fragments, hooks, plugins and instruction sections) into a project or the
//! user's global tool environment, and keeps that environment converged as
//! packs are added, removed, excluded or upgraded.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and capability ports
//! - **Service Layer** (`services`): composition, reference counting and the
//!   convergence engine
//! - **Infrastructure Layer** (`infrastructure`): filesystem stores, config,
//!   logging and local capability implementations
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use packsync::services::{ConvergenceEngine, SyncRequest};
//!
//! let engine = ConvergenceEngine::new(&registry, capabilities);
//! let report = engine.sync(&request)?;
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ArtifactId, Collision, Component, Config, InstallAction, Pack, PackManifest, ProjectState,
    Scope, ScopePaths, SettingsDocument, SyncPlan, SyncReport,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConvergenceEngine, DependencyResolver, PackRegistry, SyncRequest};
