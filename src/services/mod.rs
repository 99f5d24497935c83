//! Services layer
//!
//! Pure composition logic and the convergence engine that drives it:
//! - settings and template composition
//! - reference counting and collision detection
//! - pack discovery and dependency ordering
//! - the reconciliation pass itself

pub mod collision_detector;
pub mod convergence_engine;
pub mod dependency_resolver;
pub mod diagnostics;
pub mod env_placeholders;
pub mod pack_registry;
pub mod reference_counter;
pub mod settings_composer;
pub mod template_composer;

pub use convergence_engine::{
    ApplyProgress, Capabilities, ConvergenceEngine, NoProgress, SyncRequest,
};
pub use dependency_resolver::DependencyResolver;
pub use diagnostics::{CheckOutcome, CheckResult};
pub use pack_registry::PackRegistry;
