//! Port trait definitions (Hexagonal Architecture)
//!
//! The convergence engine never touches the outside world directly. It calls
//! out through these capabilities, which the infrastructure layer implements:
//! - `ComponentInstaller`: perform the side effect for one component
//! - `ArtifactUninstaller`: reverse one previously installed artifact
//! - `ArtifactProbe`: check whether an artifact is still present
//! - `TemplateValueResolver`: supply placeholder substitutions
//! - `TrustStore`: report which pack scripts are approved to run
//! - `Confirmer`: ask the operator to accept naming collisions

pub mod capabilities;

pub use capabilities::{
    ArtifactProbe, ArtifactUninstaller, CapabilityError, ComponentInstaller, Confirmer,
    TemplateContext, TemplateValueResolver, TrustStore,
};
