//! Domain models.

pub mod collision;
pub mod component;
pub mod config;
pub mod ledger;
pub mod pack;
pub mod report;
pub mod scope;
pub mod settings;

pub use collision::{Collision, Namespace};
pub use component::{Component, ComponentKind, InstallAction};
pub use config::{Config, LogFormat, LoggingConfig, RotationPolicy, TemplateConfig};
pub use ledger::{ArtifactId, PackArtifactRecord, ProjectState};
pub use pack::{Pack, PackManifest, TemplateContribution, TemplateSection};
pub use report::{ArtifactFailure, SyncPlan, SyncReport};
pub use scope::{Scope, ScopePaths};
pub use settings::{HookCommand, HookGroup, SettingsDocument};
