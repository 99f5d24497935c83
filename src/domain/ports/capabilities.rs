//! Capability traits the convergence engine calls out through.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::models::{ArtifactId, Collision, Component, Pack, ScopePaths};

/// Errors reported by capability implementations.
///
/// These never abort a reconciliation pass. The engine turns them into
/// per-artifact failures on the run report.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Reading or writing a location failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Location being accessed
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// A required executable is not installed.
    #[error(
        "'{command}' was not found on PATH{}",
        hint.as_ref().map(|h| format!(" ({h})")).unwrap_or_default()
    )]
    MissingDependency {
        /// Executable name
        command: String,
        /// How to install it
        hint: Option<String>,
    },

    /// A pack script has no approved hash.
    #[error(
        "script {} is not approved; review it and add its hash to the trust file",
        script.display()
    )]
    Untrusted {
        /// Script awaiting approval
        script: PathBuf,
    },

    /// An external command exited unsuccessfully.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The component kind has no installer in this scope.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An existing document could not be parsed for update.
    #[error("{} cannot be updated: {reason}", path.display())]
    InvalidDocument {
        /// Document location
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// The location holds content no pack installed.
    #[error("{artifact} already exists with different content that packsync does not manage")]
    Conflict {
        /// Artifact that would have been overwritten
        artifact: String,
    },
}

impl CapabilityError {
    /// Wrap an I/O failure at `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Performs the side effect of installing one component into a scope.
///
/// Settings and plugin components are merged by the engine itself and are
/// never passed here.
pub trait ComponentInstaller {
    /// Install `component` of `pack`, returning every artifact it claims.
    ///
    /// `claimed` holds the artifacts some pack already owns in this scope.
    /// Existing content outside that set belongs to the user: it is never
    /// replaced, and is left unclaimed when it already matches.
    ///
    /// Must be idempotent: installing an already-installed component
    /// returns the same artifacts without duplicating anything.
    fn install(
        &self,
        pack: &Pack,
        component: &Component,
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError>;
}

/// Reverses one previously installed artifact.
pub trait ArtifactUninstaller {
    /// Removing an artifact that is already gone succeeds.
    fn uninstall(&self, artifact: &ArtifactId, target: &ScopePaths) -> Result<(), CapabilityError>;
}

/// Read-only presence check used by diagnostics.
pub trait ArtifactProbe {
    /// Whether the artifact still exists in `target`.
    fn is_present(&self, artifact: &ArtifactId, target: &ScopePaths) -> bool;
}

/// Context handed to value resolvers.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    /// Scope being rendered
    pub target: &'a ScopePaths,
    /// Placeholders the pack's sections declare
    pub placeholders: &'a [String],
}

/// Supplies placeholder substitutions for a pack's template sections.
pub trait TemplateValueResolver {
    /// Values for the placeholders in `pack`'s sections.
    fn resolve(&self, pack: &Pack, context: &TemplateContext<'_>) -> BTreeMap<String, String>;

    /// Values for the core section, which belongs to no pack.
    fn core_values(&self, context: &TemplateContext<'_>) -> BTreeMap<String, String>;
}

/// Supplies the approved hashes of a pack's executable contributions.
///
/// The engine only consumes this set; it never computes trust decisions.
pub trait TrustStore {
    /// Script path (relative to the pack) -> approved content hash.
    fn trusted_hashes(&self, pack: &Pack) -> BTreeMap<PathBuf, String>;
}

/// Blocking operator confirmation.
pub trait Confirmer {
    /// Return `true` to proceed despite the collisions.
    fn confirm_collisions(&self, collisions: &[Collision]) -> bool;
}
