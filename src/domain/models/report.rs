//! Plans and reports produced by a reconciliation pass.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::collision::Collision;

/// Result of the diff phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Scope label
    pub scope: String,
    /// Desired packs the ledger does not know, in install order
    pub to_install: Vec<String>,
    /// Desired packs already in the ledger, in install order
    pub to_update: Vec<String>,
    /// Ledger packs no longer desired
    pub to_remove: Vec<String>,
    /// Name clashes introduced by `to_install`
    pub collisions: Vec<Collision>,
    /// Advisory findings (missing dependencies, cycles, unknown exclusions)
    pub warnings: Vec<String>,
}

impl SyncPlan {
    /// Nothing to install, update or remove.
    pub fn is_noop(&self) -> bool {
        self.to_install.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// One artifact or component that could not be installed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    /// Scope label
    pub scope: String,
    /// Pack (or packs) the failure belongs to
    pub pack: String,
    /// Component id or artifact identifier
    pub subject: String,
    /// Error text
    pub message: String,
}

impl fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] pack '{}', {}: {}",
            self.scope, self.pack, self.subject, self.message
        )
    }
}

/// Summary of a completed (or dry) reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Identifier of the pass
    pub run_id: Uuid,
    /// Whether the pass stopped after planning
    pub dry_run: bool,
    /// The plan the pass executed
    pub plan: SyncPlan,
    /// Pack -> artifacts it now owns
    pub installed: BTreeMap<String, Vec<String>>,
    /// Artifacts physically removed
    pub removed: Vec<String>,
    /// Artifacts released by a pack but kept because another pack still holds them
    pub retained: Vec<String>,
    /// Per-artifact problems; the rest of the pass still ran
    pub failures: Vec<ArtifactFailure>,
    /// Secret placeholders the installed servers expect
    pub required_secrets: BTreeSet<String>,
    /// Backup of a legacy instruction document, if one was migrated
    pub template_backup: Option<PathBuf>,
}

impl SyncReport {
    /// Empty report for `plan`.
    pub fn new(run_id: Uuid, plan: SyncPlan, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            plan,
            installed: BTreeMap::new(),
            removed: Vec::new(),
            retained: Vec::new(),
            failures: Vec::new(),
            required_secrets: BTreeSet::new(),
            template_backup: None,
        }
    }

    /// No failures were recorded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
