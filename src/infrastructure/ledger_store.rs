//! Persistence for the per-scope artifact ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ledger::STATE_SCHEMA_VERSION;
use crate::domain::models::{ArtifactId, PackArtifactRecord, ProjectState, Scope};
use crate::infrastructure::fs::{read_optional, write_atomic};

/// The ledger of one scope, loaded into memory.
///
/// Mutations are in-memory only; nothing reaches disk until [`ArtifactLedger::save`],
/// so several pack operations can be batched into one atomic write.
#[derive(Debug, Clone)]
pub struct ArtifactLedger {
    path: PathBuf,
    state: ProjectState,
    on_disk: bool,
}

impl ArtifactLedger {
    /// Load the ledger at `path`. A missing file is a fresh scope; a file that
    /// does not parse is [`DomainError::CorruptState`] and is left untouched.
    pub fn load(path: &Path) -> DomainResult<Self> {
        let Some(contents) = read_optional(path).map_err(|e| DomainError::io(path, e))? else {
            tracing::debug!(path = %path.display(), "no ledger yet, starting fresh");
            return Ok(Self {
                path: path.to_path_buf(),
                state: ProjectState::default(),
                on_disk: false,
            });
        };

        let mut state: ProjectState =
            serde_json::from_str(&contents).map_err(|e| DomainError::corrupt(path, e))?;

        if state.schema_version > STATE_SCHEMA_VERSION {
            return Err(DomainError::corrupt(
                path,
                format!(
                    "schema version {} is newer than this packsync supports \
                     ({STATE_SCHEMA_VERSION})",
                    state.schema_version
                ),
            ));
        }

        let pruned = state.prune_stale_exclusions();
        if pruned > 0 {
            tracing::info!(path = %path.display(), pruned, "pruned exclusions for inactive packs");
        }

        Ok(Self {
            path: path.to_path_buf(),
            state,
            on_disk: true,
        })
    }

    /// Whether a ledger file existed when this one was loaded (or has been saved since).
    pub const fn exists(&self) -> bool {
        self.on_disk
    }

    /// Ledger file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded ownership.
    pub const fn state(&self) -> &ProjectState {
        &self.state
    }

    /// Mutable ownership; changes persist on the next save.
    pub fn state_mut(&mut self) -> &mut ProjectState {
        &mut self.state
    }

    /// Replace `pack`'s record.
    pub fn record_install(&mut self, pack: &str, record: PackArtifactRecord) {
        self.state.record_install(pack, record);
    }

    /// Drop `pack`'s record, returning what it owned.
    pub fn record_removal(&mut self, pack: &str) -> BTreeSet<ArtifactId> {
        self.state.record_removal(pack)
    }

    /// Atomically write the ledger.
    pub fn save(&mut self) -> DomainResult<()> {
        self.state.schema_version = STATE_SCHEMA_VERSION;
        let json = serde_json::to_string_pretty(&self.state)?;
        write_atomic(&self.path, format!("{json}\n").as_bytes())
            .map_err(|e| DomainError::io(&self.path, e))?;
        self.on_disk = true;
        tracing::debug!(
            path = %self.path.display(),
            packs = self.state.active_packs.len(),
            "ledger saved"
        );
        Ok(())
    }
}

/// Excluded components across scopes, as `pack/component` ids.
///
/// Consumers use this to tell intentionally skipped components from broken ones.
pub fn all_excluded_components<'a>(
    ledgers: impl IntoIterator<Item = (&'a Scope, &'a ArtifactLedger)>,
) -> BTreeMap<Scope, BTreeSet<String>> {
    ledgers
        .into_iter()
        .map(|(scope, ledger)| {
            let excluded = ledger
                .state()
                .excluded_components
                .iter()
                .flat_map(|(pack, components)| {
                    components.iter().map(move |c| format!("{pack}/{c}"))
                })
                .collect();
            (scope.clone(), excluded)
        })
        .collect()
}
