//! Cross-pack reference counting for shared artifacts.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::{ArtifactId, PackArtifactRecord};

/// How many of `active_packs` list `artifact` in their ledger record.
pub fn count_holders(
    artifact: &ArtifactId,
    active_packs: &BTreeSet<String>,
    records: &BTreeMap<String, PackArtifactRecord>,
) -> usize {
    active_packs
        .iter()
        .filter_map(|pack| records.get(pack))
        .filter(|record| record.owns(artifact))
        .count()
}

/// Split `candidates` into artifacts nobody holds any more (safe to delete)
/// and artifacts some remaining active pack still holds.
pub fn partition_removable(
    candidates: &BTreeSet<ArtifactId>,
    active_packs: &BTreeSet<String>,
    records: &BTreeMap<String, PackArtifactRecord>,
) -> (BTreeSet<ArtifactId>, BTreeSet<ArtifactId>) {
    candidates
        .iter()
        .cloned()
        .partition(|artifact| count_holders(artifact, active_packs, records) == 0)
}
