//! Ledger models: which packs are active in a scope and what each one owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Current on-disk schema version of [`ProjectState`].
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Component key under which artifacts whose removal failed are parked,
/// so the next pass retries them.
pub const PENDING_REMOVAL: &str = "_pending_removal";

/// A concrete artifact produced by installing a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactId {
    /// A server registry entry
    McpServer {
        /// Registry key
        name: String,
    },
    /// A copied file
    File {
        /// Path relative to the scope's file root
        path: String,
    },
    /// A section of the instruction document
    TemplateSection {
        /// Section id
        id: String,
    },
    /// A settings location
    SettingsKey {
        /// Dotted settings path (`env.FOO`, `model`)
        path: String,
    },
    /// One hook command under an event
    HookCommand {
        /// Hook event name
        event: String,
        /// Command line
        command: String,
    },
    /// An enabled plugin
    Plugin {
        /// Plugin identifier
        name: String,
    },
    /// A line of the ignore file
    IgnoreEntry {
        /// The ignore pattern
        pattern: String,
    },
}

impl ArtifactId {
    /// Server registry entry `name`.
    pub fn mcp_server(name: impl Into<String>) -> Self {
        Self::McpServer { name: name.into() }
    }

    /// File at `path` under the scope's file root.
    pub fn file(path: impl Into<String>) -> Self {
        Self::File { path: path.into() }
    }

    /// Instruction document section `id`.
    pub fn section(id: impl Into<String>) -> Self {
        Self::TemplateSection { id: id.into() }
    }

    /// Settings location at dotted `path`.
    pub fn settings_key(path: impl Into<String>) -> Self {
        Self::SettingsKey { path: path.into() }
    }

    /// Hook `command` registered under `event`.
    pub fn hook_command(event: impl Into<String>, command: impl Into<String>) -> Self {
        Self::HookCommand {
            event: event.into(),
            command: command.into(),
        }
    }

    /// Enabled plugin `name`.
    pub fn plugin(name: impl Into<String>) -> Self {
        Self::Plugin { name: name.into() }
    }

    /// Ignore file line `pattern`.
    pub fn ignore_entry(pattern: impl Into<String>) -> Self {
        Self::IgnoreEntry {
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::McpServer { name } => write!(f, "mcp_server:{name}"),
            Self::File { path } => write!(f, "file:{path}"),
            Self::TemplateSection { id } => write!(f, "section:{id}"),
            Self::SettingsKey { path } => write!(f, "settings:{path}"),
            Self::HookCommand { event, command } => write!(f, "hook:{event}:{command}"),
            Self::Plugin { name } => write!(f, "plugin:{name}"),
            Self::IgnoreEntry { pattern } => write!(f, "ignore:{pattern}"),
        }
    }
}

/// What one pack produced in one scope, grouped by component.
///
/// This is the only source of truth for ownership; it is never re-derived from
/// the pack's current manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackArtifactRecord {
    /// Pack version these artifacts came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Component id -> artifacts it produced
    #[serde(default)]
    pub components: BTreeMap<String, BTreeSet<ArtifactId>>,

    /// Instruction document sections
    #[serde(default)]
    pub sections: BTreeSet<String>,

    /// First install of the pack in this scope
    pub installed_at: DateTime<Utc>,
    /// Last pass that touched the record
    pub updated_at: DateTime<Utc>,
}

impl PackArtifactRecord {
    /// Empty record stamped with the current time.
    pub fn new(version: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            version,
            components: BTreeMap::new(),
            sections: BTreeSet::new(),
            installed_at: now,
            updated_at: now,
        }
    }

    /// Every artifact the pack owns, sections included.
    pub fn artifacts(&self) -> BTreeSet<ArtifactId> {
        self.components
            .values()
            .flatten()
            .cloned()
            .chain(self.sections.iter().map(ArtifactId::section))
            .collect()
    }

    /// Whether the record lists `artifact`, parked entries included.
    pub fn owns(&self, artifact: &ArtifactId) -> bool {
        match artifact {
            ArtifactId::TemplateSection { id } => self.sections.contains(id),
            other => self.components.values().any(|set| set.contains(other)),
        }
    }

    /// Park an artifact whose removal failed so it is retried later.
    pub fn park_for_removal(&mut self, artifact: ArtifactId) {
        self.components
            .entry(PENDING_REMOVAL.to_string())
            .or_default()
            .insert(artifact);
    }

    /// No artifacts and no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.components.values().all(BTreeSet::is_empty)
    }
}

/// Persisted per-scope state: active packs, their exclusions and their artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    /// On-disk format version
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Packs the user selected for this scope
    #[serde(default)]
    pub active_packs: BTreeSet<String>,

    /// Pack id -> component ids deselected by the user
    #[serde(default)]
    pub excluded_components: BTreeMap<String, BTreeSet<String>>,

    /// Pack id -> owned artifacts
    #[serde(default)]
    pub artifacts: BTreeMap<String, PackArtifactRecord>,

    /// End of the last persisted pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

const fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            active_packs: BTreeSet::new(),
            excluded_components: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            last_synced_at: None,
        }
    }
}

impl ProjectState {
    /// Drop exclusion entries for packs that are not active. Returns how many were dropped.
    pub fn prune_stale_exclusions(&mut self) -> usize {
        let before = self.excluded_components.len();
        let active = &self.active_packs;
        self.excluded_components
            .retain(|pack, excluded| active.contains(pack) && !excluded.is_empty());
        before - self.excluded_components.len()
    }

    /// Packs the ledger knows about: active ones plus any that still own artifacts.
    pub fn pack_ids(&self) -> BTreeSet<String> {
        self.active_packs
            .iter()
            .chain(self.artifacts.keys())
            .cloned()
            .collect()
    }

    /// Components the user deselected for `pack`.
    pub fn excluded_for(&self, pack: &str) -> BTreeSet<String> {
        self.excluded_components.get(pack).cloned().unwrap_or_default()
    }

    /// Replace the exclusions for `pack`; an empty set clears them.
    pub fn set_excluded(&mut self, pack: &str, excluded: BTreeSet<String>) {
        if excluded.is_empty() {
            self.excluded_components.remove(pack);
        } else {
            self.excluded_components.insert(pack.to_string(), excluded);
        }
    }

    /// Mark a pack active and replace its artifact record.
    pub fn record_install(&mut self, pack: &str, record: PackArtifactRecord) {
        self.active_packs.insert(pack.to_string());
        self.artifacts.insert(pack.to_string(), record);
    }

    /// Forget a pack entirely and return the artifacts it owned.
    pub fn record_removal(&mut self, pack: &str) -> BTreeSet<ArtifactId> {
        self.active_packs.remove(pack);
        self.excluded_components.remove(pack);
        self.artifacts
            .remove(pack)
            .map(|record| record.artifacts())
            .unwrap_or_default()
    }

    /// Artifact record of `pack`, if it owns anything.
    pub fn record(&self, pack: &str) -> Option<&PackArtifactRecord> {
        self.artifacts.get(pack)
    }

    /// Every artifact any pack owns, parked ones included.
    pub fn owned_artifacts(&self) -> BTreeSet<ArtifactId> {
        self.artifacts
            .values()
            .flat_map(PackArtifactRecord::artifacts)
            .collect()
    }
}
