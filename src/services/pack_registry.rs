//! Pack discovery.
//!
//! Packs live in their own subdirectory of a packs directory and declare
//! themselves via a `pack.yaml` manifest. Several packs directories can be
//! searched; a pack found in a later directory replaces one with the same id
//! from an earlier directory, so project packs shadow user packs.
//!
//! Loading is non-fatal: packs that fail to load are logged with
//! [`tracing::warn`], skipped, and remembered so that a sync asking for one
//! can fail with a validation error instead of "unknown pack".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::errors::DomainError;
use crate::domain::models::{Pack, PackManifest};

/// Manifest file name inside each pack directory.
pub const MANIFEST_FILE: &str = "pack.yaml";

/// Errors that can occur while loading a single pack.
#[derive(Debug, Error)]
pub enum PackLoadError {
    /// The directory has no manifest.
    #[error("Missing pack.yaml in {}", .0.display())]
    MissingManifest(PathBuf),

    /// The manifest could not be read.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// Manifest path
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// The manifest is not valid YAML for a pack.
    #[error("Failed to parse {}: {source}", path.display())]
    YamlParse {
        /// Manifest path
        path: PathBuf,
        /// Parser failure
        source: serde_yaml::Error,
    },

    /// The manifest parsed but breaks a pack rule.
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// The packs available to this invocation.
#[derive(Debug, Clone, Default)]
pub struct PackRegistry {
    packs: BTreeMap<String, Pack>,
    /// Pack id (or directory name) -> why it was rejected
    invalid: BTreeMap<String, String>,
}

impl PackRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir/*/pack.yaml` for each directory, in order.
    pub fn load(dirs: &[PathBuf]) -> Self {
        let mut registry = Self::new();
        for dir in dirs {
            registry.load_dir(dir);
        }
        tracing::info!(
            count = registry.packs.len(),
            invalid = registry.invalid.len(),
            "Pack loading complete"
        );
        registry
    }

    fn load_dir(&mut self, dir: &Path) {
        if !dir.exists() {
            tracing::debug!(path = %dir.display(), "No packs directory found, skipping");
            return;
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read packs directory");
                return;
            }
        };

        let mut pack_dirs: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|path| path.is_dir())
            .collect();
        pack_dirs.sort();

        for path in pack_dirs {
            let fallback_id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match load_single_pack(&path) {
                Ok(pack) => {
                    tracing::debug!(
                        pack = %pack.id(),
                        version = pack.version().unwrap_or("-"),
                        path = %path.display(),
                        "Loaded pack"
                    );
                    self.invalid.remove(pack.id());
                    self.insert(pack);
                }
                Err(PackLoadError::MissingManifest(_)) => {
                    tracing::debug!(
                        path = %path.display(),
                        "Directory has no pack manifest, skipping"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping pack that failed to load"
                    );
                    let id = match &e {
                        PackLoadError::Invalid(DomainError::Validation { pack, .. })
                            if !pack.is_empty() =>
                        {
                            pack.clone()
                        }
                        _ => fallback_id,
                    };
                    self.packs.remove(&id);
                    self.invalid.insert(id, e.to_string());
                }
            }
        }
    }

    /// Add or replace a pack by id.
    pub fn insert(&mut self, pack: Pack) {
        self.packs.insert(pack.id().to_string(), pack);
    }

    /// Loaded pack by id.
    pub fn get(&self, id: &str) -> Option<&Pack> {
        self.packs.get(id)
    }

    /// Whether a valid pack with this id was loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.packs.contains_key(id)
    }

    /// Valid packs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pack> {
        self.packs.values()
    }

    /// Valid pack ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    /// Number of valid packs.
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Whether no valid pack was loaded.
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Rejection reason for a pack id that was found but failed to load.
    pub fn invalid_reason(&self, id: &str) -> Option<&str> {
        self.invalid.get(id).map(String::as_str)
    }

    /// Every rejected pack with its reason.
    pub fn invalid(&self) -> &BTreeMap<String, String> {
        &self.invalid
    }
}

/// Read, parse and validate the pack in `pack_dir`.
pub fn load_single_pack(pack_dir: &Path) -> Result<Pack, PackLoadError> {
    let manifest_path = pack_dir.join(MANIFEST_FILE);

    if !manifest_path.exists() {
        return Err(PackLoadError::MissingManifest(pack_dir.to_path_buf()));
    }

    let content = std::fs::read_to_string(&manifest_path).map_err(|e| PackLoadError::Io {
        path: manifest_path.clone(),
        source: e,
    })?;

    let manifest: PackManifest =
        serde_yaml::from_str(&content).map_err(|e| PackLoadError::YamlParse {
            path: manifest_path.clone(),
            source: e,
        })?;

    Ok(Pack::from_manifest(manifest, pack_dir)?)
}
