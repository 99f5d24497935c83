//! Approved script hashes, kept per scope in a JSON file.
//!
//! ```json
//! { "my-pack": { "scripts/setup.sh": "sha256:..." } }
//! ```
//!
//! Hashes are recorded by whoever approves a script; this store only reads them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::models::Pack;
use crate::domain::ports::TrustStore;
use crate::infrastructure::fs::read_optional;

type TrustFile = BTreeMap<String, BTreeMap<PathBuf, String>>;

/// Approved script hashes read from a JSON trust file.
#[derive(Debug, Clone, Default)]
pub struct FileTrustStore {
    entries: TrustFile,
}

impl FileTrustStore {
    /// Load the trust file. A missing file trusts nothing; an unreadable or
    /// malformed one is logged and also trusts nothing.
    pub fn load(path: &Path) -> Self {
        let entries = match read_optional(path) {
            Ok(Some(contents)) => serde_json::from_str::<TrustFile>(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed trust file");
                TrustFile::new()
            }),
            Ok(None) => TrustFile::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read trust file");
                TrustFile::new()
            }
        };
        Self { entries }
    }

    /// Approved scripts across every pack.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is approved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrustStore for FileTrustStore {
    fn trusted_hashes(&self, pack: &Pack) -> BTreeMap<PathBuf, String> {
        self.entries.get(pack.id()).cloned().unwrap_or_default()
    }
}
