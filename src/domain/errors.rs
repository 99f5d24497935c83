//! Domain errors for packsync.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that abort a reconciliation pass.
///
/// Per-artifact install/remove problems are not errors at this level; they are
/// collected as [`crate::domain::models::ArtifactFailure`] entries on the run
/// report so the rest of the pass can proceed.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A persisted ledger or settings document exists but cannot be parsed.
    #[error(
        "{} is corrupt: {reason}. Move or delete the file (after saving anything you need \
         from it) and re-run `packsync sync` to rebuild it",
        path.display()
    )]
    CorruptState {
        /// Unreadable file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// A pack manifest is structurally invalid or a request violates it.
    #[error("Pack '{pack}' is invalid: {reason}")]
    Validation {
        /// Offending pack id
        pack: String,
        /// What is wrong with it
        reason: String,
    },

    /// A requested pack id is not in any pack directory.
    #[error("Unknown pack: {0}")]
    UnknownPack(String),

    /// The operator declined to proceed past naming collisions.
    #[error("Aborted: {count} name collision(s) with installed packs were not confirmed")]
    CollisionsDeclined {
        /// Collisions that were shown
        count: usize,
    },

    /// Another process holds the environment lock.
    #[error(
        "Another packsync process is modifying this environment (lock held at {}). \
         Wait for it to finish and retry",
        path.display()
    )]
    LockHeld {
        /// Lock file
        path: PathBuf,
    },

    /// Reading or writing a scope file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// A persisted document that exists but cannot be parsed.
    pub fn corrupt(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::CorruptState {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// A pack rejected for `reason`.
    pub fn validation(pack: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            pack: pack.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
