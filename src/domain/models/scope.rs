//! Target scopes and the on-disk locations that belong to each.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::config::Config;

/// Where a reconciliation pass installs contributions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// A single project directory.
    Project {
        /// Project directory
        root: PathBuf,
    },
    /// The user's global environment.
    Global,
}

impl Scope {
    /// Project scope rooted at `root`.
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::Project { root: root.into() }
    }

    /// Whether this is the user's global environment.
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Scope kind without its root.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project { .. } => "project",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project { root } => write!(f, "project:{}", root.display()),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Resolved file locations for one scope.
///
/// Both scopes share the same structure; only the roots and a few file names
/// differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePaths {
    /// Scope these paths belong to.
    pub scope: Scope,
    /// Project directory, or the home directory for the global scope.
    pub root: PathBuf,
    /// Ledger (`ProjectState`) file.
    pub state_file: PathBuf,
    /// Structured settings document.
    pub settings_file: PathBuf,
    /// Instruction document with managed sections.
    pub template_file: PathBuf,
    /// MCP server registry file.
    pub mcp_file: PathBuf,
    /// Base directory file artifacts are installed relative to.
    pub files_root: PathBuf,
    /// Ignore list; only projects have one.
    pub ignore_file: Option<PathBuf>,
    /// Approved script hashes.
    pub trust_file: PathBuf,
}

impl ScopePaths {
    /// Locations for `scope`, with global ones under `home`.
    pub fn resolve(scope: &Scope, config: &Config, home: &Path) -> Self {
        match scope {
            Scope::Project { root } => {
                let state_dir = root.join(&config.state_dir);
                Self {
                    scope: scope.clone(),
                    root: root.clone(),
                    state_file: state_dir.join("state.json"),
                    settings_file: root.join(&config.settings_file),
                    template_file: root.join(&config.template_file),
                    mcp_file: root.join(&config.mcp_file),
                    files_root: root.clone(),
                    ignore_file: Some(root.join(".gitignore")),
                    trust_file: state_dir.join("trust.json"),
                }
            }
            Scope::Global => {
                let state_dir = home.join(&config.state_dir);
                Self {
                    scope: Scope::Global,
                    root: home.to_path_buf(),
                    state_file: state_dir.join("global-state.json"),
                    settings_file: home.join(&config.settings_file),
                    template_file: home.join(&config.global_template_file),
                    mcp_file: home.join(&config.global_mcp_file),
                    files_root: home.to_path_buf(),
                    ignore_file: None,
                    trust_file: state_dir.join("trust.json"),
                }
            }
        }
    }

    /// Display name used for the scope in placeholders and reports.
    pub fn display_name(&self) -> String {
        match &self.scope {
            Scope::Project { root } => root
                .file_name()
                .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Scope::Global => "global".to_string(),
        }
    }
}
