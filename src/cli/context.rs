//! Per-invocation environment: directories, configuration, target scope and
//! the pack registry.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::domain::models::{Config, Scope, ScopePaths};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::fs::EnvironmentLock;
use crate::infrastructure::ledger_store::ArtifactLedger;
use crate::services::PackRegistry;

const PACKS_DIR: &str = "packs";
const LOCK_FILE: &str = "packsync.lock";

/// Resolved directories and configuration for one invocation.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// User home
    pub home: PathBuf,
    /// Project root, even when operating globally
    pub project_dir: PathBuf,
    /// Merged configuration
    pub config: Config,
    /// Scope the command operates on
    pub target: ScopePaths,
}

impl CliContext {
    /// Resolve directories and load configuration.
    pub fn resolve(project: Option<&Path>, global: bool) -> Result<Self> {
        let home = dirs::home_dir().context("Cannot determine the home directory")?;
        let project_dir = match project {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().context("Cannot determine the current directory")?,
        };
        let config = ConfigLoader::load(&project_dir, Some(&home))?;
        Ok(Self::with_config(home, project_dir, config, global))
    }

    /// Context from already-loaded configuration.
    pub fn with_config(home: PathBuf, project_dir: PathBuf, config: Config, global: bool) -> Self {
        let scope = if global {
            Scope::Global
        } else {
            Scope::project(project_dir.clone())
        };
        let target = ScopePaths::resolve(&scope, &config, &home);
        Self {
            home,
            project_dir,
            config,
            target,
        }
    }

    /// Pack search directories, lowest precedence first.
    pub fn pack_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.home.join(&self.config.state_dir).join(PACKS_DIR)];
        if !self.target.scope.is_global() {
            dirs.push(self.project_dir.join(&self.config.state_dir).join(PACKS_DIR));
        }
        dirs.extend(self.config.packs_dirs.iter().cloned());
        dirs
    }

    /// Load every pack from the search directories.
    pub fn registry(&self) -> PackRegistry {
        PackRegistry::load(&self.pack_dirs())
    }

    /// The target scope's ledger.
    pub fn ledger(&self) -> Result<ArtifactLedger> {
        Ok(ArtifactLedger::load(&self.target.state_file)?)
    }

    /// One lock file guards every scope of this user.
    pub fn lock_path(&self) -> PathBuf {
        self.home.join(&self.config.state_dir).join(LOCK_FILE)
    }

    /// Take the environment lock for a mutating command.
    pub fn lock(&self) -> Result<EnvironmentLock> {
        Ok(EnvironmentLock::acquire(&self.lock_path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_dirs_order() {
        let mut config = Config::default();
        config.packs_dirs.push(PathBuf::from("/opt/packs"));
        let ctx = CliContext::with_config("/home/u".into(), "/work/app".into(), config, false);
        assert_eq!(
            ctx.pack_dirs(),
            vec![
                PathBuf::from("/home/u/.packsync/packs"),
                PathBuf::from("/work/app/.packsync/packs"),
                PathBuf::from("/opt/packs"),
            ]
        );
        assert_eq!(ctx.lock_path(), PathBuf::from("/home/u/.packsync/packsync.lock"));
    }

    #[test]
    fn test_global_scope_skips_project_packs() {
        let ctx =
            CliContext::with_config("/home/u".into(), "/work/app".into(), Config::default(), true);
        assert!(ctx.target.scope.is_global());
        assert_eq!(ctx.pack_dirs(), vec![PathBuf::from("/home/u/.packsync/packs")]);
    }
}
