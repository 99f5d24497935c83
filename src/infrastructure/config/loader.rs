use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `logging.level` is not a tracing level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// A required path is blank.
    #[error("Configuration value '{0}' cannot be empty")]
    EmptyPath(&'static str),

    /// A scope-relative path is absolute.
    #[error("Configuration value '{field}' must be relative to the scope root, got {value}")]
    AbsolutePath {
        /// Config key
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Figment could not extract a config.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. ~/.packsync/config.yaml (user config)
    /// 3. <project>/.packsync/config.yaml (project config)
    /// 4. <project>/.packsync/local.yaml (uncommitted local overrides)
    /// 5. Environment variables (PACKSYNC_* prefix, `__` separates nesting)
    pub fn load(project_dir: &Path, home: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for file in Self::config_files(project_dir, home) {
            figment = figment.merge(Yaml::file(file));
        }

        let config: Config = figment
            .merge(Env::prefixed("PACKSYNC_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Config files consulted by [`ConfigLoader::load`], lowest precedence first.
    pub fn config_files(project_dir: &Path, home: Option<&Path>) -> Vec<PathBuf> {
        let state_dir = Config::default().state_dir;
        let mut files = Vec::with_capacity(3);
        if let Some(home) = home {
            files.push(home.join(&state_dir).join("config.yaml"));
        }
        files.push(project_dir.join(&state_dir).join("config.yaml"));
        files.push(project_dir.join(&state_dir).join("local.yaml"));
        files
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let relative_paths = [
            ("state_dir", &config.state_dir),
            ("settings_file", &config.settings_file),
            ("template_file", &config.template_file),
            ("global_template_file", &config.global_template_file),
            ("mcp_file", &config.mcp_file),
            ("global_mcp_file", &config.global_mcp_file),
        ];
        for (field, value) in relative_paths {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyPath(field));
            }
            if Path::new(value).is_absolute() {
                return Err(ConfigError::AbsolutePath {
                    field,
                    value: value.clone(),
                });
            }
        }

        for (name, _) in &config.template.values {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::ValidationFailed(format!(
                    "template value name '{name}' may only contain letters, digits and '_'"
                )));
            }
        }

        Ok(())
    }
}
