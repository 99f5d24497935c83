//! Tool configuration: pack directories, file locations, template and logging.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for packsync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Extra directories searched for packs (after the built-in ones)
    #[serde(default)]
    pub packs_dirs: Vec<PathBuf>,

    /// Directory (relative to the scope root) holding ledger, trust and lock files
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Settings document, relative to the scope root
    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    /// Instruction document for project scopes, relative to the project root
    #[serde(default = "default_template_file")]
    pub template_file: String,

    /// Instruction document for the global scope, relative to the home directory
    #[serde(default = "default_global_template_file")]
    pub global_template_file: String,

    /// MCP server registry for project scopes
    #[serde(default = "default_mcp_file")]
    pub mcp_file: String,

    /// MCP server registry for the global scope, relative to the home directory
    #[serde(default = "default_global_mcp_file")]
    pub global_mcp_file: String,

    /// Instruction document composition
    #[serde(default)]
    pub template: TemplateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> String {
    ".packsync".to_string()
}

fn default_settings_file() -> String {
    ".claude/settings.json".to_string()
}

fn default_template_file() -> String {
    "CLAUDE.md".to_string()
}

fn default_global_template_file() -> String {
    ".claude/CLAUDE.md".to_string()
}

fn default_mcp_file() -> String {
    ".mcp.json".to_string()
}

fn default_global_mcp_file() -> String {
    ".claude.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packs_dirs: vec![],
            state_dir: default_state_dir(),
            settings_file: default_settings_file(),
            template_file: default_template_file(),
            global_template_file: default_global_template_file(),
            mcp_file: default_mcp_file(),
            global_mcp_file: default_global_mcp_file(),
            template: TemplateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Instruction document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TemplateConfig {
    /// Content of the implicit `core` section
    #[serde(default = "default_core_content")]
    pub core_content: String,

    /// Static placeholder values available to every pack
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn default_core_content() -> String {
    "# {{PROJECT_NAME}}\n\nSections between packsync markers are managed automatically. \
     Anything outside them is yours and is kept as-is."
        .to_string()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            core_content: default_core_content(),
            values: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (if None logs only go to stderr)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Console log encoding.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Compact human-readable lines
    #[default]
    Pretty,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file each day
    #[default]
    Daily,
    /// New file each hour
    Hourly,
    /// A single file
    Never,
}
