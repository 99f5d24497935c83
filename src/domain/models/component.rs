//! Pack components.
//!
//! A component is one contribution unit from a pack. Components are loaded
//! from the manifest and never mutated; the engine derives new values from
//! them when it needs to (see the env placeholder allocator).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A single contribution unit from a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Identifier, unique within its pack
    pub id: String,

    /// Display name (falls back to the id)
    #[serde(default)]
    pub name: String,

    /// Required components cannot be excluded
    #[serde(default)]
    pub required: bool,

    /// What installing this component does
    pub install: InstallAction,
}

impl Component {
    /// Display name, or the id when none is set.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Kind of the install action.
    pub const fn kind(&self) -> ComponentKind {
        self.install.kind()
    }
}

/// Install action payload, one shape per component kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallAction {
    /// Register an MCP server (stdio via `command`, or remote via `url`).
    McpServer {
        /// Key in the server registry
        name: String,
        /// Executable for a stdio server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        /// Arguments passed to `command`
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Environment, where `${NAME}` marks a secret
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        /// Endpoint of a remote server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Enable a plugin in the settings document.
    Plugin {
        /// Plugin identifier
        name: String,
    },

    /// A command that must be available on `PATH`. Advisory only.
    Dependency {
        /// Command looked up on `PATH`
        command: String,
        /// Install instructions shown when it is missing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    /// Copy a file from the pack into the scope.
    File {
        /// Path relative to the pack directory
        source: PathBuf,
        /// Path relative to the scope's file root
        destination: String,
    },

    /// Run a pack script. Only executed when the script is approved.
    Shell {
        /// Path relative to the pack directory
        script: PathBuf,
        /// Arguments passed to the script
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },

    /// Merge a settings fragment into the settings document.
    Settings {
        /// Fragment shaped like the settings document
        settings: serde_json::Value,
    },

    /// Add entries to the project's ignore list.
    IgnoreEntries {
        /// One ignore pattern per entry
        entries: Vec<String>,
    },
}

impl InstallAction {
    /// Kind of this action.
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::McpServer { .. } => ComponentKind::McpServer,
            Self::Plugin { .. } => ComponentKind::Plugin,
            Self::Dependency { .. } => ComponentKind::Dependency,
            Self::File { .. } => ComponentKind::File,
            Self::Shell { .. } => ComponentKind::Shell,
            Self::Settings { .. } => ComponentKind::Settings,
            Self::IgnoreEntries { .. } => ComponentKind::IgnoreEntries,
        }
    }
}

/// Kind of a component, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// [`InstallAction::McpServer`]
    McpServer,
    /// [`InstallAction::Plugin`]
    Plugin,
    /// [`InstallAction::Dependency`]
    Dependency,
    /// [`InstallAction::File`]
    File,
    /// [`InstallAction::Shell`]
    Shell,
    /// [`InstallAction::Settings`]
    Settings,
    /// [`InstallAction::IgnoreEntries`]
    IgnoreEntries,
}

impl ComponentKind {
    /// Manifest spelling of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::McpServer => "mcp_server",
            Self::Plugin => "plugin",
            Self::Dependency => "dependency",
            Self::File => "file",
            Self::Shell => "shell",
            Self::Settings => "settings",
            Self::IgnoreEntries => "ignore_entries",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mcp_server_component() {
        let yaml = r#"
id: docs
name: Docs server
required: true
install:
  type: mcp_server
  name: docs
  command: npx
  args: ["-y", "docs-mcp"]
  env:
    API_KEY: "${API_KEY}"
"#;
        let component: Component = serde_yaml::from_str(yaml).expect("component should parse");
        assert_eq!(component.id, "docs");
        assert!(component.required);
        assert_eq!(component.kind(), ComponentKind::McpServer);
        match component.install {
            InstallAction::McpServer { name, command, args, env, url } => {
                assert_eq!(name, "docs");
                assert_eq!(command.as_deref(), Some("npx"));
                assert_eq!(args, vec!["-y", "docs-mcp"]);
                assert_eq!(env.get("API_KEY").map(String::as_str), Some("${API_KEY}"));
                assert!(url.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_parse_settings_component_keeps_nested_values() {
        let yaml = r"
id: env
install:
  type: settings
  settings:
    env:
      FOO: bar
    timeout: 30
";
        let component: Component = serde_yaml::from_str(yaml).expect("component should parse");
        assert_eq!(component.display_name(), "env");
        match component.install {
            InstallAction::Settings { settings } => {
                assert_eq!(settings["env"]["FOO"], "bar");
                assert_eq!(settings["timeout"], 30);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let yaml = "id: x\ninstall:\n  type: teleport\n";
        assert!(serde_yaml::from_str::<Component>(yaml).is_err());
    }
}
