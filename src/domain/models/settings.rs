//! Settings document model.
//!
//! Only `hooks` and `enabledPlugins` are interpreted. Every other top-level key
//! is carried through `extra` untouched so a load/save round trip never loses
//! anything the tool does not own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A structured settings document (one per scope).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    /// Event name -> ordered hook groups
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, Vec<HookGroup>>,

    /// Plugin name -> enabled
    #[serde(rename = "enabledPlugins", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enabled_plugins: BTreeMap<String, bool>,

    /// Passthrough bag of uninterpreted keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A matcher plus the commands it triggers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookGroup {
    /// Tool-name pattern; absent matches every event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,

    /// Commands run in order
    #[serde(default)]
    pub hooks: Vec<HookCommand>,

    /// Uninterpreted keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One command run when a hook group fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCommand {
    /// Hook type, `command` unless stated
    #[serde(rename = "type", default = "default_hook_type")]
    pub kind: String,

    /// Shell command line
    pub command: String,

    /// Uninterpreted keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_hook_type() -> String {
    "command".to_string()
}

impl HookCommand {
    /// A plain `command` hook.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            kind: default_hook_type(),
            command: command.into(),
            extra: Map::new(),
        }
    }
}

impl HookGroup {
    /// Group of command hooks under an optional matcher.
    pub fn new(matcher: Option<&str>, commands: &[&str]) -> Self {
        Self {
            matcher: matcher.map(str::to_string),
            hooks: commands.iter().map(|c| HookCommand::new(*c)).collect(),
            extra: Map::new(),
        }
    }

    /// Command lines in declaration order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|h| h.command.as_str())
    }
}

impl SettingsDocument {
    /// Parse a JSON value, rejecting malformed `hooks` or `enabledPlugins`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serialize back to a JSON value.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Whether the document carries no keys at all.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.enabled_plugins.is_empty() && self.extra.is_empty()
    }

    /// Pretty JSON with a trailing newline, as written to disk.
    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}\n", serde_json::to_string_pretty(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_preserves_unknown_keys() {
        let raw = json!({
            "model": "opus",
            "permissions": {"allow": ["Bash(ls:*)"], "deny": []},
            "enabledPlugins": {"a@m": true},
            "hooks": {
                "SessionStart": [
                    {
                        "matcher": "startup",
                        "hooks": [{"type": "command", "command": "echo hi", "timeout": 5}]
                    }
                ]
            },
            "statusLine": {"type": "command", "command": "status.sh", "padding": 0}
        });

        let doc = SettingsDocument::from_value(raw.clone()).unwrap();
        assert_eq!(doc.extra.len(), 3);
        assert_eq!(doc.hooks["SessionStart"][0].hooks[0].extra["timeout"], 5);
        assert_eq!(doc.to_value().unwrap(), raw);
    }

    #[test]
    fn test_empty_document_serializes_to_empty_object() {
        let doc = SettingsDocument::default();
        assert!(doc.is_empty());
        assert_eq!(doc.to_value().unwrap(), json!({}));
    }

    #[test]
    fn test_malformed_hooks_are_rejected() {
        assert!(SettingsDocument::from_value(json!({"hooks": "nope"})).is_err());
    }
}
