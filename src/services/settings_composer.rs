//! Non-destructive settings merge and targeted key removal.
//!
//! Policy, field by field:
//! - passthrough keys: maps merge recursively, anything else keeps the base
//!   value (existing always wins), keys only in the contribution are adopted
//! - hooks: appended per event, dropping groups whose command already runs
//!   for that event
//! - plugins: additive union, existing flags never change

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::domain::models::{ArtifactId, HookGroup, SettingsDocument};

const HOOKS_KEY: &str = "hooks";
const PLUGINS_KEY: &str = "enabledPlugins";

/// Merge `contribution` into `base`. `base` wins every scalar conflict.
pub fn merge(base: &SettingsDocument, contribution: &SettingsDocument) -> SettingsDocument {
    let mut merged = base.clone();

    for (event, groups) in &contribution.hooks {
        let mut seen: BTreeSet<&str> = merged
            .hooks
            .get(event)
            .into_iter()
            .flatten()
            .flat_map(HookGroup::commands)
            .collect();

        let mut appended = Vec::new();
        for group in groups {
            let commands: Vec<&str> = group.commands().collect();
            if commands.is_empty() || commands.iter().any(|c| seen.contains(c)) {
                continue;
            }
            seen.extend(commands);
            appended.push(group.clone());
        }

        if !appended.is_empty() {
            merged.hooks.entry(event.clone()).or_default().extend(appended);
        }
    }

    for (plugin, enabled) in &contribution.enabled_plugins {
        merged.enabled_plugins.entry(plugin.clone()).or_insert(*enabled);
    }

    merge_maps(&mut merged.extra, &contribution.extra);
    merged
}

fn merge_maps(base: &mut Map<String, Value>, contribution: &Map<String, Value>) {
    for (key, value) in contribution {
        match base.get_mut(key) {
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = value {
                    merge_maps(existing, incoming);
                }
            }
            Some(_) => {}
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A settings location that can be removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyPath {
    /// A whole top-level entry (`model`, `hooks`, `enabledPlugins`)
    TopLevel(String),
    /// One sub-key of a top-level map (`env.FOO`, `hooks.SessionStart`)
    Nested { key: String, sub: String },
    /// One hook command under an event
    HookCommand { event: String, command: String },
}

impl KeyPath {
    /// Split a dotted path at its first dot.
    pub fn parse(path: &str) -> Self {
        match path.split_once('.') {
            Some((key, sub)) if !key.is_empty() && !sub.is_empty() => Self::Nested {
                key: key.to_string(),
                sub: sub.to_string(),
            },
            _ => Self::TopLevel(path.to_string()),
        }
    }

    /// The removal that retires a settings artifact, if it lives in the settings document.
    pub fn from_artifact(artifact: &ArtifactId) -> Option<Self> {
        match artifact {
            ArtifactId::SettingsKey { path } => Some(Self::parse(path)),
            ArtifactId::HookCommand { event, command } => Some(Self::HookCommand {
                event: event.clone(),
                command: command.clone(),
            }),
            ArtifactId::Plugin { name } => Some(Self::Nested {
                key: PLUGINS_KEY.to_string(),
                sub: name.clone(),
            }),
            _ => None,
        }
    }
}

impl FromStr for KeyPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel(key) => f.write_str(key),
            Self::Nested { key, sub } => write!(f, "{key}.{sub}"),
            Self::HookCommand { event, command } => write!(f, "hooks.{event}[{command}]"),
        }
    }
}

/// Remove every path from `document`. Paths that are not present are ignored.
pub fn remove_keys(document: &mut SettingsDocument, paths: &[KeyPath]) {
    for path in paths {
        remove_key(document, path);
    }
}

fn remove_key(document: &mut SettingsDocument, path: &KeyPath) {
    match path {
        KeyPath::TopLevel(key) if key == HOOKS_KEY => document.hooks.clear(),
        KeyPath::TopLevel(key) if key == PLUGINS_KEY => document.enabled_plugins.clear(),
        KeyPath::TopLevel(key) => {
            document.extra.remove(key);
        }
        KeyPath::Nested { key, sub } if key == HOOKS_KEY => {
            document.hooks.remove(sub);
        }
        KeyPath::Nested { key, sub } if key == PLUGINS_KEY => {
            document.enabled_plugins.remove(sub);
        }
        KeyPath::Nested { key, sub } => {
            let now_empty = match document.extra.get_mut(key) {
                Some(Value::Object(map)) => {
                    map.remove(sub);
                    map.is_empty()
                }
                _ => false,
            };
            if now_empty {
                document.extra.remove(key);
            }
        }
        KeyPath::HookCommand { event, command } => {
            if let Some(groups) = document.hooks.get_mut(event) {
                for group in groups.iter_mut() {
                    group.hooks.retain(|h| &h.command != command);
                }
                groups.retain(|g| !g.hooks.is_empty());
                if groups.is_empty() {
                    document.hooks.remove(event);
                }
            }
        }
    }
}

/// The artifacts a settings fragment introduces.
///
/// Map-valued passthrough keys are tracked per sub-key so two packs can
/// share a parent such as `env`; scalar keys are tracked whole.
pub fn contributed_artifacts(fragment: &SettingsDocument) -> BTreeSet<ArtifactId> {
    let mut artifacts = BTreeSet::new();

    for (key, value) in &fragment.extra {
        match value {
            Value::Object(map) if !map.is_empty() => {
                artifacts.extend(
                    map.keys()
                        .map(|sub| ArtifactId::settings_key(format!("{key}.{sub}"))),
                );
            }
            _ => {
                artifacts.insert(ArtifactId::settings_key(key.clone()));
            }
        }
    }
    for (event, groups) in &fragment.hooks {
        for command in groups.iter().flat_map(HookGroup::commands) {
            artifacts.insert(ArtifactId::hook_command(event.clone(), command));
        }
    }
    artifacts.extend(fragment.enabled_plugins.keys().map(ArtifactId::plugin));

    artifacts
}

/// Whether `document` already carries the location an artifact names.
pub fn contains(document: &SettingsDocument, artifact: &ArtifactId) -> bool {
    match KeyPath::from_artifact(artifact) {
        Some(KeyPath::TopLevel(key)) => document.extra.contains_key(&key),
        Some(KeyPath::Nested { key, sub }) if key == PLUGINS_KEY => {
            document.enabled_plugins.contains_key(&sub)
        }
        Some(KeyPath::Nested { key, sub }) if key == HOOKS_KEY => document.hooks.contains_key(&sub),
        Some(KeyPath::Nested { key, sub }) => document
            .extra
            .get(&key)
            .and_then(Value::as_object)
            .is_some_and(|map| map.contains_key(&sub)),
        Some(KeyPath::HookCommand { event, command }) => document
            .hooks
            .get(&event)
            .is_some_and(|groups| {
                groups
                    .iter()
                    .flat_map(HookGroup::commands)
                    .any(|c| c == command)
            }),
        None => false,
    }
}
