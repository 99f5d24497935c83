//! Secret placeholder allocation for MCP server environments.
//!
//! Servers reference secrets as `${NAME}` in their `env` values. When two
//! distinct servers in one run ask for the same name, the first (in install
//! order) keeps `NAME` and later ones get the first free `NAME_2`, `NAME_3`,
//! ... A name already handed out, literally or as a suffix, is never handed
//! out again. A server declared by several packs under the same name is one
//! server and shares its keys.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::{Component, InstallAction};

/// Hands out unique secret keys across the servers of one pass.
#[derive(Debug, Default)]
pub struct EnvKeyAllocator {
    /// (server, requested key) -> allocated key
    assigned: BTreeMap<(String, String), String>,
    /// Every key handed out so far
    taken: BTreeSet<String>,
}

fn is_key(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rebuild `value` with every `${NAME}` replaced by `map(NAME)`, scanning
/// once so replacements are never rewritten again.
fn rewrite(value: &str, mut map: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        if is_key(name) {
            out.push_str(&map(name));
        } else {
            out.push_str(&rest[open..open + 2 + close + 1]);
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

impl EnvKeyAllocator {
    /// An allocator with nothing taken.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_key(&mut self, server: &str, key: &str) -> String {
        let slot = (server.to_string(), key.to_string());
        if let Some(existing) = self.assigned.get(&slot) {
            return existing.clone();
        }
        let allocated = if self.taken.contains(key) {
            (2..)
                .map(|n| format!("{key}_{n}"))
                .find(|candidate| !self.taken.contains(candidate))
                .unwrap_or_else(|| key.to_string())
        } else {
            key.to_string()
        };
        self.taken.insert(allocated.clone());
        self.assigned.insert(slot, allocated.clone());
        allocated
    }

    /// Return `component` with its secret references renamed. Non-server
    /// components come back unchanged.
    pub fn allocate(&mut self, component: &Component) -> Component {
        let InstallAction::McpServer {
            name,
            command,
            args,
            env,
            url,
        } = &component.install
        else {
            return component.clone();
        };

        let rewritten = env
            .iter()
            .map(|(var, value)| {
                let value = rewrite(value, |key| {
                    let allocated = self.allocate_key(name, key);
                    format!("${{{allocated}}}")
                });
                (var.clone(), value)
            })
            .collect();

        Component {
            install: InstallAction::McpServer {
                name: name.clone(),
                command: command.clone(),
                args: args.clone(),
                env: rewritten,
                url: url.clone(),
            },
            ..component.clone()
        }
    }

    /// Every secret key handed out so far.
    pub fn required_keys(&self) -> BTreeSet<String> {
        self.assigned.values().cloned().collect()
    }
}
