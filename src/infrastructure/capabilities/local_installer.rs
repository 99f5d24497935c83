//! Filesystem-backed installer for servers, files, ignore entries,
//! dependency checks and approved scripts.
//!
//! Content already present at an install location is only replaced or
//! claimed when some pack owns it. Anything else is the user's.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value, json};

use crate::domain::models::{ArtifactId, Component, InstallAction, Pack, ScopePaths};
use crate::domain::ports::{
    ArtifactProbe, ArtifactUninstaller, CapabilityError, ComponentInstaller,
};
use crate::infrastructure::fs::{read_optional, write_atomic};
use crate::infrastructure::settings_store;
use crate::services::{settings_composer, template_composer};

const SERVERS_KEY: &str = "mcpServers";

/// Installs components by editing files under the scope root.
#[derive(Debug, Clone, Default)]
pub struct LocalInstaller;

impl LocalInstaller {
    /// A stateless installer.
    pub fn new() -> Self {
        Self
    }
}

/// What an install location holds before the install runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Existing {
    Absent,
    Matches,
    Differs,
}

/// Whether the pack may claim `artifact`. Unowned content that matches is
/// left unclaimed; unowned content that differs is a conflict.
fn may_claim(
    artifact: &ArtifactId,
    existing: Existing,
    claimed: &BTreeSet<ArtifactId>,
) -> Result<bool, CapabilityError> {
    match existing {
        Existing::Absent => Ok(true),
        _ if claimed.contains(artifact) => Ok(true),
        Existing::Matches => Ok(false),
        Existing::Differs => Err(CapabilityError::Conflict {
            artifact: artifact.to_string(),
        }),
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CapabilityError + '_ {
    move |e| CapabilityError::io(path, e)
}

/// Load the server registry document, which may hold unrelated keys.
fn load_registry(path: &Path) -> Result<Map<String, Value>, CapabilityError> {
    let Some(contents) = read_optional(path).map_err(io_err(path))? else {
        return Ok(Map::new());
    };
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CapabilityError::InvalidDocument {
            path: path.to_path_buf(),
            reason: "top-level value must be an object".to_string(),
        }),
        Err(e) => Err(CapabilityError::InvalidDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn save_registry(path: &Path, registry: &Map<String, Value>) -> Result<(), CapabilityError> {
    let json =
        serde_json::to_string_pretty(registry).map_err(|e| CapabilityError::InvalidDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    write_atomic(path, format!("{json}\n").as_bytes()).map_err(io_err(path))
}

fn server_entry(
    command: Option<&String>,
    args: &[String],
    env: &BTreeMap<String, String>,
    url: Option<&String>,
) -> Value {
    match (command, url) {
        (_, Some(url)) => json!({"type": "http", "url": url}),
        (command, None) => {
            let mut entry = Map::new();
            entry.insert("command".to_string(), json!(command));
            if !args.is_empty() {
                entry.insert("args".to_string(), json!(args));
            }
            if !env.is_empty() {
                entry.insert("env".to_string(), json!(env));
            }
            Value::Object(entry)
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, CapabilityError> {
    Ok(read_optional(path)
        .map_err(io_err(path))?
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), CapabilityError> {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    write_atomic(path, text.as_bytes()).map_err(io_err(path))
}

fn ignore_file(target: &ScopePaths) -> Result<&Path, CapabilityError> {
    target.ignore_file.as_deref().ok_or_else(|| {
        CapabilityError::Unsupported(format!(
            "ignore entries in the {} scope",
            target.scope.as_str()
        ))
    })
}

fn on_path(command: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(command).is_file())
}

impl LocalInstaller {
    fn install_server(
        &self,
        name: &str,
        entry: Value,
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let path = &target.mcp_file;
        let id = ArtifactId::mcp_server(name);
        let mut registry = load_registry(path)?;
        let servers = registry
            .entry(SERVERS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(servers) = servers else {
            return Err(CapabilityError::InvalidDocument {
                path: path.clone(),
                reason: format!("'{SERVERS_KEY}' must be an object"),
            });
        };

        let existing = match servers.get(name) {
            None => Existing::Absent,
            Some(current) if current == &entry => Existing::Matches,
            Some(_) => Existing::Differs,
        };
        if !may_claim(&id, existing, claimed)? {
            tracing::debug!(server = name, "identical user server left unclaimed");
            return Ok(Vec::new());
        }
        if existing != Existing::Matches {
            servers.insert(name.to_string(), entry);
            save_registry(path, &registry)?;
            tracing::info!(server = name, path = %path.display(), "registered MCP server");
        }
        Ok(vec![id])
    }

    fn install_file(
        &self,
        pack: &Pack,
        source: &Path,
        destination: &str,
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let from = pack.root.join(source);
        let to = target.files_root.join(destination);
        let id = ArtifactId::file(destination);
        let contents = std::fs::read(&from).map_err(io_err(&from))?;

        let existing = match std::fs::read(&to) {
            Ok(current) if current == contents => Existing::Matches,
            Ok(_) => Existing::Differs,
            Err(e) if e.kind() == ErrorKind::NotFound => Existing::Absent,
            Err(e) => return Err(CapabilityError::io(&to, e)),
        };
        if !may_claim(&id, existing, claimed)? {
            tracing::debug!(destination = %to.display(), "identical user file left unclaimed");
            return Ok(Vec::new());
        }
        if existing != Existing::Matches {
            write_atomic(&to, &contents).map_err(io_err(&to))?;
            tracing::info!(destination = %to.display(), "installed file");
        }
        Ok(vec![id])
    }

    fn install_ignore_entries(
        &self,
        entries: &[String],
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let path = ignore_file(target)?;
        let mut lines = read_lines(path)?;
        let before = lines.len();
        let mut artifacts = Vec::new();
        for entry in entries {
            let id = ArtifactId::ignore_entry(entry);
            let existing = if lines.iter().any(|l| l.trim_end() == entry) {
                Existing::Matches
            } else {
                lines.push(entry.clone());
                Existing::Absent
            };
            if may_claim(&id, existing, claimed)? {
                artifacts.push(id);
            }
        }
        if lines.len() != before {
            write_lines(path, &lines)?;
        }
        Ok(artifacts)
    }

    fn run_script(
        &self,
        pack: &Pack,
        script: &Path,
        args: &[String],
        target: &ScopePaths,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let script_path: PathBuf = pack.root.join(script);
        let output = Command::new("sh")
            .arg(&script_path)
            .args(args)
            .current_dir(&target.root)
            .env("PACKSYNC_PACK_DIR", &pack.root)
            .env("PACKSYNC_SCOPE", target.scope.as_str())
            .output()
            .map_err(io_err(&script_path))?;

        if output.status.success() {
            tracing::info!(pack = %pack.id(), script = %script.display(), "ran pack script");
            Ok(Vec::new())
        } else {
            Err(CapabilityError::CommandFailed(format!(
                "{} exited with {}: {}",
                script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl ComponentInstaller for LocalInstaller {
    fn install(
        &self,
        pack: &Pack,
        component: &Component,
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        match &component.install {
            InstallAction::McpServer {
                name,
                command,
                args,
                env,
                url,
            } => {
                let entry = server_entry(command.as_ref(), args, env, url.as_ref());
                self.install_server(name, entry, target, claimed)
            }
            InstallAction::File {
                source,
                destination,
            } => self.install_file(pack, source, destination, target, claimed),
            InstallAction::IgnoreEntries { entries } => {
                self.install_ignore_entries(entries, target, claimed)
            }
            InstallAction::Dependency { command, hint } => {
                if on_path(command) {
                    Ok(Vec::new())
                } else {
                    Err(CapabilityError::MissingDependency {
                        command: command.clone(),
                        hint: hint.clone(),
                    })
                }
            }
            InstallAction::Shell { script, args } => self.run_script(pack, script, args, target),
            InstallAction::Settings { .. } | InstallAction::Plugin { .. } => {
                Err(CapabilityError::Unsupported(format!(
                    "{} components are merged into the settings document",
                    component.kind()
                )))
            }
        }
    }
}

impl ArtifactUninstaller for LocalInstaller {
    fn uninstall(&self, artifact: &ArtifactId, target: &ScopePaths) -> Result<(), CapabilityError> {
        match artifact {
            ArtifactId::McpServer { name } => {
                let path = &target.mcp_file;
                let mut registry = load_registry(path)?;
                let removed = registry
                    .get_mut(SERVERS_KEY)
                    .and_then(Value::as_object_mut)
                    .and_then(|servers| servers.remove(name))
                    .is_some();
                if removed {
                    save_registry(path, &registry)?;
                    tracing::info!(server = %name, "unregistered MCP server");
                }
                Ok(())
            }
            ArtifactId::File { path } => {
                let full = target.files_root.join(path);
                match std::fs::remove_file(&full) {
                    Ok(()) => {
                        tracing::info!(path = %full.display(), "removed file");
                        Ok(())
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(CapabilityError::io(full, e)),
                }
            }
            ArtifactId::IgnoreEntry { pattern } => {
                let path = ignore_file(target)?;
                let mut lines = read_lines(path)?;
                let before = lines.len();
                lines.retain(|l| l.trim_end() != pattern);
                if lines.len() != before {
                    write_lines(path, &lines)?;
                }
                Ok(())
            }
            other => Err(CapabilityError::Unsupported(format!("uninstalling {other}"))),
        }
    }
}

impl ArtifactProbe for LocalInstaller {
    fn is_present(&self, artifact: &ArtifactId, target: &ScopePaths) -> bool {
        match artifact {
            ArtifactId::McpServer { name } => load_registry(&target.mcp_file).is_ok_and(|registry| {
                registry
                    .get(SERVERS_KEY)
                    .and_then(Value::as_object)
                    .is_some_and(|servers| servers.contains_key(name))
            }),
            ArtifactId::File { path } => target.files_root.join(path).is_file(),
            ArtifactId::IgnoreEntry { pattern } => ignore_file(target)
                .and_then(read_lines)
                .is_ok_and(|lines| lines.iter().any(|l| l.trim_end() == pattern)),
            ArtifactId::TemplateSection { id } => read_optional(&target.template_file)
                .ok()
                .flatten()
                .is_some_and(|doc| {
                    template_composer::parse_sections(&doc)
                        .iter()
                        .any(|s| &s.id == id)
                }),
            settings => settings_store::load(&target.settings_file)
                .is_ok_and(|doc| settings_composer::contains(&doc, settings)),
        }
    }
}
