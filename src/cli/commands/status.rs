//! `packsync status`: what the ledger says is installed.

use anyhow::Result;
use comfy_table::Cell;

use crate::cli::context::CliContext;
use crate::cli::output::{CommandOutput, TableFormatter, output};
use crate::domain::models::ledger::PENDING_REMOVAL;
use crate::infrastructure::ledger_store::ArtifactLedger;
use crate::services::PackRegistry;

/// One pack the ledger records.
#[derive(Debug, serde::Serialize)]
pub struct InstalledPack {
    /// Pack id
    pub id: String,
    /// Version at the last sync
    pub installed_version: Option<String>,
    /// Version currently offered by the registry, if the pack is still available
    pub available_version: Option<String>,
    /// Still found in the pack directories
    pub available: bool,
    /// Owned artifact count
    pub artifacts: usize,
    /// Deselected components
    pub excluded: Vec<String>,
    /// Artifacts parked after a failed removal
    pub pending_removal: usize,
}

impl InstalledPack {
    /// Whether the offered version differs from the installed one.
    pub fn drifted(&self) -> bool {
        self.available && self.installed_version != self.available_version
    }
}

/// Result of `status`.
#[derive(Debug, serde::Serialize)]
pub struct StatusOutput {
    /// Scope label
    pub scope: String,
    /// Ledger location
    pub state_file: String,
    /// RFC 3339 time of the last durable sync
    pub last_synced_at: Option<String>,
    /// Recorded packs
    pub packs: Vec<InstalledPack>,
    /// Packs no longer active whose artifacts still await removal
    pub orphaned: Vec<String>,
}

impl StatusOutput {
    /// Compare the ledger with the registry.
    pub fn build(ledger: &ArtifactLedger, registry: &PackRegistry, scope: String) -> Self {
        let state = ledger.state();
        let packs = state
            .active_packs
            .iter()
            .map(|id| {
                let record = state.record(id);
                let available = registry.get(id);
                InstalledPack {
                    id: id.clone(),
                    installed_version: record.and_then(|r| r.version.clone()),
                    available_version: available.and_then(|p| p.version().map(str::to_string)),
                    available: available.is_some(),
                    artifacts: record.map_or(0, |r| r.artifacts().len()),
                    excluded: state.excluded_for(id).into_iter().collect(),
                    pending_removal: record
                        .and_then(|r| r.components.get(PENDING_REMOVAL))
                        .map_or(0, |set| set.len()),
                }
            })
            .collect();
        let orphaned = state
            .artifacts
            .keys()
            .filter(|id| !state.active_packs.contains(*id))
            .cloned()
            .collect();

        Self {
            scope,
            state_file: ledger.path().display().to_string(),
            last_synced_at: state.last_synced_at.map(|t| t.to_rfc3339()),
            packs,
            orphaned,
        }
    }
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        if self.packs.is_empty() && self.orphaned.is_empty() {
            return format!("No packs installed in {}.", self.scope);
        }

        let formatter = TableFormatter::new();
        let rows = self
            .packs
            .iter()
            .map(|p| {
                let available = if p.available {
                    p.available_version.clone().unwrap_or_else(|| "-".to_string())
                } else {
                    "missing".to_string()
                };
                vec![
                    Cell::new(&p.id),
                    Cell::new(p.installed_version.as_deref().unwrap_or("-")),
                    formatter.drift(available, p.drifted() || !p.available),
                    Cell::new(p.artifacts),
                    Cell::new(if p.excluded.is_empty() {
                        "-".to_string()
                    } else {
                        p.excluded.join(", ")
                    }),
                ]
            })
            .collect();

        let mut lines = vec![
            format!("Scope: {}", self.scope),
            format!("Last synced: {}", self.last_synced_at.as_deref().unwrap_or("never")),
            formatter.render(&["Pack", "Installed", "Available", "Artifacts", "Excluded"], rows),
        ];
        let drifted: Vec<&str> = self
            .packs
            .iter()
            .filter(|p| p.drifted())
            .map(|p| p.id.as_str())
            .collect();
        if !drifted.is_empty() {
            lines.push(format!(
                "Updates available: {} (run `packsync pack update`)",
                drifted.join(", ")
            ));
        }
        let pending: usize = self.packs.iter().map(|p| p.pending_removal).sum();
        if pending > 0 || !self.orphaned.is_empty() {
            let orphaned = if self.orphaned.is_empty() {
                "none".to_string()
            } else {
                self.orphaned.join(", ")
            };
            lines.push(format!(
                "Artifacts awaiting removal: {pending} (plus retired packs: {orphaned}); \
                 the next sync retries them"
            ));
        }
        lines.join("\n")
    }
}

/// Run `status`.
pub fn execute(ctx: &CliContext, json_mode: bool) -> Result<()> {
    let ledger = ctx.ledger()?;
    let registry = ctx.registry();
    output(&StatusOutput::build(&ledger, &registry, ctx.target.scope.to_string()), json_mode);
    Ok(())
}
