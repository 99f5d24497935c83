//! `packsync pack ...` commands.

use anyhow::{Result, bail};
use comfy_table::Cell;
use std::collections::BTreeSet;

use crate::cli::commands::sync::{converge, current_desired, finish, parse_exclusions};
use crate::cli::context::CliContext;
use crate::cli::output::{CommandOutput, TableFormatter, output, truncate};
use crate::cli::types::PackCommands;
use crate::services::PackRegistry;

/// One row of `pack list`.
#[derive(Debug, serde::Serialize)]
pub struct PackSummary {
    /// Pack id
    pub id: String,
    /// Display name
    pub name: String,
    /// Manifest version
    pub version: Option<String>,
    /// One-line description
    pub description: String,
    /// Component count
    pub components: usize,
    /// Template section count
    pub sections: usize,
    /// Declared dependencies
    pub depends_on: Vec<String>,
    /// Installed in this scope
    pub active: bool,
}

/// Result of `pack list`.
#[derive(Debug, serde::Serialize)]
pub struct PackListOutput {
    /// Scope label
    pub scope: String,
    /// Valid packs
    pub packs: Vec<PackSummary>,
    /// Pack id -> reason the manifest was rejected
    pub invalid: Vec<InvalidPack>,
}

/// A pack whose manifest was rejected.
#[derive(Debug, serde::Serialize)]
pub struct InvalidPack {
    /// Pack id or directory name
    pub id: String,
    /// Rejection reason
    pub reason: String,
}

impl PackListOutput {
    /// Summarize `registry`, marking packs in `active`.
    pub fn build(registry: &PackRegistry, active: &BTreeSet<String>, scope: String) -> Self {
        let packs = registry
            .iter()
            .map(|pack| PackSummary {
                id: pack.id().to_string(),
                name: pack.manifest.name.clone(),
                version: pack.version().map(str::to_string),
                description: pack.manifest.description.clone(),
                components: pack.components().len(),
                sections: pack.sections().len(),
                depends_on: pack.manifest.depends_on.clone(),
                active: active.contains(pack.id()),
            })
            .collect();
        let invalid = registry
            .invalid()
            .iter()
            .map(|(id, reason)| InvalidPack {
                id: id.clone(),
                reason: reason.clone(),
            })
            .collect();
        Self { scope, packs, invalid }
    }
}

impl CommandOutput for PackListOutput {
    fn to_human(&self) -> String {
        if self.packs.is_empty() && self.invalid.is_empty() {
            return "No packs found.".to_string();
        }

        let formatter = TableFormatter::new();
        let rows = self
            .packs
            .iter()
            .map(|p| {
                vec![
                    Cell::new(&p.id),
                    Cell::new(p.version.as_deref().unwrap_or("-")),
                    formatter.flag(p.active),
                    Cell::new(p.components),
                    Cell::new(truncate(&p.description, 50)),
                ]
            })
            .collect();
        let mut text = format!(
            "Packs available to {}:\n{}",
            self.scope,
            formatter.render(&["Pack", "Version", "Active", "Components", "Description"], rows)
        );
        for invalid in &self.invalid {
            text.push_str(&format!("\ninvalid pack '{}': {}", invalid.id, invalid.reason));
        }
        text
    }
}

/// Run a `pack` subcommand.
pub fn execute(command: PackCommands, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match command {
        PackCommands::Add { ids, exclude, run } => {
            let mut desired = current_desired(&ctx.ledger()?);
            let overrides = parse_exclusions(&exclude)?;
            for id in &ids {
                desired.entry(id.clone()).or_default();
            }
            for (pack, excluded) in overrides {
                if !ids.contains(&pack) {
                    bail!("Cannot exclude components of '{pack}': it is not being added");
                }
                desired.insert(pack, excluded);
            }
            finish(converge(ctx, desired, run, json_mode)?, json_mode)
        }
        PackCommands::Remove { ids, run } => {
            let mut desired = current_desired(&ctx.ledger()?);
            for id in &ids {
                if desired.remove(id).is_none() {
                    tracing::warn!(pack = %id, "pack is not installed in this scope");
                }
            }
            finish(converge(ctx, desired, run, json_mode)?, json_mode)
        }
        PackCommands::Update { ids, run } => {
            let desired = current_desired(&ctx.ledger()?);
            if let Some(unknown) = ids.iter().find(|id| !desired.contains_key(*id)) {
                bail!(
                    "Pack '{unknown}' is not installed in this scope; \
                     use `packsync pack add {unknown}`"
                );
            }
            // Convergence is whole-scope; naming packs only narrows what is reported.
            let mut report = converge(ctx, desired, run, json_mode)?;
            if !ids.is_empty() {
                report.plan.to_update.retain(|id| ids.contains(id));
                report.installed.retain(|id, _| ids.contains(id));
            }
            finish(report, json_mode)
        }
        PackCommands::List => {
            let registry = ctx.registry();
            let active = ctx.ledger()?.state().active_packs.clone();
            output(
                &PackListOutput::build(&registry, &active, ctx.target.scope.to_string()),
                json_mode,
            );
            Ok(())
        }
    }
}
