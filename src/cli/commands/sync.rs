//! `packsync sync` and the convergence helper shared by the pack commands.

use anyhow::{Result, bail};
use console::style;
use std::collections::{BTreeMap, BTreeSet};

use crate::cli::context::CliContext;
use crate::cli::output::{BarProgress, CommandOutput, output};
use crate::cli::types::{RunArgs, SyncArgs};
use crate::domain::models::SyncReport;
use crate::domain::ports::Confirmer;
use crate::infrastructure::capabilities::{
    AutoConfirmer, ConsoleConfirmer, FileTrustStore, LocalInstaller, StaticValueResolver,
};
use crate::infrastructure::ledger_store::ArtifactLedger;
use crate::services::{ApplyProgress, Capabilities, ConvergenceEngine, NoProgress, SyncRequest};

/// Desired pack id -> excluded component ids.
pub type DesiredSet = BTreeMap<String, BTreeSet<String>>;

/// Result of a converging command.
#[derive(Debug, serde::Serialize)]
pub struct SyncOutput {
    /// Engine report
    #[serde(flatten)]
    pub report: SyncReport,
}

impl CommandOutput for SyncOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let plan = &report.plan;
        let mut lines = Vec::new();

        if report.dry_run {
            lines.push(format!("Plan for {} (dry run):", plan.scope));
        } else if plan.is_noop() && report.is_clean() && report.removed.is_empty() {
            lines.push(format!("{} is up to date.", plan.scope));
        } else {
            lines.push(format!("Synced {}:", plan.scope));
        }

        let list = |label: &str, ids: &[String]| {
            (!ids.is_empty()).then(|| format!("  {label:<10} {}", ids.join(", ")))
        };
        lines.extend(list("install", &plan.to_install));
        lines.extend(list("update", &plan.to_update));
        lines.extend(list("remove", &plan.to_remove));

        if !report.removed.is_empty() {
            lines.push(format!("  {:<10} {}", "retired", report.removed.join(", ")));
        }
        if !report.retained.is_empty() {
            lines.push(format!(
                "  {:<10} {} (still used by another pack)",
                "kept",
                report.retained.join(", ")
            ));
        }
        for collision in &plan.collisions {
            lines.push(format!("  {} {collision}", style("collision:").yellow()));
        }
        for warning in &plan.warnings {
            lines.push(format!("  {} {warning}", style("warning:").yellow()));
        }
        if let Some(backup) = &report.template_backup {
            lines.push(format!("  Existing instructions backed up to {}", backup.display()));
        }
        if !report.required_secrets.is_empty() {
            let keys: Vec<&str> = report.required_secrets.iter().map(String::as_str).collect();
            lines.push(format!("  Secrets to provide: {}", keys.join(", ")));
        }
        if !report.failures.is_empty() {
            lines.push(format!(
                "{} {} failure(s):",
                style("error:").red().bold(),
                report.failures.len()
            ));
            lines.extend(report.failures.iter().map(|f| format!("  - {f}")));
        }

        lines.join("\n")
    }
}

/// Parse `PACK/COMPONENT` exclusion specs.
pub fn parse_exclusions(specs: &[String]) -> Result<DesiredSet> {
    let mut parsed = DesiredSet::new();
    for spec in specs {
        match spec.split_once('/') {
            Some((pack, component))
                if !pack.is_empty() && !component.is_empty() && !component.contains('/') =>
            {
                parsed.entry(pack.to_string()).or_default().insert(component.to_string());
            }
            _ => bail!("Invalid exclusion '{spec}': expected PACK/COMPONENT"),
        }
    }
    Ok(parsed)
}

/// The installed pack set with its stored exclusions.
pub fn current_desired(ledger: &ArtifactLedger) -> DesiredSet {
    let state = ledger.state();
    state
        .active_packs
        .iter()
        .map(|id| (id.clone(), state.excluded_for(id)))
        .collect()
}

/// Build the desired set for `sync`.
///
/// Explicit exclusions replace the stored ones of the packs they name.
pub fn desired_for(args: &SyncArgs, current: &DesiredSet) -> Result<DesiredSet> {
    let overrides = parse_exclusions(&args.exclude)?;

    let mut desired: DesiredSet = if args.packs.is_empty() {
        current.clone()
    } else {
        args.packs
            .iter()
            .map(|id| (id.clone(), current.get(id).cloned().unwrap_or_default()))
            .collect()
    };
    if args.reset_exclusions {
        desired.values_mut().for_each(BTreeSet::clear);
    }

    for (pack, excluded) in overrides {
        match desired.get_mut(&pack) {
            Some(slot) => *slot = excluded,
            None => bail!(
                "Cannot exclude components of '{pack}': the pack is not part of this sync"
            ),
        }
    }
    Ok(desired)
}

/// Run one convergence pass for the context's scope.
pub fn converge(
    ctx: &CliContext,
    desired: DesiredSet,
    run: RunArgs,
    json_mode: bool,
) -> Result<SyncReport> {
    let _lock = if run.dry_run { None } else { Some(ctx.lock()?) };

    let registry = ctx.registry();
    let installer = LocalInstaller::new();
    let values = StaticValueResolver::new(ctx.config.template.values.clone());
    let trust = FileTrustStore::load(&ctx.target.trust_file);
    let console_confirmer = ConsoleConfirmer::new();
    let auto_confirmer = AutoConfirmer(true);
    let confirmer: &dyn Confirmer = if run.yes {
        &auto_confirmer
    } else {
        &console_confirmer
    };

    let bar = BarProgress::new();
    let progress: &dyn ApplyProgress = if json_mode { &NoProgress } else { &bar };

    let engine = ConvergenceEngine::new(
        &registry,
        Capabilities {
            installer: &installer,
            uninstaller: &installer,
            values: &values,
            trust: &trust,
            confirmer,
        },
    )
    .with_progress(progress);

    let request = SyncRequest {
        target: ctx.target.clone(),
        desired,
        core_content: ctx.config.template.core_content.clone(),
        dry_run: run.dry_run,
    };
    Ok(engine.sync(&request)?)
}

/// Print a report and turn partial failures into a non-zero exit.
pub fn finish(report: SyncReport, json_mode: bool) -> Result<()> {
    let failures = report.failures.len();
    output(&SyncOutput { report }, json_mode);
    if failures > 0 {
        bail!("{failures} artifact(s) could not be applied; the ledger records what succeeded");
    }
    Ok(())
}

/// Run `sync`.
pub fn execute(args: SyncArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let current = current_desired(&ctx.ledger()?);
    let desired = desired_for(&args, &current)?;
    let report = converge(ctx, desired, args.run, json_mode)?;
    finish(report, json_mode)
}
