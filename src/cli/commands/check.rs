//! `packsync check`: verify recorded artifacts against the filesystem.

use anyhow::{Result, bail};
use comfy_table::Cell;

use crate::cli::context::CliContext;
use crate::cli::output::{CommandOutput, TableFormatter, output};
use crate::infrastructure::capabilities::LocalInstaller;
use crate::infrastructure::ledger_store::all_excluded_components;
use crate::services::diagnostics::run_checks;
use crate::services::{CheckOutcome, CheckResult};

/// Result of `check`.
#[derive(Debug, serde::Serialize)]
pub struct CheckOutput {
    /// Scope label
    pub scope: String,
    /// Every checked subject
    pub results: Vec<CheckResult>,
    /// Subjects in place
    pub passed: usize,
    /// Subjects missing or damaged
    pub failed: usize,
    /// Deselected subjects
    pub skipped: usize,
}

impl CheckOutput {
    /// Tally `results`.
    pub fn new(scope: String, results: Vec<CheckResult>) -> Self {
        let count = |f: fn(&CheckOutcome) -> bool| results.iter().filter(|r| f(&r.outcome)).count();
        let passed = count(|o| matches!(o, CheckOutcome::Pass));
        let failed = count(CheckOutcome::is_failure);
        let skipped = count(|o| matches!(o, CheckOutcome::Skipped { .. }));
        Self {
            scope,
            results,
            passed,
            failed,
            skipped,
        }
    }
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        if self.results.is_empty() {
            return format!("Nothing installed in {}; nothing to check.", self.scope);
        }

        let formatter = TableFormatter::new();
        let rows = self
            .results
            .iter()
            .map(|r| {
                let detail = match &r.outcome {
                    CheckOutcome::Pass => String::new(),
                    CheckOutcome::Fail { reason } | CheckOutcome::Skipped { reason } => {
                        reason.clone()
                    }
                };
                vec![
                    Cell::new(&r.pack),
                    Cell::new(&r.subject),
                    formatter.outcome(&r.outcome),
                    Cell::new(detail),
                ]
            })
            .collect();
        format!(
            "{}\n{} passed, {} failed, {} skipped",
            formatter.render(&["Pack", "Component", "Status", "Detail"], rows),
            self.passed,
            self.failed,
            self.skipped
        )
    }
}

/// Run `check`; fails when any subject fails.
pub fn execute(ctx: &CliContext, json_mode: bool) -> Result<()> {
    let ledger = ctx.ledger()?;
    let registry = ctx.registry();
    let scope = &ctx.target.scope;
    let excluded = all_excluded_components([(scope, &ledger)])
        .remove(scope)
        .unwrap_or_default();

    let results = run_checks(&ctx.target, &ledger, &registry, &LocalInstaller::new(), &excluded);
    let report = CheckOutput::new(scope.to_string(), results);
    let failed = report.failed;
    output(&report, json_mode);

    if failed > 0 {
        bail!("{failed} check(s) failed; run `packsync sync` to repair");
    }
    Ok(())
}
