//! Health checks over what the ledger says is installed.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::models::ledger::PENDING_REMOVAL;
use crate::domain::models::{ArtifactId, ScopePaths};
use crate::domain::ports::ArtifactProbe;
use crate::infrastructure::ledger_store::ArtifactLedger;
use crate::services::pack_registry::PackRegistry;

/// Result of checking one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Present as recorded
    Pass,
    /// Recorded but missing or damaged
    Fail {
        /// What is wrong
        reason: String,
    },
    /// Intentionally deselected by the user
    Skipped {
        /// Why it was not checked
        reason: String,
    },
}

impl CheckOutcome {
    /// Whether this counts against the run.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    /// Short status word for tables.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail { .. } => "fail",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// One checked subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Scope label
    pub scope: String,
    /// Owning pack id
    pub pack: String,
    /// Component id, or a pseudo-subject such as `sections`
    pub subject: String,
    /// Verdict
    pub outcome: CheckOutcome,
}

fn missing(
    artifacts: &BTreeSet<ArtifactId>,
    target: &ScopePaths,
    probe: &dyn ArtifactProbe,
) -> Vec<String> {
    artifacts
        .iter()
        .filter(|a| !probe.is_present(a, target))
        .map(ToString::to_string)
        .collect()
}

fn outcome_for(missing: Vec<String>) -> CheckOutcome {
    if missing.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Fail {
            reason: format!("missing {}", missing.join(", ")),
        }
    }
}

/// Check every active pack of one scope.
///
/// `excluded` holds `pack/component` ids (see
/// [`crate::infrastructure::ledger_store::all_excluded_components`]); those
/// components are reported as skipped rather than failed.
pub fn run_checks(
    target: &ScopePaths,
    ledger: &ArtifactLedger,
    registry: &PackRegistry,
    probe: &dyn ArtifactProbe,
    excluded: &BTreeSet<String>,
) -> Vec<CheckResult> {
    let scope = target.scope.to_string();
    let state = ledger.state();
    let mut results = Vec::new();
    let result = |pack: &str, subject: &str, outcome: CheckOutcome| CheckResult {
        scope: scope.clone(),
        pack: pack.to_string(),
        subject: subject.to_string(),
        outcome,
    };

    for pack_id in &state.active_packs {
        let record = state.record(pack_id);

        let Some(pack) = registry.get(pack_id) else {
            results.push(result(
                pack_id,
                "pack",
                CheckOutcome::Fail {
                    reason: "pack is not available in any packs directory".to_string(),
                },
            ));
            continue;
        };

        for component in pack.components() {
            if excluded.contains(&format!("{pack_id}/{}", component.id)) {
                results.push(result(
                    pack_id,
                    &component.id,
                    CheckOutcome::Skipped {
                        reason: "excluded by user".to_string(),
                    },
                ));
                continue;
            }

            let outcome = match record.and_then(|r| r.components.get(&component.id)) {
                Some(artifacts) => outcome_for(missing(artifacts, target, probe)),
                None => CheckOutcome::Fail {
                    reason: "not installed; run `packsync sync`".to_string(),
                },
            };
            results.push(result(pack_id, &component.id, outcome));
        }

        if let Some(record) = record {
            if !record.sections.is_empty() {
                let sections: BTreeSet<ArtifactId> =
                    record.sections.iter().map(ArtifactId::section).collect();
                let outcome = outcome_for(missing(&sections, target, probe));
                results.push(result(pack_id, "sections", outcome));
            }
            let pending = record
                .components
                .get(PENDING_REMOVAL)
                .filter(|p| !p.is_empty());
            if let Some(pending) = pending {
                results.push(result(
                    pack_id,
                    PENDING_REMOVAL,
                    CheckOutcome::Fail {
                        reason: format!("{} artifact(s) still awaiting removal", pending.len()),
                    },
                ));
            }
        }
    }

    results
}
