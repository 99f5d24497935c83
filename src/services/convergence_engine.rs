//! Reconciliation of a scope's installed state with the desired pack set.
//!
//! One pass moves through `Loaded -> Diffed -> Applied -> Persisted`. Each
//! transition consumes the previous stage, so a stage cannot be re-entered.
//! Load and diff touch nothing on disk; anything that fails there aborts the
//! pass with the ledger untouched. Per-artifact problems during apply are
//! collected on the report and the ledger is still persisted, so it reflects
//! what actually happened.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::pack::CORE_SECTION;
use crate::domain::models::{
    ArtifactFailure, ArtifactId, Collision, Component, InstallAction, Pack, PackArtifactRecord,
    ScopePaths, SettingsDocument, SyncPlan, SyncReport, TemplateSection,
};
use crate::domain::ports::{
    ArtifactUninstaller, CapabilityError, ComponentInstaller, Confirmer, TemplateContext,
    TemplateValueResolver, TrustStore,
};
use crate::infrastructure::ledger_store::ArtifactLedger;
use crate::infrastructure::{settings_store, template_store};
use crate::services::collision_detector::detect_collisions;
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::env_placeholders::EnvKeyAllocator;
use crate::services::pack_registry::PackRegistry;
use crate::services::reference_counter::count_holders;
use crate::services::settings_composer::{self, KeyPath};
use crate::services::template_composer::{self, WritePlan};

/// External collaborators the engine drives.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    /// Installs file, server and ignore components
    pub installer: &'a dyn ComponentInstaller,
    /// Reverses released artifacts
    pub uninstaller: &'a dyn ArtifactUninstaller,
    /// Placeholder values for template sections
    pub values: &'a dyn TemplateValueResolver,
    /// Approved script hashes
    pub trust: &'a dyn TrustStore,
    /// Collision confirmation
    pub confirmer: &'a dyn Confirmer,
}

/// Progress hooks for the apply phase.
pub trait ApplyProgress {
    /// Apply is about to run `_steps` units of work.
    fn start(&self, _steps: u64) {}
    /// One unit finished.
    fn step(&self, _label: &str) {}
    /// Apply is done.
    fn finish(&self) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ApplyProgress for NoProgress {}

/// What the caller wants a scope to look like.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Scope being reconciled
    pub target: ScopePaths,
    /// Desired pack id -> components the user deselected
    pub desired: BTreeMap<String, BTreeSet<String>>,
    /// Content of the implicit core section
    pub core_content: String,
    /// Plan only; touch nothing
    pub dry_run: bool,
}

/// Reconciles one scope against a desired pack selection.
pub struct ConvergenceEngine<'a> {
    registry: &'a PackRegistry,
    caps: Capabilities<'a>,
    progress: &'a dyn ApplyProgress,
    resolver: DependencyResolver,
}

/// State after reading the ledger, packs and documents.
struct Loaded<'r> {
    ledger: ArtifactLedger,
    packs: BTreeMap<String, &'r Pack>,
    settings: SettingsDocument,
    template: Option<String>,
    warnings: Vec<String>,
}

/// State after computing the plan.
struct Diffed<'r> {
    loaded: Loaded<'r>,
    plan: SyncPlan,
    /// Packs to install or update, in install order
    apply_order: Vec<String>,
    /// (pack, component) -> server component with allocated secret keys
    servers: BTreeMap<(String, String), Component>,
    required_secrets: BTreeSet<String>,
}

/// State after side effects, before the ledger is written.
struct Applied {
    ledger: ArtifactLedger,
    report: SyncReport,
}

/// A durable pass.
struct Persisted {
    report: SyncReport,
}

impl<'a> ConvergenceEngine<'a> {
    /// Engine over `registry` without progress reporting.
    pub fn new(registry: &'a PackRegistry, caps: Capabilities<'a>) -> Self {
        Self {
            registry,
            caps,
            progress: &NoProgress,
            resolver: DependencyResolver::new(),
        }
    }

    /// Report apply progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ApplyProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Run one reconciliation pass.
    #[instrument(skip_all, fields(scope = %request.target.scope, run_id = tracing::field::Empty))]
    pub fn sync(&self, request: &SyncRequest) -> DomainResult<SyncReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let loaded = self.load(request)?;
        let diffed = self.diff(request, loaded);
        info!(
            install = diffed.plan.to_install.len(),
            update = diffed.plan.to_update.len(),
            remove = diffed.plan.to_remove.len(),
            collisions = diffed.plan.collisions.len(),
            dry_run = request.dry_run,
            "sync plan computed"
        );

        if request.dry_run {
            let mut report = SyncReport::new(run_id, diffed.plan, true);
            report.required_secrets = diffed.required_secrets;
            return Ok(report);
        }

        if !diffed.plan.collisions.is_empty()
            && !self.caps.confirmer.confirm_collisions(&diffed.plan.collisions)
        {
            return Err(DomainError::CollisionsDeclined {
                count: diffed.plan.collisions.len(),
            });
        }

        let applied = self.apply(request, run_id, diffed);
        let persisted = Self::persist(request, applied)?;
        Ok(persisted.report)
    }

    fn load<'r>(&'r self, request: &SyncRequest) -> DomainResult<Loaded<'r>> {
        let target = &request.target;
        let ledger = ArtifactLedger::load(&target.state_file)?;

        let mut packs = BTreeMap::new();
        let mut warnings = Vec::new();
        for (id, excluded) in &request.desired {
            let Some(pack) = self.registry.get(id) else {
                return Err(match self.registry.invalid_reason(id) {
                    Some(reason) => DomainError::validation(id, reason),
                    None => DomainError::UnknownPack(id.clone()),
                });
            };
            for unknown in pack.check_exclusions(excluded)? {
                warnings.push(format!(
                    "pack '{id}' has no component '{unknown}'; the exclusion is ignored"
                ));
            }
            packs.insert(id.clone(), pack);
        }

        let settings = settings_store::load(&target.settings_file)?;
        let template = template_store::read(&target.template_file)?;

        debug!(
            ledger_exists = ledger.exists(),
            desired = packs.len(),
            "loaded scope state"
        );
        Ok(Loaded {
            ledger,
            packs,
            settings,
            template,
            warnings,
        })
    }

    fn diff<'r>(&self, request: &SyncRequest, loaded: Loaded<'r>) -> Diffed<'r> {
        let ledger_ids = loaded.ledger.state().pack_ids();
        let desired: Vec<&Pack> = loaded.packs.values().copied().collect();

        let (order, order_warnings) = self.resolver.install_order(&desired);
        let mut warnings = loaded.warnings.clone();
        warnings.extend(order_warnings);

        let (to_update, to_install): (Vec<String>, Vec<String>) =
            order.iter().cloned().partition(|id| ledger_ids.contains(id));
        let to_remove: Vec<String> = ledger_ids
            .iter()
            .filter(|id| !loaded.packs.contains_key(*id))
            .cloned()
            .collect();

        let mut collisions: Vec<Collision> = Vec::new();
        let mut registered: Vec<&Pack> = to_update
            .iter()
            .filter_map(|id| loaded.packs.get(id).copied())
            .collect();
        for id in &to_install {
            if let Some(pack) = loaded.packs.get(id).copied() {
                collisions.extend(detect_collisions(pack, &registered));
                registered.push(pack);
            }
        }

        let mut allocator = EnvKeyAllocator::new();
        let mut servers = BTreeMap::new();
        for id in &order {
            let Some(pack) = loaded.packs.get(id) else { continue };
            let excluded = request.desired.get(id);
            for component in pack.components() {
                if excluded.is_some_and(|e| e.contains(&component.id)) {
                    continue;
                }
                if matches!(component.install, InstallAction::McpServer { .. }) {
                    let key = (id.clone(), component.id.clone());
                    servers.insert(key, allocator.allocate(component));
                }
            }
        }

        let plan = SyncPlan {
            scope: request.target.scope.to_string(),
            to_install,
            to_update,
            to_remove,
            collisions,
            warnings,
        };

        Diffed {
            loaded,
            plan,
            apply_order: order,
            servers,
            required_secrets: allocator.required_keys(),
        }
    }

    fn apply(&self, request: &SyncRequest, run_id: Uuid, diffed: Diffed<'_>) -> Applied {
        let Diffed {
            loaded,
            plan,
            apply_order,
            servers,
            required_secrets,
        } = diffed;
        let Loaded {
            mut ledger,
            packs,
            settings: initial_settings,
            template,
            ..
        } = loaded;

        let target = &request.target;
        let scope_label = target.scope.to_string();
        let now = Utc::now();
        // Artifacts some pack owns in this scope, grown as components install
        let mut claimed = ledger.state().owned_artifacts();

        let mut report = SyncReport::new(run_id, plan, false);
        report.required_secrets = required_secrets;

        let steps: usize = apply_order
            .iter()
            .filter_map(|id| packs.get(id))
            .map(|p| p.components().len())
            .sum::<usize>()
            + report.plan.to_remove.len();
        self.progress.start(steps as u64);

        let mut settings = initial_settings.clone();
        let mut sections: Vec<TemplateSection> = Vec::new();
        let mut released: Vec<(String, ArtifactId)> = Vec::new();
        let mut settings_packs: BTreeSet<String> = BTreeSet::new();
        let mut settings_claims: Vec<(String, String)> = Vec::new();
        let mut old_records: BTreeMap<String, PackArtifactRecord> = BTreeMap::new();

        for id in &apply_order {
            let Some(pack) = packs.get(id).copied() else { continue };
            let excluded = request.desired.get(id).cloned().unwrap_or_default();
            let old_record = ledger.state().record(id).cloned();

            let placeholders: Vec<String> = pack
                .sections()
                .iter()
                .flat_map(|s| s.placeholders.iter().cloned())
                .collect();
            let values = self.caps.values.resolve(
                pack,
                &TemplateContext {
                    target,
                    placeholders: &placeholders,
                },
            );

            let mut record = PackArtifactRecord::new(pack.version().map(str::to_string));
            if let Some(old) = &old_record {
                record.installed_at = old.installed_at;
            }
            record.updated_at = now;

            for component in pack.components() {
                if excluded.contains(&component.id) {
                    debug!(pack = %id, component = %component.id, "component excluded, skipping");
                    continue;
                }
                self.progress.step(&format!("{id}/{}", component.id));

                let installer = self.caps.installer;
                let outcome = match &component.install {
                    InstallAction::Settings { .. } | InstallAction::Plugin { .. } => {
                        settings_packs.insert(id.clone());
                        settings_claims.push((id.clone(), component.id.clone()));
                        Self::apply_settings(component, &mut settings, &initial_settings, &claimed)
                    }
                    InstallAction::Shell { script, .. } => {
                        if self.caps.trust.trusted_hashes(pack).contains_key(script) {
                            installer.install(pack, component, target, &claimed)
                        } else {
                            Err(CapabilityError::Untrusted {
                                script: pack.root.join(script),
                            })
                        }
                    }
                    InstallAction::McpServer { .. } => {
                        let key = (id.clone(), component.id.clone());
                        let server = servers.get(&key).unwrap_or(component);
                        installer.install(pack, server, target, &claimed)
                    }
                    _ => installer.install(pack, component, target, &claimed),
                };

                match outcome {
                    Ok(artifacts) => {
                        claimed.extend(artifacts.iter().cloned());
                        record
                            .components
                            .insert(component.id.clone(), artifacts.into_iter().collect());
                    }
                    Err(e) => {
                        warn!(
                            pack = %id,
                            component = %component.id,
                            error = %e,
                            "component failed to install"
                        );
                        report.failures.push(ArtifactFailure {
                            scope: scope_label.clone(),
                            pack: id.clone(),
                            subject: format!("component '{}'", component.id),
                            message: e.to_string(),
                        });
                        // Keep what the previous run installed for this component
                        let previous = old_record
                            .as_ref()
                            .and_then(|r| r.components.get(&component.id));
                        if let Some(previous) = previous {
                            record.components.insert(component.id.clone(), previous.clone());
                        }
                    }
                }
            }

            for section in pack.sections() {
                sections.push(template_composer::render_section(section, &values));
                record.sections.insert(section.id.clone());
            }

            if let Some(old) = old_record {
                let current = record.artifacts();
                released.extend(
                    old.artifacts()
                        .into_iter()
                        .filter(|a| !current.contains(a))
                        .map(|a| (id.clone(), a)),
                );
                old_records.insert(id.clone(), old);
            }

            ledger.record_install(id, record);
        }

        for id in &report.plan.to_remove {
            self.progress.step(id);
            let artifacts = ledger.record_removal(id);
            info!(pack = %id, artifacts = artifacts.len(), "pack retired");
            released.extend(artifacts.into_iter().map(|a| (id.clone(), a)));
        }

        // Retire released artifacts nobody else holds. Settings keys and
        // sections only count as removed once their document is written.
        let mut drop_keys: Vec<KeyPath> = Vec::new();
        let mut retired_keys: Vec<(String, ArtifactId)> = Vec::new();
        let mut retired_sections: Vec<(String, ArtifactId)> = Vec::new();
        let mut seen = BTreeSet::new();
        for (pack_id, artifact) in released {
            if !seen.insert(artifact.clone()) {
                continue;
            }
            let state = ledger.state();
            let holders = count_holders(&artifact, &state.active_packs, &state.artifacts);
            if holders > 0 {
                debug!(artifact = %artifact, holders, "artifact still held, keeping it");
                report.retained.push(artifact.to_string());
                continue;
            }

            if let Some(path) = KeyPath::from_artifact(&artifact) {
                settings_packs.insert(pack_id.clone());
                settings_composer::remove_keys(&mut settings, std::slice::from_ref(&path));
                drop_keys.push(path);
                retired_keys.push((pack_id, artifact));
                continue;
            }
            if let ArtifactId::TemplateSection { .. } = &artifact {
                retired_sections.push((pack_id, artifact));
                continue;
            }

            match self.caps.uninstaller.uninstall(&artifact, target) {
                Ok(()) => report.removed.push(artifact.to_string()),
                Err(e) => {
                    warn!(
                        pack = %pack_id,
                        artifact = %artifact,
                        error = %e,
                        "artifact removal failed"
                    );
                    report.failures.push(ArtifactFailure {
                        scope: scope_label.clone(),
                        pack: pack_id.clone(),
                        subject: artifact.to_string(),
                        message: e.to_string(),
                    });
                    park(&mut ledger, &pack_id, artifact);
                }
            }
        }

        let mut settings_written = true;
        if settings != initial_settings || !drop_keys.is_empty() {
            if let Err(e) = settings_store::save(&target.settings_file, &settings, &drop_keys) {
                warn!(error = %e, "settings document could not be written");
                settings_written = false;
                report.failures.push(ArtifactFailure {
                    scope: scope_label.clone(),
                    pack: settings_packs.into_iter().collect::<Vec<_>>().join(", "),
                    subject: target.settings_file.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
        if !settings_written {
            // Nothing reached disk: claims fall back to what the last write recorded
            for (pack_id, component_id) in &settings_claims {
                let previous = old_records
                    .get(pack_id)
                    .and_then(|r| r.components.get(component_id))
                    .cloned();
                if let Some(record) = ledger.state_mut().artifacts.get_mut(pack_id) {
                    match previous {
                        Some(previous) => record.components.insert(component_id.clone(), previous),
                        None => record.components.remove(component_id),
                    };
                }
            }
        }
        settle_retired(&mut ledger, &mut report, retired_keys, settings_written);

        let retired_ids: Vec<String> = retired_sections
            .iter()
            .filter_map(|(_, artifact)| match artifact {
                ArtifactId::TemplateSection { id } => Some(id.clone()),
                _ => None,
            })
            .collect();
        let template_written =
            match self.write_template(request, template.as_deref(), &sections, &retired_ids) {
                Ok(backup) => {
                    report.template_backup = backup;
                    true
                }
                Err(e) => {
                    warn!(error = %e, "instruction document could not be written");
                    report.failures.push(ArtifactFailure {
                        scope: scope_label,
                        pack: packs.keys().cloned().collect::<Vec<_>>().join(", "),
                        subject: target.template_file.display().to_string(),
                        message: e.to_string(),
                    });
                    false
                }
            };
        if !template_written {
            for id in &apply_order {
                let previous = old_records.get(id).map(|r| r.sections.clone()).unwrap_or_default();
                if let Some(record) = ledger.state_mut().artifacts.get_mut(id) {
                    record.sections = previous;
                }
            }
        }
        settle_retired(&mut ledger, &mut report, retired_sections, template_written);

        for id in &apply_order {
            if let Some(record) = ledger.state().record(id) {
                report.installed.insert(
                    id.clone(),
                    record.artifacts().iter().map(ToString::to_string).collect(),
                );
            }
        }

        self.progress.finish();
        Applied { ledger, report }
    }

    /// Merge a settings or plugin component into the working document and
    /// return the artifacts the pack may claim.
    ///
    /// A pack only claims locations that were absent before this pass or that
    /// some pack already owns, so values the user set are never retired.
    fn apply_settings(
        component: &Component,
        settings: &mut SettingsDocument,
        initial: &SettingsDocument,
        owned: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let fragment = match &component.install {
            InstallAction::Settings { settings } => SettingsDocument::from_value(settings.clone())
                .map_err(|e| CapabilityError::Unsupported(format!("settings fragment: {e}")))?,
            InstallAction::Plugin { name } => SettingsDocument {
                enabled_plugins: [(name.clone(), true)].into(),
                ..SettingsDocument::default()
            },
            _ => return Ok(Vec::new()),
        };

        *settings = settings_composer::merge(settings, &fragment);

        Ok(settings_composer::contributed_artifacts(&fragment)
            .into_iter()
            .filter(|a| !settings_composer::contains(initial, a) || owned.contains(a))
            .collect())
    }

    fn write_template(
        &self,
        request: &SyncRequest,
        existing: Option<&str>,
        sections: &[TemplateSection],
        retired: &[String],
    ) -> DomainResult<Option<std::path::PathBuf>> {
        let target = &request.target;
        if existing.is_none() && sections.is_empty() {
            return Ok(None);
        }

        let trimmed = existing.map(|text| {
            retired
                .iter()
                .fold(text.to_string(), |doc, id| template_composer::remove_section(&doc, id))
        });

        let core = TemplateSection {
            id: CORE_SECTION.to_string(),
            content: request.core_content.clone(),
            placeholders: template_composer::placeholders_in(&request.core_content),
        };
        let values = self.caps.values.core_values(&TemplateContext {
            target,
            placeholders: &core.placeholders,
        });

        let plan = template_composer::plan_write(trimmed.as_deref(), &core, sections, &values);
        if existing == Some(plan.document()) {
            return Ok(None);
        }
        if let WritePlan::MigrateLegacy { .. } = plan {
            info!(
                path = %target.template_file.display(),
                "migrating unmanaged instruction document"
            );
        }
        template_store::write(&target.template_file, &plan, Utc::now())
    }

    fn persist(request: &SyncRequest, applied: Applied) -> DomainResult<Persisted> {
        let Applied { mut ledger, report } = applied;

        for (pack, excluded) in &request.desired {
            ledger.state_mut().set_excluded(pack, excluded.clone());
        }
        ledger.state_mut().last_synced_at = Some(Utc::now());
        ledger.save()?;

        info!(
            installed = report.installed.len(),
            removed = report.removed.len(),
            retained = report.retained.len(),
            failures = report.failures.len(),
            "sync persisted"
        );
        Ok(Persisted { report })
    }
}

/// Keep an artifact on the pack's ledger record so the next pass retries it.
fn park(ledger: &mut ArtifactLedger, pack_id: &str, artifact: ArtifactId) {
    ledger
        .state_mut()
        .artifacts
        .entry(pack_id.to_string())
        .or_insert_with(|| PackArtifactRecord::new(None))
        .park_for_removal(artifact);
}

/// Report retired document artifacts once their document is written, or
/// park them when it was not.
fn settle_retired(
    ledger: &mut ArtifactLedger,
    report: &mut SyncReport,
    retired: Vec<(String, ArtifactId)>,
    written: bool,
) {
    for (pack_id, artifact) in retired {
        if written {
            report.removed.push(artifact.to_string());
        } else {
            park(ledger, &pack_id, artifact);
        }
    }
}
