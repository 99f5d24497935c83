//! Common test utilities for integration tests
//!
//! Provides a sandboxed home/project/packs layout, pack fixture builders and
//! recording capability fakes shared by the integration test files.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use packsync::domain::models::{
    ArtifactId, Collision, Component, Config, Pack, Scope, ScopePaths, SyncReport,
};
use packsync::domain::ports::{
    ArtifactUninstaller, CapabilityError, ComponentInstaller, Confirmer, TrustStore,
};
use packsync::infrastructure::capabilities::{LocalInstaller, StaticValueResolver};
use packsync::infrastructure::ledger_store::ArtifactLedger;
use packsync::services::{Capabilities, ConvergenceEngine, PackRegistry, SyncRequest};
use packsync::DomainResult;
use serde_json::Value;
use tempfile::TempDir;

/// Setup test logging
///
/// Call this at the beginning of tests that need logging output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Desired pack set from `(pack, excluded components)` pairs.
pub fn desired(items: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
    items
        .iter()
        .map(|(pack, excluded)| {
            (
                (*pack).to_string(),
                excluded.iter().map(ToString::to_string).collect(),
            )
        })
        .collect()
}

/// Isolated home, project and pack directories.
pub struct TestEnv {
    _root: TempDir,
    pub home: PathBuf,
    pub project: PathBuf,
    pub packs: PathBuf,
    pub config: Config,
    pub target: ScopePaths,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let home = root.path().join("home");
        let project = root.path().join("project");
        let packs = root.path().join("packs");
        for dir in [&home, &project, &packs] {
            std::fs::create_dir_all(dir).expect("Failed to create fixture dir");
        }
        let config = Config::default();
        let target = ScopePaths::resolve(&Scope::project(&project), &config, &home);
        Self {
            _root: root,
            home,
            project,
            packs,
            config,
            target,
        }
    }

    /// Switch the target to the global scope.
    pub fn global(mut self) -> Self {
        self.target = ScopePaths::resolve(&Scope::Global, &self.config, &self.home);
        self
    }

    /// Write `<packs>/<id>/pack.yaml`, replacing any previous manifest.
    pub fn write_pack(&self, id: &str, yaml: &str) -> PathBuf {
        let dir = self.packs.join(id);
        std::fs::create_dir_all(&dir).expect("Failed to create pack dir");
        std::fs::write(dir.join("pack.yaml"), yaml).expect("Failed to write manifest");
        dir
    }

    pub fn write_pack_file(&self, id: &str, relative: &str, contents: &str) {
        let path = self.packs.join(id).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create pack file dir");
        }
        std::fs::write(path, contents).expect("Failed to write pack file");
    }

    pub fn registry(&self) -> PackRegistry {
        PackRegistry::load(std::slice::from_ref(&self.packs))
    }

    pub fn read(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    pub fn template(&self) -> Option<String> {
        Self::read(&self.target.template_file)
    }

    pub fn ledger(&self) -> ArtifactLedger {
        ArtifactLedger::load(&self.target.state_file).expect("ledger should load")
    }

    /// Parsed settings document (`Value::Null` when absent).
    pub fn settings(&self) -> Value {
        Self::read(&self.target.settings_file)
            .map(|s| serde_json::from_str(&s).expect("settings should be JSON"))
            .unwrap_or(Value::Null)
    }

    pub fn write_settings(&self, value: &Value) {
        let path = &self.target.settings_file;
        std::fs::create_dir_all(path.parent().expect("settings file has a parent"))
            .expect("Failed to create settings dir");
        std::fs::write(path, serde_json::to_string_pretty(value).expect("serializable"))
            .expect("Failed to write settings");
    }

    /// Names registered in the scope's MCP file.
    pub fn servers(&self) -> BTreeSet<String> {
        Self::read(&self.target.mcp_file)
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .and_then(|v| v.get("mcpServers").and_then(Value::as_object).cloned())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn server(&self, name: &str) -> Option<Value> {
        Self::read(&self.target.mcp_file)
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .and_then(|v| v.pointer(&format!("/mcpServers/{name}")).cloned())
    }

    /// Run one sync pass through the harness.
    pub fn sync(
        &self,
        harness: &Harness,
        desired: BTreeMap<String, BTreeSet<String>>,
        dry_run: bool,
    ) -> DomainResult<SyncReport> {
        let registry = self.registry();
        let engine = ConvergenceEngine::new(
            &registry,
            Capabilities {
                installer: &harness.installer,
                uninstaller: &harness.installer,
                values: &harness.values,
                trust: &harness.trust,
                confirmer: &harness.confirmer,
            },
        );
        engine.sync(&SyncRequest {
            target: self.target.clone(),
            desired,
            core_content: self.config.template.core_content.clone(),
            dry_run,
        })
    }
}

/// Real filesystem installer that records calls and fails on demand.
#[derive(Default)]
pub struct FlakyInstaller {
    inner: LocalInstaller,
    /// `pack/component` ids whose install fails
    pub fail_install: RefCell<BTreeSet<String>>,
    pub fail_uninstall: RefCell<BTreeSet<ArtifactId>>,
    pub installs: RefCell<Vec<String>>,
    pub uninstalls: RefCell<Vec<ArtifactId>>,
    /// Documents swapped for a directory on the next uninstall, so a pass
    /// loads them fine but cannot write them back
    pending_blocks: RefCell<Vec<PathBuf>>,
    blocked: RefCell<Vec<PathBuf>>,
}

impl FlakyInstaller {
    pub fn fail_install(&self, key: &str) {
        self.fail_install.borrow_mut().insert(key.to_string());
    }

    pub fn fail_uninstall(&self, artifact: ArtifactId) {
        self.fail_uninstall.borrow_mut().insert(artifact);
    }

    pub fn block_on_uninstall(&self, document: &Path) {
        self.pending_blocks.borrow_mut().push(document.to_path_buf());
    }

    pub fn heal(&self) {
        self.fail_install.borrow_mut().clear();
        self.fail_uninstall.borrow_mut().clear();
        for document in self.blocked.borrow_mut().drain(..) {
            std::fs::remove_dir_all(&document).unwrap();
            std::fs::rename(aside(&document), &document).unwrap();
        }
    }
}

fn aside(document: &Path) -> PathBuf {
    document.with_extension("aside")
}

impl ComponentInstaller for FlakyInstaller {
    fn install(
        &self,
        pack: &Pack,
        component: &Component,
        target: &ScopePaths,
        claimed: &BTreeSet<ArtifactId>,
    ) -> Result<Vec<ArtifactId>, CapabilityError> {
        let key = format!("{}/{}", pack.id(), component.id);
        self.installs.borrow_mut().push(key.clone());
        if self.fail_install.borrow().contains(&key) {
            return Err(CapabilityError::CommandFailed(format!("injected failure for {key}")));
        }
        self.inner.install(pack, component, target, claimed)
    }
}

impl ArtifactUninstaller for FlakyInstaller {
    fn uninstall(&self, artifact: &ArtifactId, target: &ScopePaths) -> Result<(), CapabilityError> {
        self.uninstalls.borrow_mut().push(artifact.clone());
        for document in self.pending_blocks.borrow_mut().drain(..) {
            std::fs::rename(&document, aside(&document)).unwrap();
            std::fs::create_dir_all(document.join("blocked")).unwrap();
            self.blocked.borrow_mut().push(document);
        }
        if self.fail_uninstall.borrow().contains(artifact) {
            return Err(CapabilityError::CommandFailed(format!("injected failure for {artifact}")));
        }
        self.inner.uninstall(artifact, target)
    }
}

/// Trust store with a fixed approval table.
#[derive(Default)]
pub struct FixedTrust(pub RefCell<BTreeMap<String, BTreeMap<PathBuf, String>>>);

impl FixedTrust {
    pub fn approve(&self, pack: &str, script: &str) {
        self.0
            .borrow_mut()
            .entry(pack.to_string())
            .or_default()
            .insert(PathBuf::from(script), "sha256:test".to_string());
    }
}

impl TrustStore for FixedTrust {
    fn trusted_hashes(&self, pack: &Pack) -> BTreeMap<PathBuf, String> {
        self.0.borrow().get(pack.id()).cloned().unwrap_or_default()
    }
}

/// Confirmer with a fixed answer that counts how often it was asked.
pub struct RecordingConfirmer {
    pub answer: Cell<bool>,
    pub asked: RefCell<Vec<Collision>>,
}

impl Confirmer for RecordingConfirmer {
    fn confirm_collisions(&self, collisions: &[Collision]) -> bool {
        self.asked.borrow_mut().extend_from_slice(collisions);
        self.answer.get()
    }
}

/// All capabilities the engine needs, with knobs for the tests.
pub struct Harness {
    pub installer: FlakyInstaller,
    pub values: StaticValueResolver,
    pub trust: FixedTrust,
    pub confirmer: RecordingConfirmer,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            installer: FlakyInstaller::default(),
            values: StaticValueResolver::default(),
            trust: FixedTrust::default(),
            confirmer: RecordingConfirmer {
                answer: Cell::new(true),
                asked: RefCell::new(Vec::new()),
            },
        }
    }

    pub fn declining() -> Self {
        let harness = Self::new();
        harness.confirmer.answer.set(false);
        harness
    }
}

/// A pack with one MCP server, one copied file, a settings fragment and a section.
pub const WEB_PACK: &str = r###"
id: web
name: Web
version: 1.0.0
components:
  - id: docs
    install:
      type: mcp_server
      name: web-docs
      command: docs-mcp
      args: ["--stdio"]
  - id: rules
    install:
      type: file
      source: files/rules.md
      destination: .claude/rules/web.md
  - id: env
    install:
      type: settings
      settings:
        env:
          WEB_MODE: strict
        hooks:
          PostToolUse:
            - matcher: Write
              hooks:
                - type: command
                  command: npm run lint
  - id: ignore
    install:
      type: ignore_entries
      entries: [node_modules/]
templates:
  - section: web
    content: "## Web rules for {{PROJECT_NAME}}"
    placeholders: [PROJECT_NAME]
"###;

pub fn install_web_pack(env: &TestEnv) {
    env.write_pack("web", WEB_PACK);
    env.write_pack_file("web", "files/rules.md", "Use semantic HTML.\n");
}
