//! End-to-end convergence runs against a sandboxed project.

mod common;

use common::{desired, install_web_pack, Harness, TestEnv};
use packsync::domain::models::ledger::PENDING_REMOVAL;
use packsync::domain::models::{ArtifactId, Namespace};
use packsync::services::template_composer::{begin_marker, parse_sections};
use packsync::DomainError;

#[test]
fn test_fresh_install_applies_every_component() {
    common::setup_test_logging();
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();

    let report = env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.plan.to_install, vec!["web".to_string()]);
    assert!(env.servers().contains("web-docs"));
    assert_eq!(
        TestEnv::read(&env.project.join(".claude/rules/web.md")).as_deref(),
        Some("Use semantic HTML.\n")
    );
    assert_eq!(
        TestEnv::read(&env.project.join(".gitignore")).as_deref(),
        Some("node_modules/\n")
    );

    let settings = env.settings();
    assert_eq!(settings["env"]["WEB_MODE"], "strict");
    assert_eq!(settings["hooks"]["PostToolUse"][0]["hooks"][0]["command"], "npm run lint");

    let template = env.template().unwrap();
    let ids: Vec<String> = parse_sections(&template).into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["core", "web"]);
    assert!(template.contains("## Web rules for project"));
    assert!(template.contains("# project"));

    let ledger = env.ledger();
    let record = ledger.state().record("web").unwrap();
    assert_eq!(record.version.as_deref(), Some("1.0.0"));
    assert!(record.owns(&ArtifactId::mcp_server("web-docs")));
    assert!(record.owns(&ArtifactId::settings_key("env.WEB_MODE")));
    assert!(record.owns(&ArtifactId::hook_command("PostToolUse", "npm run lint")));
    assert!(record.owns(&ArtifactId::section("web")));
    assert!(ledger.state().last_synced_at.is_some());
}

#[test]
fn test_second_run_is_idempotent() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();

    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();
    let settings_before = TestEnv::read(&env.target.settings_file);
    let template_before = env.template();
    let mcp_before = TestEnv::read(&env.target.mcp_file);
    let record_before = env.ledger().state().record("web").cloned().unwrap();

    let report = env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    assert!(report.plan.to_install.is_empty());
    assert_eq!(report.plan.to_update, vec!["web".to_string()]);
    assert!(report.removed.is_empty());
    assert!(report.template_backup.is_none());
    assert_eq!(TestEnv::read(&env.target.settings_file), settings_before);
    assert_eq!(env.template(), template_before);
    assert_eq!(TestEnv::read(&env.target.mcp_file), mcp_before);

    let record_after = env.ledger().state().record("web").cloned().unwrap();
    assert_eq!(record_after.components, record_before.components);
    assert_eq!(record_after.installed_at, record_before.installed_at);
}

const SHARED_A: &str = r"
id: alpha
components:
  - id: alpha-server
    install: {type: mcp_server, name: shared, command: shared-mcp}
";

const SHARED_B: &str = r"
id: beta
components:
  - id: beta-server
    install: {type: mcp_server, name: shared, command: shared-mcp}
";

#[test]
fn test_shared_server_survives_until_last_holder_leaves() {
    let env = TestEnv::new();
    env.write_pack("alpha", SHARED_A);
    env.write_pack("beta", SHARED_B);
    let harness = Harness::new();

    let report = env
        .sync(&harness, desired(&[("alpha", &[]), ("beta", &[])]), false)
        .unwrap();
    assert_eq!(report.plan.collisions.len(), 1);
    assert_eq!(report.plan.collisions[0].namespace, Namespace::ServerName);
    assert_eq!(harness.confirmer.asked.borrow().len(), 1);

    let report = env.sync(&harness, desired(&[("beta", &[])]), false).unwrap();
    assert_eq!(report.plan.to_remove, vec!["alpha".to_string()]);
    assert_eq!(report.retained, vec!["mcp_server:shared".to_string()]);
    assert!(env.servers().contains("shared"));
    assert!(harness.installer.uninstalls.borrow().is_empty());

    let report = env.sync(&harness, desired(&[]), false).unwrap();
    assert_eq!(report.removed, vec!["mcp_server:shared".to_string()]);
    assert!(env.servers().is_empty());
    assert!(env.ledger().state().artifacts.is_empty());
}

#[test]
fn test_declined_collisions_abort_before_any_write() {
    let env = TestEnv::new();
    env.write_pack("alpha", SHARED_A);
    env.write_pack("beta", SHARED_B);
    let harness = Harness::declining();

    let err = env
        .sync(&harness, desired(&[("alpha", &[]), ("beta", &[])]), false)
        .unwrap_err();

    assert!(matches!(err, DomainError::CollisionsDeclined { count: 1 }));
    assert!(!env.target.mcp_file.exists());
    assert!(!env.target.state_file.exists());
    assert!(harness.installer.installs.borrow().is_empty());
}

#[test]
fn test_newly_excluded_component_is_retired() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();

    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();
    let report = env.sync(&harness, desired(&[("web", &["docs", "env"])]), false).unwrap();

    assert!(report.is_clean());
    assert!(!env.servers().contains("web-docs"));
    let settings = env.settings();
    assert!(settings.get("env").is_none_or(|e| e.get("WEB_MODE").is_none()));
    assert!(settings.get("hooks").is_none_or(|h| h.get("PostToolUse").is_none()));
    assert!(env.project.join(".claude/rules/web.md").exists());

    let ledger = env.ledger();
    assert_eq!(
        ledger.state().excluded_for("web").into_iter().collect::<Vec<_>>(),
        vec!["docs".to_string(), "env".to_string()]
    );
    assert!(!ledger.state().record("web").unwrap().owns(&ArtifactId::mcp_server("web-docs")));

    // Excluded components are skipped, not reinstalled, on later runs
    harness.installer.installs.borrow_mut().clear();
    env.sync(&harness, desired(&[("web", &["docs", "env"])]), false).unwrap();
    assert!(!harness.installer.installs.borrow().contains(&"web/docs".to_string()));
}

#[test]
fn test_version_drift_retires_dropped_artifacts() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    env.write_pack(
        "web",
        r#"
id: web
version: 2.0.0
components:
  - id: docs
    install: {type: mcp_server, name: web-docs, command: docs-mcp, args: ["--http"]}
  - id: guide
    install: {type: file, source: files/guide.md, destination: .claude/rules/web-guide.md}
"#,
    );
    env.write_pack_file("web", "files/guide.md", "Read the guide.\n");

    let report = env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert!(!env.project.join(".claude/rules/web.md").exists());
    assert!(env.project.join(".claude/rules/web-guide.md").exists());
    assert_eq!(env.server("web-docs").unwrap()["args"][0], "--http");
    assert!(env.settings().get("env").is_none_or(|e| e.get("WEB_MODE").is_none()));
    assert_eq!(TestEnv::read(&env.project.join(".gitignore")).as_deref(), Some(""));

    let template = env.template().unwrap();
    assert!(!template.contains(&begin_marker("web")));
    assert!(template.contains(&begin_marker("core")));

    assert_eq!(
        env.ledger().state().record("web").unwrap().version.as_deref(),
        Some("2.0.0")
    );
}

#[test]
fn test_corrupt_ledger_aborts_without_mutation() {
    let env = TestEnv::new();
    install_web_pack(&env);
    std::fs::create_dir_all(env.target.state_file.parent().unwrap()).unwrap();
    std::fs::write(&env.target.state_file, "{ not json").unwrap();

    let err = env.sync(&Harness::new(), desired(&[("web", &[])]), false).unwrap_err();

    assert!(matches!(err, DomainError::CorruptState { .. }));
    assert!(err.to_string().contains("packsync sync"));
    assert_eq!(TestEnv::read(&env.target.state_file).as_deref(), Some("{ not json"));
    assert!(!env.target.mcp_file.exists());
    assert!(env.template().is_none());
}

#[test]
fn test_unknown_and_invalid_packs_fail_before_apply() {
    let env = TestEnv::new();
    env.write_pack(
        "broken",
        "id: broken\ncomponents:\n  - id: x\n    install: {type: plugin, name: ''}\n",
    );
    let harness = Harness::new();

    let err = env.sync(&harness, desired(&[("nope", &[])]), false).unwrap_err();
    assert!(matches!(err, DomainError::UnknownPack(ref id) if id == "nope"));

    let err = env.sync(&harness, desired(&[("broken", &[])]), false).unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref pack, .. } if pack == "broken"));
    assert!(!env.target.state_file.exists());
}

#[test]
fn test_dry_run_reports_plan_only() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();

    let report = env.sync(&harness, desired(&[("web", &[])]), true).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.plan.to_install, vec!["web".to_string()]);
    assert!(report.installed.is_empty());
    assert!(harness.installer.installs.borrow().is_empty());
    assert!(!env.target.state_file.exists());
    assert!(!env.target.mcp_file.exists());
    assert!(env.template().is_none());
}

#[test]
fn test_untrusted_script_is_a_partial_failure() {
    let env = TestEnv::new();
    env.write_pack(
        "tools",
        r"
id: tools
components:
  - id: setup
    install: {type: shell, script: setup.sh}
  - id: lint
    install: {type: plugin, name: linter}
",
    );
    env.write_pack_file("tools", "setup.sh", "touch ran.txt\n");
    let harness = Harness::new();

    let report = env.sync(&harness, desired(&[("tools", &[])]), false).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].pack, "tools");
    assert!(report.failures[0].message.contains("setup.sh"));
    assert!(!env.project.join("ran.txt").exists());
    assert_eq!(env.settings()["enabledPlugins"]["linter"], true);
    assert!(env.ledger().state().active_packs.contains("tools"));

    harness.trust.approve("tools", "setup.sh");
    let report = env.sync(&harness, desired(&[("tools", &[])]), false).unwrap();
    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert!(env.project.join("ran.txt").exists());
}

#[test]
fn test_failed_reinstall_keeps_previous_artifacts() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    harness.installer.fail_install("web/docs");
    let report = env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.removed.is_empty());
    assert!(env.servers().contains("web-docs"));
    assert!(env
        .ledger()
        .state()
        .record("web")
        .unwrap()
        .owns(&ArtifactId::mcp_server("web-docs")));
}

#[test]
fn test_failed_removal_is_parked_and_retried() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    let server = ArtifactId::mcp_server("web-docs");
    harness.installer.fail_uninstall(server.clone());
    let report = env.sync(&harness, desired(&[]), false).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(env.servers().contains("web-docs"));
    assert!(!env.project.join(".claude/rules/web.md").exists());
    let ledger = env.ledger();
    assert!(!ledger.state().active_packs.contains("web"));
    let parked = &ledger.state().record("web").unwrap().components[PENDING_REMOVAL];
    assert_eq!(parked.iter().collect::<Vec<_>>(), vec![&server]);

    harness.installer.heal();
    let report = env.sync(&harness, desired(&[]), false).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.removed, vec![server.to_string()]);
    assert!(env.servers().is_empty());
    assert!(env.ledger().state().artifacts.is_empty());
}

#[test]
fn test_user_settings_are_never_claimed() {
    let env = TestEnv::new();
    install_web_pack(&env);
    env.write_settings(&serde_json::json!({
        "env": {"WEB_MODE": "loose", "EDITOR": "vim"},
        "model": "default"
    }));
    let harness = Harness::new();

    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();
    assert_eq!(env.settings()["env"]["WEB_MODE"], "loose");
    assert!(!env
        .ledger()
        .state()
        .record("web")
        .unwrap()
        .owns(&ArtifactId::settings_key("env.WEB_MODE")));

    env.sync(&harness, desired(&[]), false).unwrap();
    let settings = env.settings();
    assert_eq!(settings["env"]["WEB_MODE"], "loose");
    assert_eq!(settings["env"]["EDITOR"], "vim");
    assert_eq!(settings["model"], "default");
    assert!(settings.get("hooks").is_none_or(|h| h.get("PostToolUse").is_none()));
}

#[test]
fn test_user_ignore_lines_and_servers_are_left_alone() {
    let env = TestEnv::new();
    install_web_pack(&env);
    std::fs::write(env.project.join(".gitignore"), "node_modules/\n").unwrap();
    let user_server = serde_json::json!({"mcpServers": {"web-docs": {"command": "my-docs"}}});
    std::fs::write(&env.target.mcp_file, user_server.to_string()).unwrap();
    let harness = Harness::new();

    let report = env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    assert_eq!(report.failures.len(), 1, "{:?}", report.failures);
    assert_eq!(report.failures[0].subject, "component 'docs'");
    assert_eq!(env.server("web-docs").unwrap()["command"], "my-docs");
    let ledger = env.ledger();
    let record = ledger.state().record("web").unwrap();
    assert!(!record.owns(&ArtifactId::mcp_server("web-docs")));
    assert!(!record.owns(&ArtifactId::ignore_entry("node_modules/")));
    assert!(record.owns(&ArtifactId::file(".claude/rules/web.md")));

    let report = env.sync(&harness, desired(&[]), false).unwrap();

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert_eq!(
        TestEnv::read(&env.project.join(".gitignore")).as_deref(),
        Some("node_modules/\n")
    );
    assert_eq!(env.server("web-docs").unwrap()["command"], "my-docs");
    assert!(!harness.installer.uninstalls.borrow().contains(&ArtifactId::mcp_server("web-docs")));
    assert!(env.ledger().state().artifacts.is_empty());
}

#[test]
fn test_unwritten_documents_keep_retired_artifacts_parked() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    harness.installer.block_on_uninstall(&env.target.settings_file);
    harness.installer.block_on_uninstall(&env.target.template_file);
    let report = env.sync(&harness, desired(&[]), false).unwrap();

    let subjects: Vec<&str> = report.failures.iter().map(|f| f.subject.as_str()).collect();
    assert_eq!(subjects.len(), 2, "{subjects:?}");
    assert!(report.removed.contains(&"mcp_server:web-docs".to_string()));
    assert!(!report.removed.contains(&"settings:env.WEB_MODE".to_string()));
    assert!(!report.removed.contains(&"section:web".to_string()));

    let ledger = env.ledger();
    assert!(!ledger.state().active_packs.contains("web"));
    let parked = &ledger.state().record("web").unwrap().components[PENDING_REMOVAL];
    assert!(parked.contains(&ArtifactId::settings_key("env.WEB_MODE")));
    assert!(parked.contains(&ArtifactId::hook_command("PostToolUse", "npm run lint")));
    assert!(parked.contains(&ArtifactId::section("web")));
    assert!(!parked.contains(&ArtifactId::mcp_server("web-docs")));

    harness.installer.heal();
    assert_eq!(env.settings()["env"]["WEB_MODE"], "strict");
    let report = env.sync(&harness, desired(&[]), false).unwrap();

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert!(report.removed.contains(&"settings:env.WEB_MODE".to_string()));
    assert!(report.removed.contains(&"section:web".to_string()));
    assert!(env.settings().get("env").is_none_or(|e| e.get("WEB_MODE").is_none()));
    assert!(!env.template().unwrap().contains(&begin_marker("web")));
    assert!(env.ledger().state().artifacts.is_empty());
}

#[test]
fn test_malformed_settings_fragment_is_rejected_before_apply() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();
    let state_before = TestEnv::read(&env.target.state_file);
    let settings_before = TestEnv::read(&env.target.settings_file);

    env.write_pack(
        "odd",
        r"
id: odd
components:
  - id: hooks
    install: {type: settings, settings: {hooks: nope}}
",
    );
    let err = env
        .sync(&harness, desired(&[("web", &[]), ("odd", &[])]), false)
        .unwrap_err();

    assert!(matches!(err, DomainError::Validation { ref pack, .. } if pack == "odd"));
    assert_eq!(TestEnv::read(&env.target.state_file), state_before);
    assert_eq!(TestEnv::read(&env.target.settings_file), settings_before);
}

#[test]
fn test_legacy_template_is_backed_up_and_replaced() {
    let env = TestEnv::new();
    install_web_pack(&env);
    std::fs::write(&env.target.template_file, "My hand-written notes\n").unwrap();

    let report = env.sync(&Harness::new(), desired(&[("web", &[])]), false).unwrap();

    let backup = report.template_backup.expect("legacy document should be backed up");
    assert_eq!(TestEnv::read(&backup).as_deref(), Some("My hand-written notes\n"));
    let template = env.template().unwrap();
    assert!(!template.contains("My hand-written notes"));
    assert!(template.starts_with(&begin_marker("core")));
}

#[test]
fn test_user_content_survives_recomposition() {
    let env = TestEnv::new();
    install_web_pack(&env);
    let harness = Harness::new();
    env.sync(&harness, desired(&[("web", &[])]), false).unwrap();

    let mut template = env.template().unwrap();
    template.push_str("\nMy own notes stay here.\n");
    std::fs::write(&env.target.template_file, &template).unwrap();

    let report = env.sync(&harness, desired(&[]), false).unwrap();
    assert!(report.template_backup.is_none());
    assert!(report.removed.contains(&"section:web".to_string()));

    let template = env.template().unwrap();
    assert!(template.contains("My own notes stay here."));
    let ids: Vec<String> = parse_sections(&template).into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["core"]);
}

#[test]
fn test_secret_placeholders_are_disambiguated() {
    let env = TestEnv::new();
    env.write_pack(
        "apis",
        r"
id: apis
components:
  - id: search
    install: {type: mcp_server, name: search, command: search-mcp, env: {TOKEN: '${API_KEY}'}}
  - id: issues
    install: {type: mcp_server, name: issues, command: issues-mcp, env: {TOKEN: '${API_KEY}'}}
",
    );

    let report = env.sync(&Harness::new(), desired(&[("apis", &[])]), false).unwrap();

    assert_eq!(
        report.required_secrets.iter().cloned().collect::<Vec<_>>(),
        vec!["API_KEY".to_string(), "API_KEY_2".to_string()]
    );
    assert_eq!(env.server("issues").unwrap()["env"]["TOKEN"], "${API_KEY_2}");
    assert_eq!(env.server("search").unwrap()["env"]["TOKEN"], "${API_KEY}");
}

#[test]
fn test_global_scope_uses_home_locations() {
    let env = TestEnv::new().global();
    env.write_pack(
        "solo",
        r"
id: solo
components:
  - id: server
    install: {type: mcp_server, name: solo, url: 'https://solo.example/mcp'}
templates:
  - section: solo
    content: Global guidance
",
    );

    let report = env.sync(&Harness::new(), desired(&[("solo", &[])]), false).unwrap();

    assert!(report.is_clean());
    assert_eq!(env.target.mcp_file, env.home.join(".claude.json"));
    assert_eq!(env.server("solo").unwrap()["url"], "https://solo.example/mcp");
    assert!(env.home.join(".claude/CLAUDE.md").exists());
    assert!(env.home.join(".packsync/global-state.json").exists());
    assert!(!env.project.join(".packsync").exists());
}
