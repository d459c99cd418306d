//! End-to-end context assembly over a real git repository
//!
//! - Bundle contents and ranking for a partially failing project
//! - Adaptive test limit applied to the emitted registry
//! - Per-file truncation and the file cap
//! - Missing artifacts degrade to empty fields
//! - Focus selection and metrics across a simulated cycle

use context_engine::harness::settings::{load_settings_map, SETTINGS_FILE};
use context_engine::{
    next_failing_test, ContextAssembler, CycleOutcome, HarnessSettings, MetricsCollector,
    RegistryDocument,
};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn init_git_repo(path: &Path) {
    Command::new("git")
        .args(["init"])
        .current_dir(path)
        .output()
        .expect("git init failed");
    Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(path)
        .output()
        .expect("git config email failed");
    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(path)
        .output()
        .expect("git config name failed");
    fs::write(path.join("README.md"), "# Todo App\n").unwrap();
    Command::new("git")
        .args(["add", "."])
        .current_dir(path)
        .output()
        .expect("git add failed");
    Command::new("git")
        .args(["commit", "-m", "Initial commit"])
        .current_dir(path)
        .output()
        .expect("git commit failed");
}

/// 2 failing, 18 passing
fn sample_registry() -> String {
    let mut tests = vec![
        r#"{"category": "functional", "description": "Todo list shows items", "steps": ["Open the todos page", "See items"], "passes": false}"#.to_string(),
        r#"{"category": "style", "description": "Header uses brand color", "steps": ["Inspect header"], "passes": false}"#.to_string(),
    ];
    for i in 0..18 {
        tests.push(format!(
            r#"{{"category": "functional", "description": "Passing behavior {i}", "steps": ["check"], "passes": true}}"#
        ));
    }
    format!(r#"{{"project": "todo", "tests": [{}]}}"#, tests.join(","))
}

fn setup_project() -> tempfile::TempDir {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    init_git_repo(root);

    fs::create_dir_all(root.join("src/components")).unwrap();
    fs::create_dir_all(root.join("node_modules/react")).unwrap();
    fs::create_dir_all(root.join("assets")).unwrap();

    fs::write(root.join("feature_list.json"), sample_registry()).unwrap();
    fs::write(root.join("app_spec.txt"), "A todo application.").unwrap();
    fs::write(root.join("codex-progress.txt"), "Cycle 3: list page scaffolded").unwrap();
    fs::write(root.join("src/todos.js"), "export function todos() {}").unwrap();
    fs::write(root.join("src/components/header.css"), ".header {}").unwrap();
    fs::write(root.join("src/util.js"), "export const noop = () => {};").unwrap();
    fs::write(root.join("node_modules/react/index.js"), "module.exports = {}").unwrap();
    fs::write(root.join("assets/logo.png"), [0u8, 159, 146, 150]).unwrap();

    dir
}

/// Settings from `<root>/harness.conf` only, so exported `HARNESS_*`
/// variables cannot change the expectations
fn settings(root: &Path) -> HarnessSettings {
    let map = load_settings_map(root.join(SETTINGS_FILE)).expect("settings file");
    let mut settings = HarnessSettings::from_map(&map).expect("settings");
    settings.resolve_paths(root);
    settings
}

#[test]
fn test_bundle_for_partially_failing_project() {
    let dir = setup_project();
    let bundle = ContextAssembler::new(dir.path(), settings(dir.path()))
        .assemble()
        .unwrap();

    assert_eq!(bundle.specification, "A todo application.");
    assert_eq!(bundle.progress, "Cycle 3: list page scaffolded");
    assert!(bundle.history.contains("Initial commit"));

    // "todos" is named by a failing test: 50 (source) + 200 (stem)
    assert_eq!(bundle.file_paths[0], "src/todos.js");
    assert!(bundle.file_paths.iter().all(|p| !p.starts_with("node_modules/")));
    assert!(bundle.file_paths.iter().all(|p| !p.starts_with(".git/")));
    assert!(bundle.file_paths.contains(&"assets/logo.png".to_string()));

    // 2 failing of 20: min(2 + 5, 20, 15) = 7, other keys preserved
    let registry = bundle.test_registry.as_ref().expect("registry");
    assert_eq!(registry.tests().len(), 7);
    match registry {
        RegistryDocument::Wrapped { rest, .. } => assert_eq!(rest["project"], "todo"),
        other => panic!("expected wrapped registry, got {other:?}"),
    }
}

#[test]
fn test_bundle_json_shape() {
    let dir = setup_project();
    let bundle = ContextAssembler::new(dir.path(), settings(dir.path()))
        .assemble()
        .unwrap();

    let value = serde_json::to_value(&bundle).unwrap();
    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["app_spec", "feature_list", "files", "git_log", "progress", "repo_tree"]
    );
    assert_eq!(value["feature_list"]["tests"].as_array().unwrap().len(), 7);
    assert_eq!(value["feature_list"]["project"], "todo");
    assert_eq!(value["files"]["src/todos.js"], "export function todos() {}");
}

#[test]
fn test_file_cap_and_truncation_from_settings_file() {
    let dir = setup_project();
    fs::write(dir.path().join("src/big.py"), "z".repeat(5000)).unwrap();
    fs::write(
        dir.path().join("harness.conf"),
        "# limits\nmax_files = 4\nmax_file_bytes = 1000\n",
    )
    .unwrap();

    let bundle = ContextAssembler::new(dir.path(), settings(dir.path()))
        .assemble()
        .unwrap();

    assert_eq!(bundle.file_paths.len(), 4);
    for text in bundle.file_contents.values() {
        let body = text.split("\n\n[TRUNCATED:").next().unwrap();
        assert!(body.len() <= 1000);
    }
    if let Some(big) = bundle.file_contents.get("src/big.py") {
        assert!(big.ends_with("[TRUNCATED: 4000 bytes]"));
    }
}

#[test]
fn test_missing_artifacts_yield_empty_fields() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.go"), "package main").unwrap();

    let bundle = ContextAssembler::new(dir.path(), settings(dir.path()))
        .assemble()
        .unwrap();

    assert_eq!(bundle.specification, "");
    assert_eq!(bundle.progress, "");
    assert_eq!(bundle.history, "");
    assert!(bundle.test_registry.is_none());
    assert_eq!(bundle.file_paths, vec!["main.go".to_string()]);
}

#[test]
fn test_malformed_registry_degrades_to_no_tests() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("feature_list.json"), "{ not json").unwrap();
    fs::write(dir.path().join("app.py"), "print()").unwrap();

    let bundle = ContextAssembler::new(dir.path(), settings(dir.path()))
        .assemble()
        .unwrap();
    assert!(bundle.test_registry.is_none());
    assert!(next_failing_test(dir.path().join("feature_list.json")).is_none());
}

#[test]
fn test_cycle_focus_and_metrics() {
    let dir = setup_project();
    let settings = settings(dir.path());

    let focus = next_failing_test(&settings.feature_list_path).expect("a failing test");
    assert_eq!(focus.index, 0);
    assert!(focus.render().contains("Todo list shows items"));

    // The agent fixes the first failure
    let text = fs::read_to_string(&settings.feature_list_path)
        .unwrap()
        .replacen(r#""passes": false"#, r#""passes": true"#, 1);
    fs::write(&settings.feature_list_path, text).unwrap();

    let focus = next_failing_test(&settings.feature_list_path).expect("a failing test");
    assert_eq!(focus.index, 1);
    assert_eq!(focus.test.category, "style");

    let metrics = MetricsCollector::new(&settings.metrics_path);
    metrics
        .record_cycle(&CycleOutcome::new(1, 61.5, true).with_failing(2, 1))
        .unwrap();
    let summary = metrics.summary().unwrap();
    assert_eq!(summary.total_cycles, 1);
    assert_eq!(summary.total_tests_fixed, 1);
    assert!(dir.path().join("harness_metrics.jsonl").exists());
}
