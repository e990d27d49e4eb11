//! CLI integration tests for kodebase
//!
//! These tests drive the binary through whole workflows: project setup,
//! artifact creation, lifecycle transitions with cascades, and dependency
//! resolution.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ACTOR: &str = "Ada (ada@example.com)";

/// Get a command instance for the kodebase binary
fn kb(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("kodebase"));
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".xdg"))
        .env_remove("KODEBASE_LOG")
        .args(["--actor", ACTOR]);
    cmd
}

/// Create a temporary directory and initialize a kodebase project
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    kb(dir.path()).arg("init").assert().success();
    dir
}

/// Initiative A, milestone A.1 and issue A.1.1, with A and A.1 ready
fn setup_tree() -> TempDir {
    let dir = setup_project();
    let path = dir.path();
    kb(path).args(["new", "Platform"]).assert().success();
    kb(path).args(["new", "Parser", "--parent", "A"]).assert().success();
    kb(path).args(["new", "Lexer", "--parent", "A.1"]).assert().success();
    for id in ["A", "A.1", "A.1.1"] {
        kb(path).args(["transition", id, "ready"]).assert().success();
    }
    dir
}

fn artifact_file(dir: &Path, rel: &str) -> String {
    fs::read_to_string(dir.join(".kodebase/artifacts").join(rel)).unwrap()
}

fn json_stdout(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    kb(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized kodebase project"));

    assert!(dir.path().join(".kodebase/artifacts").is_dir());
    assert!(dir.path().join(".kodebase/config.toml").is_file());
    assert!(dir.path().join(".kodebase/.gitignore").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    kb(dir.path()).arg("init").assert().success();
    kb(dir.path()).arg("init").assert().success();
}

#[test]
fn test_commands_outside_project_fail() {
    let dir = TempDir::new().unwrap();

    kb(dir.path())
        .arg("ready")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not in a kodebase project"));
}

// =============================================================================
// Artifact creation
// =============================================================================

#[test]
fn test_new_allocates_hierarchical_ids() {
    let dir = setup_project();
    let path = dir.path();

    kb(path)
        .args(["new", "Platform"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created initiative A: Platform (draft)"));
    kb(path)
        .args(["new", "Tooling"])
        .assert()
        .success()
        .stdout(predicate::str::contains("initiative B"));
    kb(path)
        .args(["new", "Parser", "--parent", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("milestone A.1"));
    kb(path)
        .args(["new", "Lexer", "--parent", "A.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("issue A.1.1"));
    kb(path)
        .args(["new", "Grammar", "--parent", "A.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("issue A.1.2"));

    let issue = artifact_file(path, "A/A.1/A.1.1.yml");
    assert!(issue.contains("title: Lexer"));
    assert!(issue.contains("trigger: artifact_created"));
    assert!(issue.contains(ACTOR));
}

#[test]
fn test_new_rejects_missing_or_invalid_parent() {
    let dir = setup_project();
    let path = dir.path();

    kb(path)
        .args(["new", "Orphan", "--parent", "Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    kb(path).args(["new", "Platform"]).assert().success();
    kb(path).args(["new", "Parser", "--parent", "A"]).assert().success();
    kb(path).args(["new", "Lexer", "--parent", "A.1"]).assert().success();
    kb(path)
        .args(["new", "Too deep", "--parent", "A.1.1"])
        .assert()
        .failure();
}

#[test]
fn test_list_filters_by_type() {
    let dir = setup_tree();

    let list = json_stdout(kb(dir.path()).args(["--format", "json", "list", "--type", "issue"]));
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "A.1.1");
    assert_eq!(items[0]["state"], "ready");
}

#[test]
fn test_show_prints_events() {
    let dir = setup_tree();

    kb(dir.path())
        .args(["show", "A.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A.1.1: Lexer"))
        .stdout(predicate::str::contains("State: ready"))
        .stdout(predicate::str::contains("artifact_created"));
}

// =============================================================================
// Lifecycle and cascades
// =============================================================================

#[test]
fn test_invalid_transition_is_rejected() {
    let dir = setup_project();
    let path = dir.path();
    kb(path).args(["new", "Platform"]).assert().success();

    kb(path)
        .args(["transition", "A", "completed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Valid transitions"));

    // Nothing was written
    let initiative = artifact_file(path, "A/A.yml");
    assert!(!initiative.contains("event: completed"));
}

#[test]
fn test_starting_issue_cascades_to_ancestors() {
    let dir = setup_tree();
    let path = dir.path();

    kb(path)
        .args(["transition", "A.1.1", "in_progress", "--trigger", "branch_created"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A.1.1: ready -> in_progress"))
        .stdout(predicate::str::contains("A.1 -> in_progress"))
        .stdout(predicate::str::contains("A -> in_progress"));

    let milestone = artifact_file(path, "A/A.1/A.1.yml");
    assert!(milestone.contains("trigger: children_started"));
    assert!(milestone.contains("System Cascade (cascade@completion)"));
    assert!(milestone.contains("trigger_artifact: A.1.1"));
}

#[test]
fn test_completing_all_issues_moves_milestone_to_review() {
    let dir = setup_tree();
    let path = dir.path();

    kb(path).args(["transition", "A.1.1", "in_progress"]).assert().success();
    kb(path).args(["transition", "A.1.1", "in_review"]).assert().success();

    let report = json_stdout(kb(path).args(["--format", "json", "complete", "A.1.1"]));
    assert_eq!(report["to"], "completed");
    let changes = report["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["id"], "A.1");
    assert_eq!(changes[0]["new_state"], "in_review");

    let issue = artifact_file(path, "A/A.1/A.1.1.yml");
    assert!(issue.contains("trigger: pr_merged"));
}

#[test]
fn test_cascade_can_be_disabled() {
    let dir = setup_tree();
    let path = dir.path();
    fs::write(
        path.join(".kodebase/config.toml"),
        "[cascade]\nenabled = false\n",
    )
    .unwrap();

    let report = json_stdout(kb(path).args(["--format", "json", "transition", "A.1.1", "in_progress"]));
    assert!(report["changes"].as_array().unwrap().is_empty());
}

// =============================================================================
// Dependencies
// =============================================================================

#[test]
fn test_blocked_issue_unblocks_when_dependency_completes() {
    let dir = setup_tree();
    let path = dir.path();

    kb(path)
        .args(["new", "Grammar", "--parent", "A.1", "--blocked-by", "A.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("issue A.1.2: Grammar (blocked)"));

    let blocker = artifact_file(path, "A/A.1/A.1.1.yml");
    assert!(blocker.contains("A.1.2"), "blocks side is mirrored");

    let why = json_stdout(kb(path).args(["--format", "json", "why", "A.1.2"]));
    assert_eq!(why["ready"], false);
    assert_eq!(why["reasons"][0]["type"], "incomplete_dependencies");
    assert_eq!(why["reasons"][0]["dependencies"][0], "A.1.1");

    kb(path).args(["transition", "A.1.1", "in_progress"]).assert().success();
    kb(path).args(["transition", "A.1.1", "in_review"]).assert().success();
    kb(path)
        .args(["complete", "A.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A.1.2 -> ready"));

    let dependent = artifact_file(path, "A/A.1/A.1.2.yml");
    assert!(dependent.contains("trigger: dependency_completed"));
    assert!(dependent.contains("resolved: true"));
}

#[test]
fn test_dep_rejects_cycles_and_cross_level_edges() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path)
        .args(["new", "Grammar", "--parent", "A.1", "--blocked-by", "A.1.1"])
        .assert()
        .success();

    kb(path)
        .args(["dep", "A.1.1", "A.1.2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency"));

    kb(path)
        .args(["dep", "A.1", "A.1.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cross-level"));
}

#[test]
fn test_dep_and_undep_update_both_sides() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path).args(["new", "Grammar", "--parent", "A.1"]).assert().success();

    kb(path)
        .args(["dep", "A.1.2", "A.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A.1.2 is now blocked by A.1.1"));
    assert!(artifact_file(path, "A/A.1/A.1.2.yml").contains("event: blocked"));

    kb(path).args(["undep", "A.1.2", "A.1.1"]).assert().success();
    kb(path)
        .args(["undep", "A.1.2", "A.1.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not depend on"));
}

/// Drives an issue from `ready` to `completed`
fn finish(dir: &Path, id: &str) {
    kb(dir).args(["transition", id, "in_progress"]).assert().success();
    kb(dir).args(["transition", id, "in_review"]).assert().success();
    kb(dir).args(["complete", id]).assert().success();
}

fn state_of(dir: &Path, id: &str) -> (String, bool) {
    let shown = json_stdout(kb(dir).args(["--format", "json", "show", id]));
    (
        shown["state"].as_str().unwrap().to_string(),
        shown["ready"].as_bool().unwrap(),
    )
}

#[test]
fn test_dep_on_blocked_artifact_waits_for_every_dependency() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path).args(["new", "Grammar", "--parent", "A.1"]).assert().success();
    kb(path).args(["transition", "A.1.2", "ready"]).assert().success();
    kb(path)
        .args(["new", "Codegen", "--parent", "A.1", "--blocked-by", "A.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(blocked)"));

    kb(path).args(["dep", "A.1.3", "A.1.2"]).assert().success();
    let codegen = artifact_file(path, "A/A.1/A.1.3.yml");
    assert_eq!(codegen.matches("artifact_id:").count(), 2);

    finish(path, "A.1.1");
    assert_eq!(state_of(path, "A.1.3"), ("blocked".to_string(), false));

    finish(path, "A.1.2");
    assert_eq!(state_of(path, "A.1.3"), ("ready".to_string(), true));
}

#[test]
fn test_undep_last_dependency_unblocks() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path)
        .args(["new", "Grammar", "--parent", "A.1", "--blocked-by", "A.1.1"])
        .assert()
        .success();
    assert_eq!(state_of(path, "A.1.2"), ("blocked".to_string(), false));

    let removed = json_stdout(kb(path).args(["--format", "json", "undep", "A.1.2", "A.1.1"]));
    assert_eq!(removed["state"], "ready");
    assert_eq!(state_of(path, "A.1.2"), ("ready".to_string(), true));

    let grammar = artifact_file(path, "A/A.1/A.1.2.yml");
    assert!(grammar.contains("trigger: dependency_completed"));
    assert!(grammar.contains("removed_dependency: A.1.1"));
}

#[test]
fn test_undep_one_of_two_dependencies_stays_blocked() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path).args(["new", "Grammar", "--parent", "A.1"]).assert().success();
    kb(path)
        .args([
            "new", "Codegen", "--parent", "A.1", "--blocked-by", "A.1.1", "--blocked-by", "A.1.2",
        ])
        .assert()
        .success();

    kb(path).args(["undep", "A.1.3", "A.1.1"]).assert().success();
    assert_eq!(state_of(path, "A.1.3"), ("blocked".to_string(), false));
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_ready_and_blocked_listings() {
    let dir = setup_tree();
    let path = dir.path();
    kb(path)
        .args(["new", "Grammar", "--parent", "A.1", "--blocked-by", "A.1.1"])
        .assert()
        .success();

    let ready = json_stdout(kb(path).args(["--format", "json", "ready"]));
    let ids: Vec<_> = ready
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"A.1.1".to_string()));
    assert!(!ids.contains(&"A.1.2".to_string()));

    kb(path)
        .arg("blocked")
        .assert()
        .success()
        .stdout(predicate::str::contains("A.1.2"));
}

#[test]
fn test_validate_passes_on_clean_project() {
    let dir = setup_tree();

    kb(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All 3 artifacts are valid"));
}

#[test]
fn test_validate_reports_unreadable_files() {
    let dir = setup_tree();
    let path = dir.path();
    fs::create_dir_all(path.join(".kodebase/artifacts/B")).unwrap();
    fs::write(path.join(".kodebase/artifacts/B/B.yml"), "metadata: [unclosed").unwrap();

    kb(path)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("PARSE_ERROR"))
        .stderr(predicate::str::contains("Validation found 1 issue(s)"));
}

#[test]
fn test_context_renders_markdown_digest() {
    let dir = setup_tree();

    kb(dir.path())
        .args(["context", "A.1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("# Milestone A.1: Parser"))
        .stdout(predicate::str::contains("**Progress:** 0/1 completed"))
        .stdout(predicate::str::contains("- [ ] A.1.1 Lexer (ready)"));
}
