use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn conveyor(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("conveyor").unwrap();
    cmd.current_dir(dir.path()).env("CONVEYOR_ROOT", dir.path());
    cmd
}

fn json_run(dir: &TempDir, args: &[&str]) -> Value {
    let mut cmd = conveyor(dir);
    cmd.args(args).arg("--json");
    let assert = cmd.assert().success();
    serde_json::from_slice(&assert.get_output().stdout).unwrap()
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::create_dir_all(dir.path().join(".conveyor")).unwrap();
    std::fs::write(dir.path().join(".conveyor/config.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// conveyor init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir).arg("init").assert().success();

    assert!(dir.path().join(".conveyor").is_dir());
    assert!(dir.path().join(".conveyor/config.yaml").exists());
}

#[test]
fn init_is_idempotent_and_preserves_edits() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir).arg("init").assert().success();
    std::fs::write(dir.path().join(".conveyor/config.yaml"), "rigidity: 0.9\n").unwrap();
    conveyor(&dir).arg("init").assert().success();

    let content = std::fs::read_to_string(dir.path().join(".conveyor/config.yaml")).unwrap();
    assert_eq!(content, "rigidity: 0.9\n");
}

// ---------------------------------------------------------------------------
// conveyor start / status / list
// ---------------------------------------------------------------------------

#[test]
fn start_with_echo_worker_completes() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir).arg("init").assert().success();

    let status = json_run(&dir, &["start", "demo task"]);
    assert_eq!(status["current_stage"]["type"], "complete");
    assert_eq!(status["pending_approval"], false);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    let fetched = json_run(&dir, &["status", &thread_id]);
    assert_eq!(fetched["current_stage"]["type"], "complete");
    assert_eq!(fetched["stages"].as_array().unwrap().len(), 6);

    let listed = json_run(&dir, &["list"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[test]
fn start_with_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strict.yaml");
    std::fs::write(&path, "checkpoint_stages:\n- requirements\n").unwrap();

    let status = json_run(&dir, &["start", "demo", "--config", path.to_str().unwrap()]);
    assert_eq!(status["pending_approval"], true);
    assert_eq!(status["current_stage"]["stage"], "requirements");
}

#[test]
fn start_rejects_invalid_rigidity() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir)
        .args(["start", "demo", "--rigidity", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rigidity"));
}

#[test]
fn start_rejects_unknown_worker() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir)
        .args(["start", "demo", "--worker", "claude"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown worker"));
}

#[test]
fn status_of_unknown_thread_fails() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir)
        .args(["status", "no-such-thread"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ---------------------------------------------------------------------------
// checkpoint suspend / resume across processes
// ---------------------------------------------------------------------------

#[test]
fn checkpoint_suspends_and_resume_completes() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "checkpoint_stages:\n- documentation\n");

    // Each CLI call is a separate process, so suspension and resume
    // exercise the persisted state end to end.
    let status = json_run(&dir, &["start", "demo"]);
    assert_eq!(status["pending_approval"], true);
    assert_eq!(status["current_stage"]["stage"], "documentation");
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    let resumed = json_run(&dir, &["resume", &thread_id, "--approve"]);
    assert_eq!(resumed["current_stage"]["type"], "complete");
    assert_eq!(resumed["stages"].as_array().unwrap().len(), 6);
}

#[test]
fn resume_reject_aborts_and_archive_removes() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "checkpoint_stages:\n- code_review\n");

    let status = json_run(&dir, &["start", "demo"]);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    let rejected = json_run(
        &dir,
        &["resume", &thread_id, "--reject", "--reason", "wrong direction"],
    );
    assert_eq!(rejected["current_stage"]["type"], "aborted");
    assert!(rejected["errors"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["kind"] == "rejected"));

    conveyor(&dir)
        .args(["archive", &thread_id])
        .assert()
        .success();
    conveyor(&dir)
        .args(["status", &thread_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn resume_requires_a_suspended_run() {
    let dir = TempDir::new().unwrap();
    let status = json_run(&dir, &["start", "demo"]);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    conveyor(&dir)
        .args(["resume", &thread_id, "--approve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not suspended"));
}

#[test]
fn resume_without_a_decision_fails() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "checkpoint_stages:\n- testing\n");
    let status = json_run(&dir, &["start", "demo"]);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    conveyor(&dir)
        .args(["resume", &thread_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--approve"));
}

// ---------------------------------------------------------------------------
// step / archive misuse
// ---------------------------------------------------------------------------

#[test]
fn step_rejects_a_terminal_run() {
    let dir = TempDir::new().unwrap();
    let status = json_run(&dir, &["start", "demo"]);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    conveyor(&dir)
        .args(["step", &thread_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terminal"));
}

#[test]
fn archive_refuses_a_suspended_run() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "checkpoint_stages:\n- architecture\n");
    let status = json_run(&dir, &["start", "demo"]);
    let thread_id = status["thread_id"].as_str().unwrap().to_string();

    conveyor(&dir)
        .args(["archive", &thread_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terminal"));
}

// ---------------------------------------------------------------------------
// conveyor capabilities
// ---------------------------------------------------------------------------

#[test]
fn capabilities_lists_the_builtin_registry() {
    let dir = TempDir::new().unwrap();
    conveyor(&dir)
        .arg("capabilities")
        .assert()
        .success()
        .stdout(predicate::str::contains("file_write"))
        .stdout(predicate::str::contains("read_only"))
        .stdout(predicate::str::contains("execute"));
}
