//! Integration tests for the `polsync` CLI binary.
//!
//! Argument parsing, help output, completions, and offline validation of
//! record documents. Nothing here needs a reachable device.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `polsync` binary with env isolation.
///
/// Clears all `POLSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn polsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("polsync");
    cmd.env("HOME", "/tmp/polsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/polsync-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("POLSYNC_PROFILE")
        .env_remove("POLSYNC_CONFIG")
        .env_remove("POLSYNC_URL")
        .env_remove("POLSYNC_API_KEY")
        .env_remove("POLSYNC_ENVIRONMENT")
        .env_remove("POLSYNC_OUTPUT")
        .env_remove("POLSYNC_INSECURE")
        .env_remove("POLSYNC_TIMEOUT")
        .env_remove("POLSYNC_USERNAME")
        .env_remove("POLSYNC_PASSWORD");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

const RECORDS: &str = "\
- kind: tag
  name: prod
- kind: address
  name: web-1
  value: 10.0.0.1
  tags: [prod]
- kind: address-group
  name: web
  static-members: [web-1]
";

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = polsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "Expected 'Usage' in output:\n{stderr}");
}

#[test]
fn test_help_lists_commands() {
    polsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("plan")
            .and(predicate::str::contains("deploy"))
            .and(predicate::str::contains("inspect"))
            .and(predicate::str::contains("validate")),
    );
}

#[test]
fn test_version_flag() {
    polsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("polsync"));
}

#[test]
fn test_completions_zsh() {
    polsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_unknown_kind_is_rejected() {
    polsync_cmd()
        .args(["inspect", "firewall-widget"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown object kind"));
}

#[test]
fn test_invalid_output_format() {
    polsync_cmd()
        .args(["--output", "xml", "config", "path"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("possible values"));
}

#[test]
fn test_validate_requires_input() {
    polsync_cmd().arg("validate").assert().code(2);
}

// ── Offline validation ──────────────────────────────────────────────

#[test]
fn test_validate_counts_objects() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);

    polsync_cmd()
        .args(["--vsys", "vsys1", "validate", "-i", &file])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("3 object(s) valid")
                .and(predicate::str::contains("address-group")),
        );
}

#[test]
fn test_validate_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);

    let output = polsync_cmd()
        .args(["--vsys", "vsys1", "-o", "json", "validate", "-i", &file])
        .output()
        .unwrap();
    assert!(output.status.success());
    let counts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(counts["address"], 1);
    assert_eq!(counts["tag"], 1);
}

#[test]
fn test_validate_reports_unresolved_reference() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "objects.json",
        r#"{"objects": [{"kind": "address-group", "name": "web", "static-members": ["missing"]}]}"#,
    );

    polsync_cmd()
        .args(["--device-group", "branches", "validate", "-i", &file])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_validate_without_scope_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);

    polsync_cmd()
        .args(["validate", "-i", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No deployment scope"));
}

#[test]
fn test_validate_uses_profile_scope() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);
    let config = write(
        dir.path(),
        "config.toml",
        "default_profile = \"lab\"\n\n[profiles.lab]\nurl = \"https://fw.example\"\ntarget = \"firewall\"\n",
    );

    polsync_cmd()
        .args(["--config", &config, "validate", "-i", &file])
        .assert()
        .success();
}

#[test]
fn test_unknown_profile_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);
    let config = write(
        dir.path(),
        "config.toml",
        "[profiles.lab]\nurl = \"https://fw.example\"\ntarget = \"firewall\"\n",
    );

    polsync_cmd()
        .args(["--config", &config, "--profile", "prod", "validate", "-i", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("lab"));
}

// ── Device commands without a device ───────────────────────────────

#[test]
fn test_plan_without_device_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "objects.yaml", RECORDS);

    polsync_cmd()
        .args(["--vsys", "vsys1", "plan", "-i", &file])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No device configured"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    polsync_cmd()
        .args(["--config", "/tmp/polsync-alt.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/polsync-alt.toml"));
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.toml",
        "[profiles.lab]\nurl = \"https://fw.example\"\ntarget = \"firewall\"\napi_key = \"LUFRPT-secret\"\n",
    );

    polsync_cmd()
        .args(["--config", &config, "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********")
                .and(predicate::str::contains("LUFRPT-secret").not()),
        );
}
