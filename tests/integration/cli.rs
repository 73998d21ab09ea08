//! The `kiln` binary.

use assert_cmd::Command;
use kiln_cli::git::is_git_installed;
use kiln_cli::test_utils::bare_repository;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn kiln(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(temp.path())
        .env("KILN_CONFIG", temp.path().join("kiln-config.toml"))
        .env("KILN_NO_PROGRESS", "1")
        .env_remove("RUST_LOG")
        .env_remove("KILN_REGISTRY_URL");
    cmd
}

#[test]
fn test_no_arguments_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    kiln(&temp).assert().success().stderr(predicate::str::contains("Nothing to build"));
}

#[test]
fn test_source_without_config_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    kiln(&temp).arg("widgets").assert().success();
}

#[test]
fn test_malformed_config_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("site.json"), "{ \"name\": ").unwrap();

    kiln(&temp)
        .args(["widgets", "site.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid build configuration"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp = TempDir::new().unwrap();

    kiln(&temp)
        .args(["widgets", "absent.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("absent.json"));
}

#[test]
fn test_unreachable_registry_fails_and_leaves_no_output() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("site.json"), "{}").unwrap();

    kiln(&temp)
        .env("KILN_IDENTITY", "dev@kiln.example")
        .env("KILN_SECRET", "hunter2")
        .args(["--registry", "http://127.0.0.1:9", "-o", "dist", "widgets", "site.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Network error"));

    assert!(!temp.path().join("dist").exists());
}

#[cfg(unix)]
#[test]
fn test_relative_output_dir_receives_outputs_and_script_writes() {
    if !is_git_installed() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let url = bare_repository(
        &temp.path().join("repos"),
        "site",
        &json!({
            "files": [{"from": "a.txt", "to": "a.txt", "method": "copy"}],
            "scripts": ["stamp.sh"]
        }),
        &[
            ("a.txt", b"copied".as_slice()),
            ("stamp.sh", b"echo stamped > \"$KILN_DEST_DIR/stamped.txt\"\n".as_slice()),
        ],
    )
    .unwrap();
    fs::write(temp.path().join("site.json"), "{}").unwrap();
    fs::create_dir(temp.path().join("dist")).unwrap();

    kiln(&temp).args(["-o", "dist", url.as_str(), "site.json"]).assert().success();

    let dist = temp.path().join("dist");
    assert_eq!(fs::read_to_string(dist.join("a.txt")).unwrap(), "copied");
    assert_eq!(fs::read_to_string(dist.join("stamped.txt")).unwrap(), "stamped\n");
}

#[test]
fn test_conflicting_verbosity_flags_are_rejected() {
    let temp = TempDir::new().unwrap();
    kiln(&temp).args(["--verbose", "--quiet"]).assert().failure();
}

#[test]
fn test_help_lists_options() {
    let temp = TempDir::new().unwrap();
    kiln(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-parallel"))
        .stdout(predicate::str::contains("--registry"));
}
