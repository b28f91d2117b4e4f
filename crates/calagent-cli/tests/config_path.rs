//! Integration tests for config path and init commands.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

/// Test: config path respects CALAGENT_HOME.
#[test]
fn test_config_path_uses_calagent_home() {
    let temp = tempdir().unwrap();
    let expected = temp.path().join("config.toml");

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().as_ref()));
}

/// Test: config init writes the template once.
#[test]
fn test_config_init_creates_file() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("api_base_url"));

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

/// Test: a broken config file is reported with its path.
#[test]
fn test_invalid_config_is_reported() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("config.toml"), "api_base_url = [").unwrap();

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}
