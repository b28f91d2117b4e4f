//! Integration tests for the consent commands.

mod fixtures;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::read_storage;
use predicates::prelude::*;
use tempfile::tempdir;

/// Test: accept is stored and reported by show.
#[test]
fn test_accept_then_show() {
    let temp = tempdir().unwrap();

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["consent", "accept"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cookie consent accepted"));

    let entries = read_storage(temp.path());
    assert_eq!(entries["cookieConsent"], "accepted");
    assert!(entries["cookieConsentDate"].is_string());

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["consent", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cookie consent: accepted"))
        .stdout(predicate::str::contains("Analytics: enabled"));
}

/// Test: clear forgets the decision.
#[test]
fn test_reject_then_clear() {
    let temp = tempdir().unwrap();

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["consent", "reject"])
        .assert()
        .success();

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["consent", "clear"])
        .assert()
        .success();

    cargo_bin_cmd!("calagent")
        .env("CALAGENT_HOME", temp.path())
        .args(["consent", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("undecided"));
}
