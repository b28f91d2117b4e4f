use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("calagent")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("whoami"))
        .stdout(predicate::str::contains("request"))
        .stdout(predicate::str::contains("waitlist"));
}

#[test]
fn test_consent_help_shows_subcommands() {
    cargo_bin_cmd!("calagent")
        .args(["consent", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("accept"))
        .stdout(predicate::str::contains("reject"))
        .stdout(predicate::str::contains("clear"));
}

#[test]
fn test_login_help_shows_callback_flag() {
    cargo_bin_cmd!("calagent")
        .args(["login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--callback-url"))
        .stdout(predicate::str::contains("--no-browser"));
}

#[test]
fn test_unknown_command_fails() {
    cargo_bin_cmd!("calagent")
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
