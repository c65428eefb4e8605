use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(deprecated)]
fn bundlewire_cmd() -> Command {
    let mut cmd = Command::cargo_bin("bundlewire").unwrap();
    cmd.env_remove("BUNDLEWIRE_REPO")
        .env_remove("BUNDLEWIRE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures")
        .join(name)
}

#[test]
fn test_check_consistent_repository() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("resolved.toml"))
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1 resource(s) consistent after 1 permutation(s)",
        ));
}

#[test]
fn test_check_honours_permutation_limit() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    fs::write(&config, "[resolver]\nmax-permutations = 1\n").unwrap();

    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("backtrack.toml"))
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Gave up after 1 candidate permutations"));
}

#[test]
fn test_check_rejects_malformed_repository() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repository.toml");
    fs::write(&repo, "[[resource]]\nversion = \"1.0\"\n").unwrap();

    bundlewire_cmd()
        .arg("--repo")
        .arg(&repo)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Repository error"));
}

#[test]
fn test_check_rejects_bad_config() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    fs::write(&config, "[resolver]\nmax-permutations = \"lots\"\n").unwrap();

    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("simple.toml"))
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_verbose_logs_raised_conflicts() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("backtrack.toml"))
        .args(["--verbose", "check"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Uses constraint violation"));
}
