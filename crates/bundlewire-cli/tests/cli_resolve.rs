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
fn test_resolve_simple_repository() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("simple.toml"))
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Resolved 2 resource(s) in 1 permutation(s)",
        ))
        .stdout(predicate::str::contains("org.example.app/1.0.0"))
        .stdout(predicate::str::contains(
            "  import org.example.api -> org.example.lib/1.2.0",
        ))
        .stdout(predicate::str::contains("Uses conflicts").not());
}

#[test]
fn test_resolve_reports_recovered_conflicts() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("backtrack.toml"))
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains("in 2 permutation(s)"))
        .stdout(predicate::str::contains(
            "  import org.example.api -> api-v1/1.0.0",
        ))
        .stdout(predicate::str::contains("Uses conflicts (1):"))
        .stdout(predicate::str::contains(
            "[import uses] package 'org.example.log'",
        ));
}

#[test]
fn test_resolve_json_output() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("backtrack.toml"))
        .args(["resolve", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"attempts\": 2"))
        .stdout(predicate::str::contains("\"kind\": \"import-uses\""))
        .stdout(predicate::str::contains("\"provider\": \"api-v1/1.0.0\""));
}

#[test]
fn test_resolve_missing_requirement_fails() {
    bundlewire_cmd()
        .arg("--repo")
        .arg(fixture("missing.toml"))
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to resolve app"));
}

#[test]
fn test_resolve_finds_repository_in_parent_directory() {
    let tmp = TempDir::new().unwrap();
    fs::copy(fixture("simple.toml"), tmp.path().join("repository.toml")).unwrap();
    let nested = tmp.path().join("nested").join("deeper");
    fs::create_dir_all(&nested).unwrap();

    bundlewire_cmd()
        .current_dir(&nested)
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains("org.example.lib/1.2.0"));
}

#[test]
fn test_resolve_without_repository_fails() {
    let tmp = TempDir::new().unwrap();

    bundlewire_cmd()
        .current_dir(tmp.path())
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not find repository.toml"));
}
