//! Command-line behaviour that needs no object storage.

use assert_cmd::Command;
use predicates::prelude::*;

fn etl() -> Command {
    let mut cmd = Command::cargo_bin("etl").unwrap();
    cmd.env("AWS_EC2_METADATA_DISABLED", "true")
        .env("AWS_ACCESS_KEY_ID", "test")
        .env("AWS_SECRET_ACCESS_KEY", "test")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn missing_source_file_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    etl()
        .args(["run", "--source-path"])
        .arg(dir.path().join("alumnos.csv"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Source not found"));
}

#[test]
fn empty_bucket_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    etl()
        .args(["run", "--bucket", "", "--source-path"])
        .arg(dir.path().join("alumnos.csv"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn remote_conflicts_with_source_path() {
    etl()
        .args(["run", "--remote", "--source-path", "x.csv"])
        .assert()
        .failure();
}

#[test]
fn help_lists_subcommands() {
    etl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("invoke")));
}
