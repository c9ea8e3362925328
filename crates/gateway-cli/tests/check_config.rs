#![allow(deprecated)] // cargo_bin is deprecated but still supported by assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn sample_yaml(db_path: &str, allowed_path: &str) -> String {
    format!(
        r#"
actor: ci-agent
policy:
  default_deny: true
  allow_tools: [fs.readFile]
  global_timeout_ms: 5000
  global_max_bytes: 1000000
filesystem:
  allowed_paths: ["{allowed_path}"]
  max_file_size: 1048576
http:
  allowed_domains: ["*.example.com"]
  max_response_bytes: 1048576
  timeout_ms: 5000
database:
  path: "{db_path}"
  max_rows: 100
  query_timeout_ms: 2000
"#
    )
}

#[test]
fn check_config_accepts_a_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    rusqlite::Connection::open(&db_path).unwrap();
    let config_path = dir.path().join("gateway.yaml");
    fs::write(
        &config_path,
        sample_yaml(db_path.to_str().unwrap(), dir.path().to_str().unwrap()),
    )
    .unwrap();

    Command::cargo_bin("gateway")
        .unwrap()
        .arg("check-config")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("config ok"));
}

#[test]
fn check_config_rejects_a_missing_file() {
    Command::cargo_bin("gateway")
        .unwrap()
        .arg("check-config")
        .arg("--config")
        .arg("/nonexistent/gateway.yaml")
        .assert()
        .failure();
}
