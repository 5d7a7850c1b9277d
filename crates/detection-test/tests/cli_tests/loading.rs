//! Detection file loading errors (no execution service required).

use super::detection_test;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_missing_path() {
    detection_test()
        .arg("/nonexistent/rule.detection.yaml")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_empty_directory() -> TestResult {
    let dir = TempDir::new()?;
    detection_test()
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No detection files found"));
    Ok(())
}

#[test]
fn test_both_log_and_resource_types() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("mixed.detection.yaml");
    fs::write(
        &path,
        "body: 'def rule(e): return True'\nlog-types: [A]\nresource-types: [B]\n",
    )?;

    detection_test()
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exactly one of 'log-types' or 'resource-types'"));
    Ok(())
}

#[test]
fn test_invalid_resource_json() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("bad.detection.yaml");
    fs::write(
        &path,
        r"
body: 'def rule(e): return True'
log-types: [AWS.CloudTrail]
tests:
  - name: Broken event
    expected-result: true
    resource: '{not json'
",
    )?;

    detection_test()
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "resource for test \"Broken event\" is not valid json",
        ));
    Ok(())
}

#[test]
fn test_unknown_config_key() -> TestResult {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("detection-test.config.yaml"), "retries: 3\n")?;
    fs::write(
        dir.path().join("rule.detection.yaml"),
        "body: 'def rule(e): return True'\nlog-types: [AWS.CloudTrail]\n",
    )?;

    detection_test()
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("YAML parse error"));
    Ok(())
}
