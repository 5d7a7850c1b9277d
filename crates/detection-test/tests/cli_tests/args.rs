//! CLI argument tests (no execution service required).

use super::{detection_test, fixtures_dir};
use predicates::prelude::*;

#[test]
fn test_arg_help() {
    detection_test()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Test runner for detection rules and policies",
        ));
}

#[test]
fn test_arg_version() {
    detection_test()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("detection-test"));
}

#[test]
fn test_arg_invalid_format() {
    detection_test()
        .arg(fixtures_dir())
        .args(["--format", "csv"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_arg_invalid_endpoint() {
    detection_test()
        .arg(fixtures_dir().join("console-login.detection.yaml"))
        .args(["--endpoint", "ftp://detections.internal"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("endpoint must be an http(s) URL"));
}

#[test]
fn test_arg_zero_timeout() {
    detection_test()
        .arg(fixtures_dir().join("console-login.detection.yaml"))
        .args(["--timeout", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timeout must be greater than zero"));
}

#[test]
fn test_arg_non_numeric_timeout() {
    detection_test()
        .arg(fixtures_dir())
        .args(["--timeout", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
