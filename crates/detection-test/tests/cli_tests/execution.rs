//! Execution tests against a mock execution service.

use super::{detection_test, fixtures_dir};
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const RULE_PATH: &str = "/v1/detections/rules/test";
const POLICY_PATH: &str = "/v1/detections/policies/test";

fn rule_fixture() -> std::path::PathBuf {
    fixtures_dir().join("console-login.detection.yaml")
}

fn policy_fixture() -> std::path::PathBuf {
    fixtures_dir().join("policies/bucket-encryption.detection.yml")
}

fn passing_rule_results() -> Value {
    json!({
        "results": [
            {
                "id": "0",
                "name": "Root login",
                "passed": true,
                "error": null,
                "functions": {
                    "ruleFunction": { "output": "true", "error": null },
                    "titleFunction": { "output": "Root login from 1.2.3.4", "error": null }
                }
            },
            {
                "id": "1",
                "name": "IAM user login",
                "passed": true,
                "error": null,
                "functions": {
                    "ruleFunction": { "output": "false", "error": null }
                }
            }
        ]
    })
}

#[test]
fn test_rule_run_passes() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(RULE_PATH)
            .json_body_includes(r#"{"logTypes": ["AWS.CloudTrail"]}"#);
        then.status(200).json_body(passing_rule_results());
    });

    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("running 2 tests for root-console-login (rule)"))
        .stdout(predicate::str::contains("test Root login ... ok"))
        .stdout(predicate::str::contains("test IAM user login ... ok"))
        .stdout(predicate::str::contains("2 passed; 0 failed; 0 errored"));

    mock.assert();
}

#[test]
fn test_rule_failure_shows_required_error_and_rows() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(200).json_body(json!({
            "results": [{
                "id": "0",
                "name": "Root login",
                "passed": false,
                "error": { "message": "generic failure" },
                "functions": {
                    "ruleFunction": { "output": null, "error": { "message": "KeyError: 'userIdentity'" } },
                    "titleFunction": { "output": "Root login", "error": null },
                    "dedupFunction": { "output": null, "error": { "message": "dedup exploded" } }
                }
            }]
        }));
    });

    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("test Root login ... FAILED"))
        .stdout(predicate::str::contains("error: KeyError: 'userIdentity'"))
        .stdout(predicate::str::contains("generic failure").not())
        .stdout(predicate::str::contains("Alert Title: Root login"))
        .stdout(predicate::str::contains("Dedup String: dedup exploded"))
        .stdout(predicate::str::contains("0 passed; 1 failed; 1 errored"));
}

#[test]
fn test_policy_run_uses_policy_endpoint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(POLICY_PATH)
            .json_body_includes(r#"{"resourceTypes": ["AWS.S3.Bucket"]}"#);
        then.status(200).json_body(json!({
            "results": [{
                "id": "0",
                "name": "Encrypted bucket",
                "passed": true,
                "error": null,
                "functions": { "policyFunction": { "output": "true", "error": null } }
            }]
        }));
    });

    detection_test()
        .arg(policy_fixture())
        .args(["--endpoint", &server.base_url(), "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "running 1 tests for bucket-encryption (policy)",
        ))
        .stdout(predicate::str::contains("test Encrypted bucket ... ok"));

    mock.assert();
}

#[test]
fn test_api_token_sent_as_bearer() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(POLICY_PATH)
            .header("authorization", "Bearer s3cret");
        then.status(200).json_body(json!({ "results": [] }));
    });

    detection_test()
        .arg(policy_fixture())
        .args(["--endpoint", &server.base_url()])
        .env("DETECTION_TEST_API_TOKEN", "s3cret")
        .assert()
        .success();

    mock.assert();
}

#[test]
fn test_service_error_exits_with_execution_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(502).body("bad gateway");
    });

    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains(
            "Internal error during testing: execution service returned status 502",
        ));
}

#[test]
fn test_unreachable_service_exits_with_execution_error() {
    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", "http://127.0.0.1:9", "--timeout", "2000"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Internal error during testing"));
}

#[test]
fn test_json_output() -> TestResult {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(200).json_body(passing_rule_results());
    });

    let output = detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url(), "--format", "json"])
        .output()?;

    assert_eq!(output.status.code(), Some(0));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    let detection = &report["detections"][0];
    assert_eq!(detection["detection"], "root-console-login");
    assert_eq!(detection["kind"], "rule");
    assert_eq!(detection["summary"]["passed"], 2);
    assert_eq!(detection["tests"][0]["badge"], "PASS");
    assert_eq!(detection["tests"][0]["rows"][0]["label"], "Alert Title");
    assert!(detection["error"].is_null());
    assert!(report["timestamp"].is_string());
    Ok(())
}

#[test]
fn test_json_output_reports_banner() -> TestResult {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(200).body("not json");
    });

    let output = detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url(), "--format", "json"])
        .output()?;

    assert_eq!(output.status.code(), Some(3));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    let detection = &report["detections"][0];
    assert_eq!(detection["tests"].as_array().map(Vec::len), Some(0));
    let banner = detection["error"].as_str().unwrap_or_default();
    assert!(banner.starts_with("Internal error during testing: malformed response"));
    Ok(())
}

#[test]
fn test_error_envelope_is_not_a_clean_pass() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(200)
            .json_body(json!({ "data": null, "errors": [{ "message": "boom" }] }));
    });

    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains(
            "Internal error during testing: malformed response from execution service",
        ))
        .stdout(predicate::str::contains("0 passed; 0 failed").not());
}

#[test]
fn test_filter_sends_matching_tests_only() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(RULE_PATH)
            .body_includes(r#""name":"IAM user login""#)
            .body_excludes(r#""name":"Root login""#);
        then.status(200).json_body(json!({
            "results": [{
                "id": "1",
                "name": "IAM user login",
                "passed": true,
                "error": null,
                "functions": { "ruleFunction": { "output": "false", "error": null } }
            }]
        }));
    });

    detection_test()
        .arg(rule_fixture())
        .args(["--endpoint", &server.base_url(), "--filter", "IAM"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running 1 tests"))
        .stdout(predicate::str::contains("test Root login").not());

    mock.assert();
}

#[test]
fn test_directory_runs_every_detection() {
    let server = MockServer::start();
    let rules = server.mock(|when, then| {
        when.method(POST).path(RULE_PATH);
        then.status(200).json_body(passing_rule_results());
    });
    let policies = server.mock(|when, then| {
        when.method(POST).path(POLICY_PATH);
        then.status(200).json_body(json!({
            "results": [{
                "id": "0",
                "name": "Encrypted bucket",
                "passed": false,
                "error": null,
                "functions": { "policyFunction": { "output": "false", "error": null } }
            }]
        }));
    });

    detection_test()
        .arg(fixtures_dir())
        .args(["--endpoint", &server.base_url()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Running tests for 2 detection(s)"))
        .stdout(predicate::str::contains("root-console-login: 2/2 passed"))
        .stdout(predicate::str::contains("bucket-encryption: 0/1 passed"));

    rules.assert();
    policies.assert();
}
