use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// A command with a clean environment, a private HOME and fast retries.
fn transport_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("qcflow-transport"));
    cmd.env_clear()
        .env("HOME", home)
        .env("QCFLOW_HTTP_REQUEST_MAX_RETRIES", "2")
        .env("QCFLOW_HTTP_REQUEST_BACKOFF_FACTOR", "0")
        .env("QCFLOW_HTTP_REQUEST_BACKOFF_JITTER", "0");
    cmd
}

#[test]
fn test_call_get_prints_body() {
    let mut server = Server::new();
    let home = tempdir().unwrap();

    let mock = server
        .mock("GET", "/api/2.0/qcflow/experiments/search")
        .match_query(Matcher::UrlEncoded("max_results".into(), "5".into()))
        .match_header("authorization", "Bearer secret-token")
        .with_status(200)
        .with_body(r#"{"experiments":[{"experiment_id":"0","name":"Default"}]}"#)
        .create();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", server.url())
        .env("QCFLOW_TRACKING_TOKEN", "secret-token")
        .args([
            "call",
            "GET",
            "/api/2.0/qcflow/experiments/search",
            "--data",
            r#"{"max_results":5}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"Default""#));

    mock.assert();
}

#[test]
fn test_call_retries_transient_failures() {
    let mut server = Server::new();
    let home = tempdir().unwrap();

    let unavailable = server
        .mock("POST", "/api/2.0/qcflow/runs/create")
        .with_status(503)
        .expect(2)
        .create();
    let ok = server
        .mock("POST", "/api/2.0/qcflow/runs/create")
        .match_body(Matcher::JsonString(r#"{"experiment_id":"1"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"run":{"info":{"run_id":"abc"}}}"#)
        .create();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", server.url())
        .args([
            "call",
            "POST",
            "/api/2.0/qcflow/runs/create",
            "-d",
            r#"{"experiment_id":"1"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc"));

    unavailable.assert();
    ok.assert();
}

#[test]
fn test_call_gives_up_after_max_retries() {
    let mut server = Server::new();
    let home = tempdir().unwrap();

    let mock = server
        .mock("GET", "/api/2.0/qcflow/runs/get")
        .with_status(429)
        .expect(3)
        .create();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", server.url())
        .args(["call", "GET", "/api/2.0/qcflow/runs/get"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("429"))
        .stderr(predicate::str::contains("gave up after 3 attempts"));

    mock.assert();
}

#[test]
fn test_call_does_not_retry_client_errors() {
    let mut server = Server::new();
    let home = tempdir().unwrap();

    let mock = server
        .mock("GET", "/api/2.0/qcflow/runs/get")
        .with_status(404)
        .with_body(r#"{"error_code":"RESOURCE_DOES_NOT_EXIST"}"#)
        .expect(1)
        .create();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", server.url())
        .args(["call", "GET", "/api/2.0/qcflow/runs/get"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"))
        .stderr(predicate::str::contains("RESOURCE_DOES_NOT_EXIST"));

    mock.assert();
}

#[test]
fn test_call_host_flag_overrides_environment() {
    let mut server = Server::new();
    let home = tempdir().unwrap();

    let mock = server
        .mock("GET", "/health")
        .match_header("authorization", "Bearer flag-token")
        .with_status(200)
        .with_body("OK")
        .create();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", "http://127.0.0.1:1")
        .env("QCFLOW_TRACKING_TOKEN", "env-token")
        .args([
            "--host",
            &server.url(),
            "--token",
            "flag-token",
            "call",
            "GET",
            "/health",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    mock.assert();
}

#[test]
fn test_env_prints_artifact_cli_variables() {
    let home = tempdir().unwrap();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", "https://tracking.example.com/")
        .env("QCFLOW_TRACKING_TOKEN", "secret-token")
        .env("QCFLOW_TRACKING_INSECURE_TLS", "true")
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "DATABRICKS_HOST=https://tracking.example.com\n",
        ))
        .stdout(predicate::str::contains("DATABRICKS_TOKEN=secret-token"))
        .stdout(predicate::str::contains("DATABRICKS_INSECURE=true"))
        .stdout(predicate::str::contains("DATABRICKS_USERNAME").not());
}

#[test]
fn test_env_reads_credentials_file() {
    let home = tempdir().unwrap();
    let qcflow_dir = home.path().join(".qcflow");
    fs::create_dir_all(&qcflow_dir).unwrap();
    fs::write(
        qcflow_dir.join("credentials"),
        "[qcflow]\nqcflow_tracking_username = alice\nqcflow_tracking_password = s3cret\n",
    )
    .unwrap();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", "http://localhost:5000")
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("DATABRICKS_USERNAME=alice"))
        .stdout(predicate::str::contains("DATABRICKS_PASSWORD=s3cret"))
        .stdout(predicate::str::contains("DATABRICKS_INSECURE").not());
}

#[test]
fn test_env_without_credentials_fails() {
    let home = tempdir().unwrap();

    transport_cmd(home.path())
        .arg("env")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No usable tracking credentials"));
}

#[test]
fn test_invalid_retry_setting_is_reported() {
    let home = tempdir().unwrap();

    transport_cmd(home.path())
        .env("QCFLOW_TRACKING_URI", "http://localhost:5000")
        .env("QCFLOW_HTTP_REQUEST_MAX_RETRIES", "lots")
        .args(["call", "GET", "/health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("QCFLOW_HTTP_REQUEST_MAX_RETRIES"));
}
