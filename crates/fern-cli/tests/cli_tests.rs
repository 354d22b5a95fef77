//! Integration tests for the `fern` CLI binary.
//!
//! These tests run the CLI as a subprocess against a temporary data
//! directory, checking exit codes, JSON on stdout, and state carried between
//! invocations by the on-disk store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

const KEY_CONFIG: &str = "region: eu-west-1
kms:
  - id: cli-key
    alias: fern
    key: AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=
";

/// Helper: locate the `fern` binary built by `cargo test`.
fn fern_bin() -> String {
    let path = env!("CARGO_BIN_EXE_fern");
    assert!(Path::new(path).exists(), "fern binary not found at {path}");
    path.to_owned()
}

/// Helper: run fern inside `dir` and return (`exit_code`, stdout, stderr).
fn run_in(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(fern_bin())
        .args(args)
        .current_dir(dir)
        .env("FERN_DATA_PATH", dir.join("data"))
        .env("FERN_LOG_LEVEL", "warn")
        .env_remove("FERN_CONFIG")
        .env_remove("FERN_STORAGE")
        .env_remove("FERN_USER")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute fern");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

/// Helper: run a command that must succeed and parse its JSON output.
fn json_in(dir: &Path, args: &[&str]) -> Value {
    let (code, stdout, stderr) = run_in(dir, args);
    assert_eq!(code, 0, "fern {args:?} failed: {stderr}");
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON from {args:?}: {e}\n{stdout}"))
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_in(dir.path(), &["--version"]);
    assert_eq!(code, 0, "fern --version should exit 0");
    assert!(stdout.contains("fern"), "version output should contain 'fern': {stdout}");
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_in(dir.path(), &["--help"]);
    assert_eq!(code, 0);
    for sub in ["zone", "change", "param", "dump-keys"] {
        assert!(stdout.contains(sub), "help should list '{sub}': {stdout}");
    }
}

#[test]
fn test_unknown_storage_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_in(dir.path(), &["--storage", "floppy", "zone", "count"]);
    assert_eq!(code, 2, "clap usage errors exit 2: {stderr}");
}

// ── Hosted zones ─────────────────────────────────────────────────────

#[test]
fn test_zone_state_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();

    let created = json_in(dir, &["zone", "create", "example.com", "--comment", "test zone"]);
    let id = created["HostedZone"]["Id"].as_str().unwrap().to_owned();
    assert!(id.starts_with("/hostedzone/Z"), "unexpected id {id}");
    assert_eq!(created["HostedZone"]["Name"], "example.com.");
    assert_eq!(created["ChangeInfo"]["Status"], "INSYNC");

    assert_eq!(json_in(dir, &["zone", "count"])["HostedZoneCount"], 1);
    let listed = json_in(dir, &["zone", "list"]);
    assert_eq!(listed["HostedZones"][0]["Id"], id.as_str());
    assert_eq!(listed["IsTruncated"], false);

    let batch = dir.join("batch.json");
    fs::write(
        &batch,
        r#"{"Changes":[{"Action":"UPSERT","ResourceRecordSet":
            {"Name":"www","Type":"A","TTL":60,"ResourceRecords":[{"Value":"192.0.2.1"}]}}]}"#,
    )
    .unwrap();
    let change = json_in(dir, &["zone", "change", &id, "--batch", batch.to_str().unwrap()]);
    let change_id = change["ChangeInfo"]["Id"].as_str().unwrap().to_owned();
    assert_eq!(json_in(dir, &["change", "get", &change_id])["ChangeInfo"]["Id"], change_id.as_str());

    let records = json_in(dir, &["zone", "records", &id]);
    let names: Vec<_> = records["ResourceRecordSets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["Name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, vec!["example.com.", "example.com.", "www.example.com."]);

    let (code, _, stderr) = run_in(dir, &["zone", "delete", &id]);
    assert_eq!(code, 1);
    assert!(stderr.contains("HostedZoneNotEmpty"), "stderr: {stderr}");
}

#[test]
fn test_zone_tags_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let created = json_in(dir, &["zone", "create", "tags.test"]);
    let id = created["HostedZone"]["Id"].as_str().unwrap().to_owned();

    let (code, _, stderr) = run_in(dir, &["zone", "tag", &id, "--add", "team=dns", "--add", "env=ci"]);
    assert_eq!(code, 0, "{stderr}");
    let (code, _, _) = run_in(dir, &["zone", "tag", &id, "--remove", "env"]);
    assert_eq!(code, 0);

    let tags = json_in(dir, &["zone", "tags", &id]);
    assert_eq!(tags["ResourceTagSet"]["ResourceType"], "hostedzone");
    assert_eq!(tags["ResourceTagSet"]["Tags"], serde_json::json!([{"Key": "team", "Value": "dns"}]));
}

#[test]
fn test_missing_zone_reports_error_code() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_in(dir.path(), &["zone", "get", "ZDOESNOTEXIST"]);
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("NoSuchHostedZone"), "stderr: {stderr}");
}

#[test]
fn test_dump_keys_lists_zone_keys() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let created = json_in(dir, &["zone", "create", "dump.test"]);
    let bare = created["HostedZone"]["Id"]
        .as_str()
        .unwrap()
        .trim_start_matches("/hostedzone/")
        .to_owned();

    let (code, stdout, _) = run_in(dir, &["dump-keys", "route53"]);
    assert_eq!(code, 0);
    let keys: Vec<&str> = stdout.lines().collect();
    assert!(keys.contains(&format!("/hostedzone/{bare}").as_str()), "keys: {keys:?}");
    assert!(keys.contains(&"/zonename/dump.test."), "keys: {keys:?}");
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);

    let (code, stdout, _) = run_in(dir, &["dump-keys", "ssm"]);
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
}

// ── Parameters ───────────────────────────────────────────────────────

#[test]
fn test_secure_parameter_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    fs::write(dir.join(".fern.yaml"), KEY_CONFIG).unwrap();

    let put = json_in(
        dir,
        &["param", "put", "/app/db/password", "s3cret", "--type", "secure-string", "--tag", "env=dev"],
    );
    assert_eq!(put["Version"], 1);

    let sealed = json_in(dir, &["param", "get", "/app/db/password"]);
    assert_ne!(sealed["Parameter"]["Value"], "s3cret");

    let opened = json_in(dir, &["param", "get", "/app/db/password", "--decrypt"]);
    assert_eq!(opened["Parameter"]["Value"], "s3cret");
    assert_eq!(opened["Parameter"]["Type"], "SecureString");
    assert_eq!(
        opened["Parameter"]["ARN"],
        "arn:aws:ssm:eu-west-1:000000000000:parameter/app/db/password"
    );

    let (code, _, stderr) = run_in(dir, &["param", "put", "/app/db/password", "again"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("ParameterAlreadyExists"), "stderr: {stderr}");

    let tags = json_in(dir, &["param", "tags", "/app/db/password"]);
    assert_eq!(tags["TagList"], serde_json::json!([{"Key": "env", "Value": "dev"}]));
}

#[test]
fn test_secure_parameter_without_keys_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_in(
        dir.path(),
        &["param", "put", "/s", "v", "--type", "secure-string"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("InvalidKeyId"), "stderr: {stderr}");
}

#[test]
fn test_parameters_by_path_and_batch_delete() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    for name in ["/svc/a", "/svc/b", "/svc/deep/c", "/other"] {
        json_in(dir, &["param", "put", name, "v"]);
    }

    let shallow = json_in(dir, &["param", "list-path", "/svc"]);
    assert_eq!(shallow["Parameters"].as_array().unwrap().len(), 2);
    let deep = json_in(dir, &["param", "list-path", "/svc", "--recursive"]);
    assert_eq!(deep["Parameters"].as_array().unwrap().len(), 3);

    let described = json_in(dir, &["param", "describe", "--filter", "Name:BeginsWith=/svc/d"]);
    assert_eq!(described["Parameters"][0]["Name"], "/svc/deep/c");

    let deleted = json_in(dir, &["param", "delete", "/svc/a", "/missing"]);
    assert_eq!(deleted["DeletedParameters"], serde_json::json!(["/svc/a"]));
    assert_eq!(deleted["InvalidParameters"], serde_json::json!(["/missing"]));

    let got = json_in(dir, &["param", "get", "/svc/a", "/svc/b"]);
    assert_eq!(got["InvalidParameters"], serde_json::json!(["/svc/a"]));
    assert_eq!(got["Parameters"][0]["Name"], "/svc/b");
}

#[test]
fn test_memory_storage_does_not_persist() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    json_in(dir, &["--storage", "memory", "param", "put", "/ephemeral", "v"]);
    let (code, _, stderr) = run_in(dir, &["--storage", "memory", "param", "get", "/ephemeral"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("ParameterNotFound"), "stderr: {stderr}");
    assert!(!dir.join("data").exists());
}
