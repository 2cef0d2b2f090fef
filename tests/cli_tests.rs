// CLI tests: drive the review-flow binary against a throwaway file store

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn review_flow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("review-flow").unwrap();
    cmd.current_dir(dir.path())
        .env("REVIEW_FLOW__STORAGE__BACKEND", "file")
        .env("REVIEW_FLOW__STORAGE__PATH", dir.path().join("store"))
        .env("RUST_LOG", "warn");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_table_lists_every_kind() {
    let dir = TempDir::new().unwrap();
    review_flow(&dir)
        .arg("table")
        .assert()
        .success()
        .stdout(predicate::str::contains("submission_list"))
        .stdout(predicate::str::contains("PENDING_REVIEW"))
        .stdout(predicate::str::contains("markPaid"));
}

#[test]
fn test_invoice_lifecycle_through_the_cli() {
    let dir = TempDir::new().unwrap();

    let created = json_stdout(review_flow(&dir).args([
        "create",
        "--kind",
        "invoice",
        "--owner",
        "creator-1",
        "--counterparty",
        "agency",
        "--line",
        r#"{"reference_id":"campaign-7","details":{"type":"financial","price":"1000.00"}}"#,
    ]));
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["state"], "DRAFT");
    assert_eq!(created["version"], 1);
    assert_eq!(created["line_items"][0]["details"]["total"], "1070.00");

    let sent = json_stdout(review_flow(&dir).args([
        "transition", id.as_str(), "send", "--version", "1", "--actor", "creator-1",
    ]));
    assert_eq!(sent["state"], "SENT");
    assert_eq!(sent["version"], 2);

    // Outdated version is refused and nothing changes
    review_flow(&dir)
        .args([
            "transition", id.as_str(), "approve", "--version", "1", "--actor", "agency", "--role", "counterparty",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stale version"));

    // Without --version the current one is read for us
    let verified = json_stdout(review_flow(&dir).args([
        "transition", id.as_str(), "approve", "--actor", "agency", "--role", "counterparty", "--note", "checked",
    ]));
    assert_eq!(verified["state"], "VERIFIED");
    assert_eq!(verified["version"], 3);

    let comments = json_stdout(review_flow(&dir).args(["comments", id.as_str()]));
    assert_eq!(comments.as_array().unwrap().len(), 1);
    assert_eq!(comments[0]["body"], "checked");
}

#[test]
fn test_wrong_role_is_forbidden() {
    let dir = TempDir::new().unwrap();
    let created = json_stdout(review_flow(&dir).args([
        "create",
        "--kind",
        "quotation",
        "--owner",
        "brand-1",
        "--counterparty",
        "staff-1",
    ]));
    let id = created["id"].as_str().unwrap().to_string();

    review_flow(&dir)
        .args(["transition", id.as_str(), "start-work", "--version", "1", "--actor", "brand-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Forbidden"));
}
