//! CLI contract: `replay` and `config` print a JSON envelope on stdout and
//! map failures to the error's exit code.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn mirror_in(dir: &TempDir) -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("mirror"));
    command
        .current_dir(dir.path())
        .env_remove("LODESTAR_MIRROR_URL")
        .env("RUST_LOG", "warn");
    command
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

const RECORDING: &str = r#"{"type":"connected","clientId":"WS1"}
{"type":"snapshot","highestEventId":0,"agents":[{"id":"A1","status":"online"}],"tasks":[{"id":"T1","title":"Parser","status":"ready","priority":1},{"id":"T2","title":"Lexer","status":"ready","priority":2}],"leases":[]}
{"type":"event","data":{"id":1,"createdAt":"2025-02-01T10:00:00Z","type":"task.claimed","taskId":"T1","actorAgentId":"A1","payload":{"ttlSeconds":900}}}
{"type":"event","data":{"id":2,"createdAt":"2025-02-01T10:01:00Z","type":"message.sent","actorAgentId":"A1","targetAgentId":"A2","payload":{"body":"taking T1"}}}

this line is not json
{"type":"event","data":{"id":5,"createdAt":"2025-02-01T10:02:00Z","type":"task.done","taskId":"T2"}}
"#;

#[test]
fn given_recording_when_replayed_then_status_and_resync_are_reported() {
    let dir = TempDir::new().unwrap();
    let mut recording = NamedTempFile::new_in(dir.path()).unwrap();
    recording.write_all(RECORDING.as_bytes()).unwrap();

    let assert = mirror_in(&dir)
        .args(["replay", "--at", "2025-02-01T10:05:00Z", "--limit", "5"])
        .arg(recording.path())
        .assert()
        .success();
    let json = stdout_json(assert.get_output());

    assert_eq!(json["ok"], true);
    let data = &json["d"];
    assert_eq!(data["lastAppliedEventId"], 2);
    assert_eq!(data["awaitingSnapshot"], true);
    assert_eq!(data["resyncRequests"].as_array().map(Vec::len), Some(1));
    assert_eq!(data["repoStatus"]["tasksByStatus"]["inProgress"], 1);
    assert_eq!(data["repoStatus"]["tasksByStatus"]["ready"], 1);
    assert_eq!(data["leases"][0]["taskId"], "T1");
    assert_eq!(data["leases"][0]["expiry"], "warning");
    assert_eq!(data["leases"][0]["remainingSeconds"], 600);
    assert_eq!(data["messages"][0]["body"], "taking T1");
    assert_eq!(data["recentEvents"][0]["type"], "message.sent");
    assert_eq!(data["ingestStats"]["malformed"], 1);
    assert_eq!(data["ingestStats"]["gaps"], 1);
}

#[test]
fn given_missing_recording_when_replayed_then_exits_with_io_code() {
    let dir = TempDir::new().unwrap();
    mirror_in(&dir)
        .args(["replay", "does-not-exist.jsonl"])
        .assert()
        .failure()
        .code(7)
        .stdout(contains("\"ok\": false"));
}

#[test]
fn given_no_config_file_when_printing_config_then_defaults_are_shown() {
    let dir = TempDir::new().unwrap();
    let assert = mirror_in(&dir).arg("config").assert().success();
    let json = stdout_json(assert.get_output());

    assert_eq!(json["d"]["url"], "ws://127.0.0.1:8000/ws");
    assert_eq!(json["d"]["max_reconnect_attempts"], 10);
    assert_eq!(json["d"]["reconnect_multiplier"], 2.0);
}

#[test]
fn given_config_file_and_url_flag_when_printing_config_then_flag_wins() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("mirror.toml");
    std::fs::write(
        &config_path,
        "url = \"ws://from-file:9000/ws\"\nmax_reconnect_attempts = 4\n",
    )
    .unwrap();

    let assert = mirror_in(&dir)
        .arg("--config")
        .arg(&config_path)
        .args(["config", "--url", "wss://from-flag.example/ws"])
        .assert()
        .success();
    let json = stdout_json(assert.get_output());

    assert_eq!(json["d"]["url"], "wss://from-flag.example/ws");
    assert_eq!(json["d"]["max_reconnect_attempts"], 4);
}

#[test]
fn given_environment_url_when_printing_config_then_it_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let assert = mirror_in(&dir)
        .env("LODESTAR_MIRROR_URL", "ws://from-env:7000/ws")
        .arg("config")
        .assert()
        .success();
    assert_eq!(
        stdout_json(assert.get_output())["d"]["url"],
        "ws://from-env:7000/ws"
    );
}

#[test]
fn given_http_url_when_printing_config_then_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let assert = mirror_in(&dir)
        .args(["config", "--url", "http://not-a-socket"])
        .assert()
        .failure()
        .code(2);
    let json = stdout_json(assert.get_output());
    assert_eq!(json["err"]["code"], "INVALID");
}
