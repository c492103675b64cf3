// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::sync::Arc;

use anyhow::Result;
use quantumxfer::{
    keys::KeyManager,
    logger::{Level, Logger, LoggerOptions},
    router::{NoDialog, Request, Router},
    session::SessionManager,
    store::Store,
};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

fn test_router() -> Result<(Router, TempDir)> {
    let dir = tempdir()?;
    let (sessions, _progress_rx) = SessionManager::new();
    let store = Arc::new(Store::open(dir.path()));
    let keys = KeyManager::new(dir.path());
    let logger = Logger::new(
        dir.path().join("logs"),
        LoggerOptions {
            level: Level::Debug,
            ..LoggerOptions::default()
        },
    );
    let router = Router::new(sessions, store, keys, logger, Arc::new(NoDialog));
    Ok((router, dir))
}

fn request(channel: &str, id: &str, payload: Value) -> Request {
    serde_json::from_value(json!({
        "channel": channel,
        "id": id,
        "payload": payload,
    }))
    .expect("request deserializes")
}

#[tokio::test]
async fn invalid_host_is_rejected_before_any_handler() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-connect",
            "1",
            json!({
                "host": "invalid..host",
                "port": 22,
                "username": "ubuntu",
                "authType": "password",
                "password": "x",
            }),
        ))
        .await;

    assert_eq!(response["id"], "1");
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "VALIDATION_ERROR");
    let details = response["details"].as_array().expect("details present");
    assert_eq!(details[0]["field"], "host");
    assert_eq!(details[0]["code"], "INVALID_HOST");
    Ok(())
}

#[tokio::test]
async fn disconnect_of_unknown_id_is_no_connection() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-disconnect",
            "7",
            json!({ "connectionId": 99999 }),
        ))
        .await;

    assert_eq!(response["id"], "7");
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "NO_CONNECTION");
    Ok(())
}

#[tokio::test]
async fn metacharacter_commands_never_reach_the_pool() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-execute-command",
            "2",
            json!({ "connectionId": 1, "command": "ls; rm -rf /" }),
        ))
        .await;

    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "VALIDATION_ERROR");
    let details = response["details"].as_array().expect("details present");
    assert_eq!(details[0]["code"], "SHELL_METACHAR");
    Ok(())
}

#[tokio::test]
async fn valid_command_against_unknown_connection_is_no_connection() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-execute-command",
            "3",
            json!({ "connectionId": 42, "command": "ls -la" }),
        ))
        .await;

    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "NO_CONNECTION");
    Ok(())
}

#[tokio::test]
async fn command_timeout_is_range_checked() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-execute-command",
            "4",
            json!({ "connectionId": 1, "command": "ls", "timeoutSeconds": 0 }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");

    let response = router
        .dispatch(request(
            "ssh-execute-command",
            "5",
            json!({ "connectionId": 1, "command": "ls", "timeoutSeconds": 3601 }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn unknown_channel_is_a_validation_error() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request("ssh-make-coffee", "9", json!({})))
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn malformed_payload_is_a_validation_error() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-execute-command",
            "10",
            json!({ "connectionId": "not-a-number" }),
        ))
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn download_paths_are_validated_up_front() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-download-file",
            "11",
            json!({
                "connectionId": 1,
                "remotePath": "/etc/shadow",
                "localPath": "/tmp/loot",
            }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");
    assert_eq!(response["details"][0]["code"], "FORBIDDEN_PATH");

    let response = router
        .dispatch(request(
            "ssh-upload-file",
            "12",
            json!({
                "connectionId": 1,
                "localPath": "../secrets.txt",
                "remotePath": "/home/user/ok.txt",
            }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");
    assert_eq!(response["details"][0]["code"], "PATH_TRAVERSAL");
    Ok(())
}

#[tokio::test]
async fn file_management_channels_validate_remote_paths() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-delete-item",
            "13",
            json!({ "connectionId": 1, "remotePath": "/etc/passwd" }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");
    assert_eq!(response["details"][0]["code"], "FORBIDDEN_PATH");

    let response = router
        .dispatch(request(
            "ssh-rename-item",
            "14",
            json!({
                "connectionId": 1,
                "fromPath": "/home/user/a.txt",
                "toPath": "/home/user/../../b.txt",
            }),
        ))
        .await;
    assert_eq!(response["code"], "VALIDATION_ERROR");
    assert_eq!(response["details"][0]["code"], "PATH_TRAVERSAL");

    // Valid paths against an unknown connection fall through to the pool.
    let response = router
        .dispatch(request(
            "ssh-create-directory",
            "15",
            json!({ "connectionId": 1, "remotePath": "/home/user/new-dir" }),
        ))
        .await;
    assert_eq!(response["code"], "NO_CONNECTION");
    Ok(())
}

#[tokio::test]
async fn profiles_round_trip_through_dispatch() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "profiles-save",
            "20",
            json!([{
                "id": "p1",
                "name": "staging",
                "host": "stage.example.com",
                "port": 2222,
                "username": "deploy",
                "lastUsed": "2025-06-01T12:00:00Z",
                "commandHistory": ["uptime"],
            }]),
        ))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["saved"], 1);

    let response = router.dispatch(request("profiles-load", "21", json!(null))).await;
    assert_eq!(response["success"], true);
    let profiles = response["profiles"].as_array().expect("profiles array");
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["name"], "staging");
    assert_eq!(profiles[0]["port"], 2222);
    Ok(())
}

#[tokio::test]
async fn history_channels_report_bounded_length() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "command-history-append",
            "30",
            json!({ "command": "df -h" }),
        ))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["length"], 1);

    let response = router
        .dispatch(request("command-history-load", "31", json!(null)))
        .await;
    assert_eq!(response["commands"][0], "df -h");

    let commands: Vec<String> = (0..600).map(|i| format!("c{i}")).collect();
    let response = router
        .dispatch(request(
            "command-history-save",
            "32",
            json!({ "commands": commands }),
        ))
        .await;
    assert_eq!(response["length"], 500);
    Ok(())
}

#[tokio::test]
async fn keys_generate_and_list_through_dispatch() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "keys-generate",
            "40",
            json!({ "name": "ci", "type": "ed25519" }),
        ))
        .await;
    assert_eq!(response["success"], true);
    let fingerprint = response["key"]["fingerprint"]
        .as_str()
        .expect("fingerprint present");
    assert!(fingerprint.starts_with("SHA256:"));

    let response = router.dispatch(request("keys-list", "41", json!(null))).await;
    assert_eq!(response["success"], true);
    assert_eq!(response["keys"][0]["name"], "ci");
    Ok(())
}

#[tokio::test]
async fn logs_write_appends_to_a_dated_file() -> Result<()> {
    let (router, dir) = test_router()?;
    let target = dir.path().join("session-logs");

    let response = router
        .dispatch(request(
            "logs-write",
            "50",
            json!({
                "text": "[10:00:00] ~> uptime\nup 3 days",
                "directory": target.display().to_string(),
            }),
        ))
        .await;
    assert_eq!(response["success"], true);

    let path = response["path"].as_str().expect("path present");
    let contents = std::fs::read_to_string(path)?;
    assert!(contents.contains("up 3 days"));
    Ok(())
}

#[tokio::test]
async fn dialog_open_without_a_host_picker_cancels() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "dialog-open",
            "60",
            json!({ "properties": ["openDirectory"], "title": "Choose logs dir" }),
        ))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["canceled"], true);
    Ok(())
}

#[tokio::test]
async fn cancel_of_unknown_transfer_reports_false() -> Result<()> {
    let (router, _dir) = test_router()?;

    let response = router
        .dispatch(request(
            "ssh-cancel-transfer",
            "70",
            json!({ "transferId": "t-404" }),
        ))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["cancelled"], false);
    Ok(())
}
