// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Wire payload shapes, one per channel. Field names follow the IPC
//! contract; the connect payload lives with the validator as
//! [`crate::validator::ConnectionRequest`].

use serde::Deserialize;

use crate::session::ListOptions;

fn default_path() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePayload {
    pub connection_id: u64,
    pub command: String,
    /// Optional per-command deadline, `1..=3600` seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryPayload {
    pub connection_id: u64,
    #[serde(default = "default_path")]
    pub remote_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecursivePayload {
    pub connection_id: u64,
    #[serde(default = "default_path")]
    pub root: String,
    #[serde(flatten)]
    pub opts: ListOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    pub connection_id: u64,
    pub remote_path: String,
    pub local_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub connection_id: u64,
    pub local_path: String,
    pub remote_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePathPayload {
    pub connection_id: u64,
    pub remote_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    pub connection_id: u64,
    pub from_path: String,
    pub to_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectPayload {
    pub connection_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTransferPayload {
    pub transfer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryAppendPayload {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct HistorySavePayload {
    pub commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsWritePayload {
    pub text: String,
    pub directory: String,
}

#[derive(Debug, Deserialize)]
pub struct DialogOpenPayload {
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}
