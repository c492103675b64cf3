// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Live SSH session management: the connection pool, one actor per
//! transport, SFTP listings, and streaming transfers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod connection;
pub mod pool;
pub mod sftp;
pub mod transfer;

pub use pool::{ConnectInfo, SessionManager, TransferSummary};
pub use transfer::{
    ProgressEvent, ProgressFn, TransferDescriptor, TransferKind, TransferState,
};

/// Lifecycle of one connection. `Closed` is absorbing; operations against a
/// closed connection answer `NO_CONNECTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closing,
    Closed,
}

/// Redaction-safe connection summary returned to the front-end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub host: String,
    pub username: String,
    pub port: u16,
}

/// Outcome of one non-interactive command. A non-zero exit with empty
/// output is still a transport-level success; callers interpret `exit_code`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One SFTP directory entry, normalized for the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    pub permissions: String,
    pub absolute_path: String,
}

/// Caps for the recursive listing. Absent fields mean unbounded.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveListing {
    pub entries: Vec<RemoteEntry>,
    pub total_files: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;
const S_IFDIR: u32 = 0o040000;

/// `rwxrwxrwx` rendering of the low nine mode bits.
pub fn permissions_string(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Entry kind from the stat mode, with a directory hint for servers that
/// omit the type bits.
pub fn kind_from_mode(mode: u32, is_dir_hint: bool) -> EntryKind {
    match mode & S_IFMT {
        S_IFLNK => EntryKind::Symlink,
        S_IFDIR => EntryKind::Directory,
        0 if is_dir_hint => EntryKind::Directory,
        _ => EntryKind::File,
    }
}
