// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Store, write_atomic};

/// Hard cap on the global command-history ring. Enforced at this boundary;
/// oldest entries are evicted first.
pub const HISTORY_CAP: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFile {
    commands: Vec<String>,
    updated_at: DateTime<Utc>,
}

async fn read_unlocked(path: &Path) -> Result<Vec<String>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context("failed to read command history"),
    };
    let file: HistoryFile =
        serde_json::from_slice(&raw).context("command history is not valid JSON")?;
    Ok(file.commands)
}

async fn write_unlocked(path: &Path, mut commands: Vec<String>) -> Result<usize> {
    if commands.len() > HISTORY_CAP {
        let excess = commands.len() - HISTORY_CAP;
        commands.drain(..excess);
    }
    let len = commands.len();
    let file = HistoryFile {
        commands,
        updated_at: Utc::now(),
    };
    let body = serde_json::to_vec(&file).context("failed to encode command history")?;
    write_atomic(path, &body).await?;
    Ok(len)
}

impl Store {
    /// Missing file loads as an empty history, never an error.
    pub async fn load_history(&self) -> Result<Vec<String>> {
        let _guard = self.history_lock.lock().await;
        read_unlocked(&self.history_path()).await
    }

    /// Appends one command under a single read-modify-write; duplicates
    /// within the window are preserved. Returns the post-append length,
    /// bounded by [`HISTORY_CAP`].
    pub async fn append_command(&self, command: &str) -> Result<usize> {
        let _guard = self.history_lock.lock().await;
        let path = self.history_path();
        let mut commands = read_unlocked(&path).await?;
        commands.push(command.to_string());
        write_unlocked(&path, commands).await
    }

    /// Replaces the ring wholesale (front-end bulk sync). The cap still
    /// applies; the newest entries win.
    pub async fn save_history(&self, commands: Vec<String>) -> Result<usize> {
        let _guard = self.history_lock.lock().await;
        write_unlocked(&self.history_path(), commands).await
    }
}
