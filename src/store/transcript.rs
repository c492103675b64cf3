// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// One executed command and its output, as recorded per live session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub output: String,
    pub directory: String,
}

impl TranscriptEntry {
    /// The on-disk text form: `[<localized timestamp>] <cwd>> <cmd>` followed
    /// by the output block.
    pub fn to_text(&self) -> String {
        let local = self.timestamp.with_timezone(&Local);
        format!(
            "[{}] {}> {}\n{}\n",
            local.format("%Y-%m-%d %H:%M:%S"),
            self.directory,
            self.command,
            self.output
        )
    }
}

/// Dated text file used by both transcript mirroring and the `logs-write`
/// channel.
pub fn dated_text_file(dir: &Path) -> PathBuf {
    dir.join(format!(
        "quantumxfer-{}.txt",
        Local::now().format("%Y-%m-%d")
    ))
}

/// Appends raw text to the dated file in `dir`, creating the directory as
/// needed. Returns the path written to.
pub async fn append_text_log(dir: &Path, text: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .context("failed to create logs directory")?;
    let path = dated_text_file(dir);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .context("failed to open transcript file")?;
    file.write_all(text.as_bytes())
        .await
        .context("failed to append transcript text")?;
    if !text.ends_with('\n') {
        file.write_all(b"\n")
            .await
            .context("failed to append transcript text")?;
    }
    file.flush().await.context("failed to flush transcript file")?;
    Ok(path)
}

/// Mirrors one transcript entry into the user's chosen logs directory.
pub async fn append_transcript(dir: &Path, entry: &TranscriptEntry) -> Result<PathBuf> {
    append_text_log(dir, &entry.to_text()).await
}
