// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Durable per-user state: connection profiles, the global command-history
//! ring, and transcript/text-log mirroring. All writes go through a
//! temp-file-then-rename so a crash mid-write never truncates state, and a
//! per-file async mutex gives concurrent callers a linearizable order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::RngExt;
use tokio::sync::Mutex;

pub mod history;
pub mod profiles;
pub mod transcript;

pub use history::HISTORY_CAP;
pub use profiles::{PROFILE_HISTORY_CAP, Profile};
pub use transcript::TranscriptEntry;

pub struct Store {
    state_dir: PathBuf,
    /// Serializes all access to `profiles.json`.
    profiles_lock: Mutex<()>,
    /// Serializes all access to the global command-history file.
    history_lock: Mutex<()>,
}

impl Store {
    pub fn open(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            profiles_lock: Mutex::new(()),
            history_lock: Mutex::new(()),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub(crate) fn profiles_path(&self) -> PathBuf {
        self.state_dir.join("profiles.json")
    }

    pub(crate) fn history_path(&self) -> PathBuf {
        self.state_dir
            .join("command-history")
            .join("global-command-history.json")
    }
}

/// Write-to-temp-then-rename in the destination directory, so the rename
/// stays on one filesystem.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .context("destination path has no parent directory")?;
    tokio::fs::create_dir_all(dir)
        .await
        .context("failed to create state directory")?;

    let suffix: u32 = rand::rng().random();
    let tmp = dir.join(format!(
        ".{}.{suffix:08x}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
    ));

    tokio::fs::write(&tmp, bytes)
        .await
        .context("failed to write temp file")?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).context("failed to move temp file into place");
    }
    Ok(())
}
