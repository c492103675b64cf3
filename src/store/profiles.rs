// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{Store, write_atomic};

/// Per-profile command history cap.
pub const PROFILE_HISTORY_CAP: usize = 100;

/// A saved connection profile. Field names match the on-disk JSON contract
/// shared with the front-end. Passwords are never stored inline; opted-in
/// callers carry an opaque reference into the OS secret store instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    pub last_used: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_directory: Option<String>,
    #[serde(default)]
    pub command_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_session_time_seconds: Option<u64>,
}

fn default_port() -> u16 {
    22
}

async fn read_unlocked(path: &Path) -> Result<Vec<Profile>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context("failed to read profiles file"),
    };
    serde_json::from_slice(&raw).context("profiles file is not valid JSON")
}

/// Drops unnamed entries, clamps per-profile history, and writes atomically.
async fn write_unlocked(path: &Path, profiles: Vec<Profile>) -> Result<usize> {
    let mut kept: Vec<Profile> = Vec::with_capacity(profiles.len());
    for mut profile in profiles {
        if profile.name.trim().is_empty() {
            warn!(id = %profile.id, "dropping profile with empty name");
            continue;
        }
        if profile.command_history.len() > PROFILE_HISTORY_CAP {
            let excess = profile.command_history.len() - PROFILE_HISTORY_CAP;
            profile.command_history.drain(..excess);
        }
        kept.push(profile);
    }

    let body = serde_json::to_vec_pretty(&kept).context("failed to encode profiles")?;
    write_atomic(path, &body).await?;
    Ok(kept.len())
}

impl Store {
    /// Missing file loads as an empty list, never an error.
    pub async fn load_profiles(&self) -> Result<Vec<Profile>> {
        let _guard = self.profiles_lock.lock().await;
        read_unlocked(&self.profiles_path()).await
    }

    /// Persists the full profile list; returns how many entries were kept.
    pub async fn save_profiles(&self, profiles: Vec<Profile>) -> Result<usize> {
        let _guard = self.profiles_lock.lock().await;
        write_unlocked(&self.profiles_path(), profiles).await
    }

    /// Connect bookkeeping for a named connect: bumps `lastUsed` and
    /// `connectionCount` on the matching profile under a single
    /// read-modify-write. Unknown names are a no-op; connect never creates
    /// profiles implicitly.
    pub async fn touch_profile(&self, name: &str) -> Result<Option<Profile>> {
        let _guard = self.profiles_lock.lock().await;
        let path = self.profiles_path();
        let mut profiles = read_unlocked(&path).await?;
        let Some(profile) = profiles.iter_mut().find(|p| p.name == name) else {
            return Ok(None);
        };
        profile.last_used = Utc::now();
        profile.connection_count = Some(profile.connection_count.unwrap_or(0) + 1);
        let touched = profile.clone();
        write_unlocked(&path, profiles).await?;
        Ok(Some(touched))
    }

    /// Logs directory configured for the named profile, if any.
    pub async fn profile_logs_directory(&self, name: &str) -> Result<Option<String>> {
        let profiles = self.load_profiles().await?;
        Ok(profiles
            .into_iter()
            .find(|p| p.name == name)
            .and_then(|p| p.logs_directory))
    }
}
