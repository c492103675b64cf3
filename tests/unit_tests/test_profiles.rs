// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::Result;
use chrono::Utc;
use quantumxfer::store::{PROFILE_HISTORY_CAP, Profile, Store};
use tempfile::tempdir;

fn profile(id: &str, name: &str) -> Profile {
    Profile {
        id: id.to_string(),
        name: name.to_string(),
        host: "example.com".to_string(),
        port: 22,
        username: "deploy".to_string(),
        password_ref: None,
        private_key_path: None,
        last_used: Utc::now(),
        logs_directory: None,
        command_history: Vec::new(),
        tags: None,
        favorited: None,
        connection_count: None,
        total_session_time_seconds: None,
    }
}

#[tokio::test]
async fn missing_file_loads_empty() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());
    assert!(store.load_profiles().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn save_then_load_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    let mut alpha = profile("p1", "alpha");
    alpha.logs_directory = Some("/tmp/logs".to_string());
    alpha.tags = Some(vec!["prod".to_string()]);
    alpha.favorited = Some(true);
    let beta = profile("p2", "beta");

    store.save_profiles(vec![alpha.clone(), beta.clone()]).await?;
    let mut loaded = store.load_profiles().await?;
    loaded.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, alpha.id);
    assert_eq!(loaded[0].logs_directory, alpha.logs_directory);
    assert_eq!(loaded[0].tags, alpha.tags);
    // Dates survive the ISO-8601 round trip at millisecond precision.
    assert_eq!(
        loaded[0].last_used.timestamp_millis(),
        alpha.last_used.timestamp_millis()
    );
    assert_eq!(loaded[1].id, beta.id);
    Ok(())
}

#[tokio::test]
async fn unnamed_profiles_are_dropped_on_save() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    let kept = store
        .save_profiles(vec![profile("p1", "ok"), profile("p2", "   ")])
        .await?;
    assert_eq!(kept, 1);
    let loaded = store.load_profiles().await?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "ok");
    Ok(())
}

#[tokio::test]
async fn per_profile_history_is_clamped() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    let mut p = profile("p1", "alpha");
    p.command_history = (0..PROFILE_HISTORY_CAP + 20).map(|i| format!("c{i}")).collect();
    store.save_profiles(vec![p]).await?;

    let loaded = store.load_profiles().await?;
    assert_eq!(loaded[0].command_history.len(), PROFILE_HISTORY_CAP);
    assert_eq!(loaded[0].command_history.first().map(String::as_str), Some("c20"));
    Ok(())
}

#[tokio::test]
async fn touch_updates_last_used_and_count() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    let mut p = profile("p1", "alpha");
    p.last_used = Utc::now() - chrono::Duration::days(7);
    store.save_profiles(vec![p.clone()]).await?;

    let touched = store.touch_profile("alpha").await?.expect("profile exists");
    assert_eq!(touched.connection_count, Some(1));
    assert!(touched.last_used > p.last_used);

    let touched = store.touch_profile("alpha").await?.expect("profile exists");
    assert_eq!(touched.connection_count, Some(2));

    assert!(store.touch_profile("missing").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn on_disk_form_is_a_json_array() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());
    store.save_profiles(vec![profile("p1", "alpha")]).await?;

    let raw = std::fs::read_to_string(dir.path().join("profiles.json"))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    assert!(value.is_array());
    assert_eq!(value[0]["name"], "alpha");
    // No stray temp files left behind by the atomic write.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}
