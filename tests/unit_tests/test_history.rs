// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::Result;
use quantumxfer::store::{HISTORY_CAP, Store};
use tempfile::tempdir;

#[tokio::test]
async fn missing_file_loads_empty() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());
    assert!(store.load_history().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn append_then_load_ends_with_the_command() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    store.append_command("ls -la").await?;
    store.append_command("uptime").await?;

    let history = store.load_history().await?;
    assert_eq!(history.last().map(String::as_str), Some("uptime"));
    assert_eq!(history.len(), 2);
    Ok(())
}

#[tokio::test]
async fn append_reports_post_append_length() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    assert_eq!(store.append_command("one").await?, 1);
    assert_eq!(store.append_command("two").await?, 2);
    Ok(())
}

#[tokio::test]
async fn duplicates_within_the_window_are_preserved() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    store.append_command("make build").await?;
    store.append_command("make build").await?;
    store.append_command("make build").await?;

    let history = store.load_history().await?;
    assert_eq!(history, vec!["make build"; 3]);
    Ok(())
}

#[tokio::test]
async fn ring_is_bounded_to_500_with_fifo_eviction() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    for i in 0..=HISTORY_CAP {
        store.append_command(&format!("cmd-{i}")).await?;
    }

    let history = store.load_history().await?;
    assert_eq!(history.len(), HISTORY_CAP);
    assert!(!history.contains(&"cmd-0".to_string()));
    assert_eq!(history.first().map(String::as_str), Some("cmd-1"));
    assert_eq!(
        history.last().map(String::as_str),
        Some(format!("cmd-{HISTORY_CAP}").as_str())
    );
    Ok(())
}

#[tokio::test]
async fn bulk_save_keeps_the_newest_entries() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path());

    let commands: Vec<String> = (0..HISTORY_CAP + 50).map(|i| format!("c{i}")).collect();
    let len = store.save_history(commands).await?;
    assert_eq!(len, HISTORY_CAP);

    let history = store.load_history().await?;
    assert_eq!(history.first().map(String::as_str), Some("c50"));
    Ok(())
}

#[tokio::test]
async fn concurrent_appends_all_land() -> Result<()> {
    let dir = tempdir()?;
    let store = std::sync::Arc::new(Store::open(dir.path()));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = std::sync::Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.append_command(&format!("parallel-{i}")).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(store.load_history().await?.len(), 16);
    Ok(())
}
