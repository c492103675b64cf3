// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::{Context, Result};
use quantumxfer::session::{ListOptions, SessionManager};
use tempfile::tempdir;

use crate::integration_tests::common::{live_config, skip_without_endpoint};

#[tokio::test]
async fn upload_download_round_trip_with_progress() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (sessions, mut progress_rx) = SessionManager::new();
    let info = sessions.connect(live_config().context("cfg")?).await?;

    let dir = tempdir()?;
    let local_src = dir.path().join("payload.bin");
    let body: Vec<u8> = (0..2 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&local_src, &body)?;

    let remote = "quantumxfer-it-payload.bin";
    let up = sessions
        .upload(info.connection_id, &local_src, remote)
        .await
        .context("upload failed")?;
    assert_eq!(up.bytes_transferred, body.len() as u64);

    let local_dst = dir.path().join("payload-copy.bin");
    let down = sessions
        .download(info.connection_id, remote, &local_dst)
        .await
        .context("download failed")?;
    assert_eq!(down.bytes_transferred, body.len() as u64);
    assert_eq!(std::fs::read(&local_dst)?, body);

    let descriptor = sessions
        .transfer(&down.transfer_id)
        .context("transfer descriptor missing")?;
    assert_eq!(
        descriptor.state,
        quantumxfer::session::TransferState::Completed
    );
    assert_eq!(descriptor.progress_bytes, body.len() as u64);

    // At least the final progress event for each transfer arrived, and the
    // final one reports the full byte count.
    let mut events = Vec::new();
    while let Ok(event) = progress_rx.try_recv() {
        events.push(event);
    }
    assert!(!events.is_empty());
    let last_down = events
        .iter()
        .rev()
        .find(|e| e.transfer_id == down.transfer_id)
        .context("download progress missing")?;
    assert_eq!(last_down.bytes, body.len() as u64);

    let _ = sessions
        .execute(info.connection_id, &format!("rm -f {remote}"), None, None)
        .await;
    sessions.disconnect(info.connection_id).await?;
    Ok(())
}

/// Wires the pool the way the serve loop does: one outbound queue carrying
/// both progress envelopes and final responses. Every progress event for a
/// transfer must land in the queue before that transfer's final response.
#[tokio::test]
async fn progress_events_precede_the_final_response() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (out_tx, mut out_rx) =
        tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
    let progress_out = out_tx.clone();
    let sessions = SessionManager::with_progress(std::sync::Arc::new(move |event| {
        let _ = progress_out.send(quantumxfer::router::envelope::progress(&event));
    }));
    let info = sessions.connect(live_config().context("cfg")?).await?;

    let dir = tempdir()?;
    let local_src = dir.path().join("ordered.bin");
    let body: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 199) as u8).collect();
    std::fs::write(&local_src, &body)?;
    let remote = "quantumxfer-it-ordered.bin";

    let summary = sessions
        .upload(info.connection_id, &local_src, remote)
        .await
        .context("upload failed")?;
    // The final response enters the queue from this task, after the
    // transfer returned, exactly as the dispatch path does.
    let _ = out_tx.send(serde_json::json!({
        "id": "up-1",
        "success": true,
        "transferId": summary.transfer_id,
    }));

    let mut queued = Vec::new();
    while let Ok(value) = out_rx.try_recv() {
        queued.push(value);
    }

    let final_idx = queued
        .iter()
        .position(|v| v["id"] == "up-1")
        .context("final response missing from the queue")?;
    let progress_idx: Vec<usize> = queued
        .iter()
        .enumerate()
        .filter(|(_, v)| {
            v["channel"] == "progress"
                && v["transferId"] == summary.transfer_id.as_str()
        })
        .map(|(i, _)| i)
        .collect();
    assert!(!progress_idx.is_empty(), "expected at least one progress event");
    assert!(
        progress_idx.iter().all(|i| *i < final_idx),
        "progress events must precede the final response: {queued:?}"
    );
    // The last event reports the full byte count.
    let last = &queued[*progress_idx.last().context("progress index")?];
    assert_eq!(last["bytes"], body.len() as u64);

    let _ = sessions
        .execute(info.connection_id, &format!("rm -f {remote}"), None, None)
        .await;
    sessions.disconnect(info.connection_id).await?;
    Ok(())
}

#[tokio::test]
async fn mkdir_rename_delete_round_trip() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (sessions, _progress_rx) = SessionManager::new();
    let info = sessions.connect(live_config().context("cfg")?).await?;

    let dir = "quantumxfer-it-dir";
    let renamed = "quantumxfer-it-dir-renamed";
    let _ = sessions.remove_path(info.connection_id, dir).await;
    let _ = sessions.remove_path(info.connection_id, renamed).await;

    sessions.create_directory(info.connection_id, dir).await?;
    let entries = sessions.list_directory(info.connection_id, ".").await?;
    assert!(entries.iter().any(|e| e.name == dir));

    sessions.rename_path(info.connection_id, dir, renamed).await?;
    let entries = sessions.list_directory(info.connection_id, ".").await?;
    assert!(entries.iter().any(|e| e.name == renamed));
    assert!(!entries.iter().any(|e| e.name == dir));

    sessions.remove_path(info.connection_id, renamed).await?;
    let entries = sessions.list_directory(info.connection_id, ".").await?;
    assert!(!entries.iter().any(|e| e.name == renamed));

    sessions.disconnect(info.connection_id).await?;
    Ok(())
}

#[tokio::test]
async fn listing_maps_kinds_and_permissions() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (sessions, _progress_rx) = SessionManager::new();
    let info = sessions.connect(live_config().context("cfg")?).await?;

    let entries = sessions.list_directory(info.connection_id, ".").await?;
    for entry in &entries {
        assert_eq!(entry.permissions.len(), 9);
        assert!(entry.absolute_path.starts_with('/'));
    }

    let listing = sessions
        .list_directory_recursive(
            info.connection_id,
            ".",
            ListOptions {
                max_depth: Some(2),
                max_files: Some(25),
            },
        )
        .await?;
    assert!(listing.total_files <= 25);
    assert_eq!(listing.total_files, listing.entries.len());

    sessions.disconnect(info.connection_id).await?;
    Ok(())
}
