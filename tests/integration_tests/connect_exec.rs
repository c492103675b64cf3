// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::{Context, Result};
use quantumxfer::session::SessionManager;

use crate::integration_tests::common::{live_config, skip_without_endpoint};

#[tokio::test]
async fn connect_execute_disconnect() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let cfg = live_config().context("live config")?;
    let (sessions, _progress_rx) = SessionManager::new();

    let info = sessions.connect(cfg).await.context("connect failed")?;
    assert!(info.connection_id >= 1);

    let result = sessions
        .execute(info.connection_id, "echo quantumxfer", None, None)
        .await
        .context("exec failed")?;
    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.contains("quantumxfer"));

    // Stderr is collected independently of stdout.
    let result = sessions
        .execute(info.connection_id, "ls /definitely-not-here", None, None)
        .await
        .context("exec failed")?;
    assert_ne!(result.exit_code, Some(0));
    assert!(!result.stderr.is_empty());

    // The transcript recorded both commands in order.
    let transcript = sessions.transcript(info.connection_id).await?;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].command, "echo quantumxfer");

    let snapshot = sessions
        .connection_snapshot(info.connection_id)
        .context("snapshot")?;
    assert!(snapshot.last_used_at >= snapshot.created_at);

    sessions.disconnect(info.connection_id).await?;
    // Closed is absorbing.
    let err = sessions
        .execute(info.connection_id, "echo again", None, None)
        .await
        .expect_err("closed connection must refuse work");
    assert_eq!(err.code(), "NO_CONNECTION");
    Ok(())
}

#[tokio::test]
async fn connection_ids_are_strictly_monotonic() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (sessions, _progress_rx) = SessionManager::new();

    let first = sessions.connect(live_config().context("cfg")?).await?;
    let second = sessions.connect(live_config().context("cfg")?).await?;
    assert!(second.connection_id > first.connection_id);

    sessions.disconnect_all().await;
    // Ids are never reused, even after a full teardown.
    let third = sessions.connect(live_config().context("cfg")?).await?;
    assert!(third.connection_id > second.connection_id);
    sessions.disconnect_all().await;
    Ok(())
}

#[tokio::test]
async fn command_deadline_leaves_the_connection_ready() -> Result<()> {
    if skip_without_endpoint() {
        return Ok(());
    }
    let (sessions, _progress_rx) = SessionManager::new();
    let info = sessions.connect(live_config().context("cfg")?).await?;

    let err = sessions
        .execute(
            info.connection_id,
            "sleep 30",
            Some(std::time::Duration::from_secs(1)),
            None,
        )
        .await
        .expect_err("deadline must fire");
    assert_eq!(err.code(), "EXEC_ERROR");
    assert_eq!(err.to_string(), "command execution failed: TIMEOUT");

    // Same transport keeps working.
    let result = sessions
        .execute(info.connection_id, "echo still-alive", None, None)
        .await?;
    assert!(result.stdout.contains("still-alive"));
    sessions.disconnect(info.connection_id).await?;
    Ok(())
}
