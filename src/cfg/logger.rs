// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cfg::config::LOG_LEVEL_ENV;

/// Installs the global tracing subscriber for developer diagnostics. The
/// filter comes from `QUANTUMXFER_LOG_LEVEL`; the writer is non-blocking
/// stderr so the IPC loop on stdout stays clean.
pub fn init_tracing() -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("failed to set global default subscriber")?;

    Ok(guard)
}
