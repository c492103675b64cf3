// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Streaming file transfers over an SFTP session. Chunked at 64 KiB with
//! throttled progress events and cooperative cancel at chunk boundaries.

use std::{path::Path, sync::Arc, time::Duration};

use bytes::BytesMut;
use russh_sftp::client::SftpSession;
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Progress cadence: whichever of these trips first.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TransferState {
    Pending,
    Transferring,
    Completed,
    Failed { reason: String },
}

/// Bookkeeping record for one transfer, owned by the pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDescriptor {
    pub id: String,
    pub kind: TransferKind,
    #[serde(flatten)]
    pub state: TransferState,
    pub progress_bytes: u64,
    pub total_bytes: u64,
    pub remote_path: String,
    pub local_path: String,
}

/// Unsolicited event emitted while a transfer is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub transfer_id: String,
    pub bytes: u64,
    pub total: u64,
}

/// Progress sink, invoked synchronously on the transfer's own task for each
/// event. Every invocation happens before the transfer's result is
/// returned, so whatever the sink enqueues is ordered ahead of the final
/// response for that transfer.
pub type ProgressFn = dyn Fn(ProgressEvent) + Send + Sync;

/// Throttles progress events to the 100 ms / 1 MiB cadence and always
/// emits the final byte count.
pub(crate) struct ProgressSink {
    notify: Arc<ProgressFn>,
    transfer_id: String,
    total: u64,
    last_emit: Instant,
    bytes_at_last_emit: u64,
}

impl ProgressSink {
    pub(crate) fn new(notify: Arc<ProgressFn>, transfer_id: String, total: u64) -> Self {
        Self {
            notify,
            transfer_id,
            total,
            last_emit: Instant::now(),
            bytes_at_last_emit: 0,
        }
    }

    fn report(&mut self, bytes: u64) {
        let elapsed = self.last_emit.elapsed();
        let delta = bytes - self.bytes_at_last_emit;
        if elapsed < PROGRESS_INTERVAL && delta < PROGRESS_BYTES {
            return;
        }
        self.emit(bytes);
    }

    fn finish(&mut self, bytes: u64) {
        self.emit(bytes);
    }

    fn emit(&mut self, bytes: u64) {
        self.last_emit = Instant::now();
        self.bytes_at_last_emit = bytes;
        (self.notify)(ProgressEvent {
            transfer_id: self.transfer_id.clone(),
            bytes,
            total: self.total,
        });
    }
}

/// Streams a remote file to the local filesystem. Cancel aborts at the next
/// chunk boundary and removes the partial local file; the connection stays
/// open either way.
pub(crate) async fn download(
    sftp: &SftpSession,
    remote: &str,
    local: &Path,
    cancel: &CancellationToken,
    notify: Arc<ProgressFn>,
    transfer_id: &str,
) -> Result<u64, CoreError> {
    let total = sftp
        .metadata(remote)
        .await
        .map_err(|e| CoreError::Download(e.to_string()))?
        .size
        .unwrap_or(0);
    let mut sink = ProgressSink::new(notify, transfer_id.to_string(), total);

    let mut source = sftp
        .open(remote)
        .await
        .map_err(|e| CoreError::Download(e.to_string()))?;
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::Download(e.to_string()))?;
    }
    let mut dest = tokio::fs::File::create(local)
        .await
        .map_err(|e| CoreError::Download(e.to_string()))?;

    let mut buf = BytesMut::zeroed(CHUNK_SIZE);
    let mut done: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            drop(dest);
            let _ = tokio::fs::remove_file(local).await;
            return Err(CoreError::Cancelled);
        }
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| CoreError::Download(e.to_string()))?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])
            .await
            .map_err(|e| CoreError::Download(e.to_string()))?;
        done += n as u64;
        sink.report(done);
    }

    dest.flush()
        .await
        .map_err(|e| CoreError::Download(e.to_string()))?;
    sink.finish(done);
    Ok(done)
}

/// Streams a local file to the remote side. Same cancel semantics as
/// [`download`]; the partial remote file is left for the caller to resume or
/// remove.
pub(crate) async fn upload(
    sftp: &SftpSession,
    local: &Path,
    remote: &str,
    cancel: &CancellationToken,
    notify: Arc<ProgressFn>,
    transfer_id: &str,
) -> Result<u64, CoreError> {
    let total = tokio::fs::metadata(local)
        .await
        .map_err(|e| CoreError::Upload(e.to_string()))?
        .len();
    let mut sink = ProgressSink::new(notify, transfer_id.to_string(), total);

    let mut source = tokio::fs::File::open(local)
        .await
        .map_err(|e| CoreError::Upload(e.to_string()))?;
    let mut dest = sftp
        .create(remote)
        .await
        .map_err(|e| CoreError::Upload(e.to_string()))?;

    let mut buf = BytesMut::zeroed(CHUNK_SIZE);
    let mut done: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| CoreError::Upload(e.to_string()))?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])
            .await
            .map_err(|e| CoreError::Upload(e.to_string()))?;
        done += n as u64;
        sink.report(done);
    }

    dest.flush()
        .await
        .map_err(|e| CoreError::Upload(e.to_string()))?;
    dest.shutdown()
        .await
        .map_err(|e| CoreError::Upload(e.to_string()))?;
    sink.finish(done);
    Ok(done)
}
