// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! The connection pool. Owns the monotonic id counter, the map of live
//! connection handles, and the transfer registry with its cancel tokens.
//! Per-connection work is forwarded to the owning actor; the map itself is
//! only ever held for short insert/remove/lookup sections.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cfg::config::SshConnection,
    errors::CoreError,
    session::{
        ConnectionState, ExecResult, ListOptions, RecursiveListing, RemoteEntry,
        ServerInfo,
        connection::{ConnOp, ConnectionActor, ConnectionHandle, establish},
        transfer::{
            ProgressEvent, ProgressFn, TransferDescriptor, TransferKind, TransferState,
        },
    },
    store::TranscriptEntry,
};

/// Terminal transfer records are pruned once the registry grows past this.
const TRANSFER_REGISTRY_CAP: usize = 512;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub connection_id: u64,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub transfer_id: String,
    pub bytes_transferred: u64,
}

/// Point-in-time view of one pooled connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: u64,
    pub server_info: ServerInfo,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

struct PooledConnection {
    handle: ConnectionHandle,
    last_used_ms: AtomicI64,
}

struct TransferEntry {
    descriptor: TransferDescriptor,
    cancel: CancellationToken,
}

pub struct SessionManager {
    connections: DashMap<u64, PooledConnection>,
    /// Ids start at 1 and are never reused within a process lifetime.
    next_id: AtomicU64,
    transfers: DashMap<String, TransferEntry>,
    next_transfer_id: AtomicU64,
    progress: Arc<ProgressFn>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Builds the pool with a channel draining the unsolicited progress
    /// events. Callers that interleave those events with final responses on
    /// one output stream must use [`with_progress`] instead: a second
    /// channel cannot preserve ordering across the two.
    ///
    /// [`with_progress`]: SessionManager::with_progress
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (progress, progress_rx) = mpsc::unbounded_channel();
        let manager = Self::with_progress(Arc::new(move |event| {
            let _ = progress.send(event);
        }));
        (manager, progress_rx)
    }

    /// Builds the pool with a caller-supplied progress sink. The sink runs
    /// synchronously on the transfer's task before the transfer returns, so
    /// a sink that enqueues into the caller's response queue keeps every
    /// progress event ahead of its transfer's final response.
    pub fn with_progress(progress: Arc<ProgressFn>) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            transfers: DashMap::new(),
            next_transfer_id: AtomicU64::new(1),
            progress,
            shutdown: CancellationToken::new(),
        })
    }

    /// Establishes and authenticates a transport. The id is assigned only
    /// after the transport reports ready, so successful connects observe a
    /// strictly increasing sequence.
    pub async fn connect(&self, cfg: SshConnection) -> Result<ConnectInfo, CoreError> {
        let handle = establish(&cfg).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let server = ServerInfo {
            host: cfg.host.clone(),
            username: cfg.username.clone(),
            port: cfg.port,
        };
        let tx = ConnectionActor::spawn(
            id,
            handle,
            self.progress.clone(),
            self.shutdown.child_token(),
        );
        let now = Utc::now();
        self.connections.insert(
            id,
            PooledConnection {
                handle: ConnectionHandle {
                    id,
                    tx,
                    server: server.clone(),
                    created_at: now,
                },
                last_used_ms: AtomicI64::new(now.timestamp_millis()),
            },
        );
        info!(id, host = %server.host, port = server.port, "ssh connection ready");

        Ok(ConnectInfo {
            connection_id: id,
            server_info: server,
        })
    }

    pub async fn execute(
        &self,
        id: u64,
        command: &str,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<ExecResult, CoreError> {
        let command = command.to_string();
        let cancel = cancel.unwrap_or_else(|| self.shutdown.child_token());
        self.op(id, move |reply| ConnOp::Exec {
            command,
            timeout,
            cancel,
            reply,
        })
        .await
    }

    pub async fn list_directory(
        &self,
        id: u64,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, CoreError> {
        let path = path.to_string();
        self.op(id, move |reply| ConnOp::ListDir { path, reply }).await
    }

    pub async fn list_directory_recursive(
        &self,
        id: u64,
        root: &str,
        opts: ListOptions,
    ) -> Result<RecursiveListing, CoreError> {
        let root = root.to_string();
        self.op(id, move |reply| ConnOp::ListRecursive { root, opts, reply })
            .await
    }

    pub async fn create_directory(&self, id: u64, path: &str) -> Result<(), CoreError> {
        let path = path.to_string();
        self.op(id, move |reply| ConnOp::Mkdir { path, reply }).await
    }

    pub async fn remove_path(&self, id: u64, path: &str) -> Result<(), CoreError> {
        let path = path.to_string();
        self.op(id, move |reply| ConnOp::Remove { path, reply }).await
    }

    pub async fn rename_path(
        &self,
        id: u64,
        from: &str,
        to: &str,
    ) -> Result<(), CoreError> {
        let from = from.to_string();
        let to = to.to_string();
        self.op(id, move |reply| ConnOp::Rename { from, to, reply })
            .await
    }

    pub async fn download(
        &self,
        id: u64,
        remote: &str,
        local: &Path,
    ) -> Result<TransferSummary, CoreError> {
        if !self.connections.contains_key(&id) {
            return Err(CoreError::NoConnection(id));
        }
        let transfer_id = self.register_transfer(TransferKind::Download, remote, local);
        let cancel = self.transfer_cancel(&transfer_id);

        self.set_transfer_state(&transfer_id, TransferState::Transferring, 0);
        let op_transfer_id = transfer_id.clone();
        let remote = remote.to_string();
        let local = local.to_path_buf();
        let result = self
            .op(id, move |reply| ConnOp::Download {
                remote,
                local,
                transfer_id: op_transfer_id,
                cancel,
                reply,
            })
            .await;
        self.finish_transfer(&transfer_id, &result);
        result.map(|bytes| TransferSummary {
            transfer_id,
            bytes_transferred: bytes,
        })
    }

    pub async fn upload(
        &self,
        id: u64,
        local: &Path,
        remote: &str,
    ) -> Result<TransferSummary, CoreError> {
        if !self.connections.contains_key(&id) {
            return Err(CoreError::NoConnection(id));
        }
        let transfer_id = self.register_transfer(TransferKind::Upload, remote, local);
        let cancel = self.transfer_cancel(&transfer_id);

        self.set_transfer_state(&transfer_id, TransferState::Transferring, 0);
        let op_transfer_id = transfer_id.clone();
        let remote = remote.to_string();
        let local = local.to_path_buf();
        let result = self
            .op(id, move |reply| ConnOp::Upload {
                local,
                remote,
                transfer_id: op_transfer_id,
                cancel,
                reply,
            })
            .await;
        self.finish_transfer(&transfer_id, &result);
        result.map(|bytes| TransferSummary {
            transfer_id,
            bytes_transferred: bytes,
        })
    }

    /// Cooperative cancel: trips the transfer's token so the next chunk
    /// boundary aborts. Returns false for unknown or already-terminal
    /// transfers. The connection itself stays open.
    pub fn cancel_transfer(&self, transfer_id: &str) -> bool {
        let Some(entry) = self.transfers.get(transfer_id) else {
            return false;
        };
        if matches!(
            entry.descriptor.state,
            TransferState::Completed | TransferState::Failed { .. }
        ) {
            return false;
        }
        entry.cancel.cancel();
        true
    }

    pub fn transfer(&self, transfer_id: &str) -> Option<TransferDescriptor> {
        self.transfers.get(transfer_id).map(|e| e.descriptor.clone())
    }

    /// In-memory transcript of one live session, oldest first.
    pub async fn transcript(&self, id: u64) -> Result<Vec<TranscriptEntry>, CoreError> {
        let tx = self.mailbox(id)?;
        let (reply, rx) = oneshot::channel();
        tx.send(ConnOp::Transcript { reply })
            .await
            .map_err(|_| CoreError::NoConnection(id))?;
        rx.await.map_err(|_| CoreError::NoConnection(id))
    }

    pub fn connection_snapshot(&self, id: u64) -> Option<ConnectionSnapshot> {
        self.connections.get(&id).map(|conn| ConnectionSnapshot {
            id,
            server_info: conn.handle.server.clone(),
            state: ConnectionState::Ready,
            created_at: conn.handle.created_at,
            last_used_at: DateTime::from_timestamp_millis(
                conn.last_used_ms.load(Ordering::Relaxed),
            )
            .unwrap_or(conn.handle.created_at),
        })
    }

    /// Best-effort close. Removing the record first makes the closed state
    /// absorbing: every later operation on this id answers `NO_CONNECTION`.
    pub async fn disconnect(&self, id: u64) -> Result<(), CoreError> {
        let Some((_, conn)) = self.connections.remove(&id) else {
            return Err(CoreError::NoConnection(id));
        };
        let (reply, rx) = oneshot::channel();
        if conn.handle.tx.send(ConnOp::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
        info!(id, "ssh connection closed");
        Ok(())
    }

    /// Disconnects a snapshot of all ids. Idempotent: ids that raced away
    /// are skipped.
    pub async fn disconnect_all(&self) {
        let ids: Vec<u64> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Err(e) = self.disconnect(id).await {
                debug!(id, "disconnect-all skipped: {e}");
            }
        }
    }

    /// Broadcasts shutdown (cancelling in-flight transfers), then closes
    /// every connection.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.disconnect_all().await;
    }

    // --- internals ---

    fn mailbox(&self, id: u64) -> Result<mpsc::Sender<ConnOp>, CoreError> {
        let conn = self
            .connections
            .get(&id)
            .ok_or(CoreError::NoConnection(id))?;
        conn.last_used_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        Ok(conn.handle.tx.clone())
    }

    /// Sends one operation to the owning actor and awaits its reply. A
    /// closed mailbox means the connection reached its absorbing state.
    async fn op<T>(
        &self,
        id: u64,
        build: impl FnOnce(oneshot::Sender<Result<T, CoreError>>) -> ConnOp,
    ) -> Result<T, CoreError> {
        let tx = self.mailbox(id)?;
        let (reply, rx) = oneshot::channel();
        tx.send(build(reply))
            .await
            .map_err(|_| CoreError::NoConnection(id))?;
        rx.await.map_err(|_| CoreError::NoConnection(id))?
    }

    fn register_transfer(
        &self,
        kind: TransferKind,
        remote: &str,
        local: &Path,
    ) -> String {
        if self.transfers.len() >= TRANSFER_REGISTRY_CAP {
            self.transfers.retain(|_, e| {
                !matches!(
                    e.descriptor.state,
                    TransferState::Completed | TransferState::Failed { .. }
                )
            });
        }

        let transfer_id =
            format!("t-{}", self.next_transfer_id.fetch_add(1, Ordering::SeqCst));
        self.transfers.insert(
            transfer_id.clone(),
            TransferEntry {
                descriptor: TransferDescriptor {
                    id: transfer_id.clone(),
                    kind,
                    state: TransferState::Pending,
                    progress_bytes: 0,
                    total_bytes: 0,
                    remote_path: remote.to_string(),
                    local_path: local.display().to_string(),
                },
                cancel: self.shutdown.child_token(),
            },
        );
        transfer_id
    }

    fn transfer_cancel(&self, transfer_id: &str) -> CancellationToken {
        self.transfers
            .get(transfer_id)
            .map(|e| e.cancel.clone())
            .unwrap_or_else(|| self.shutdown.child_token())
    }

    fn set_transfer_state(&self, transfer_id: &str, state: TransferState, bytes: u64) {
        if let Some(mut entry) = self.transfers.get_mut(transfer_id) {
            entry.descriptor.state = state;
            entry.descriptor.progress_bytes = bytes;
            if bytes > entry.descriptor.total_bytes {
                entry.descriptor.total_bytes = bytes;
            }
        }
    }

    fn finish_transfer(&self, transfer_id: &str, result: &Result<u64, CoreError>) {
        match result {
            Ok(bytes) => {
                self.set_transfer_state(transfer_id, TransferState::Completed, *bytes);
            },
            Err(e) => self.set_transfer_state(
                transfer_id,
                TransferState::Failed {
                    reason: e.code().to_string(),
                },
                0,
            ),
        }
    }
}
