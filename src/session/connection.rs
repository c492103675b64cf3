// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! One actor per live transport. The pool forwards every operation through
//! an mpsc mailbox, so everything touching a single connection is strictly
//! serialized FIFO while different connections proceed in parallel.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use russh::{
    ChannelMsg, Disconnect,
    client::{self, Handle},
    keys::{PrivateKeyWithHashAlg, load_secret_key},
};
use russh_sftp::client::SftpSession;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::config::{Auth, SshConnection},
    errors::CoreError,
    session::{
        ConnectionState, ExecResult, ListOptions, RecursiveListing, RemoteEntry,
        ServerInfo,
        sftp::{SftpSource, list_dir, make_dir, remove_path, rename_path, walk},
        transfer::{self, ProgressFn},
    },
    store::TranscriptEntry,
};

/// Host keys are surfaced to (and pinned by) the front-end; the core
/// transport accepts them.
pub(crate) struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Operations accepted by a connection actor.
pub(crate) enum ConnOp {
    Exec {
        command: String,
        timeout: Option<Duration>,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<ExecResult, CoreError>>,
    },
    ListDir {
        path: String,
        reply: oneshot::Sender<Result<Vec<RemoteEntry>, CoreError>>,
    },
    ListRecursive {
        root: String,
        opts: ListOptions,
        reply: oneshot::Sender<Result<RecursiveListing, CoreError>>,
    },
    Download {
        remote: String,
        local: PathBuf,
        transfer_id: String,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<u64, CoreError>>,
    },
    Upload {
        local: PathBuf,
        remote: String,
        transfer_id: String,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<u64, CoreError>>,
    },
    Mkdir {
        path: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Remove {
        path: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Rename {
        from: String,
        to: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<TranscriptEntry>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Opens the transport and authenticates per the config's `Auth` sum.
/// Failure paths map onto the three connect error codes: key material that
/// cannot be read is `PRIVATE_KEY_ERROR`, transport setup and the deadline
/// are `CONNECTION_ERROR`, and rejected credentials are `AUTH_ERROR`.
pub(crate) async fn establish(
    cfg: &SshConnection,
) -> Result<Handle<AcceptingHandler>, CoreError> {
    let key = match &cfg.auth {
        Auth::Key {
            private_key_path,
            passphrase,
        }
        | Auth::Both {
            private_key_path,
            passphrase,
            ..
        } => Some(
            load_secret_key(
                private_key_path,
                passphrase.as_ref().map(|p| p.expose().as_str()),
            )
            .map_err(|e| CoreError::PrivateKey(e.to_string()))?,
        ),
        Auth::Password { .. } => None,
    };

    let config = Arc::new(client::Config::default());
    let mut handle = tokio::time::timeout(
        cfg.timeout,
        client::connect(config, (cfg.host.as_str(), cfg.port), AcceptingHandler),
    )
    .await
    .map_err(|_| {
        CoreError::Connection(format!(
            "connection to {}:{} timed out after {}s",
            cfg.host,
            cfg.port,
            cfg.timeout.as_secs()
        ))
    })?
    .map_err(|e| CoreError::Connection(e.to_string()))?;

    let authenticated = match (&cfg.auth, key) {
        (Auth::Password { password }, _) => {
            authenticate_password(&mut handle, &cfg.username, password.expose()).await?
        },
        (Auth::Key { .. }, Some(key)) => {
            authenticate_key(&mut handle, &cfg.username, key).await?
        },
        (Auth::Both { password, .. }, Some(key)) => {
            if authenticate_key(&mut handle, &cfg.username, key).await? {
                true
            } else {
                debug!("key auth rejected, falling back to password");
                authenticate_password(&mut handle, &cfg.username, password.expose())
                    .await?
            }
        },
        // Key material is loaded above for every key-bearing variant.
        (_, None) => false,
    };

    if !authenticated {
        return Err(CoreError::Auth(format!(
            "server rejected credentials for {}@{}",
            cfg.username, cfg.host
        )));
    }
    Ok(handle)
}

async fn authenticate_password(
    handle: &mut Handle<AcceptingHandler>,
    username: &str,
    password: &str,
) -> Result<bool, CoreError> {
    let result = handle
        .authenticate_password(username, password)
        .await
        .map_err(|e| CoreError::Auth(e.to_string()))?;
    Ok(result.success())
}

async fn authenticate_key(
    handle: &mut Handle<AcceptingHandler>,
    username: &str,
    key: russh::keys::PrivateKey,
) -> Result<bool, CoreError> {
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(|e| CoreError::Auth(e.to_string()))?
        .flatten();
    let result = handle
        .authenticate_publickey(
            username,
            PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
        )
        .await
        .map_err(|e| CoreError::Auth(e.to_string()))?;
    Ok(result.success())
}

pub(crate) struct ConnectionActor {
    id: u64,
    handle: Handle<AcceptingHandler>,
    sftp: Option<SftpSession>,
    state: ConnectionState,
    transcript: Vec<TranscriptEntry>,
    transcript_seq: u64,
    progress: Arc<ProgressFn>,
    shutdown: CancellationToken,
}

impl ConnectionActor {
    /// Spawns the actor task and hands back its mailbox. The actor starts in
    /// `Connecting` and flips to `Ready` as its loop begins; `Closed` is
    /// reached exactly once, whether by disconnect, mailbox teardown, or the
    /// shutdown broadcast.
    pub(crate) fn spawn(
        id: u64,
        handle: Handle<AcceptingHandler>,
        progress: Arc<ProgressFn>,
        shutdown: CancellationToken,
    ) -> mpsc::Sender<ConnOp> {
        let (tx, rx) = mpsc::channel(32);
        let actor = Self {
            id,
            handle,
            sftp: None,
            state: ConnectionState::Connecting,
            transcript: Vec::new(),
            transcript_seq: 0,
            progress,
            shutdown,
        };
        tokio::spawn(actor.run(rx));
        tx
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ConnOp>) {
        self.state = ConnectionState::Ready;
        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(id = self.id, "shutdown signal, closing connection");
                    self.close().await;
                    break;
                },
                op = rx.recv() => match op {
                    None => {
                        self.close().await;
                        break;
                    },
                    Some(ConnOp::Disconnect { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    },
                    Some(op) => self.handle_op(op).await,
                },
            }
        }
        debug!(id = self.id, "connection actor exited");
    }

    async fn handle_op(&mut self, op: ConnOp) {
        match op {
            ConnOp::Exec {
                command,
                timeout,
                cancel,
                reply,
            } => {
                let result = self.exec(&command, timeout, &cancel).await;
                if let Ok(exec) = &result {
                    self.record_transcript(&command, exec);
                }
                let _ = reply.send(result);
            },
            ConnOp::ListDir { path, reply } => {
                let result = self.list_dir_with_retry(&path).await;
                let _ = reply.send(result);
            },
            ConnOp::ListRecursive { root, opts, reply } => {
                let result = self.list_recursive_with_retry(&root, &opts).await;
                let _ = reply.send(result);
            },
            ConnOp::Download {
                remote,
                local,
                transfer_id,
                cancel,
                reply,
            } => {
                let result = self
                    .download_with_retry(&remote, &local, &transfer_id, &cancel)
                    .await;
                let _ = reply.send(result);
            },
            ConnOp::Upload {
                local,
                remote,
                transfer_id,
                cancel,
                reply,
            } => {
                let result = self
                    .upload_with_retry(&local, &remote, &transfer_id, &cancel)
                    .await;
                let _ = reply.send(result);
            },
            ConnOp::Mkdir { path, reply } => {
                let result = self.mkdir_with_retry(&path).await;
                let _ = reply.send(result);
            },
            ConnOp::Remove { path, reply } => {
                let result = self.remove_with_retry(&path).await;
                let _ = reply.send(result);
            },
            ConnOp::Rename { from, to, reply } => {
                let result = self.rename_with_retry(&from, &to).await;
                let _ = reply.send(result);
            },
            ConnOp::Transcript { reply } => {
                let _ = reply.send(self.transcript.clone());
            },
            // Disconnect is intercepted by run() so the loop can stop.
            ConnOp::Disconnect { reply } => {
                let _ = reply.send(());
            },
        }
    }

    /// Runs one command on a fresh exec channel, collecting stdout and
    /// stderr independently until the channel closes. The optional deadline
    /// and the cancel token both tear the channel down but leave the
    /// connection `Ready`.
    async fn exec(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecResult, CoreError> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| CoreError::Exec(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| CoreError::Exec(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut signal = None;

        loop {
            let msg = match next_channel_msg(&mut channel, deadline, cancel).await {
                Ok(msg) => msg,
                Err(e) => {
                    let _ = channel.close().await;
                    return Err(e);
                },
            };
            let Some(msg) = msg else { break };
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.extend_from_slice(data);
                },
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    signal = Some(format!("{signal_name:?}"));
                },
                _ => {},
            }
        }

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            signal,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn record_transcript(&mut self, command: &str, exec: &ExecResult) {
        self.transcript_seq += 1;
        let output = if exec.stderr.is_empty() {
            exec.stdout.clone()
        } else if exec.stdout.is_empty() {
            exec.stderr.clone()
        } else {
            format!("{}\n{}", exec.stdout, exec.stderr)
        };
        self.transcript.push(TranscriptEntry {
            id: self.transcript_seq,
            timestamp: Utc::now(),
            command: command.to_string(),
            output,
            directory: "~".to_string(),
        });
    }

    /// Lazily opens the SFTP subsystem channel, reusing it across calls.
    async fn sftp(&mut self) -> Result<&SftpSession, CoreError> {
        if self.sftp.is_none() {
            let channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|e| CoreError::Sftp(e.to_string()))?;
            channel
                .request_subsystem(true, "sftp")
                .await
                .map_err(|e| CoreError::Sftp(e.to_string()))?;
            let session = SftpSession::new(channel.into_stream())
                .await
                .map_err(|e| CoreError::Sftp(e.to_string()))?;
            self.sftp = Some(session);
        }
        match &self.sftp {
            Some(session) => Ok(session),
            None => Err(CoreError::Sftp("subsystem unavailable".to_string())),
        }
    }

    fn drop_sftp(&mut self, err: &CoreError) {
        warn!(id = self.id, "sftp operation failed, reopening subsystem: {err}");
        self.sftp = None;
    }

    async fn list_dir_with_retry(
        &mut self,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, CoreError> {
        let first = {
            let sftp = self.sftp().await?;
            list_dir(sftp, path).await
        };
        match first {
            Ok(entries) => Ok(entries),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                list_dir(sftp, path).await
            },
        }
    }

    async fn list_recursive_with_retry(
        &mut self,
        root: &str,
        opts: &ListOptions,
    ) -> Result<RecursiveListing, CoreError> {
        let first = {
            let sftp = self.sftp().await?;
            walk(&mut SftpSource { sftp }, root, opts).await
        };
        match first {
            Ok(listing) => Ok(listing),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                walk(&mut SftpSource { sftp }, root, opts).await
            },
        }
    }

    async fn mkdir_with_retry(&mut self, path: &str) -> Result<(), CoreError> {
        let first = {
            let sftp = self.sftp().await?;
            make_dir(sftp, path).await
        };
        match first {
            Ok(()) => Ok(()),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                make_dir(sftp, path).await
            },
        }
    }

    async fn remove_with_retry(&mut self, path: &str) -> Result<(), CoreError> {
        let first = {
            let sftp = self.sftp().await?;
            remove_path(sftp, path).await
        };
        match first {
            Ok(()) => Ok(()),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                remove_path(sftp, path).await
            },
        }
    }

    async fn rename_with_retry(&mut self, from: &str, to: &str) -> Result<(), CoreError> {
        let first = {
            let sftp = self.sftp().await?;
            rename_path(sftp, from, to).await
        };
        match first {
            Ok(()) => Ok(()),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                rename_path(sftp, from, to).await
            },
        }
    }

    async fn download_with_retry(
        &mut self,
        remote: &str,
        local: &Path,
        transfer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, CoreError> {
        let progress = self.progress.clone();
        let first = {
            let sftp = self.sftp().await?;
            transfer::download(sftp, remote, local, cancel, progress.clone(), transfer_id)
                .await
        };
        match first {
            Ok(bytes) => Ok(bytes),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                transfer::download(sftp, remote, local, cancel, progress, transfer_id)
                    .await
            },
        }
    }

    async fn upload_with_retry(
        &mut self,
        local: &Path,
        remote: &str,
        transfer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, CoreError> {
        let progress = self.progress.clone();
        let first = {
            let sftp = self.sftp().await?;
            transfer::upload(sftp, local, remote, cancel, progress.clone(), transfer_id)
                .await
        };
        match first {
            Ok(bytes) => Ok(bytes),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(err) => {
                self.drop_sftp(&err);
                let sftp = self.sftp().await?;
                transfer::upload(sftp, local, remote, cancel, progress, transfer_id).await
            },
        }
    }

    /// Best-effort close. Idempotent; `Closed` is absorbing.
    async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closing;
        self.sftp = None;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            debug!(id = self.id, "disconnect notification failed: {e}");
        }
        self.state = ConnectionState::Closed;
    }
}

/// Next channel message, honoring both the optional exec deadline and the
/// caller's cancel token. The borrow of the channel stays inside this
/// function so the caller can close it on error.
async fn next_channel_msg(
    channel: &mut russh::Channel<client::Msg>,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<Option<ChannelMsg>, CoreError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
        msg = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, channel.wait())
                    .await
                    .map_err(|_| CoreError::Exec("TIMEOUT".to_string())),
                None => Ok(channel.wait().await),
            }
        } => msg,
    }
}

/// Immutable connection facts shared with the pool map.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionHandle {
    pub(crate) id: u64,
    pub(crate) tx: mpsc::Sender<ConnOp>,
    pub(crate) server: ServerInfo,
    pub(crate) created_at: chrono::DateTime<chrono::Utc>,
}
