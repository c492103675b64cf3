// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Typed request dispatch. Every channel goes through the same gate:
//! deserialize the payload, run the matching validators, then invoke the
//! handler. Handler failures come back as closed-set error codes with
//! short, path-free messages.

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    cfg::config::SshConnection,
    errors::CoreError,
    keys::{GenerateKeyOptions, ImportKeyOptions, KeyManager},
    logger::Logger,
    router::{
        channels::{
            CancelTransferPayload, DialogOpenPayload, DisconnectPayload,
            DownloadPayload, ExecutePayload, HistoryAppendPayload, HistorySavePayload,
            ListDirectoryPayload, ListRecursivePayload, LogsWritePayload,
            RemotePathPayload, RenamePayload, UploadPayload,
        },
        envelope::{self, Request},
    },
    session::SessionManager,
    store::{Profile, Store, TranscriptEntry, transcript},
    validator::{
        self, ValidationError, ValidationReport, validate_command,
        validate_local_path, validate_remote_path,
    },
};

/// Host-provided directory picker. The OS dialog lives in the front-end
/// process; headless deployments plug in [`NoDialog`].
pub trait DialogHost: Send + Sync {
    /// Returns the chosen directory, or `None` when the user cancelled.
    fn pick_directory(&self, properties: &[String], title: Option<&str>) -> Option<String>;
}

/// Dialog host for headless operation: every pick is cancelled.
pub struct NoDialog;

impl DialogHost for NoDialog {
    fn pick_directory(
        &self,
        _properties: &[String],
        _title: Option<&str>,
    ) -> Option<String> {
        None
    }
}

pub struct Router {
    sessions: Arc<SessionManager>,
    store: Arc<Store>,
    keys: KeyManager,
    logger: Logger,
    dialog: Arc<dyn DialogHost>,
    /// Logs directory per connection, resolved from the profile named at
    /// connect time; drives transcript mirroring.
    transcript_dirs: DashMap<u64, PathBuf>,
}

impl Router {
    pub fn new(
        sessions: Arc<SessionManager>,
        store: Arc<Store>,
        keys: KeyManager,
        logger: Logger,
        dialog: Arc<dyn DialogHost>,
    ) -> Self {
        Self {
            sessions,
            store,
            keys,
            logger,
            dialog,
            transcript_dirs: DashMap::new(),
        }
    }

    /// The single entry point: one request in, one final response out.
    pub async fn dispatch(&self, req: Request) -> Value {
        let id = req.id.clone();
        match self.route(req).await {
            Ok(fields) => envelope::ok(&id, fields),
            Err(err) => {
                if matches!(err, CoreError::Handler(_)) {
                    self.logger
                        .error("request handler failed", json!({ "requestId": id }));
                }
                envelope::fail(&id, &err)
            },
        }
    }

    async fn route(&self, req: Request) -> Result<Value, CoreError> {
        match req.channel.as_str() {
            "ssh-connect" => self.ssh_connect(req.payload).await,
            "ssh-execute-command" => self.ssh_execute(req.payload).await,
            "ssh-list-directory" => self.ssh_list_directory(req.payload).await,
            "ssh-list-directory-recursive" => self.ssh_list_recursive(req.payload).await,
            "ssh-download-file" => self.ssh_download(req.payload).await,
            "ssh-upload-file" => self.ssh_upload(req.payload).await,
            "ssh-create-directory" => self.ssh_create_directory(req.payload).await,
            "ssh-delete-item" => self.ssh_delete_item(req.payload).await,
            "ssh-rename-item" => self.ssh_rename_item(req.payload).await,
            "ssh-disconnect" => self.ssh_disconnect(req.payload).await,
            "ssh-cancel-transfer" => self.ssh_cancel_transfer(req.payload).await,
            "profiles-load" => self.profiles_load().await,
            "profiles-save" => self.profiles_save(req.payload).await,
            "command-history-load" => self.history_load().await,
            "command-history-append" => self.history_append(req.payload).await,
            "command-history-save" => self.history_save(req.payload).await,
            "keys-list" => self.keys_list().await,
            "keys-generate" => self.keys_generate(req.payload).await,
            "keys-import" => self.keys_import(req.payload).await,
            "logs-write" => self.logs_write(req.payload).await,
            "dialog-open" => self.dialog_open(req.payload),
            other => Err(CoreError::Validation {
                details: vec![ValidationError::new(
                    "channel",
                    "UNKNOWN_CHANNEL",
                    format!("unknown channel '{other}'"),
                )],
            }),
        }
    }

    // --- ssh ---

    async fn ssh_connect(&self, payload: Value) -> Result<Value, CoreError> {
        let request: validator::ConnectionRequest = parse(payload)?;
        check(validator::validate_connection(&request))?;

        let cfg = SshConnection::try_from(request)?;
        let profile_name = cfg.name.clone();
        let info = self.sessions.connect(cfg).await?;

        // Connect bookkeeping runs only for requests that named a profile.
        if let Some(name) = profile_name {
            if let Err(e) = self.store.touch_profile(&name).await {
                error!("profile bookkeeping failed: {e}");
            }
            match self.store.profile_logs_directory(&name).await {
                Ok(Some(dir)) => {
                    self.transcript_dirs
                        .insert(info.connection_id, PathBuf::from(dir));
                },
                Ok(None) => {},
                Err(e) => error!("profile lookup failed: {e}"),
            }
        }

        let fields = to_fields(&info)?;
        self.logger.child("session").info(
            "SSH connection established",
            json!({
                "connectionId": info.connection_id,
                "host": info.server_info.host,
                "username": info.server_info.username,
                "port": info.server_info.port,
            }),
        );
        Ok(fields)
    }

    async fn ssh_execute(&self, payload: Value) -> Result<Value, CoreError> {
        let request: ExecutePayload = parse(payload)?;
        check(validate_command(&request.command))?;
        if let Some(seconds) = request.timeout_seconds
            && !(1..=3600).contains(&seconds)
        {
            return Err(CoreError::Validation {
                details: vec![ValidationError::new(
                    "timeoutSeconds",
                    "INVALID_TIMEOUT",
                    "command timeout must be in 1..=3600",
                )],
            });
        }

        let timeout = request
            .timeout_seconds
            .map(|s| std::time::Duration::from_secs(s.into()));
        let result = self
            .sessions
            .execute(request.connection_id, &request.command, timeout, None)
            .await?;

        self.logger
            .child("session")
            .log_command(&request.command, result.duration_ms);
        if let Err(e) = self.store.append_command(&request.command).await {
            error!("history append failed: {e}");
        }
        self.mirror_transcript(request.connection_id, &request.command, &result)
            .await;

        to_fields(&result)
    }

    async fn ssh_list_directory(&self, payload: Value) -> Result<Value, CoreError> {
        let request: ListDirectoryPayload = parse(payload)?;
        check(validate_remote_path(&request.remote_path))?;
        let entries = self
            .sessions
            .list_directory(request.connection_id, &request.remote_path)
            .await?;
        Ok(json!({ "entries": entries }))
    }

    async fn ssh_list_recursive(&self, payload: Value) -> Result<Value, CoreError> {
        let request: ListRecursivePayload = parse(payload)?;
        check(validate_remote_path(&request.root))?;
        let listing = self
            .sessions
            .list_directory_recursive(request.connection_id, &request.root, request.opts)
            .await?;
        to_fields(&listing)
    }

    async fn ssh_download(&self, payload: Value) -> Result<Value, CoreError> {
        let request: DownloadPayload = parse(payload)?;
        let mut report = validate_remote_path(&request.remote_path);
        report.merge(validate_local_path(&request.local_path));
        check(report)?;

        let summary = self
            .sessions
            .download(
                request.connection_id,
                &request.remote_path,
                std::path::Path::new(&request.local_path),
            )
            .await?;
        to_fields(&summary)
    }

    async fn ssh_upload(&self, payload: Value) -> Result<Value, CoreError> {
        let request: UploadPayload = parse(payload)?;
        let mut report = validate_local_path(&request.local_path);
        report.merge(validate_remote_path(&request.remote_path));
        check(report)?;

        let summary = self
            .sessions
            .upload(
                request.connection_id,
                std::path::Path::new(&request.local_path),
                &request.remote_path,
            )
            .await?;
        to_fields(&summary)
    }

    async fn ssh_create_directory(&self, payload: Value) -> Result<Value, CoreError> {
        let request: RemotePathPayload = parse(payload)?;
        check(validate_remote_path(&request.remote_path))?;
        self.sessions
            .create_directory(request.connection_id, &request.remote_path)
            .await?;
        Ok(json!({ "path": request.remote_path }))
    }

    async fn ssh_delete_item(&self, payload: Value) -> Result<Value, CoreError> {
        let request: RemotePathPayload = parse(payload)?;
        check(validate_remote_path(&request.remote_path))?;
        self.sessions
            .remove_path(request.connection_id, &request.remote_path)
            .await?;
        Ok(json!({ "path": request.remote_path }))
    }

    async fn ssh_rename_item(&self, payload: Value) -> Result<Value, CoreError> {
        let request: RenamePayload = parse(payload)?;
        let mut report = validate_remote_path(&request.from_path);
        report.merge(validate_remote_path(&request.to_path));
        check(report)?;
        self.sessions
            .rename_path(request.connection_id, &request.from_path, &request.to_path)
            .await?;
        Ok(json!({ "from": request.from_path, "to": request.to_path }))
    }

    async fn ssh_disconnect(&self, payload: Value) -> Result<Value, CoreError> {
        let request: DisconnectPayload = parse(payload)?;
        self.sessions.disconnect(request.connection_id).await?;
        self.transcript_dirs.remove(&request.connection_id);
        Ok(json!({ "message": "disconnected" }))
    }

    async fn ssh_cancel_transfer(&self, payload: Value) -> Result<Value, CoreError> {
        let request: CancelTransferPayload = parse(payload)?;
        let cancelled = self.sessions.cancel_transfer(&request.transfer_id);
        Ok(json!({ "cancelled": cancelled }))
    }

    // --- store ---

    async fn profiles_load(&self) -> Result<Value, CoreError> {
        let profiles = self
            .store
            .load_profiles()
            .await
            .map_err(|e| store_error("profile store read failed", e))?;
        Ok(json!({ "profiles": profiles }))
    }

    async fn profiles_save(&self, payload: Value) -> Result<Value, CoreError> {
        let profiles: Vec<Profile> = parse(payload)?;
        let saved = self
            .store
            .save_profiles(profiles)
            .await
            .map_err(|e| store_error("profile store write failed", e))?;
        Ok(json!({ "saved": saved }))
    }

    async fn history_load(&self) -> Result<Value, CoreError> {
        let commands = self
            .store
            .load_history()
            .await
            .map_err(|e| store_error("command history read failed", e))?;
        Ok(json!({ "commands": commands }))
    }

    async fn history_append(&self, payload: Value) -> Result<Value, CoreError> {
        let request: HistoryAppendPayload = parse(payload)?;
        let length = self
            .store
            .append_command(&request.command)
            .await
            .map_err(|e| store_error("command history write failed", e))?;
        Ok(json!({ "length": length }))
    }

    async fn history_save(&self, payload: Value) -> Result<Value, CoreError> {
        let request: HistorySavePayload = parse(payload)?;
        let length = self
            .store
            .save_history(request.commands)
            .await
            .map_err(|e| store_error("command history write failed", e))?;
        Ok(json!({ "length": length }))
    }

    // --- keys ---

    async fn keys_list(&self) -> Result<Value, CoreError> {
        let keys = self
            .keys
            .list()
            .await
            .map_err(|e| store_error("key listing failed", e))?;
        Ok(json!({ "keys": keys }))
    }

    async fn keys_generate(&self, payload: Value) -> Result<Value, CoreError> {
        let options: GenerateKeyOptions = parse(payload)?;
        let record = self
            .keys
            .generate(options)
            .await
            .map_err(|e| store_error("key generation failed", e))?;
        self.logger.child("keys").info(
            "key pair generated",
            json!({ "name": record.name, "fingerprint": record.fingerprint }),
        );
        Ok(json!({ "key": record }))
    }

    async fn keys_import(&self, payload: Value) -> Result<Value, CoreError> {
        let options: ImportKeyOptions = parse(payload)?;
        let record = self
            .keys
            .import(options)
            .await
            .map_err(|e| store_error("key import failed", e))?;
        Ok(json!({ "key": record }))
    }

    // --- misc ---

    async fn logs_write(&self, payload: Value) -> Result<Value, CoreError> {
        let request: LogsWritePayload = parse(payload)?;
        check(validate_local_path(&request.directory))?;
        let path = transcript::append_text_log(
            std::path::Path::new(&request.directory),
            &request.text,
        )
        .await
        .map_err(|e| store_error("log write failed", e))?;
        Ok(json!({ "path": path.display().to_string() }))
    }

    fn dialog_open(&self, payload: Value) -> Result<Value, CoreError> {
        let request: DialogOpenPayload = parse(payload)?;
        match self
            .dialog
            .pick_directory(&request.properties, request.title.as_deref())
        {
            Some(path) => Ok(json!({ "canceled": false, "path": path })),
            None => Ok(json!({ "canceled": true })),
        }
    }

    /// Mirrors one executed command into the connection's logs directory,
    /// when the connect request named a profile that configured one.
    async fn mirror_transcript(
        &self,
        connection_id: u64,
        command: &str,
        result: &crate::session::ExecResult,
    ) {
        let Some(dir) = self
            .transcript_dirs
            .get(&connection_id)
            .map(|d| d.clone())
        else {
            return;
        };
        let entry = TranscriptEntry {
            id: 0,
            timestamp: chrono::Utc::now(),
            command: command.to_string(),
            output: if result.stderr.is_empty() {
                result.stdout.clone()
            } else {
                format!("{}\n{}", result.stdout, result.stderr)
            },
            directory: "~".to_string(),
        };
        if let Err(e) = transcript::append_transcript(&dir, &entry).await {
            error!("transcript mirror failed: {e}");
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, CoreError> {
    serde_json::from_value(payload).map_err(|e| CoreError::Validation {
        details: vec![ValidationError::new(
            "payload",
            "INVALID_PAYLOAD",
            e.to_string(),
        )],
    })
}

fn check(report: ValidationReport) -> Result<(), CoreError> {
    if report.valid {
        Ok(())
    } else {
        Err(CoreError::Validation {
            details: report.errors,
        })
    }
}

fn to_fields<T: serde::Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value)
        .map_err(|_| CoreError::handler("response encoding failed"))
}

/// Collapses a store/key failure into a short `HANDLER_ERROR`, logging the
/// detail through tracing only.
fn store_error(context: &'static str, err: anyhow::Error) -> CoreError {
    error!("{context}: {err:#}");
    CoreError::handler(context)
}
