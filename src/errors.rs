// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use thiserror::Error;

use crate::validator::ValidationError;

/// Every failure that can cross the IPC boundary. The wire `code` of each
/// variant is stable; front-ends key user-visible messages off it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("request validation failed")]
    Validation { details: Vec<ValidationError> },

    #[error("no connection with id {0}")]
    NoConnection(u64),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("private key error: {0}")]
    PrivateKey(String),

    #[error("command execution failed: {0}")]
    Exec(String),

    #[error("SFTP subsystem unavailable: {0}")]
    Sftp(String),

    #[error("failed to read remote directory: {0}")]
    ReadDir(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Handler(String),
}

impl CoreError {
    /// Stable wire code for this error. The set is closed; front-ends
    /// switch on it.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NoConnection(_) => "NO_CONNECTION",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::PrivateKey(_) => "PRIVATE_KEY_ERROR",
            Self::Exec(_) => "EXEC_ERROR",
            Self::Sftp(_) => "SFTP_ERROR",
            Self::ReadDir(_) => "READDIR_ERROR",
            Self::Download(_) => "DOWNLOAD_ERROR",
            Self::Upload(_) => "UPLOAD_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Handler(_) => "HANDLER_ERROR",
        }
    }

    /// Wraps an internal failure as a `HANDLER_ERROR`, keeping the message
    /// short and free of filesystem paths or backtraces.
    pub fn handler(context: &str) -> Self {
        Self::Handler(context.to_string())
    }
}
