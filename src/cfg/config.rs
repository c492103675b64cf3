// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result, ensure};

use crate::{
    errors::CoreError,
    logger::{Level, Sensitive},
    validator::ConnectionRequest,
};

/// Overrides the per-user state root.
pub const STATE_DIR_ENV: &str = "QUANTUMXFER_STATE_DIR";
/// Controls both the tracing filter and the structured-log threshold.
pub const LOG_LEVEL_ENV: &str = "QUANTUMXFER_LOG_LEVEL";

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root for profiles, command history, and keys.
    pub state_dir: PathBuf,
    /// Where the structured log sink writes its dated files.
    pub logs_dir: PathBuf,
    pub log_level: Level,
}

impl CoreConfig {
    /// Resolves directories from the environment and verifies the state root
    /// is writable. An unwritable state directory is fatal at startup.
    pub fn from_env() -> Result<Self> {
        let state_dir = resolve_state_dir()?;
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("state directory {state_dir:?} is not writable"))?;

        let probe = state_dir.join(".writable");
        fs::write(&probe, b"ok")
            .with_context(|| format!("state directory {state_dir:?} is not writable"))?;
        let _ = fs::remove_file(&probe);

        let logs_dir = state_dir.join("logs");
        let log_level = env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Level::Info);

        Ok(Self {
            state_dir,
            logs_dir,
            log_level,
        })
    }
}

fn resolve_state_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(STATE_DIR_ENV) {
        ensure!(!dir.is_empty(), "{STATE_DIR_ENV} must not be empty");
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|base| base.join("quantumxfer"))
        .context("no per-user data directory on this platform")
}

/// Credential material for one connection attempt. The tagged sum makes a
/// missing credential unrepresentable once the wire payload has been
/// narrowed.
#[derive(Debug, Clone)]
pub enum Auth {
    Password {
        password: Sensitive<String>,
    },
    Key {
        private_key_path: PathBuf,
        passphrase: Option<Sensitive<String>>,
    },
    Both {
        password: Sensitive<String>,
        private_key_path: PathBuf,
        passphrase: Option<Sensitive<String>>,
    },
}

/// A validated, fully-defaulted connection config: the input to
/// `SessionManager::connect`.
#[derive(Debug, Clone)]
pub struct SshConnection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
    pub timeout: Duration,
    /// When present and non-empty, connect bookkeeping touches the profile
    /// with this name.
    pub name: Option<String>,
}

impl TryFrom<ConnectionRequest> for SshConnection {
    type Error = CoreError;

    /// Narrows a validated wire payload. The validator has already enforced
    /// the agreement between `authType` and the credential fields; anything
    /// still missing here is reported as a validation failure rather than a
    /// panic.
    fn try_from(req: ConnectionRequest) -> Result<Self, Self::Error> {
        let missing = |field: &str| CoreError::Validation {
            details: vec![crate::validator::ValidationError::new(
                field,
                "AUTH_MISSING",
                "credential field required by authType is absent",
            )],
        };

        let passphrase = req.passphrase.map(Sensitive::new);
        let auth = match req.auth_type.as_str() {
            "password" => Auth::Password {
                password: Sensitive::new(req.password.ok_or_else(|| missing("password"))?),
            },
            "key" => Auth::Key {
                private_key_path: PathBuf::from(
                    req.private_key_path.ok_or_else(|| missing("privateKeyPath"))?,
                ),
                passphrase,
            },
            "both" => Auth::Both {
                password: Sensitive::new(req.password.ok_or_else(|| missing("password"))?),
                private_key_path: PathBuf::from(
                    req.private_key_path.ok_or_else(|| missing("privateKeyPath"))?,
                ),
                passphrase,
            },
            _ => {
                return Err(CoreError::Validation {
                    details: vec![crate::validator::ValidationError::new(
                        "authType",
                        "INVALID_AUTH_TYPE",
                        "authType must be one of password, key, both",
                    )],
                });
            },
        };

        Ok(Self {
            host: req.host,
            port: req.port.map_or(DEFAULT_SSH_PORT, |p| p as u16),
            username: req.username,
            auth,
            timeout: req
                .timeout_seconds
                .map_or(DEFAULT_CONNECT_TIMEOUT, |s| Duration::from_secs(s.into())),
            name: req.name.filter(|n| !n.trim().is_empty()),
        })
    }
}
