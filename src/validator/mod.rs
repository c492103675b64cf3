// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Pure request validation at the trust boundary. Everything here is
//! synchronous and side-effect free; the router refuses to invoke a handler
//! until the relevant report comes back clean.

use serde::{Deserialize, Serialize};

pub mod command;
pub mod host;
pub mod keys;
pub mod path;

pub use command::{
    validate_cipher, validate_command, validate_compression, validate_kex,
};
pub use host::{
    validate_auth_type, validate_host, validate_password, validate_port,
    validate_timeout, validate_username,
};
pub use keys::{validate_private_key_blob, validate_public_key_blob};
pub use path::{validate_local_path, validate_private_key_path, validate_remote_path};

/// A single rejected field. `code` is stable and travels in the
/// `VALIDATION_ERROR` envelope as `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of a validator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
    }
}

/// Wire shape of an `ssh-connect` payload, before it is narrowed into the
/// tagged [`crate::cfg::config::Auth`] sum. Field names follow the IPC
/// contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub host: String,
    #[serde(default)]
    pub port: Option<u32>,
    pub username: String,
    pub auth_type: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Composite `SSHConnection` check: every field rule, then the agreement
/// between `authType` and the credential fields that are actually present.
pub fn validate_connection(req: &ConnectionRequest) -> ValidationReport {
    let mut report = validate_host(&req.host);

    if let Some(port) = req.port {
        report.merge(validate_port(port));
    }
    report.merge(validate_username(&req.username));
    report.merge(validate_auth_type(&req.auth_type));
    if let Some(timeout) = req.timeout_seconds {
        report.merge(validate_timeout(timeout));
    }
    if let Some(password) = &req.password {
        report.merge(validate_password(password));
    }
    if let Some(path) = &req.private_key_path {
        report.merge(validate_private_key_path(path));
    }

    let wants_password = matches!(req.auth_type.as_str(), "password" | "both");
    let wants_key = matches!(req.auth_type.as_str(), "key" | "both");

    let mut errors = Vec::new();
    if wants_password && req.password.as_deref().is_none_or(str::is_empty) {
        errors.push(ValidationError::new(
            "password",
            "AUTH_MISSING",
            format!("authType '{}' requires a password", req.auth_type),
        ));
    }
    if wants_key && req.private_key_path.as_deref().is_none_or(str::is_empty) {
        errors.push(ValidationError::new(
            "privateKeyPath",
            "AUTH_MISSING",
            format!("authType '{}' requires a private key path", req.auth_type),
        ));
    }
    report.merge(ValidationReport::from_errors(errors));
    report
}
