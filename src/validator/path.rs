// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Path rules shared by SFTP operations and key handling: traversal,
//! embedded NUL, length caps, and the remote system-path denylist.

use super::{ValidationError, ValidationReport};

const MAX_PATH_LEN: usize = 4096;

/// Remote prefixes no request may touch, regardless of auth.
const REMOTE_DENYLIST: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/root/.ssh",
    "/proc/",
    "/sys/",
    "/dev/",
    "/boot/",
    "C:\\Windows\\System32",
    "C:\\System Volume Information",
];

fn err(field: &str, code: &str, message: impl Into<String>) -> ValidationReport {
    ValidationReport::from_errors(vec![ValidationError::new(field, code, message)])
}

fn base_path_checks(field: &str, path: &str) -> Option<ValidationReport> {
    if path.is_empty() {
        return Some(err(field, "EMPTY", "path must not be empty"));
    }
    if path.len() > MAX_PATH_LEN {
        return Some(err(
            field,
            "TOO_LONG",
            format!("path exceeds {MAX_PATH_LEN} characters"),
        ));
    }
    if path.contains('\0') {
        return Some(err(field, "INVALID_PATH", "path contains an embedded NUL"));
    }
    if path.contains("..") {
        return Some(err(
            field,
            "PATH_TRAVERSAL",
            "path must not contain '..' segments",
        ));
    }
    None
}

/// Remote path: traversal and NUL rules plus the system-path denylist.
pub fn validate_remote_path(path: &str) -> ValidationReport {
    if let Some(report) = base_path_checks("remotePath", path) {
        return report;
    }
    for denied in REMOTE_DENYLIST {
        let hit = if denied.ends_with('/') {
            path.starts_with(denied) || path == &denied[..denied.len() - 1]
        } else {
            path.starts_with(denied)
        };
        if hit {
            return err(
                "remotePath",
                "FORBIDDEN_PATH",
                format!("access to '{denied}' is not permitted"),
            );
        }
    }
    ValidationReport::ok()
}

/// Local path: traversal and NUL rules only; the local side has no denylist.
pub fn validate_local_path(path: &str) -> ValidationReport {
    match base_path_checks("localPath", path) {
        Some(report) => report,
        None => ValidationReport::ok(),
    }
}

/// Private-key path: traversal rules plus a ban on `~` expansion and shell
/// metacharacters, since this string eventually reaches the filesystem layer.
pub fn validate_private_key_path(path: &str) -> ValidationReport {
    if path.is_empty() {
        return err("privateKeyPath", "EMPTY", "key path must not be empty");
    }
    if path.len() > MAX_PATH_LEN {
        return err(
            "privateKeyPath",
            "TOO_LONG",
            format!("key path exceeds {MAX_PATH_LEN} characters"),
        );
    }
    if path.contains("..") {
        return err(
            "privateKeyPath",
            "PATH_TRAVERSAL",
            "key path must not contain '..' segments",
        );
    }
    if path.contains('~') {
        return err(
            "privateKeyPath",
            "PATH_TRAVERSAL",
            "key path must not use '~' expansion",
        );
    }
    if path.contains(';') || path.contains('|') || path.contains('`') || path.contains("$(")
    {
        return err(
            "privateKeyPath",
            "SHELL_METACHAR",
            "key path must not contain shell metacharacters",
        );
    }
    ValidationReport::ok()
}
