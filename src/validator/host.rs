// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Host, port, username, password, auth-type, and timeout grammar.

use std::net::Ipv6Addr;

use super::{ValidationError, ValidationReport};

/// Total hostname length cap per RFC 1123.
const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_USERNAME_LEN: usize = 32;
const MAX_PASSWORD_BYTES: usize = 256;

const HOST_FORBIDDEN: &[char] = &['@', ';', '|', '`', '$', '(', ')', '<', '>', '&'];

fn err(field: &str, code: &str, message: impl Into<String>) -> ValidationReport {
    ValidationReport::from_errors(vec![ValidationError::new(field, code, message)])
}

/// Accepts dotted-decimal IPv4, RFC-1123 hostnames, and bracket-less IPv6.
/// Rejects `user@host`, whitespace, shell metacharacters, and empty labels
/// (including the `a..b` double-dot form).
pub fn validate_host(host: &str) -> ValidationReport {
    if host.is_empty() {
        return err("host", "INVALID_HOST", "host must not be empty");
    }
    if host.len() > MAX_HOST_LEN {
        return err(
            "host",
            "INVALID_HOST",
            format!("host exceeds {MAX_HOST_LEN} characters"),
        );
    }
    if host.chars().any(char::is_whitespace) {
        return err("host", "INVALID_HOST", "host must not contain whitespace");
    }
    if host.contains(HOST_FORBIDDEN) {
        return err(
            "host",
            "INVALID_HOST",
            "host must not contain '@' or shell metacharacters",
        );
    }

    // All-numeric dotted strings must be a well-formed IPv4 address; falling
    // through to the hostname grammar would admit out-of-range octets.
    if host.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return if is_ipv4(host) {
            ValidationReport::ok()
        } else {
            err("host", "INVALID_HOST", "malformed IPv4 address")
        };
    }

    if host.contains(':') {
        return if host.parse::<Ipv6Addr>().is_ok() {
            ValidationReport::ok()
        } else {
            err("host", "INVALID_HOST", "malformed IPv6 address")
        };
    }

    for label in host.split('.') {
        if !is_hostname_label(label) {
            return err(
                "host",
                "INVALID_HOST",
                format!("invalid hostname label '{label}'"),
            );
        }
    }
    ValidationReport::ok()
}

fn is_ipv4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.parse::<u8>().is_ok())
}

fn is_hostname_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    let bytes = label.as_bytes();
    bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// Port must sit in `1..=65535`.
pub fn validate_port(port: u32) -> ValidationReport {
    if (1..=65535).contains(&port) {
        ValidationReport::ok()
    } else {
        err("port", "INVALID_PORT", "port must be in 1..=65535")
    }
}

/// 1-32 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> ValidationReport {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return err(
            "username",
            "INVALID_USERNAME",
            format!("username must be 1..={MAX_USERNAME_LEN} characters"),
        );
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
    {
        return err(
            "username",
            "INVALID_USERNAME",
            "username may only contain [A-Za-z0-9_.-]",
        );
    }
    ValidationReport::ok()
}

/// 1-256 bytes, any codepoint. Empty passwords are rejected outright.
pub fn validate_password(password: &str) -> ValidationReport {
    if password.is_empty() {
        return err("password", "INVALID_PASSWORD", "password must not be empty");
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return err(
            "password",
            "INVALID_PASSWORD",
            format!("password exceeds {MAX_PASSWORD_BYTES} bytes"),
        );
    }
    ValidationReport::ok()
}

pub fn validate_auth_type(auth_type: &str) -> ValidationReport {
    match auth_type {
        "password" | "key" | "both" => ValidationReport::ok(),
        other => err(
            "authType",
            "INVALID_AUTH_TYPE",
            format!("unknown auth type '{other}'"),
        ),
    }
}

/// Connect timeout in seconds, `1..=300`.
pub fn validate_timeout(seconds: u32) -> ValidationReport {
    if (1..=300).contains(&seconds) {
        ValidationReport::ok()
    } else {
        err(
            "timeoutSeconds",
            "INVALID_TIMEOUT",
            "timeoutSeconds must be in 1..=300",
        )
    }
}
