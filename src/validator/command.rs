// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Command and crypto-suite rules. Commands run non-interactively on the
//! remote side, so anything that could splice a second command or redirect
//! into a device file is refused before it reaches a transport.

use super::{ValidationError, ValidationReport};

const MAX_COMMAND_LEN: usize = 4096;

/// Negotiable ciphers. Everything outside this list is considered legacy.
pub const ALLOWED_CIPHERS: &[&str] = &[
    "aes128-ctr",
    "aes256-ctr",
    "aes128-gcm@openssh.com",
    "aes256-gcm@openssh.com",
    "chacha20-poly1305@openssh.com",
];

/// Key-exchange methods: curve25519, NIST ECDH, and group14-sha256 or
/// stronger finite-field groups.
pub const ALLOWED_KEX: &[&str] = &[
    "curve25519-sha256",
    "curve25519-sha256@libssh.org",
    "ecdh-sha2-nistp256",
    "ecdh-sha2-nistp384",
    "ecdh-sha2-nistp521",
    "diffie-hellman-group14-sha256",
    "diffie-hellman-group16-sha512",
    "diffie-hellman-group18-sha512",
];

pub const ALLOWED_COMPRESSION: &[&str] = &["none", "zlib", "zlib@openssh.com"];

fn err(field: &str, code: &str, message: impl Into<String>) -> ValidationReport {
    ValidationReport::from_errors(vec![ValidationError::new(field, code, message)])
}

/// Rejects shell metacharacters (`;`, `|`, backtick, `$(`) and redirection
/// into `/dev/*` or `/proc/*`. The blanket pipe rejection also covers pipes
/// into networking utilities such as `nc` and `telnet`.
pub fn validate_command(command: &str) -> ValidationReport {
    if command.is_empty() {
        return err("command", "EMPTY", "command must not be empty");
    }
    if command.len() > MAX_COMMAND_LEN {
        return err(
            "command",
            "TOO_LONG",
            format!("command exceeds {MAX_COMMAND_LEN} characters"),
        );
    }
    if command.contains(';') || command.contains('|') || command.contains('`') {
        return err(
            "command",
            "SHELL_METACHAR",
            "command must not contain ';', '|', or '`'",
        );
    }
    if command.contains("$(") {
        return err(
            "command",
            "SHELL_METACHAR",
            "command must not contain '$(' substitution",
        );
    }
    if redirects_into_device(command) {
        return err(
            "command",
            "SHELL_METACHAR",
            "command must not redirect into /dev or /proc",
        );
    }
    ValidationReport::ok()
}

/// Looks for `>` (or `>>`) followed by optional whitespace and a device or
/// proc path.
fn redirects_into_device(command: &str) -> bool {
    let bytes = command.as_bytes();
    for (idx, b) in bytes.iter().enumerate() {
        if *b != b'>' {
            continue;
        }
        let rest = command[idx + 1..].trim_start_matches('>').trim_start();
        if rest.starts_with("/dev/") || rest.starts_with("/proc/") {
            return true;
        }
    }
    false
}

pub fn validate_cipher(name: &str) -> ValidationReport {
    if ALLOWED_CIPHERS.contains(&name) {
        ValidationReport::ok()
    } else {
        err(
            "cipher",
            "INVALID_CIPHER",
            format!("cipher '{name}' is not in the allow-list"),
        )
    }
}

pub fn validate_kex(name: &str) -> ValidationReport {
    if ALLOWED_KEX.contains(&name) {
        ValidationReport::ok()
    } else {
        err(
            "kex",
            "INVALID_KEX",
            format!("key exchange '{name}' is not in the allow-list"),
        )
    }
}

pub fn validate_compression(name: &str) -> ValidationReport {
    if ALLOWED_COMPRESSION.contains(&name) {
        ValidationReport::ok()
    } else {
        err(
            "compression",
            "INVALID_COMPRESSION",
            format!("compression '{name}' is not in the allow-list"),
        )
    }
}
