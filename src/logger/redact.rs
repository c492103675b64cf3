// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Credential redaction. Two layers: the typed [`Sensitive`] wrapper, whose
//! serialization can never leak, and a recursive scrub of untyped metadata
//! for everything that arrives as plain JSON.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Metadata nesting deeper than this is replaced with `"[circular]"`.
/// `serde_json::Value` is a tree, so the cap plays the role a visited set
/// would for genuinely cyclic inputs.
const MAX_DEPTH: usize = 64;

/// Commands embedded in log metadata are clipped to this many characters.
pub const MAX_LOGGED_COMMAND: usize = 200;

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|passphrase|private.?key|secret|token|credential|authorization")
        .expect("redaction key pattern compiles")
});

static SENSITIVE_KV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(password|passphrase|private[-_.]?key|secret|token|credential|authorization)\b(\s*[=:]\s*)([^\s,;&"']+)"#,
    )
    .expect("redaction key=value pattern compiles")
});

/// Holds a secret that must never appear in logs, transcripts, progress
/// events, or serialized state. `Debug`, `Display`, and `Serialize` all
/// yield `"[REDACTED]"`; the value is reachable only through [`expose`].
///
/// [`expose`]: Sensitive::expose
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Deliberate access to the wrapped secret.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Sensitive)
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

/// True when a metadata key names credential material.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Scrubs `key=value` / `key: value` secrets inside free-form strings.
pub fn scrub_text(text: &str) -> String {
    SENSITIVE_KV
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{}{}{REDACTED}", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Recursively redacts a metadata value in place: credential-named keys are
/// replaced wholesale, string values are scrubbed for embedded secrets, and
/// `command` fields are clipped to [`MAX_LOGGED_COMMAND`] characters.
pub fn redact_value(value: &mut Value) {
    redact_at_depth(value, 0);
}

fn redact_at_depth(value: &mut Value, depth: usize) {
    if depth > MAX_DEPTH {
        *value = Value::String("[circular]".to_string());
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else if key == "command" {
                    if let Value::String(cmd) = entry {
                        clamp_command(cmd);
                        *cmd = scrub_text(cmd);
                    }
                } else {
                    redact_at_depth(entry, depth + 1);
                }
            }
        },
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_at_depth(item, depth + 1);
            }
        },
        Value::String(text) => {
            let scrubbed = scrub_text(text);
            if scrubbed != *text {
                *text = scrubbed;
            }
        },
        _ => {},
    }
}

fn clamp_command(command: &mut String) {
    if command.chars().count() > MAX_LOGGED_COMMAND {
        let clipped: String = command.chars().take(MAX_LOGGED_COMMAND).collect();
        *command = clipped;
    }
}
