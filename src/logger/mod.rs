// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! The user-facing structured log sink: leveled JSON-lines records with a
//! total redaction pass, daily size-capped files, and an in-memory ring for
//! inspection. Developer diagnostics go through `tracing` instead (see
//! `cfg::logger`); this sink is part of the product surface.

use std::{
    collections::VecDeque,
    io,
    path::Path,
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

pub mod redact;
pub mod rotate;

pub use redact::{REDACTED, Sensitive};
use redact::{redact_value, scrub_text};
use rotate::RollingLogFile;

/// Most recent records kept in memory for `recent()`.
const RING_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// One emitted record. Serialized as a single JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub context: String,
    pub message: String,
    pub metadata: Value,
    pub pid: u32,
}

#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub level: Level,
    pub console: bool,
    pub max_file_bytes: u64,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: Level::Info,
            console: false,
            max_file_bytes: rotate::DEFAULT_MAX_BYTES,
        }
    }
}

struct Shared {
    level: Level,
    console: bool,
    file: Mutex<RollingLogFile>,
    ring: Mutex<VecDeque<LogRecord>>,
    /// Disk writes that failed and were swallowed. Reported at Warn on the
    /// next successful write.
    dropped_writes: AtomicU64,
}

/// Cheap handle onto the shared sinks. `child()` stamps a different context
/// onto the same sinks and level.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    context: String,
}

impl Logger {
    pub fn new(logs_dir: impl Into<std::path::PathBuf>, options: LoggerOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                level: options.level,
                console: options.console,
                file: Mutex::new(RollingLogFile::new(logs_dir, options.max_file_bytes)),
                ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
                dropped_writes: AtomicU64::new(0),
            }),
            context: "core".to_string(),
        }
    }

    pub fn child(&self, context: &str) -> Logger {
        Logger {
            shared: Arc::clone(&self.shared),
            context: context.to_string(),
        }
    }

    pub fn debug(&self, message: &str, metadata: Value) {
        self.log(Level::Debug, message, metadata);
    }

    pub fn info(&self, message: &str, metadata: Value) {
        self.log(Level::Info, message, metadata);
    }

    pub fn warn(&self, message: &str, metadata: Value) {
        self.log(Level::Warn, message, metadata);
    }

    pub fn error(&self, message: &str, metadata: Value) {
        self.log(Level::Error, message, metadata);
    }

    /// Records an executed command with its duration. The command text is
    /// clipped to 200 characters by the redaction pass.
    pub fn log_command(&self, command: &str, duration_ms: u64) {
        self.info(
            "ssh command executed",
            json!({ "command": command, "durationMs": duration_ms }),
        );
    }

    /// Last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        let ring = match self.shared.ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.iter().rev().take(n).rev().cloned().collect()
    }

    /// Copies the current day's log file to `dest` for user download.
    pub fn export(&self, dest: &Path) -> io::Result<u64> {
        let source = {
            let file = match self.shared.file.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            file.current_path()
        };
        std::fs::copy(&source, dest)
    }

    /// Failed-write count since the last successful flush (test hook).
    pub fn dropped_writes(&self) -> u64 {
        self.shared.dropped_writes.load(Ordering::Relaxed)
    }

    fn log(&self, level: Level, message: &str, mut metadata: Value) {
        if level < self.shared.level {
            return;
        }

        redact_value(&mut metadata);
        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            context: self.context.clone(),
            message: scrub_text(message),
            metadata,
            pid: std::process::id(),
        };

        self.push_ring(record.clone());
        self.write_record(&record);
    }

    fn push_ring(&self, record: LogRecord) {
        let mut ring = match self.shared.ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    fn write_record(&self, record: &LogRecord) {
        let Ok(line) = serde_json::to_string(record) else {
            self.shared.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if self.shared.console {
            eprintln!("{line}");
        }

        let mut file = match self.shared.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match file.append_line(&line) {
            Ok(()) => {
                let dropped = self.shared.dropped_writes.swap(0, Ordering::Relaxed);
                if dropped > 0 {
                    let warn = LogRecord {
                        timestamp: Utc::now(),
                        level: Level::Warn,
                        context: self.context.clone(),
                        message: format!("{dropped} log writes were dropped"),
                        metadata: Value::Null,
                        pid: std::process::id(),
                    };
                    if let Ok(warn_line) = serde_json::to_string(&warn) {
                        let _ = file.append_line(&warn_line);
                    }
                    drop(file);
                    self.push_ring(warn);
                }
            },
            Err(_) => {
                self.shared.dropped_writes.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}
