// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Daily log files with a byte cap. The active file is
//! `quantumxfer-YYYY-MM-DD.log`; when it would exceed the cap it is renamed
//! to the next free `quantumxfer-YYYY-MM-DD.N.log` ordinal and a fresh file
//! is opened. Appends are line-granular and flushed on every write.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const FILE_PREFIX: &str = "quantumxfer";

pub struct RollingLogFile {
    dir: PathBuf,
    max_bytes: u64,
    current: Option<OpenFile>,
}

struct OpenFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
    written: u64,
}

impl RollingLogFile {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file the next append would land in.
    pub fn current_path(&self) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}-{}.log", Local::now().format("%Y-%m-%d")))
    }

    /// Appends one line, rolling the date or the ordinal first if needed.
    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        let today = Local::now().date_naive();
        let needs_open = match &self.current {
            Some(open) => open.date != today,
            None => true,
        };
        if needs_open {
            self.open_for(today)?;
        }

        let line_len = line.len() as u64 + 1;
        if let Some(open) = &self.current
            && open.written + line_len > self.max_bytes
            && open.written > 0
        {
            self.rotate_current()?;
            self.open_for(today)?;
        }

        if let Some(open) = &mut self.current {
            open.file.write_all(line.as_bytes())?;
            open.file.write_all(b"\n")?;
            open.file.flush()?;
            open.written += line_len;
        }
        Ok(())
    }

    fn open_for(&mut self, date: NaiveDate) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{FILE_PREFIX}-{}.log", date.format("%Y-%m-%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.current = Some(OpenFile {
            date,
            path,
            file,
            written,
        });
        Ok(())
    }

    /// Renames the active file to the next free ordinal suffix.
    fn rotate_current(&mut self) -> io::Result<()> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        drop(open.file);

        let stem = format!("{FILE_PREFIX}-{}", open.date.format("%Y-%m-%d"));
        let mut ordinal = 1u32;
        loop {
            let candidate = self.dir.join(format!("{stem}.{ordinal}.log"));
            if !candidate.exists() {
                fs::rename(&open.path, &candidate)?;
                return Ok(());
            }
            ordinal += 1;
        }
    }
}
