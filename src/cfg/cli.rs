// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Process exit codes for the `connect` probe.
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const VALIDATION: i32 = 2;
    pub const CONNECTION: i32 = 3;
    pub const AUTH: i32 = 4;
    /// Startup failure (unwritable state directory, subscriber init).
    pub const FATAL: i32 = 5;
}

#[derive(Debug, Parser)]
#[command(
    name = "quantumxfer",
    about = "SSH/SFTP session core for the QuantumXfer client",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the back-end: JSON-lines requests on stdin, responses and
    /// progress events on stdout.
    Serve,
    /// Connect to a host, then immediately disconnect. Exits 0 on success,
    /// 2 on validation failure, 3 on connection failure, 4 on auth failure.
    Connect {
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 22)]
        port: u16,
        #[arg(long = "user")]
        user: String,
        /// Read the password from the first line of stdin.
        #[arg(long, conflicts_with = "key")]
        password_stdin: bool,
        /// Authenticate with this private key file.
        #[arg(long)]
        key: Option<PathBuf>,
        /// Profile name for connect bookkeeping.
        #[arg(long)]
        name: Option<String>,
    },
}
