// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quantumxfer::{
    cfg::{
        cli::{Cli, Command, exit_codes},
        config::{CoreConfig, SshConnection},
        logger::init_tracing,
    },
    errors::CoreError,
    keys::KeyManager,
    logger::{Logger, LoggerOptions},
    router::{NoDialog, Request, Router, envelope},
    session::SessionManager,
    store::Store,
    validator::{self, ConnectionRequest},
};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    // Blocking filesystem work (key generation, state writes) runs on a
    // small bounded pool.
    let blocking_threads = std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(4);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(blocking_threads)
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(run())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = match init_tracing() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            std::process::exit(exit_codes::FATAL);
        },
    };

    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(exit_codes::FATAL);
        },
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Connect {
            host,
            port,
            user,
            password_stdin,
            key,
            name,
        } => {
            let code = connect_probe(host, port, user, password_stdin, key, name).await?;
            std::process::exit(code);
        },
    }
}

/// The back-end loop: one JSON request per stdin line, one final response
/// per request on stdout, with transfer progress events interleaved.
async fn serve(config: CoreConfig) -> Result<()> {
    // Single writer task keeps stdout lines whole across concurrent
    // responses and progress events.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // Progress events enter the same outbound queue as responses, from the
    // transfer's own task. A transfer enqueues its last event before its
    // result unwinds to the dispatch task, so on stdout every progress
    // event precedes its transfer's final response.
    let progress_out = out_tx.clone();
    let sessions = SessionManager::with_progress(Arc::new(move |event| {
        let _ = progress_out.send(envelope::progress(&event));
    }));

    let store = Arc::new(Store::open(&config.state_dir));
    let keys = KeyManager::new(&config.state_dir);
    let logger = Logger::new(
        &config.logs_dir,
        LoggerOptions {
            level: config.log_level,
            ..LoggerOptions::default()
        },
    );
    let router = Arc::new(Router::new(
        Arc::clone(&sessions),
        store,
        keys,
        logger,
        Arc::new(NoDialog),
    ));

    info!("quantumxfer core serving on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt, shutting down");
                break;
            },
            line = lines.next_line() => line.context("stdin read failed")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("unparseable request line: {e}");
                let _ = out_tx.send(envelope::fail(
                    "",
                    &CoreError::Validation {
                        details: vec![validator::ValidationError::new(
                            "request",
                            "INVALID_PAYLOAD",
                            "request line is not a valid envelope",
                        )],
                    },
                ));
                continue;
            },
        };

        let router = Arc::clone(&router);
        let out = out_tx.clone();
        tokio::spawn(async move {
            let response = router.dispatch(request).await;
            let _ = out.send(response);
        });
    }

    sessions.shutdown().await;
    // The progress sink inside the pool holds an outbound sender; release
    // our handles so the writer drains in-flight responses and exits once
    // the last dispatch task finishes.
    drop(router);
    drop(sessions);
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// One-shot probe: connect, then immediately disconnect, mapping the
/// outcome onto the documented exit codes.
async fn connect_probe(
    host: String,
    port: u16,
    user: String,
    password_stdin: bool,
    key: Option<std::path::PathBuf>,
    name: Option<String>,
) -> Result<i32> {
    if !password_stdin && key.is_none() {
        eprintln!("either --password-stdin or --key is required");
        return Ok(exit_codes::VALIDATION);
    }

    let password = if password_stdin {
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("failed to read password from stdin")?;
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    } else {
        None
    };

    let request = ConnectionRequest {
        host,
        port: Some(port.into()),
        username: user,
        auth_type: if password_stdin { "password" } else { "key" }.to_string(),
        password,
        private_key_path: key.map(|p| p.display().to_string()),
        passphrase: None,
        timeout_seconds: None,
        name,
    };

    let report = validator::validate_connection(&request);
    if !report.valid {
        for err in &report.errors {
            eprintln!("{}: {} ({})", err.field, err.message, err.code);
        }
        return Ok(exit_codes::VALIDATION);
    }

    let cfg: SshConnection = match request.try_into() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_codes::VALIDATION);
        },
    };

    let (sessions, _progress_rx) = SessionManager::new();
    match sessions.connect(cfg).await {
        Ok(info) => {
            eprintln!(
                "connected to {}:{} as {} (connection {})",
                info.server_info.host,
                info.server_info.port,
                info.server_info.username,
                info.connection_id
            );
            let _ = sessions.disconnect(info.connection_id).await;
            Ok(exit_codes::OK)
        },
        Err(e) => {
            eprintln!("{e}");
            Ok(match e.code() {
                "AUTH_ERROR" => exit_codes::AUTH,
                "VALIDATION_ERROR" => exit_codes::VALIDATION,
                _ => exit_codes::CONNECTION,
            })
        },
    }
}
