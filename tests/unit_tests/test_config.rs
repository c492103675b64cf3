// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::Result;
use quantumxfer::{
    cfg::config::{CoreConfig, LOG_LEVEL_ENV, STATE_DIR_ENV, SshConnection},
    logger::Level,
    validator::ConnectionRequest,
};
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn state_dir_env_override_wins() -> Result<()> {
    let dir = tempdir()?;
    unsafe {
        std::env::set_var(STATE_DIR_ENV, dir.path());
        std::env::remove_var(LOG_LEVEL_ENV);
    }

    let config = CoreConfig::from_env()?;
    assert_eq!(config.state_dir, dir.path());
    assert_eq!(config.logs_dir, dir.path().join("logs"));
    assert_eq!(config.log_level, Level::Info);

    unsafe {
        std::env::remove_var(STATE_DIR_ENV);
    }
    Ok(())
}

#[test]
#[serial]
fn log_level_env_is_parsed() -> Result<()> {
    let dir = tempdir()?;
    unsafe {
        std::env::set_var(STATE_DIR_ENV, dir.path());
        std::env::set_var(LOG_LEVEL_ENV, "debug");
    }

    let config = CoreConfig::from_env()?;
    assert_eq!(config.log_level, Level::Debug);

    unsafe {
        std::env::remove_var(STATE_DIR_ENV);
        std::env::remove_var(LOG_LEVEL_ENV);
    }
    Ok(())
}

fn wire_request(auth_type: &str) -> ConnectionRequest {
    serde_json::from_value(serde_json::json!({
        "host": "example.com",
        "username": "deploy",
        "authType": auth_type,
        "password": "sup3rs3cret",
        "privateKeyPath": "/home/deploy/.ssh/id_ed25519",
    }))
    .expect("request deserializes")
}

#[test]
fn connection_defaults_port_and_timeout() -> Result<()> {
    let cfg = SshConnection::try_from(wire_request("password"))?;
    assert_eq!(cfg.port, 22);
    assert_eq!(cfg.timeout.as_secs(), 30);
    assert!(cfg.name.is_none());
    Ok(())
}

#[test]
fn auth_sum_matches_auth_type() -> Result<()> {
    use quantumxfer::cfg::config::Auth;

    let cfg = SshConnection::try_from(wire_request("password"))?;
    assert!(matches!(cfg.auth, Auth::Password { .. }));

    let cfg = SshConnection::try_from(wire_request("key"))?;
    assert!(matches!(cfg.auth, Auth::Key { .. }));

    let cfg = SshConnection::try_from(wire_request("both"))?;
    assert!(matches!(cfg.auth, Auth::Both { .. }));
    Ok(())
}

#[test]
fn blank_profile_names_are_discarded() -> Result<()> {
    let mut request = wire_request("password");
    request.name = Some("   ".to_string());
    let cfg = SshConnection::try_from(request)?;
    assert!(cfg.name.is_none());
    Ok(())
}

#[test]
fn debug_output_never_contains_credentials() -> Result<()> {
    let cfg = SshConnection::try_from(wire_request("both"))?;
    let rendered = format!("{cfg:?}");
    assert!(
        !rendered.contains("sup3rs3cret"),
        "debug output leaked: {rendered}"
    );
    assert!(rendered.contains("[REDACTED]"));
    Ok(())
}
