// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

use anyhow::Result;
use quantumxfer::keys::{GenerateKeyOptions, ImportKeyOptions, KeyManager, KeyType};
use tempfile::tempdir;

fn generate_opts(name: &str, key_type: KeyType) -> GenerateKeyOptions {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "type": match key_type {
            KeyType::Rsa => "rsa",
            KeyType::Ed25519 => "ed25519",
            KeyType::Ecdsa => "ecdsa",
        },
    }))
    .expect("options deserialize")
}

#[tokio::test]
async fn generate_then_list_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let manager = KeyManager::new(dir.path());

    let record = manager.generate(generate_opts("deploy", KeyType::Ed25519)).await?;
    assert_eq!(record.key_type, KeyType::Ed25519);
    assert!(record.fingerprint.starts_with("SHA256:"));
    assert!(record.private_key_path.exists());
    assert!(record.public_key_path.exists());

    let listed = manager.list().await?;
    let found = listed
        .iter()
        .find(|k| k.name == "deploy")
        .expect("generated key is listed");
    assert_eq!(found.key_type, KeyType::Ed25519);
    assert_eq!(found.fingerprint, record.fingerprint);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn private_keys_are_owner_only() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let manager = KeyManager::new(dir.path());
    let record = manager.generate(generate_opts("strict", KeyType::Ed25519)).await?;

    let private = std::fs::metadata(&record.private_key_path)?.permissions();
    assert_eq!(private.mode() & 0o777, 0o600);
    let public = std::fs::metadata(&record.public_key_path)?.permissions();
    assert_eq!(public.mode() & 0o777, 0o644);
    Ok(())
}

#[tokio::test]
async fn generate_rejects_duplicates_and_bad_names() -> Result<()> {
    let dir = tempdir()?;
    let manager = KeyManager::new(dir.path());

    manager.generate(generate_opts("dup", KeyType::Ed25519)).await?;
    assert!(manager.generate(generate_opts("dup", KeyType::Ed25519)).await.is_err());

    for name in ["", "../escape", "a/b", ".hidden", "bad name"] {
        assert!(
            manager.generate(generate_opts(name, KeyType::Ed25519)).await.is_err(),
            "expected '{name}' to be rejected"
        );
    }
    Ok(())
}

#[tokio::test]
async fn generated_material_imports_elsewhere() -> Result<()> {
    let source_dir = tempdir()?;
    let source = KeyManager::new(source_dir.path());
    let record = source.generate(generate_opts("mover", KeyType::Ed25519)).await?;

    let private_key = std::fs::read_to_string(&record.private_key_path)?;
    let public_key = std::fs::read_to_string(&record.public_key_path)?;

    let dest_dir = tempdir()?;
    let dest = KeyManager::new(dest_dir.path());
    let imported = dest
        .import(ImportKeyOptions {
            name: "mover".to_string(),
            private_key,
            public_key: Some(public_key),
        })
        .await?;

    assert_eq!(imported.fingerprint, record.fingerprint);
    assert_eq!(imported.key_type, KeyType::Ed25519);
    assert!(imported.private_key_path.exists());
    Ok(())
}

#[tokio::test]
async fn import_rejects_garbage_material() -> Result<()> {
    let dir = tempdir()?;
    let manager = KeyManager::new(dir.path());

    let result = manager
        .import(ImportKeyOptions {
            name: "junk".to_string(),
            private_key: "not a key at all".to_string(),
            public_key: None,
        })
        .await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn ecdsa_generation_honors_bits() -> Result<()> {
    let dir = tempdir()?;
    let manager = KeyManager::new(dir.path());

    let opts: GenerateKeyOptions = serde_json::from_value(serde_json::json!({
        "name": "curve",
        "type": "ecdsa",
        "bits": 384,
    }))?;
    let record = manager.generate(opts).await?;
    assert_eq!(record.key_type, KeyType::Ecdsa);

    let opts: GenerateKeyOptions = serde_json::from_value(serde_json::json!({
        "name": "badcurve",
        "type": "ecdsa",
        "bits": 123,
    }))?;
    assert!(manager.generate(opts).await.is_err());
    Ok(())
}
