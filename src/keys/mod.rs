// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! Local SSH key-pair management over a fixed keys directory. Generation
//! runs on the blocking pool; private files are created owner-read-write
//! only. Fingerprints are SHA-256 and safe to log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use russh::keys::{
    HashAlg, PrivateKey, PublicKey,
    ssh_key::{
        LineEnding,
        private::{Ed25519Keypair, EcdsaKeypair, KeypairData, RsaKeypair},
        rand_core::OsRng,
        EcdsaCurve,
    },
};

use crate::{
    logger::Sensitive,
    validator::{validate_private_key_blob, validate_public_key_blob},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Ed25519,
    Ecdsa,
}

/// One key pair on disk, as returned by `list`/`generate`/`import`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyOptions {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    #[serde(default)]
    pub bits: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub passphrase: Option<Sensitive<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportKeyOptions {
    pub name: String,
    pub private_key: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

pub struct KeyManager {
    dir: PathBuf,
}

impl KeyManager {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("keys"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerates pairs by their public halves. Entries whose public key
    /// does not parse are skipped with a warning rather than failing the
    /// whole listing.
    pub async fn list(&self) -> Result<Vec<KeyPairRecord>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e).context("failed to read keys directory"),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pub") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
            else {
                continue;
            };
            let private_path = self.dir.join(&name);
            if !private_path.exists() {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await?;
            let public = match PublicKey::from_openssh(raw.trim()) {
                Ok(public) => public,
                Err(e) => {
                    warn!(key = %name, "skipping unparseable public key: {e}");
                    continue;
                },
            };
            let Some(key_type) = key_type_of(&public) else {
                warn!(key = %name, "skipping key with unsupported algorithm");
                continue;
            };

            let created_at = tokio::fs::metadata(&private_path)
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .map_or_else(Utc::now, DateTime::from);

            records.push(KeyPairRecord {
                name,
                key_type,
                private_key_path: private_path,
                public_key_path: path,
                fingerprint: public.fingerprint(HashAlg::Sha256).to_string(),
                created_at,
            });
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Generates a fresh key pair. The key math runs on the blocking pool.
    pub async fn generate(&self, opts: GenerateKeyOptions) -> Result<KeyPairRecord> {
        check_key_name(&opts.name)?;
        let private_path = self.dir.join(&opts.name);
        ensure!(
            !private_path.exists(),
            "a key named '{}' already exists",
            opts.name
        );

        tokio::fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let record = tokio::task::spawn_blocking(move || -> Result<KeyPairRecord> {
            let keypair = match opts.key_type {
                KeyType::Ed25519 => KeypairData::from(Ed25519Keypair::random(&mut OsRng)),
                KeyType::Ecdsa => {
                    let curve = match opts.bits.unwrap_or(256) {
                        256 => EcdsaCurve::NistP256,
                        384 => EcdsaCurve::NistP384,
                        521 => EcdsaCurve::NistP521,
                        other => bail!("unsupported ECDSA size {other}"),
                    };
                    KeypairData::from(
                        EcdsaKeypair::random(&mut OsRng, curve)
                            .context("ECDSA generation failed")?,
                    )
                },
                KeyType::Rsa => {
                    let bits = opts.bits.unwrap_or(3072) as usize;
                    ensure!(
                        (2048..=8192).contains(&bits),
                        "RSA size must be in 2048..=8192"
                    );
                    KeypairData::from(
                        RsaKeypair::random(&mut OsRng, bits)
                            .context("RSA generation failed")?,
                    )
                },
            };

            let key = PrivateKey::new(keypair, opts.comment.unwrap_or_default())
                .context("failed to assemble private key")?;
            let fingerprint = key.public_key().fingerprint(HashAlg::Sha256).to_string();
            let public_openssh = key
                .public_key()
                .to_openssh()
                .context("failed to encode public key")?;

            let stored = match &opts.passphrase {
                Some(passphrase) => key
                    .encrypt(&mut OsRng, passphrase.expose())
                    .context("failed to encrypt private key")?,
                None => key,
            };
            let private_openssh = stored
                .to_openssh(LineEnding::LF)
                .context("failed to encode private key")?;

            let private_path = dir.join(&opts.name);
            let public_path = dir.join(format!("{}.pub", opts.name));
            write_key_file(&private_path, private_openssh.as_bytes(), 0o600)?;
            write_key_file(&public_path, public_openssh.as_bytes(), 0o644)?;

            Ok(KeyPairRecord {
                name: opts.name,
                key_type: opts.key_type,
                private_key_path: private_path,
                public_key_path: public_path,
                fingerprint,
                created_at: Utc::now(),
            })
        })
        .await
        .context("key generation task failed")??;

        Ok(record)
    }

    /// Imports caller-provided key material after validating its framing.
    /// The fingerprint comes from the public half when given, otherwise from
    /// the parsed private key.
    pub async fn import(&self, opts: ImportKeyOptions) -> Result<KeyPairRecord> {
        check_key_name(&opts.name)?;

        let report = validate_private_key_blob(&opts.private_key);
        ensure!(report.valid, "private key is not in a recognized format");
        if let Some(public) = &opts.public_key {
            let report = validate_public_key_blob(public);
            ensure!(report.valid, "public key is not in a recognized format");
        }

        let (public, key_type) = match &opts.public_key {
            Some(blob) => {
                let parsed = PublicKey::from_openssh(blob.trim())
                    .context("public key does not parse")?;
                let key_type = key_type_of(&parsed)
                    .context("public key uses an unsupported algorithm")?;
                (parsed, key_type)
            },
            None => {
                let parsed = PrivateKey::from_openssh(opts.private_key.as_bytes())
                    .context("private key does not parse; supply the public half")?;
                let public = parsed.public_key().clone();
                let key_type = key_type_of(&public)
                    .context("private key uses an unsupported algorithm")?;
                (public, key_type)
            },
        };

        let private_path = self.dir.join(&opts.name);
        let public_path = self.dir.join(format!("{}.pub", opts.name));
        ensure!(
            !private_path.exists(),
            "a key named '{}' already exists",
            opts.name
        );

        tokio::fs::create_dir_all(&self.dir).await?;
        let public_openssh = public.to_openssh().context("failed to encode public key")?;
        write_key_file(&private_path, opts.private_key.as_bytes(), 0o600)?;
        write_key_file(&public_path, public_openssh.as_bytes(), 0o644)?;

        Ok(KeyPairRecord {
            name: opts.name,
            key_type,
            private_key_path: private_path,
            public_key_path: public_path,
            fingerprint: public.fingerprint(HashAlg::Sha256).to_string(),
            created_at: Utc::now(),
        })
    }
}

fn key_type_of(public: &PublicKey) -> Option<KeyType> {
    use russh::keys::Algorithm;
    match public.algorithm() {
        Algorithm::Ed25519 => Some(KeyType::Ed25519),
        Algorithm::Rsa { .. } => Some(KeyType::Rsa),
        Algorithm::Ecdsa { .. } => Some(KeyType::Ecdsa),
        _ => None,
    }
}

/// Key names become file names; keep them to a conservative charset.
fn check_key_name(name: &str) -> Result<()> {
    ensure!(
        !name.is_empty() && name.len() <= 128,
        "key name must be 1..=128 characters"
    );
    ensure!(
        name.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-')),
        "key name may only contain [A-Za-z0-9_.-]"
    );
    ensure!(!name.starts_with('.'), "key name must not start with '.'");
    Ok(())
}

fn write_key_file(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    set_mode(path, mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set mode on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    // Non-POSIX targets rely on the per-user state directory ACLs.
    Ok(())
}
