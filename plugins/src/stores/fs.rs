use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use nodeup_core::api::{Keystore, SecretStore};

async fn read_optional(path: &PathBuf) -> anyhow::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("error reading {}", path.display())),
    }
}

fn validate_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        anyhow::bail!("invalid store entry name {name:?}");
    }
    Ok(())
}

/// Directory of PEM certificates, one `<name>.crt` per entry.
#[derive(Debug, Clone)]
pub struct FsKeystore {
    dir: PathBuf,
}

impl FsKeystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Keystore for FsKeystore {
    async fn certificate(&self, name: &str) -> anyhow::Result<Option<String>> {
        validate_name(name)?;
        let path = self.dir.join(format!("{name}.crt"));
        let Some(data) = read_optional(&path).await? else {
            return Ok(None);
        };
        let pem = String::from_utf8(data)
            .with_context(|| format!("certificate {} is not valid UTF-8", path.display()))?;
        if !pem.contains("-----BEGIN CERTIFICATE-----") {
            anyhow::bail!("{} does not contain a PEM certificate", path.display());
        }
        Ok(Some(pem))
    }
}

#[derive(Debug, Deserialize)]
struct SecretFile {
    #[serde(rename = "Data")]
    data: String,
}

/// Directory of JSON secrets, one file per entry: `{"Data": "<base64>"}`.
#[derive(Debug, Clone)]
pub struct FsSecretStore {
    dir: PathBuf,
}

impl FsSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FsSecretStore {
    async fn secret(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        validate_name(name)?;
        let path = self.dir.join(name);
        let Some(data) = read_optional(&path).await? else {
            return Ok(None);
        };
        let file: SecretFile = serde_json::from_slice(&data)
            .with_context(|| format!("error parsing secret {}", path.display()))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(file.data.trim())
            .with_context(|| format!("secret {} is not valid base64", path.display()))?;
        Ok(Some(decoded))
    }
}
