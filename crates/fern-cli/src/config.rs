//! Process configuration for `fern`.
//!
//! The YAML file supplies the region, the encryption keys, and the DNS
//! defaults seeded into new zones. Everything about where and how data is
//! stored comes from flags or `FERN_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use fern_core::config::DEFAULT_REGION;
use fern_core::{AccountContext, DnsDefaults, KeyConfig, KeyRing};
use fern_storage::{MemoryBackend, StorageBackend};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".fern.yaml";

/// Contents of the YAML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FernConfig {
    pub region: String,
    /// Encryption keys for `SecureString` parameters. The first is the default.
    pub kms: Vec<KeyConfig>,
    pub dns: DnsDefaults,
}

impl Default for FernConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_owned(),
            kms: Vec::new(),
            dns: DnsDefaults::default(),
        }
    }
}

impl FernConfig {
    /// Load the config file.
    ///
    /// An explicitly named file must exist. Without one, `.fern.yaml` in the
    /// working directory is used if present, and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    warn!(file = DEFAULT_CONFIG_FILE, "config file not found, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        info!(file = %path.display(), region = %config.region, keys = config.kms.len(), "configuration loaded");
        for key in &config.kms {
            debug!(key_id = %key.id, alias = %key.alias, "encryption key configured");
        }
        Ok(config)
    }

    pub fn account(&self) -> AccountContext {
        AccountContext::new(self.region.clone())
    }

    /// Decode and check every configured key.
    pub fn key_ring(&self) -> Result<Arc<KeyRing>> {
        let ring = KeyRing::from_config(&self.kms).context("invalid kms key in configuration")?;
        Ok(Arc::new(ring))
    }
}

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// One `RocksDB` directory per engine.
    Rocksdb,
    /// One redb file per engine.
    Redb,
    /// Nothing persists past the process.
    Memory,
}

/// Which engine's store to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Namespace {
    Route53,
    Ssm,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Self::Route53 => "route53",
            Self::Ssm => "ssm",
        }
    }
}

/// Open the store backing one engine under `data_path`.
pub fn open_store(
    kind: StorageKind,
    data_path: &Path,
    namespace: Namespace,
) -> Result<Arc<dyn StorageBackend>> {
    let store: Arc<dyn StorageBackend> = match kind {
        StorageKind::Memory => {
            info!(namespace = namespace.as_str(), "using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageKind::Rocksdb => {
            let path = data_path.join(namespace.as_str());
            std::fs::create_dir_all(data_path)
                .with_context(|| format!("failed to create data directory {}", data_path.display()))?;
            info!(path = %path.display(), "using RocksDB storage");
            Arc::new(
                fern_storage::RocksDbBackend::open(&path).context("failed to open RocksDB storage")?,
            )
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageKind::Rocksdb => {
            anyhow::bail!("RocksDB storage requested but feature 'rocksdb-backend' is not enabled");
        }
        #[cfg(feature = "redb-backend")]
        StorageKind::Redb => {
            let path = data_path.join(format!("{}.redb", namespace.as_str()));
            std::fs::create_dir_all(data_path)
                .with_context(|| format!("failed to create data directory {}", data_path.display()))?;
            info!(path = %path.display(), "using redb storage");
            Arc::new(fern_storage::RedbBackend::open(&path).context("failed to open redb storage")?)
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageKind::Redb => {
            anyhow::bail!("redb storage requested but feature 'redb-backend' is not enabled");
        }
    };
    Ok(store)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn yaml_shape() {
        let raw = r"
region: eu-central-1
kms:
  - id: fern-key-1
    alias: fern
    key: AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=
dns:
  nameServers:
    - ns1.internal.
credentials:
  - accessKey: AKIA
    secretKey: secret
    username: ci
";
        let config: FernConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.dns.name_servers, vec!["ns1.internal."]);
        assert_eq!(config.dns.soa, DnsDefaults::default().soa);
        assert_eq!(config.key_ring().unwrap().len(), 1);
        assert_eq!(config.account().account_id, "000000000000");
    }

    #[test]
    fn short_key_is_rejected() {
        let config: FernConfig = serde_yaml::from_str("kms:\n  - {id: a, alias: b, key: AAAA}\n").unwrap();
        assert!(config.key_ring().is_err());
    }

    #[test]
    fn missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FernConfig::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn memory_store_opens_anywhere() {
        let store = open_store(StorageKind::Memory, Path::new("/nonexistent"), Namespace::Ssm);
        assert!(store.is_ok());
    }
}
