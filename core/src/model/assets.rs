use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// A file the node needs, optionally pinned by sha256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub hash: Option<String>,
}

impl Asset {
    /// Parse `"<sha256>@<url>"` or a bare URL.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let spec = spec.trim();
        let invalid = |reason: &str| ConfigError::InvalidAsset {
            asset: spec.to_string(),
            reason: reason.to_string(),
        };

        let (hash, url) = match spec.split_once('@') {
            Some((hash, url)) if !hash.contains('/') => (Some(hash.to_ascii_lowercase()), url),
            _ => (None, spec),
        };

        if url.is_empty() {
            return Err(invalid("empty url"));
        }
        if let Some(h) = &hash {
            if h.len() != 64 || !h.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("hash must be 64 hex characters"));
            }
        }

        Ok(Self {
            url: url.to_string(),
            hash,
        })
    }

    /// Last path segment of the URL.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

/// Assets declared for this node's architecture, cached under one directory.
#[derive(Debug, Clone)]
pub struct AssetStore {
    cache_dir: PathBuf,
    assets: Vec<Asset>,
}

impl AssetStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            assets: Vec::new(),
        }
    }

    pub fn add(&mut self, spec: &str) -> Result<(), ConfigError> {
        self.assets.push(Asset::parse(spec)?);
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Where an asset lands in the cache.
    pub fn cache_path(&self, asset: &Asset) -> PathBuf {
        self.cache_dir.join(asset.file_name())
    }
}

/// Maps upstream artifact locations to the locations the node will actually
/// use (mirrors, pinned registries).
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, location: &str) -> String;
}

/// Resolver that keeps every location as declared.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

impl AssetResolver for PassthroughResolver {
    fn resolve(&self, location: &str) -> String {
        location.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0f1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8";

    #[test]
    fn parses_pinned_asset() {
        let asset = Asset::parse(&format!("{HASH}@https://dl.k8s.io/v1.16.0/bin/linux/amd64/kubelet")).unwrap();
        assert_eq!(asset.hash.as_deref(), Some(HASH));
        assert_eq!(asset.file_name(), "kubelet");
    }

    #[test]
    fn bare_url_has_no_hash() {
        let asset = Asset::parse("https://user@mirror.example.com/cni.tgz").unwrap();
        assert_eq!(asset.hash, None);
        assert_eq!(asset.url, "https://user@mirror.example.com/cni.tgz");
    }

    #[test]
    fn rejects_short_hash() {
        let err = Asset::parse("abc@https://example.com/x").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAsset { .. }));
    }

    #[test]
    fn assets_are_cached_by_file_name() {
        let mut store = AssetStore::new("/var/cache/nodeup");
        store.add("https://example.com/bin/kubectl").unwrap();
        assert_eq!(
            store.cache_path(&store.assets()[0]),
            PathBuf::from("/var/cache/nodeup/kubectl")
        );
    }
}
