use nodeup_core::api::{AssetResolver, AssetsSpec};

/// Rewrites `http(s)` file locations onto the cluster's file repository,
/// keeping the path. Locations are unchanged when no repository is set.
#[derive(Debug, Clone, Default)]
pub struct MirrorAssetResolver {
    file_repository: Option<String>,
}

impl MirrorAssetResolver {
    pub fn new(assets: Option<&AssetsSpec>) -> Self {
        let file_repository = assets
            .and_then(|a| a.file_repository.as_deref())
            .map(|r| r.trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty());
        Self { file_repository }
    }
}

impl AssetResolver for MirrorAssetResolver {
    fn resolve(&self, location: &str) -> String {
        let Some(repo) = &self.file_repository else {
            return location.to_string();
        };
        let rest = location
            .strip_prefix("https://")
            .or_else(|| location.strip_prefix("http://"));
        match rest.and_then(|r| r.split_once('/')) {
            Some((_host, path)) if !location.starts_with(repo.as_str()) => {
                format!("{repo}/{path}")
            }
            _ => location.to_string(),
        }
    }
}
