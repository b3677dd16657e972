use async_trait::async_trait;

/// Read-only access to cluster certificates.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// PEM certificate by name, `None` if the store has no such entry.
    async fn certificate(&self, name: &str) -> anyhow::Result<Option<String>>;
}

/// Read-only access to cluster secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn secret(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Handle to a live cloud API. Only present when a task needs one.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider name as used in hostname sigils: `aws`, `gce`, `digitalocean`, `alicloud`.
    fn name(&self) -> &str;

    /// Instance metadata at `path` (`meta-data/instance-id`), `None` if the
    /// metadata service has no such entry.
    async fn metadata(&self, path: &str) -> anyhow::Result<Option<String>>;

    /// Release connections held by this handle. Called once when the
    /// execution context is dropped.
    fn close(&self) {}
}
