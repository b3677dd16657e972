mod fs;

pub use fs::{FsKeystore, FsSecretStore};

use std::sync::Arc;

use nodeup_core::api::{local_path, ClusterSpec, ConfigError, Keystore, SecretStore};

/// Key store and secret store named by the cluster spec. Both must be set.
pub fn build_stores(
    cluster: &ClusterSpec,
) -> Result<(Arc<dyn Keystore>, Arc<dyn SecretStore>), ConfigError> {
    if cluster.secret_store.is_empty() {
        return Err(ConfigError::MissingField("SecretStore"));
    }
    if cluster.key_store.is_empty() {
        return Err(ConfigError::MissingField("KeyStore"));
    }

    tracing::info!("Building SecretStore at {:?}", cluster.secret_store);
    let secrets = FsSecretStore::new(local_path(&cluster.secret_store)?);
    tracing::info!("Building KeyStore at {:?}", cluster.key_store);
    let keystore = FsKeystore::new(local_path(&cluster.key_store)?);

    Ok((Arc::new(keystore), Arc::new(secrets)))
}
