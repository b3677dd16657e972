use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use nodeup_core::api::{Builder, Fragment, ModelContext};

use crate::nodetasks::FileTask;

pub const CA_CERT_PATH: &str = "/srv/kubernetes/ca.crt";
pub const BASIC_AUTH_PATH: &str = "/srv/kubernetes/basic_auth.csv";

const CA_NAME: &str = "ca";
const ADMIN_SECRET: &str = "kube";

/// Cluster CA on every node; on masters also the admin credentials the API
/// server authenticates against.
pub struct PkiBuilder {
    ctx: Arc<ModelContext>,
}

impl PkiBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Builder for PkiBuilder {
    fn name(&self) -> &str {
        "pki"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let srv = FileTask::key_for("/srv/kubernetes");
        let mut fragment = Fragment::new();

        let ca = self
            .ctx
            .keystore
            .certificate(CA_NAME)
            .await
            .context("error reading CA certificate")?
            .with_context(|| format!("certificate {CA_NAME:?} not found in key store"))?;
        let task = FileTask::file(CA_CERT_PATH, ca, 0o644).after([srv.clone()]);
        fragment.add(task.key(), task);

        if self.ctx.is_master() {
            let password = self
                .ctx
                .secrets
                .secret(ADMIN_SECRET)
                .await
                .context("error reading admin secret")?
                .with_context(|| format!("secret {ADMIN_SECRET:?} not found in secret store"))?;
            let password = String::from_utf8(password)
                .with_context(|| format!("secret {ADMIN_SECRET:?} is not valid UTF-8"))?;
            let csv = format!("{},admin,admin,system:masters\n", password.trim());
            let task = FileTask::file(BASIC_AUTH_PATH, csv, 0o600).after([srv]);
            fragment.add(task.key(), task);
        }

        Ok(fragment)
    }
}
