use async_trait::async_trait;

use crate::executor::graph::Fragment;

/// A contributor of desired node state.
///
/// Builders read the shared model context they were constructed with and
/// return the tasks they want on this node. Ordering against tasks of other
/// builders is expressed by referencing their keys, never by registration
/// order.
#[async_trait]
pub trait Builder: Send + Sync {
    fn name(&self) -> &str;

    async fn build(&self) -> anyhow::Result<Fragment>;
}
