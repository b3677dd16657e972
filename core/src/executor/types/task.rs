use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TaskError;
use crate::executor::TaskKey;
use crate::host::HostSystem;
use crate::model::{CloudProvider, Keystore, SecretStore};

/// One named unit of desired host state.
///
/// `check` must never mutate the host, `apply` must be idempotent, and
/// `render_script` must produce steps that reach the same end state on a bare
/// machine without the agent present.
#[async_trait]
pub trait NodeTask: Send + Sync + fmt::Debug {
    /// Short type name used in logs and reports, e.g. `File`.
    fn kind(&self) -> &'static str;

    /// Keys of tasks that must be done before this one runs.
    fn dependencies(&self) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Desired state, described without looking at the host.
    fn desired(&self) -> Vec<Change>;

    /// Compare desired state with the live host.
    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError>;

    /// Converge the live host.
    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError>;

    /// Shell steps for the first-boot script.
    fn render_script(&self) -> Result<Vec<String>, TaskError>;

    /// Steps that must run once, before any task's steps, no matter how many
    /// tasks ask for them (`apt-get update`).
    fn script_preamble(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A single field that differs (or would be created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub field: String,
    pub current: Option<String>,
    pub desired: String,
}

impl Change {
    pub fn new(field: impl Into<String>, current: Option<String>, desired: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            current,
            desired: desired.into(),
        }
    }

    pub fn create(field: impl Into<String>, desired: impl Into<String>) -> Self {
        Self::new(field, None, desired)
    }
}

/// Result of an existing-state check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Satisfied,
    Changes(Vec<Change>),
}

impl CheckOutcome {
    /// `Satisfied` when `changes` is empty.
    pub fn from_changes(changes: Vec<Change>) -> Self {
        if changes.is_empty() {
            Self::Satisfied
        } else {
            Self::Changes(changes)
        }
    }
}

/// What a task sees while it runs. Everything here is a read-only input.
#[derive(Clone)]
pub struct TaskContext {
    pub host: Arc<dyn HostSystem>,
    pub keystore: Arc<dyn Keystore>,
    pub secrets: Arc<dyn SecretStore>,
    pub config_base: PathBuf,
    pub cloud: Option<Arc<dyn CloudProvider>>,
    pub tags: BTreeSet<String>,
}

impl TaskContext {
    pub fn config_base(&self) -> &Path {
        &self.config_base
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("host_root", &self.host.root())
            .field("config_base", &self.config_base)
            .field("cloud", &self.cloud.as_ref().map(|c| c.name().to_string()))
            .field("tags", &self.tags)
            .finish()
    }
}
