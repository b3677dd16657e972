use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a task inside one task graph.
///
/// Keys are opaque: builders pick a stable name, and homogeneous injected
/// collections use [`TaskKey::indexed`] so that `LoadImage.0`, `LoadImage.1`
/// never collide with a hand-picked name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn indexed(kind: &str, index: usize) -> Self {
        Self(format!("{kind}.{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
