#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;
pub mod task;

pub use error::{ConfigError, MetadataLookupError, NodeupError};
pub use executor::{AssemblyError, ExecutorError};
pub use task::{HostError, ProbeError, TaskError};
