use thiserror::Error;

use super::executor::{AssemblyError, ExecutorError};

/// Top-level error for one node-up invocation.
#[derive(Error, Debug)]
pub enum NodeupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("error building task graph: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("error running tasks: {0}")]
    Executor(#[from] ExecutorError),
    #[error("{0}")]
    Metadata(#[from] MetadataLookupError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl NodeupError {
    /// Process exit code for this error.
    ///
    /// 11: configuration, 12: assembly, 13: metadata, 20: task execution, 50: internal
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 11,
            Self::Assembly(_) => 12,
            Self::Metadata(_) => 13,
            Self::Executor(_) | Self::Io(_) => 20,
            Self::Anyhow(_) => 50,
        }
    }
}

/// Fatal errors raised before the task graph is assembled.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("unsupported target type {0:?}")]
    InvalidTarget(String),

    #[error("error loading {what} {location:?}: {source}")]
    Load {
        what: &'static str,
        location: String,
        source: std::io::Error,
    },

    #[error("error parsing {what} {location:?}: {message}")]
    Parse {
        what: &'static str,
        location: String,
        message: String,
    },

    #[error("unsupported location {0:?} (only local paths and file:// are supported)")]
    UnsupportedLocation(String),

    #[error("bind address {0:?} is not a valid IP address")]
    InvalidBindAddress(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid asset {asset:?}: {reason}")]
    InvalidAsset { asset: String, reason: String },
}

/// A symbolic host identity that needs an instance-metadata lookup.
#[derive(Error, Debug)]
#[error("cannot resolve {value:?} for {field}: {reason}")]
pub struct MetadataLookupError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}
