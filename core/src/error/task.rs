use thiserror::Error;

/// Failure of a single task attempt.
///
/// The task decides the class: transient failures are retried by the
/// scheduler until the run deadline, fatal failures abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0} (will retry)")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

impl TaskError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Fatal(m) => m,
        }
    }
}

/// Errors from the host abstraction (filesystem, processes, downloads).
#[derive(Error, Debug)]
pub enum HostError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("command {command:?} failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },
}

impl HostError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

// Host state can change under us (package mirrors, daemons starting), so
// host failures are always worth another attempt.
impl From<HostError> for TaskError {
    fn from(err: HostError) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Probe or enable failure during capability negotiation. Logged, never fatal.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("error checking facility {facility:?}: {message}")]
    Probe { facility: String, message: String },

    #[error("error enabling facility {facility:?}: {message}")]
    Enable { facility: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_are_retryable() {
        let err: TaskError = HostError::Download {
            url: "https://example.invalid/a.tar".into(),
            message: "connection reset".into(),
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn fatal_is_not_retryable() {
        let err = TaskError::fatal("path must be absolute");
        assert!(!err.is_retryable());
        assert_eq!(err.message(), "path must be absolute");
    }
}
