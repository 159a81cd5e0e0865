//! Error types for the control plane

use std::path::PathBuf;

use gx_host::HostError;
use thiserror::Error;

/// Result alias used throughout gx-core
pub type Result<T> = std::result::Result<T, GeneosError>;

/// Top-level error type for instance operations
#[derive(Error, Debug)]
pub enum GeneosError {
    /// Error from a host operation
    #[error(transparent)]
    Host(#[from] HostError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Instance has a `<type>.disabled` marker
    #[error("{0} is disabled")]
    Disabled(String),

    /// Instance is marked protected and the operation was not forced
    #[error("{0} is protected")]
    Protected(String),

    /// Something required does not exist
    #[error("{0}: not found")]
    NotFound(String),

    /// Something being created already exists
    #[error("{0}: already exists")]
    AlreadyExists(String),

    /// Caller may not act on this instance
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed name, reference, range or argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not available for this component type
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Process did not stop or start as expected
    #[error("{0}")]
    Process(String),

    /// JSON (de)serialization of instance settings failed
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Flat classification of every error, for exhaustive handling by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidArgument,
    NotSupported,
    ProcessNotRunning,
    Transport,
    Disabled,
    Protected,
    Config,
    Io,
}

impl GeneosError {
    /// Collapse host and core variants into one [`ErrorKind`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeneosError::Host(e) => match e {
                HostError::NotFound(_) => ErrorKind::NotFound,
                HostError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                HostError::PermissionDenied(_) => ErrorKind::PermissionDenied,
                HostError::InvalidArgument(_) => ErrorKind::InvalidArgument,
                HostError::NotSupported(_) => ErrorKind::NotSupported,
                HostError::ProcessNotRunning => ErrorKind::ProcessNotRunning,
                HostError::Transport(_) => ErrorKind::Transport,
                HostError::Ssh(_)
                | HostError::Sftp { .. }
                | HostError::Command { .. }
                | HostError::Timeout(_)
                | HostError::Io { .. } => ErrorKind::Io,
            },
            GeneosError::Config(_) | GeneosError::Json { .. } => ErrorKind::Config,
            GeneosError::Disabled(_) => ErrorKind::Disabled,
            GeneosError::Protected(_) => ErrorKind::Protected,
            GeneosError::NotFound(_) => ErrorKind::NotFound,
            GeneosError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            GeneosError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            GeneosError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GeneosError::NotSupported(_) => ErrorKind::NotSupported,
            GeneosError::Process(_) => ErrorKind::Io,
        }
    }

    /// True for "does not exist", whichever layer reported it
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Soft failures that batch reporting does not count as errors
    pub fn is_soft(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_host::TransportFailure;

    #[test]
    fn test_kind_collapses_host_errors() {
        let err = GeneosError::from(HostError::NotFound(PathBuf::from("/opt/geneos")));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());

        let err = GeneosError::from(HostError::ProcessNotRunning);
        assert_eq!(err.kind(), ErrorKind::ProcessNotRunning);

        let err = GeneosError::from(HostError::from(TransportFailure {
            target: "geneos@db1:22".to_string(),
            message: "refused".to_string(),
        }));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_soft_errors() {
        assert!(GeneosError::NotSupported("reload".to_string()).is_soft());
        assert!(!GeneosError::Disabled("gateway:a@localhost".to_string()).is_soft());
    }
}
