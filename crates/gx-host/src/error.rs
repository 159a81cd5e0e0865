//! Host error types

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the host layer
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors returned by [`crate::Host`] operations
#[derive(Error, Debug)]
pub enum HostError {
    /// Path does not exist on the host
    #[error("{}: no such file or directory", .0.display())]
    NotFound(PathBuf),

    /// Path already exists on the host
    #[error("{}: already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Operation not permitted for the current identity
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed argument (bad glob, bad user name, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not available on this host
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Signalled process does not exist
    #[error("process not running")]
    ProcessNotRunning,

    /// Cached dial failure for a remote host
    #[error(transparent)]
    Transport(#[from] TransportFailure),

    /// SSH protocol or channel error after the transport was established
    #[error("ssh error: {0}")]
    Ssh(String),

    /// SFTP request failed
    #[error("sftp error on {}: {message}", .path.display())]
    Sftp { path: PathBuf, message: String },

    /// Remote command exited unsuccessfully
    #[error("command failed with status {status}: {output}")]
    Command { status: u32, output: String },

    /// Operation did not complete within its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Untranslated I/O error
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A failed dial to a remote host.
///
/// Cloneable so the same failure can be handed back for every later
/// operation on the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot connect to {target}: {message}")]
pub struct TransportFailure {
    /// `user@host:port` of the failed dial
    pub target: String,
    /// Reason reported by the transport
    pub message: String,
}

impl HostError {
    /// Translate an I/O error for `path` into the host taxonomy
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => HostError::NotFound(path),
            io::ErrorKind::AlreadyExists => HostError::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => {
                HostError::PermissionDenied(path.display().to_string())
            }
            _ => HostError::Io { path, source },
        }
    }

    /// True for the "does not exist" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }

    /// True if the path already existed
    pub fn is_already_exists(&self) -> bool {
        matches!(self, HostError::AlreadyExists(_))
    }

    /// True if this is the cached transport failure of a remote host
    pub fn is_transport(&self) -> bool {
        matches!(self, HostError::Transport(_))
    }
}
