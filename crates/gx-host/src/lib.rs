//! gx-host: Local and SSH-remote host abstraction for geneos-ctl
//!
//! Every filesystem and process operation the control plane needs is
//! available through the [`Host`] trait, implemented once for the local
//! machine ([`Local`]) and once for a remote machine reached over SSH with
//! an SFTP sub-channel ([`Remote`]). Remote transports are cached in an
//! explicit [`ConnectionPool`] that callers own and inject.

pub mod config;
pub mod error;
pub mod host;
pub mod local;
pub mod remote;
pub mod serde_utils;
pub mod users;

pub use config::{HostConfig, SshOptions, LOCALHOST};
pub use error::{HostError, Result, TransportFailure};
pub use host::{
    copy_file, CommandOutput, Credentials, DirEntry, FileInfo, FileKind, Host, Signal,
    StartCommand,
};
pub use local::Local;
pub use remote::{ConnectionPool, Remote};
