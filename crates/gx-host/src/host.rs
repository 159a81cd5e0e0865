//! The host trait and the value types it exchanges

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HostError, Result};

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Metadata common to local and SFTP stat results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Entry type
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// Permission bits (without the type bits)
    pub mode: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Last modification time, if reported
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    /// Build from a raw `st_mode` value, splitting type and permission bits
    pub fn from_raw_mode(
        raw_mode: u32,
        size: u64,
        uid: u32,
        gid: u32,
        modified: Option<SystemTime>,
    ) -> Self {
        let kind = match raw_mode & 0o170000 {
            0o040000 => FileKind::Dir,
            0o120000 => FileKind::Symlink,
            0o100000 => FileKind::File,
            _ => FileKind::Other,
        };
        Self {
            kind,
            size,
            mode: raw_mode & 0o7777,
            uid,
            gid,
            modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// One entry of a directory listing. `info` does not follow symlinks.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub info: FileInfo,
}

/// Signals the supervisor sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Term,
    Kill,
    Hup,
    Usr1,
    Usr2,
}

impl Signal {
    /// Name as accepted by `kill -s`
    pub fn name(self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Kill => "KILL",
            Signal::Hup => "HUP",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
        }
    }

    #[cfg(unix)]
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Hup => libc::SIGHUP,
            Signal::Usr1 => libc::SIGUSR1,
            Signal::Usr2 => libc::SIGUSR2,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

/// Numeric identity a started process runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
    pub home: PathBuf,
}

/// Everything needed to launch a detached instance process
#[derive(Debug, Clone)]
pub struct StartCommand {
    /// Absolute path of the executable
    pub program: PathBuf,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Complete environment as `KEY=VALUE`
    pub env: Vec<String>,
    /// Working directory
    pub dir: PathBuf,
    /// File receiving stdout and stderr, opened for append
    pub errfile: PathBuf,
    /// Identity to switch to before exec (local hosts only)
    pub credentials: Option<Credentials>,
}

impl StartCommand {
    /// Render as a single shell line, for logs and remote execution
    pub fn shell_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|s| shell_quote(&s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of [`Host::run`]: exit status and combined stdout/stderr
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_status: Option<u32>,
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Output as lossy UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Quote `s` for a POSIX shell using single quotes
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A filesystem and process-execution target.
///
/// Implemented by [`crate::Local`] and [`crate::Remote`]. All paths are
/// absolute paths on the target host.
#[async_trait]
pub trait Host: Send + Sync + fmt::Debug {
    /// Name used in `NAME@HOST` references
    fn name(&self) -> &str;

    /// Network name (or `localhost`)
    fn hostname(&self) -> &str;

    /// User the host operates as
    fn username(&self) -> &str;

    /// True for the machine this process runs on
    fn is_local(&self) -> bool;

    /// Metadata, following symlinks
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Metadata of the entry itself
    async fn lstat(&self, path: &Path) -> Result<FileInfo>;

    /// Open a file for reading
    async fn open(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Create or truncate a file for writing
    async fn create(&self, path: &Path, mode: u32) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;

    /// List a directory, excluding `.` and `..`
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Create a single directory, failing with `AlreadyExists` if present
    async fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Create a directory and any missing parents
    async fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()>;

    /// Rename, replacing `to` if it exists
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create symlink `link` pointing at `target`
    async fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    async fn read_link(&self, path: &Path) -> Result<PathBuf>;

    /// Create hard link `link` to `original`
    async fn link(&self, original: &Path, link: &Path) -> Result<()>;

    /// Remove a file, symlink or empty directory
    async fn remove(&self, path: &Path) -> Result<()>;

    /// Remove a tree. Missing paths are not an error.
    async fn remove_all(&self, path: &Path) -> Result<()>;

    async fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;

    /// Run one command to completion and return its combined output
    async fn run(&self, program: &str, args: &[String], dir: Option<&Path>)
        -> Result<CommandOutput>;

    /// Launch a detached process; does not wait for it
    async fn start(&self, command: &StartCommand) -> Result<()>;

    /// Deliver `signal` to `pid`
    async fn signal(&self, pid: u32, signal: Signal) -> Result<()>;

    /// Tear down any cached transport
    async fn close(&self);

    /// Read a whole file
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut reader = self.open(path).await?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(data)
    }

    /// Write a whole file, replacing any existing content
    async fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> Result<()> {
        let mut writer = self.create(path, mode).await?;
        writer
            .write_all(data)
            .await
            .map_err(|e| HostError::io(path, e))?;
        writer.shutdown().await.map_err(|e| HostError::io(path, e))?;
        Ok(())
    }

    /// True if `path` exists (symlinks are not followed)
    async fn exists(&self, path: &Path) -> bool {
        self.lstat(path).await.is_ok()
    }

    /// True if `path` is a directory
    async fn is_dir(&self, path: &Path) -> bool {
        matches!(self.stat(path).await, Ok(info) if info.is_dir())
    }

    /// Expand a glob pattern by walking directories one component at a time
    async fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern_path = Path::new(pattern);
        if !pattern_path.is_absolute() {
            return Err(HostError::InvalidArgument(format!(
                "glob pattern must be absolute: {}",
                pattern
            )));
        }

        let mut candidates = vec![PathBuf::from("/")];
        for component in pattern_path.components() {
            let part = match component {
                Component::RootDir => continue,
                Component::Normal(part) => part.to_string_lossy().into_owned(),
                _ => {
                    return Err(HostError::InvalidArgument(format!(
                        "unsupported glob component in {}",
                        pattern
                    )))
                }
            };

            if !has_wildcard(&part) {
                candidates = candidates.into_iter().map(|c| c.join(&part)).collect();
                continue;
            }

            let matcher = glob::Pattern::new(&part)
                .map_err(|e| HostError::InvalidArgument(format!("{}: {}", pattern, e)))?;
            let mut next = Vec::new();
            for dir in candidates {
                let entries = match self.read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for entry in entries {
                    if matcher.matches(&entry.name) {
                        next.push(dir.join(&entry.name));
                    }
                }
            }
            candidates = next;
        }

        let mut found = Vec::new();
        for path in candidates {
            if self.exists(&path).await {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

/// True if `s` contains glob metacharacters
pub fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Copy one file between two (possibly different) hosts, keeping its mode
pub async fn copy_file(
    src_host: &dyn Host,
    src: &Path,
    dst_host: &dyn Host,
    dst: &Path,
) -> Result<()> {
    let info = src_host.stat(src).await?;
    if !info.is_file() {
        return Err(HostError::InvalidArgument(format!(
            "{} is not a regular file",
            src.display()
        )));
    }
    let data = src_host.read_file(src).await?;
    if let Some(parent) = dst.parent() {
        dst_host.mkdir_all(parent, 0o775).await?;
    }
    dst_host.write_file(dst, &data, info.mode).await?;
    tracing::debug!(
        "copied {}:{} to {}:{} ({} bytes)",
        src_host.name(),
        src.display(),
        dst_host.name(),
        dst.display(),
        data.len()
    );
    Ok(())
}
