//! Remote hosts reached over SSH, with file operations over SFTP

mod connect;
mod pool;

pub use pool::{ConnectionPool, SshConnection};

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::config::HostConfig;
use crate::error::{HostError, Result, TransportFailure};
use crate::host::{
    shell_quote, CommandOutput, DirEntry, FileInfo, Host, Signal, StartCommand,
};

/// A machine reached over SSH.
///
/// The first failed dial is remembered for the life of the value and
/// returned by every later operation without touching the network.
pub struct Remote {
    config: HostConfig,
    pool: Arc<ConnectionPool>,
    failed: OnceLock<TransportFailure>,
    dial_lock: Mutex<()>,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("name", &self.config.name)
            .field("target", &self.config.key())
            .field("failed", &self.failed.get())
            .finish()
    }
}

impl Remote {
    /// Create a remote host using transports from `pool`
    pub fn new(config: HostConfig, pool: Arc<ConnectionPool>) -> Self {
        Self {
            config,
            pool,
            failed: OnceLock::new(),
            dial_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The sticky dial failure, if one happened
    pub fn failed(&self) -> Option<&TransportFailure> {
        self.failed.get()
    }

    /// The cached transport, dialing once if needed
    pub async fn connection(&self) -> Result<Arc<SshConnection>> {
        if let Some(failure) = self.failed.get() {
            return Err(HostError::Transport(failure.clone()));
        }
        let key = self.config.key();
        if let Some(connection) = self.pool.get(&key) {
            return Ok(connection);
        }

        let _guard = self.dial_lock.lock().await;
        // another task may have finished dialing while we waited
        if let Some(failure) = self.failed.get() {
            return Err(HostError::Transport(failure.clone()));
        }
        if let Some(connection) = self.pool.get(&key) {
            return Ok(connection);
        }

        match self.pool.dial(&self.config).await {
            Ok(connection) => Ok(connection),
            Err(failure) => {
                tracing::warn!("{}", failure);
                let failure = self.failed.get_or_init(|| failure).clone();
                Err(HostError::Transport(failure))
            }
        }
    }

    async fn sftp(&self) -> Result<Arc<SftpSession>> {
        self.connection().await?.sftp().await
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.connection().await?.exec(command).await
    }

    /// Run a shell line and fail unless it exits with status 0
    async fn exec_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(HostError::Command {
                status: output.exit_status.unwrap_or(u32::MAX),
                output: output.text().trim().to_string(),
            })
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn sftp_error(path: &Path, err: SftpError) -> HostError {
    if let SftpError::Status(status) = &err {
        match status.status_code {
            StatusCode::NoSuchFile => return HostError::NotFound(path.to_path_buf()),
            StatusCode::PermissionDenied => {
                return HostError::PermissionDenied(path.display().to_string())
            }
            _ => {}
        }
    }
    HostError::Sftp {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn attrs_info(attrs: &FileAttributes) -> FileInfo {
    FileInfo::from_raw_mode(
        attrs.permissions.unwrap_or(0),
        attrs.size.unwrap_or(0),
        attrs.uid.unwrap_or(0),
        attrs.gid.unwrap_or(0),
        attrs
            .mtime
            .map(|t| UNIX_EPOCH + Duration::from_secs(u64::from(t))),
    )
}

/// Build the script a remote shell runs to start a detached process
pub(crate) fn start_script(command: &StartCommand) -> String {
    let mut script = format!("cd {}\n", shell_quote(&path_string(&command.dir)));
    for entry in &command.env {
        if let Some((key, value)) = entry.split_once('=') {
            script.push_str(&format!("export {}={}\n", key, shell_quote(value)));
        }
    }
    script.push_str(&format!(
        "{} < /dev/null >> {} 2>&1 &\n",
        command.shell_line(),
        shell_quote(&path_string(&command.errfile))
    ));
    script.push_str("exit\n");
    script
}

#[async_trait]
impl Host for Remote {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn hostname(&self) -> &str {
        &self.config.hostname
    }

    fn username(&self) -> &str {
        &self.config.username
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let attrs = self
            .sftp()
            .await?
            .metadata(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        Ok(attrs_info(&attrs))
    }

    async fn lstat(&self, path: &Path) -> Result<FileInfo> {
        let attrs = self
            .sftp()
            .await?
            .symlink_metadata(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        Ok(attrs_info(&attrs))
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = self
            .sftp()
            .await?
            .open(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        Ok(Box::new(file))
    }

    /// Files take the remote umask; `mode` is applied with `chmod` only
    /// when it differs from the common default.
    async fn create(&self, path: &Path, mode: u32) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let file = self
            .sftp()
            .await?
            .create(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        if mode != 0o644 {
            self.exec_checked(&format!(
                "chmod {:o} {}",
                mode,
                shell_quote(&path_string(path))
            ))
            .await?;
        }
        Ok(Box::new(file))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let dir = self
            .sftp()
            .await?
            .read_dir(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        let mut entries: Vec<DirEntry> = dir
            .filter(|entry| entry.file_name() != "." && entry.file_name() != "..")
            .map(|entry| DirEntry {
                name: entry.file_name(),
                info: attrs_info(&entry.metadata()),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let sftp = self.sftp().await?;
        if let Err(e) = sftp.create_dir(path_string(path)).await {
            // SFTP reports "exists" as a generic failure
            if sftp.symlink_metadata(path_string(path)).await.is_ok() {
                return Err(HostError::AlreadyExists(path.to_path_buf()));
            }
            return Err(sftp_error(path, e));
        }
        if mode != 0o755 {
            self.exec_checked(&format!(
                "chmod {:o} {}",
                mode,
                shell_quote(&path_string(path))
            ))
            .await?;
        }
        Ok(())
    }

    async fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            match self.stat(dir).await {
                Ok(info) if info.is_dir() => break,
                Ok(_) => return Err(HostError::AlreadyExists(dir.to_path_buf())),
                Err(e) if e.is_not_found() => missing.push(dir.to_path_buf()),
                Err(e) => return Err(e),
            }
            current = dir.parent();
        }
        for dir in missing.iter().rev() {
            match self.mkdir(dir, mode).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let sftp = self.sftp().await?;
        match sftp.rename(path_string(from), path_string(to)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // SFTPv3 rename refuses to replace; fall back to rename(2) via mv
                if sftp.symlink_metadata(path_string(to)).await.is_ok() {
                    self.exec_checked(&format!(
                        "mv -f -- {} {}",
                        shell_quote(&path_string(from)),
                        shell_quote(&path_string(to))
                    ))
                    .await
                    .map(|_| ())
                } else {
                    Err(sftp_error(from, e))
                }
            }
        }
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.sftp()
            .await?
            .symlink(path_string(link), path_string(target))
            .await
            .map_err(|e| sftp_error(link, e))
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let target = self
            .sftp()
            .await?
            .read_link(path_string(path))
            .await
            .map_err(|e| sftp_error(path, e))?;
        Ok(PathBuf::from(target))
    }

    async fn link(&self, original: &Path, link: &Path) -> Result<()> {
        if !self.exists(original).await {
            return Err(HostError::NotFound(original.to_path_buf()));
        }
        if self.exists(link).await {
            return Err(HostError::AlreadyExists(link.to_path_buf()));
        }
        self.exec_checked(&format!(
            "ln -- {} {}",
            shell_quote(&path_string(original)),
            shell_quote(&path_string(link))
        ))
        .await
        .map(|_| ())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let sftp = self.sftp().await?;
        let info = self.lstat(path).await?;
        let result = if info.is_dir() {
            sftp.remove_dir(path_string(path)).await
        } else {
            sftp.remove_file(path_string(path)).await
        };
        result.map_err(|e| sftp_error(path, e))
    }

    async fn remove_all(&self, path: &Path) -> Result<()> {
        // depth-first without recursion: a directory is pushed back once
        // its children are queued and removed when popped the second time
        let mut stack = vec![(path.to_path_buf(), false)];
        while let Some((current, expanded)) = stack.pop() {
            let info = match self.lstat(&current).await {
                Ok(info) => info,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if info.is_dir() && !expanded {
                stack.push((current.clone(), true));
                for entry in self.read_dir(&current).await? {
                    stack.push((current.join(entry.name), false));
                }
            } else {
                match self.remove(&current).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    async fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        self.exec_checked(&format!(
            "chown {}:{} -- {}",
            uid,
            gid,
            shell_quote(&path_string(path))
        ))
        .await
        .map(|_| ())
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        dir: Option<&Path>,
    ) -> Result<CommandOutput> {
        let mut line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .map(|s| shell_quote(&s))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(dir) = dir {
            line = format!("cd {} && {}", shell_quote(&path_string(dir)), line);
        }
        self.exec(&line).await
    }

    async fn start(&self, command: &StartCommand) -> Result<()> {
        if command.credentials.is_some() {
            return Err(HostError::NotSupported(format!(
                "changing user when starting on remote host {}",
                self.config.name
            )));
        }
        let script = start_script(command);
        tracing::debug!("{}: start script:\n{}", self.config.name, script);
        self.connection().await?.shell(&script).await
    }

    async fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        let output = self
            .exec(&format!("kill -s {} {}", signal.name(), pid))
            .await?;
        kill_result(&output, pid, signal, &self.config.name)
    }

    async fn close(&self) {
        self.pool.close(&self.config.key()).await;
    }
}

/// Interpret the output of a remote `kill`. The shell's messages for
/// ESRCH and EPERM map to the same errors a local signal would give.
fn kill_result(output: &CommandOutput, pid: u32, signal: Signal, host: &str) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    let text = output.text();
    if text.contains("No such process") {
        Err(HostError::ProcessNotRunning)
    } else if text.contains("Operation not permitted") {
        Err(HostError::PermissionDenied(format!(
            "cannot send {} to process {} on {}",
            signal, pid, host
        )))
    } else {
        Err(HostError::Command {
            status: output.exit_status.unwrap_or(u32::MAX),
            output: text.trim().to_string(),
        })
    }
}
