//! The local host: direct operating system calls

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::LOCALHOST;
use crate::error::{HostError, Result};
use crate::host::{CommandOutput, DirEntry, FileInfo, Host, Signal, StartCommand};

/// The machine this process runs on
#[derive(Debug, Clone)]
pub struct Local {
    username: String,
}

impl Local {
    pub fn new() -> Self {
        Self {
            username: whoami::username(),
        }
    }
}

impl Default for Local {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn file_info(meta: &std::fs::Metadata) -> FileInfo {
    use std::os::unix::fs::MetadataExt;
    FileInfo::from_raw_mode(
        meta.mode(),
        meta.len(),
        meta.uid(),
        meta.gid(),
        meta.modified().ok(),
    )
}

#[cfg(not(unix))]
fn file_info(meta: &std::fs::Metadata) -> FileInfo {
    use crate::host::FileKind;
    let kind = if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else if meta.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    FileInfo {
        kind,
        size: meta.len(),
        mode: if meta.permissions().readonly() { 0o444 } else { 0o644 },
        uid: 0,
        gid: 0,
        modified: meta.modified().ok(),
    }
}

#[async_trait]
impl Host for Local {
    fn name(&self) -> &str {
        LOCALHOST
    }

    fn hostname(&self) -> &str {
        LOCALHOST
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(file_info(&meta))
    }

    async fn lstat(&self, path: &Path) -> Result<FileInfo> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(file_info(&meta))
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &Path, mode: u32) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        let file = options.open(path).await.map_err(|e| HostError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| HostError::io(path, e))? {
            // entries can vanish between readdir and lstat
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                info: file_info(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await.map_err(|e| HostError::io(path, e))
    }

    async fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await.map_err(|e| HostError::io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| HostError::io(from, e))
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        tokio::fs::symlink(target, link)
            .await
            .map_err(|e| HostError::io(link, e))
    }

    #[cfg(not(unix))]
    async fn symlink(&self, _target: &Path, link: &Path) -> Result<()> {
        Err(HostError::NotSupported(format!(
            "symlink {} on this platform",
            link.display()
        )))
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf> {
        tokio::fs::read_link(path)
            .await
            .map_err(|e| HostError::io(path, e))
    }

    async fn link(&self, original: &Path, link: &Path) -> Result<()> {
        tokio::fs::hard_link(original, link)
            .await
            .map_err(|e| HostError::io(link, e))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        let result = if meta.is_dir() {
            tokio::fs::remove_dir(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| HostError::io(path, e))
    }

    async fn remove_all(&self, path: &Path) -> Result<()> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(HostError::io(path, e)),
        };
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| HostError::io(path, e))
    }

    #[cfg(unix)]
    async fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|e| HostError::io(path, e))
    }

    #[cfg(not(unix))]
    async fn chown(&self, _path: &Path, _uid: u32, _gid: u32) -> Result<()> {
        Ok(())
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        dir: Option<&Path>,
    ) -> Result<CommandOutput> {
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        let output = command
            .output()
            .await
            .map_err(|e| HostError::io(program, e))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(CommandOutput {
            exit_status: output.status.code().map(|c| c as u32),
            output: combined,
        })
    }

    async fn start(&self, command: &StartCommand) -> Result<()> {
        spawn_detached(command)
    }

    #[cfg(unix)]
    async fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(HostError::ProcessNotRunning),
            Some(libc::EPERM) => Err(HostError::PermissionDenied(format!(
                "cannot send {} to process {}",
                signal, pid
            ))),
            _ => Err(HostError::io(format!("/proc/{}", pid), err)),
        }
    }

    #[cfg(not(unix))]
    async fn signal(&self, _pid: u32, signal: Signal) -> Result<()> {
        Err(HostError::NotSupported(format!("{} on this platform", signal)))
    }

    async fn close(&self) {}
}

/// Spawn `command` in its own session with output appended to its errfile.
///
/// The child is released, never waited for.
#[cfg(unix)]
fn spawn_detached(command: &StartCommand) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::process::CommandExt;

    let out = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(&command.errfile)
        .map_err(|e| HostError::io(&command.errfile, e))?;
    if let Some(creds) = &command.credentials {
        std::os::unix::fs::chown(&command.errfile, Some(creds.uid), Some(creds.gid))
            .map_err(|e| HostError::io(&command.errfile, e))?;
    }
    let err = out
        .try_clone()
        .map_err(|e| HostError::io(&command.errfile, e))?;

    let mut cmd = std::process::Command::new(&command.program);
    cmd.args(&command.args)
        .env_clear()
        .envs(command.env.iter().filter_map(|e| e.split_once('=')))
        .current_dir(&command.dir)
        .stdin(std::process::Stdio::null())
        .stdout(out)
        .stderr(err);

    // everything the child needs is prepared before fork
    let ids = command.credentials.as_ref().map(|creds| {
        let groups: Vec<libc::gid_t> = creds.groups.iter().map(|g| *g as libc::gid_t).collect();
        (creds.uid as libc::uid_t, creds.gid as libc::gid_t, groups)
    });
    // SAFETY: only async-signal-safe libc calls run between fork and exec
    unsafe {
        cmd.pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if let Some((uid, gid, groups)) = &ids {
                if libc::setgroups(groups.len() as _, groups.as_ptr()) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::setgid(*gid) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::setuid(*uid) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| HostError::io(&command.program, e))?;
    tracing::debug!("started {} as pid {}", command.program.display(), child.id());
    drop(child);
    Ok(())
}

#[cfg(not(unix))]
fn spawn_detached(command: &StartCommand) -> Result<()> {
    Err(HostError::NotSupported(format!(
        "starting {} on this platform",
        command.program.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_and_stat() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let path = dir.path().join("gateway.json");

        host.write_file(&path, b"{}", 0o640).await.unwrap();
        assert_eq!(host.read_file(&path).await.unwrap(), b"{}");

        let info = host.stat(&path).await.unwrap();
        assert!(info.is_file());
        assert_eq!(info.size, 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let err = host.stat(&dir.path().join("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mkdir_fails_when_present() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let lock = dir.path().join("setup.xml.lck");

        host.mkdir(&lock, 0o755).await.unwrap();
        let err = host.mkdir(&lock, 0o755).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_mkdir_all_and_remove_all() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let deep = dir.path().join("gateway/gateways/demo/cache");

        host.mkdir_all(&deep, 0o755).await.unwrap();
        host.write_file(&deep.join("a"), b"x", 0o644).await.unwrap();
        assert!(host.is_dir(&deep).await);

        host.remove_all(&dir.path().join("gateway")).await.unwrap();
        assert!(!host.exists(&dir.path().join("gateway")).await);
        // already gone
        host.remove_all(&dir.path().join("gateway")).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_dir_sorted() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        for name in ["b", "a", "c"] {
            host.write_file(&dir.path().join(name), b"", 0o644)
                .await
                .unwrap();
        }
        let names: Vec<_> = host
            .read_dir(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_link_symlink_and_rename() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let original = dir.path().join("file.new");
        let live = dir.path().join("file");
        host.write_file(&original, b"v2", 0o644).await.unwrap();

        host.link(&original, &live).await.unwrap();
        assert_eq!(host.read_file(&live).await.unwrap(), b"v2");

        let sym = dir.path().join("current");
        host.symlink(&live, &sym).await.unwrap();
        assert!(host.lstat(&sym).await.unwrap().is_symlink());
        assert_eq!(host.read_link(&sym).await.unwrap(), live);

        let moved = dir.path().join("file.old");
        host.rename(&live, &moved).await.unwrap();
        assert!(!host.exists(&live).await);
        assert!(host.exists(&moved).await);
    }

    #[tokio::test]
    async fn test_glob_local() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        for name in ["a.log", "b.log", "c.txt"] {
            host.write_file(&dir.path().join(name), b"", 0o644)
                .await
                .unwrap();
        }
        let pattern = format!("{}/*.log", dir.path().display());
        let found = host.glob(&pattern).await.unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.log"), dir.path().join("b.log")]
        );
    }

    #[tokio::test]
    async fn test_run_combines_output() {
        let host = Local::new();
        let out = host
            .run(
                "sh",
                &["-c".to_string(), "echo out; echo err >&2".to_string()],
                None,
            )
            .await
            .unwrap();
        assert!(out.success());
        let text = out.text();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_signal_missing_process() {
        let host = Local::new();
        let err = host.signal(999_999_999, Signal::Term).await.unwrap_err();
        assert!(matches!(err, HostError::ProcessNotRunning));
    }

    #[tokio::test]
    async fn test_copy_file_keeps_mode() {
        let dir = TempDir::new().unwrap();
        let host = Local::new();
        let src = dir.path().join("netprobe.json");
        host.write_file(&src, b"{\"port\":7036}", 0o640).await.unwrap();

        let dst = dir.path().join("copy/netprobe.json");
        crate::host::copy_file(&host, &src, &host, &dst).await.unwrap();
        assert_eq!(host.read_file(&dst).await.unwrap(), b"{\"port\":7036}");
        assert_eq!(host.stat(&dst).await.unwrap().mode, 0o640);

        let err = crate::host::copy_file(&host, dir.path(), &host, &dst)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidArgument(_)));
    }
}
