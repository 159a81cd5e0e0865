//! Atomic replacement of live files from staged `.new` copies
//!
//! A rollout holds `<path>.lck` (a directory, so creating it is atomic on
//! any host), moves the live file to `<path>.old` and hard-links the staged
//! file into place. At every step either the live file or its backup exists.

use std::path::{Path, PathBuf};

use gx_host::{Host, HostError};

use crate::error::{GeneosError, Result};

pub const NEW_SUFFIX: &str = ".new";
pub const OLD_SUFFIX: &str = ".old";
const LOCK_SUFFIX: &str = ".lck";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Replace `path` with `path + new_suffix`, keeping the previous file as
/// `path + old_suffix`
pub async fn roll_file(host: &dyn Host, path: &Path, new_suffix: &str, old_suffix: &str) -> Result<()> {
    roll_locked(host, path, new_suffix, old_suffix).await.map(|_| ())
}

/// As [`roll_file`], returning whether a live file was backed up
async fn roll_locked(host: &dyn Host, path: &Path, new_suffix: &str, old_suffix: &str) -> Result<bool> {
    let lock = with_suffix(path, LOCK_SUFFIX);
    match host.mkdir(&lock, 0o700).await {
        Ok(()) => {}
        Err(HostError::AlreadyExists(_)) => {
            return Err(GeneosError::AlreadyExists(format!(
                "{}: rollout in progress",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    }

    let result = swap(host, path, new_suffix, old_suffix).await;

    if let Err(e) = host.remove(&lock).await {
        tracing::warn!("cannot remove lock {}: {}", lock.display(), e);
    }
    result
}

async fn swap(host: &dyn Host, path: &Path, new_suffix: &str, old_suffix: &str) -> Result<bool> {
    let staged = with_suffix(path, new_suffix);
    let backup = with_suffix(path, old_suffix);

    match host.stat(&staged).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            return Err(GeneosError::NotFound(format!(
                "{}: nothing staged to roll out",
                staged.display()
            )))
        }
        Err(e) => return Err(e.into()),
    }

    let had_live = match host.lstat(path).await {
        Ok(_) => {
            host.rename(path, &backup).await?;
            true
        }
        Err(e) if e.is_not_found() => false,
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = host.link(&staged, path).await {
        if had_live {
            if let Err(restore) = host.rename(&backup, path).await {
                tracing::error!(
                    "cannot restore {} from {}: {}",
                    path.display(),
                    backup.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    host.remove(&staged).await?;
    tracing::debug!("rolled {} into {}", staged.display(), path.display());
    Ok(had_live)
}

/// Roll every path in order. If one fails, the ones already rolled are
/// put back and the first error is returned: a file that had a live copy
/// gets its backup rolled back in with the suffixes swapped, and a file
/// that did not is moved back to its staged name.
pub async fn roll_files(host: &dyn Host, paths: &[PathBuf]) -> Result<()> {
    let mut rolled: Vec<(&PathBuf, bool)> = Vec::new();
    for path in paths {
        match roll_locked(host, path, NEW_SUFFIX, OLD_SUFFIX).await {
            Ok(had_live) => rolled.push((path, had_live)),
            Err(e) => {
                for (done, had_live) in rolled.into_iter().rev() {
                    if let Err(undo) = unroll(host, done, had_live).await {
                        tracing::error!("cannot unroll {}: {}", done.display(), undo);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

async fn unroll(host: &dyn Host, path: &Path, had_live: bool) -> Result<()> {
    if had_live {
        return roll_file(host, path, OLD_SUFFIX, NEW_SUFFIX).await;
    }
    host.rename(path, &with_suffix(path, NEW_SUFFIX)).await?;
    Ok(())
}
