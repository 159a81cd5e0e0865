//! Marker files and cleanup inside an instance's home

use std::path::{Component as PathComponent, Path, PathBuf};

use super::Instance;
use crate::error::{GeneosError, Result};

/// Split a colon separated list, dropping empty entries
pub fn split_list(list: &str) -> Vec<String> {
    list.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject patterns that could reach outside the home directory
fn check_relative(pattern: &str) -> Result<()> {
    let path = Path::new(pattern);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, PathComponent::ParentDir | PathComponent::RootDir))
    {
        return Err(GeneosError::InvalidArgument(format!(
            "cleanup pattern {:?} must be relative to the instance home",
            pattern
        )));
    }
    Ok(())
}

impl Instance {
    /// `<home>/<type>.disabled`
    pub fn disabled_path(&self) -> PathBuf {
        self.type_file("disabled")
    }

    pub async fn is_disabled(&self) -> bool {
        self.host().exists(&self.disabled_path()).await
    }

    /// Create the disabled marker. Returns false if it was already there.
    pub async fn disable(&self) -> Result<bool> {
        let path = self.disabled_path();
        if self.host().exists(&path).await {
            return Ok(false);
        }
        let note = format!("disabled by {}\n", gx_host::users::current_username());
        self.host().write_file(&path, note.as_bytes(), 0o664).await?;
        tracing::info!("{}: disabled", self);
        Ok(true)
    }

    /// Remove the disabled marker. Returns false if there was none.
    pub async fn enable(&self) -> Result<bool> {
        match self.host().remove(&self.disabled_path()).await {
            Ok(()) => {
                tracing::info!("{}: enabled", self);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove everything in home matching the relative glob `patterns`.
    /// Returns the number of paths removed.
    pub async fn remove_files(&self, patterns: &[String]) -> Result<usize> {
        for pattern in patterns {
            check_relative(pattern)?;
        }
        let home = self.home();
        let mut removed = 0;
        for pattern in patterns {
            let pattern = pattern.trim_end_matches('/');
            let full = home.join(pattern);
            for path in self.host().glob(&full.to_string_lossy()).await? {
                self.host().remove_all(&path).await?;
                tracing::debug!("{}: removed {}", self, path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;
    use gx_host::Local;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("*.old:*.history"), vec!["*.old", "*.history"]);
        assert_eq!(split_list(":a::b:"), vec!["a", "b"]);
        assert!(split_list("").is_empty());
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let dir = TempDir::new().unwrap();
        let gw = Instance::new(
            ComponentKind::Gateway,
            "gw1",
            Arc::new(Local::new()),
            dir.path().to_path_buf(),
        );
        std::fs::create_dir_all(gw.home()).unwrap();

        assert!(!gw.is_disabled().await);
        assert!(gw.disable().await.unwrap());
        assert!(gw.home().join("gateway.disabled").is_file());
        assert!(!gw.disable().await.unwrap());
        assert!(gw.enable().await.unwrap());
        assert!(!gw.enable().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_files() {
        let dir = TempDir::new().unwrap();
        let gw = Instance::new(
            ComponentKind::Gateway,
            "gw1",
            Arc::new(Local::new()),
            dir.path().to_path_buf(),
        );
        let home = gw.home();
        std::fs::create_dir_all(home.join("cache/sub")).unwrap();
        std::fs::write(home.join("cache/sub/x"), "x").unwrap();
        std::fs::write(home.join("a.old"), "").unwrap();
        std::fs::write(home.join("b.old"), "").unwrap();
        std::fs::write(home.join("gateway.json"), "{}").unwrap();

        let removed = gw
            .remove_files(&split_list("*.old:cache/:missing.txt"))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(!home.join("cache").exists());
        assert!(home.join("gateway.json").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_patterns() {
        let dir = TempDir::new().unwrap();
        let gw = Instance::new(
            ComponentKind::Gateway,
            "gw1",
            Arc::new(Local::new()),
            dir.path().to_path_buf(),
        );
        for bad in ["/etc/passwd", "../other/*", "logs/../../x"] {
            let err = gw.remove_files(&[bad.to_string()]).await.unwrap_err();
            assert!(matches!(err, GeneosError::InvalidArgument(_)), "{}", bad);
        }
    }
}
