//! Instances: identity, home directory and configuration

mod files;
pub mod legacy;
mod reference;

pub use files::split_list;
pub use reference::{is_pattern, validate_name, InstanceRef};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use gx_host::Host;

use crate::component::{Component, ComponentKind, InstanceView};
use crate::error::{GeneosError, Result};
use crate::settings::Settings;

#[derive(Debug)]
struct State {
    settings: Settings,
    home: PathBuf,
    loaded: Option<SystemTime>,
    legacy: bool,
}

/// One managed instance: a (type, name, host) triple and its settings.
///
/// Obtain instances through [`crate::Context::instance`] so that the same
/// identity always yields the same value.
pub struct Instance {
    kind: ComponentKind,
    name: String,
    host: Arc<dyn Host>,
    root: PathBuf,
    state: RwLock<State>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.to_string())
            .field("root", &self.root)
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.name, self.host.name())
    }
}

impl Instance {
    /// Create an unloaded instance with type defaults applied
    pub(crate) fn new(kind: ComponentKind, name: &str, host: Arc<dyn Host>, root: PathBuf) -> Self {
        let home = kind.instances_dir(&root).join(name);
        let mut settings = Settings::new();
        settings.set("home", home.to_string_lossy().into_owned());
        kind.component().apply_defaults(&mut settings, &root, name);
        Self {
            kind,
            name: name.to_string(),
            host,
            root,
            state: RwLock::new(State {
                settings,
                home,
                loaded: None,
                legacy: false,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn component(&self) -> &'static dyn Component {
        self.kind.component()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Geneos root on this instance's host
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference(&self) -> InstanceRef {
        InstanceRef {
            kind: Some(self.kind),
            name: self.name.clone(),
            host: self.host.name().to_string(),
        }
    }

    /// Home directory as resolved by the last load
    pub fn home(&self) -> PathBuf {
        self.read().home.clone()
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> Settings {
        self.read().settings.clone()
    }

    /// One setting as a string, empty if unset
    pub fn setting(&self, key: &str) -> String {
        self.read().settings.get_string(key)
    }

    /// Modify settings in memory. Call [`Instance::save`] to persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        f(&mut self.write().settings)
    }

    /// Run `f` with a view of this instance for component callbacks
    pub fn with_view<R>(&self, f: impl FnOnce(&InstanceView<'_>) -> R) -> R {
        let state = self.read();
        let view = InstanceView {
            name: &self.name,
            home: &state.home,
            settings: &state.settings,
        };
        f(&view)
    }

    /// Modification time of the config file last loaded
    pub fn loaded(&self) -> Option<SystemTime> {
        self.read().loaded
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded.is_some()
    }

    /// True if settings came from a legacy `.rc` file
    pub fn is_legacy(&self) -> bool {
        self.read().legacy
    }

    /// `<home>/<type>.<ext>`
    pub fn type_file(&self, ext: &str) -> PathBuf {
        self.home().join(self.kind.file_name(ext))
    }

    /// `<home>/<type>.json`
    pub fn config_path(&self) -> PathBuf {
        self.type_file("json")
    }

    /// `<home>/<type>.txt`, receiving the process's stdout and stderr
    pub fn errfile(&self) -> PathBuf {
        self.type_file("txt")
    }

    /// Find the home directory: the configured `home` if it is a directory,
    /// then the standard location, then (for types with a parent) the
    /// legacy location, else the standard location even if missing
    pub async fn resolve_home(&self) -> PathBuf {
        let configured = self.setting("home");
        if !configured.is_empty() && self.host.is_dir(Path::new(&configured)).await {
            return PathBuf::from(configured);
        }

        let standard = self.kind.instances_dir(&self.root).join(&self.name);
        if self.host.is_dir(&standard).await {
            return standard;
        }

        if let Some(legacy_dir) = self.kind.legacy_instances_dir(&self.root) {
            let legacy = legacy_dir.join(&self.name);
            if self.host.is_dir(&legacy).await {
                return legacy;
            }
        }
        standard
    }

    /// True if the home directory exists
    pub async fn exists(&self) -> bool {
        let home = self.resolve_home().await;
        self.host.is_dir(&home).await
    }

    /// Load settings from `<type>.json`, or from a legacy `<type>.rc`.
    ///
    /// A file already loaded with the same modification time is not read
    /// again. Defaults fill in whatever the file leaves unset.
    pub async fn load(&self) -> Result<()> {
        let home = self.resolve_home().await;
        let json_path = home.join(self.kind.file_name("json"));
        let rc_path = home.join(self.kind.file_name("rc"));

        let (path, legacy, info) = match self.host.stat(&json_path).await {
            Ok(info) => (json_path, false, info),
            Err(e) if e.is_not_found() => match self.host.stat(&rc_path).await {
                Ok(info) => (rc_path, true, info),
                Err(e) if e.is_not_found() => {
                    return Err(GeneosError::NotFound(format!(
                        "no configuration for {} in {}",
                        self,
                        home.display()
                    )))
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        };

        if info.modified.is_some() && self.loaded() == info.modified && self.home() == home {
            tracing::debug!("{}: {} unchanged, not reloading", self, path.display());
            return Ok(());
        }

        let data = self.host.read_file(&path).await?;
        let mut settings = if legacy {
            legacy::parse_rc(&String::from_utf8_lossy(&data), self.component())
        } else {
            serde_json::from_slice::<Settings>(&data).map_err(|source| GeneosError::Json {
                path: path.clone(),
                source,
            })?
        };
        settings.set("home", home.to_string_lossy().into_owned());
        self.component()
            .apply_defaults(&mut settings, &self.root, &self.name);

        let mut state = self.write();
        state.settings = settings;
        state.home = home;
        state.loaded = info.modified.or_else(|| Some(SystemTime::now()));
        state.legacy = legacy;
        tracing::debug!("{}: loaded {}", self, path.display());
        Ok(())
    }

    /// Forget loaded settings so the next load reads the file again
    pub fn unload(&self) {
        let mut state = self.write();
        state.loaded = None;
        state.legacy = false;
    }

    /// Write all settings to `<type>.json`.
    ///
    /// If they were loaded from a legacy `.rc` file, that file is renamed to
    /// `<type>.rc.orig` afterwards and the instance is no longer legacy.
    pub async fn save(&self) -> Result<()> {
        let home = self.home();
        self.host.mkdir_all(&home, 0o775).await?;

        let json_path = home.join(self.kind.file_name("json"));
        let data = serde_json::to_vec_pretty(&self.settings()).map_err(|source| {
            GeneosError::Json {
                path: json_path.clone(),
                source,
            }
        })?;
        self.host.write_file(&json_path, &data, 0o664).await?;

        if self.is_legacy() {
            let rc = home.join(self.kind.file_name("rc"));
            let orig = home.join(self.kind.file_name("rc.orig"));
            if self.host.exists(&rc).await {
                self.host.rename(&rc, &orig).await?;
                tracing::info!("{}: migrated {} to {}", self, rc.display(), json_path.display());
            }
        }

        let modified = self.host.stat(&json_path).await.ok().and_then(|i| i.modified);
        let mut state = self.write();
        state.legacy = false;
        state.loaded = modified.or_else(|| Some(SystemTime::now()));
        Ok(())
    }

    /// Convert a legacy instance to JSON configuration.
    ///
    /// An instance found under its type's legacy directory is first moved
    /// to the standard one. Returns false if there was nothing to do: not
    /// legacy, no `.rc` file, or a `.json` file already present.
    pub async fn migrate(&self) -> Result<bool> {
        let mut moved = false;
        let home = self.home();
        let standard = self.kind.instances_dir(&self.root).join(&self.name);
        if home != standard && !self.host.exists(&standard).await {
            if let Some(legacy_dir) = self.kind.legacy_instances_dir(&self.root) {
                if home.parent() == Some(legacy_dir.as_path()) {
                    if let Some(parent) = standard.parent() {
                        self.host.mkdir_all(parent, 0o775).await?;
                    }
                    self.host.rename(&home, &standard).await?;
                    tracing::info!("{}: moved {} to {}", self, home.display(), standard.display());
                    let mut state = self.write();
                    state.home = standard.clone();
                    state.settings.set("home", standard.to_string_lossy().into_owned());
                    moved = true;
                }
            }
        }

        if !self.is_legacy() {
            return Ok(moved);
        }
        let home = self.home();
        if !self.host.exists(&home.join(self.kind.file_name("rc"))).await
            || self.host.exists(&home.join(self.kind.file_name("json"))).await
        {
            return Ok(moved);
        }
        self.save().await?;
        Ok(true)
    }

    /// Restore a migrated legacy configuration: `<type>.rc.orig` becomes
    /// `<type>.rc` again and `<type>.json` is removed
    pub async fn revert(&self) -> Result<bool> {
        let home = self.home();
        let orig = home.join(self.kind.file_name("rc.orig"));
        if !self.host.exists(&orig).await {
            return Ok(false);
        }
        self.host
            .rename(&orig, &home.join(self.kind.file_name("rc")))
            .await?;
        match self.host.remove(&home.join(self.kind.file_name("json"))).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.unload();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_host::Local;
    use tempfile::TempDir;

    fn instance(root: &Path, kind: ComponentKind, name: &str) -> Instance {
        Instance::new(kind, name, Arc::new(Local::new()), root.to_path_buf())
    }

    #[tokio::test]
    async fn test_defaults_before_load() {
        let dir = TempDir::new().unwrap();
        let gw = instance(dir.path(), ComponentKind::Gateway, "Demo");
        assert!(!gw.is_loaded());
        assert_eq!(gw.home(), dir.path().join("gateway/gateways/Demo"));
        assert_eq!(gw.setting("port"), "7039");
        assert_eq!(gw.to_string(), "gateway:Demo@localhost");
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let gw = instance(dir.path(), ComponentKind::Gateway, "nothing");
        let err = gw.load().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!gw.exists().await);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let np = instance(dir.path(), ComponentKind::Netprobe, "probe1");
        np.update(|s| s.set("port", 7101));
        np.save().await.unwrap();
        assert!(dir.path().join("netprobe/netprobes/probe1/netprobe.json").is_file());

        let again = instance(dir.path(), ComponentKind::Netprobe, "probe1");
        again.load().await.unwrap();
        assert_eq!(again.settings().get_u16("port"), Some(7101));
        assert!(!again.is_legacy());
        assert!(again.loaded().is_some());
    }

    #[tokio::test]
    async fn test_configured_home_wins() {
        let dir = TempDir::new().unwrap();
        let custom = dir.path().join("elsewhere");
        std::fs::create_dir_all(&custom).unwrap();
        let np = instance(dir.path(), ComponentKind::Netprobe, "probe1");
        np.update(|s| s.set("home", custom.to_string_lossy().into_owned()));
        assert_eq!(np.resolve_home().await, custom);
    }

    #[tokio::test]
    async fn test_san_legacy_home() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("san/sans/s1");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("san.rc"), "SanPort=7200\n").unwrap();

        let san = instance(dir.path(), ComponentKind::San, "s1");
        // the configured default points at the standard location, which is missing
        assert_eq!(san.resolve_home().await, legacy);
        san.load().await.unwrap();
        assert!(san.is_legacy());
        assert_eq!(san.settings().get_u16("port"), Some(7200));

        assert!(san.migrate().await.unwrap());
        let standard = dir.path().join("netprobe/sans/s1");
        assert_eq!(san.home(), standard);
        assert!(standard.join("san.json").is_file());
        assert!(standard.join("san.rc.orig").is_file());
        assert!(!legacy.exists());
    }

    #[tokio::test]
    async fn test_revert() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("licd/licds/l1");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("licd.rc"), "LicdPort=7041\n").unwrap();

        let licd = instance(dir.path(), ComponentKind::Licd, "l1");
        licd.load().await.unwrap();
        licd.save().await.unwrap();
        assert!(home.join("licd.rc.orig").exists());

        assert!(licd.revert().await.unwrap());
        assert!(home.join("licd.rc").exists());
        assert!(!home.join("licd.json").exists());
        assert!(!licd.revert().await.unwrap());
    }
}
