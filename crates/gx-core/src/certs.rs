//! Reading and writing TLS material and key files on a host
//!
//! Generating certificates and encoding key files are left to other tools;
//! this module only moves the bytes. Writes are staged as `<path>.new` and
//! rolled into place so a reader never sees a partial file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gx_host::Host;

use crate::error::Result;
use crate::rollout::{roll_file, NEW_SUFFIX, OLD_SUFFIX};

const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

/// Certificate and private key storage
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// PEM certificate at `path`
    async fn read_certificate(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write_certificate(&self, path: &Path, pem: &[u8]) -> Result<()>;

    /// PEM private key at `path`
    async fn read_private_key(&self, path: &Path) -> Result<Vec<u8>>;

    /// Written readable by the owner only
    async fn write_private_key(&self, path: &Path, pem: &[u8]) -> Result<()>;
}

/// Shared gateway key files, in whatever encoding the caller uses
#[async_trait]
pub trait KeyfileCodec: Send + Sync {
    async fn read_keyfile(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write_keyfile(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Plain files on a [`Host`]
#[derive(Debug, Clone)]
pub struct HostFileStore {
    host: Arc<dyn Host>,
}

impl HostFileStore {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    async fn stage_and_roll(&self, path: &Path, data: &[u8], mode: u32) -> Result<()> {
        if let Some(dir) = path.parent() {
            self.host.mkdir_all(dir, 0o775).await?;
        }
        let mut staged = path.as_os_str().to_owned();
        staged.push(NEW_SUFFIX);
        let staged = Path::new(&staged);
        // mode only applies to a newly created file
        match self.host.remove(staged).await {
            Ok(()) => tracing::debug!("removed stale {}", staged.display()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.host.write_file(staged, data, mode).await?;
        roll_file(self.host.as_ref(), path, NEW_SUFFIX, OLD_SUFFIX).await
    }
}

#[async_trait]
impl CertificateStore for HostFileStore {
    async fn read_certificate(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.host.read_file(path).await?)
    }

    async fn write_certificate(&self, path: &Path, pem: &[u8]) -> Result<()> {
        self.stage_and_roll(path, pem, CERT_MODE).await
    }

    async fn read_private_key(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.host.read_file(path).await?)
    }

    async fn write_private_key(&self, path: &Path, pem: &[u8]) -> Result<()> {
        self.stage_and_roll(path, pem, KEY_MODE).await
    }
}

#[async_trait]
impl KeyfileCodec for HostFileStore {
    async fn read_keyfile(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.host.read_file(path).await?)
    }

    async fn write_keyfile(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.stage_and_roll(path, contents, KEY_MODE).await
    }
}
