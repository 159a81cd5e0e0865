//! The per-invocation context: configuration, hosts and instance cache

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use gx_host::{ConnectionPool, Host, HostConfig, Local, Remote, LOCALHOST};

use crate::component::ComponentKind;
use crate::config::{GlobalConfig, HostsFile};
use crate::error::{GeneosError, Result};
use crate::instance::{validate_name, Instance, InstanceRef};

type InstanceKey = (ComponentKind, String, String);

/// Everything one invocation shares: configuration, the SSH connection
/// pool, hosts created so far and instances created so far
pub struct Context {
    config: GlobalConfig,
    hosts_file: HostsFile,
    pool: Arc<ConnectionPool>,
    hosts: DashMap<String, Arc<dyn Host>>,
    instances: DashMap<InstanceKey, Arc<Instance>>,
}

impl Context {
    pub fn new(config: GlobalConfig, hosts_file: HostsFile) -> Self {
        let pool = Arc::new(ConnectionPool::new(config.ssh.clone()));
        Self {
            config,
            hosts_file,
            pool,
            hosts: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn hosts_file(&self) -> &HostsFile {
        &self.hosts_file
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Names of every known host, `localhost` first
    pub fn host_names(&self) -> Vec<String> {
        std::iter::once(LOCALHOST.to_string())
            .chain(
                self.hosts_file
                    .hosts
                    .iter()
                    .filter(|h| h.name != LOCALHOST)
                    .map(|h| h.name.clone()),
            )
            .collect()
    }

    /// The host called `name`, created on first use
    pub fn host(&self, name: &str) -> Result<Arc<dyn Host>> {
        if let Some(host) = self.hosts.get(name) {
            return Ok(Arc::clone(&host));
        }
        let host: Arc<dyn Host> = if name == LOCALHOST {
            Arc::new(Local::new())
        } else {
            let config = self
                .hosts_file
                .get(name)
                .cloned()
                .ok_or_else(|| GeneosError::NotFound(format!("host {:?}", name)))?;
            Arc::new(Remote::new(config, Arc::clone(&self.pool)))
        };
        Ok(Arc::clone(
            self.hosts.entry(name.to_string()).or_insert(host).value(),
        ))
    }

    /// Geneos root on host `name`
    pub fn root_on(&self, name: &str) -> PathBuf {
        self.hosts_file
            .get(name)
            .and_then(|h: &HostConfig| h.root.clone())
            .unwrap_or_else(|| self.config.root.clone())
    }

    /// The instance `kind:name@host`. Asking again for the same identity
    /// returns the same value until it is unloaded.
    pub fn instance(&self, kind: ComponentKind, name: &str, host: &str) -> Result<Arc<Instance>> {
        validate_name(name, false)?;
        let key = (kind, name.to_string(), host.to_string());
        if let Some(instance) = self.instances.get(&key) {
            return Ok(Arc::clone(&instance));
        }
        let host_ref = self.host(host)?;
        let instance = Arc::new(Instance::new(kind, name, host_ref, self.root_on(host)));
        Ok(Arc::clone(self.instances.entry(key).or_insert(instance).value()))
    }

    /// Drop a cached instance so the next lookup builds it afresh
    pub fn unload(&self, instance: &Instance) {
        let key = (
            instance.kind(),
            instance.name().to_string(),
            instance.host().name().to_string(),
        );
        self.instances.remove(&key);
    }

    /// Every instance of `kind` on `host`, found by listing its instance
    /// directories (and the legacy one for types with a parent)
    pub async fn instances_on(&self, host: &str, kind: ComponentKind) -> Result<Vec<Arc<Instance>>> {
        let host_ref = self.host(host)?;
        let root = self.root_on(host);
        let mut dirs = vec![kind.instances_dir(&root)];
        dirs.extend(kind.legacy_instances_dir(&root));

        let mut names = Vec::new();
        for dir in dirs {
            let entries = match host_ref.read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let is_dir = entry.info.is_dir()
                    || (entry.info.is_symlink() && host_ref.is_dir(&dir.join(&entry.name)).await);
                if !is_dir {
                    continue;
                }
                if validate_name(&entry.name, false).is_err() {
                    tracing::debug!("skipping {}/{}: not an instance name", dir.display(), entry.name);
                    continue;
                }
                if !names.contains(&entry.name) {
                    names.push(entry.name);
                }
            }
        }
        names.sort();

        names
            .iter()
            .map(|name| self.instance(kind, name, host))
            .collect()
    }

    /// Instances selected by `refs`; no refs selects everything.
    ///
    /// Exact references are returned whether or not the instance exists,
    /// so that callers report each one. Patterns are expanded by listing,
    /// and hosts that cannot be listed are skipped with a warning.
    pub async fn matching(&self, refs: &[InstanceRef]) -> Result<Vec<Arc<Instance>>> {
        let all;
        let refs = if refs.is_empty() {
            all = [InstanceRef {
                kind: None,
                name: "*".to_string(),
                host: "*".to_string(),
            }];
            &all[..]
        } else {
            refs
        };

        let mut found: Vec<Arc<Instance>> = Vec::new();
        let mut push = |instance: Arc<Instance>| {
            if !found.iter().any(|f| Arc::ptr_eq(f, &instance)) {
                found.push(instance);
            }
        };

        for r in refs {
            if !r.is_pattern() {
                match r.kind {
                    Some(kind) => push(self.instance(kind, &r.name, &r.host)?),
                    None => {
                        let mut any = false;
                        for kind in ComponentKind::ALL {
                            let instance = self.instance(kind, &r.name, &r.host)?;
                            if instance.exists().await {
                                push(instance);
                                any = true;
                            }
                        }
                        if !any {
                            return Err(GeneosError::NotFound(format!("instance {}", r)));
                        }
                    }
                }
                continue;
            }

            let kinds: Vec<ComponentKind> = match r.kind {
                Some(kind) => vec![kind],
                None => ComponentKind::ALL.to_vec(),
            };
            for host in self.host_names() {
                if !glob_host(&r.host, &host) {
                    continue;
                }
                for &kind in &kinds {
                    let listed = match self.instances_on(&host, kind).await {
                        Ok(listed) => listed,
                        Err(e) => {
                            tracing::warn!("cannot list {} instances on {}: {}", kind, host, e);
                            break;
                        }
                    };
                    for instance in listed {
                        if r.matches(kind, instance.name(), &host) {
                            push(instance);
                        }
                    }
                }
            }
        }

        found.sort_by(|a, b| {
            (a.host().name(), a.kind(), a.name()).cmp(&(b.host().name(), b.kind(), b.name()))
        });
        Ok(found)
    }

    /// Close every remote transport
    pub async fn close(&self) {
        self.pool.close_all().await;
    }
}

fn glob_host(pattern: &str, host: &str) -> bool {
    pattern == host
        || glob::Pattern::new(pattern)
            .map(|p| p.matches(host))
            .unwrap_or(false)
}
