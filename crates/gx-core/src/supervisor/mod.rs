//! Starting, stopping and signalling instance processes
//!
//! Start builds the command line from the instance's component, launches it
//! detached on the instance's host and then polls `/proc` until the process
//! shows up. Stop escalates from SIGTERM to SIGKILL.

mod backoff;

pub use backoff::ExponentialBackoff;

use std::path::PathBuf;
use std::time::Duration;

use gx_host::{users, Credentials, HostError, Signal, StartCommand};

use crate::config::{BackoffConfig, GlobalConfig};
use crate::error::{GeneosError, Result};
use crate::instance::{split_list, Instance};
use crate::process::find_pid;

/// PATH given to instances whose environment does not set one
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";

/// Caller additions to an instance's configured command line
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Appended after the configured arguments
    pub extra_args: Vec<String>,
    /// `KEY=VALUE` entries applied after the configured environment
    pub extra_env: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    /// Stop even if the instance is protected
    pub force: bool,
    /// Skip SIGTERM and send SIGKILL straight away
    pub kill: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running, no signal sent
    NotRunning,
    /// Exited after SIGTERM
    Stopped { pid: u32 },
    /// Exited after SIGKILL
    Killed { pid: u32 },
    /// The process belongs to someone we may not signal
    Refused { pid: u32 },
}

/// Runs start and stop sequences with configurable timing
#[derive(Debug, Clone)]
pub struct Supervisor {
    confirm: BackoffConfig,
    stop_interval: Duration,
    stop_attempts: u32,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl Supervisor {
    pub fn new(confirm: BackoffConfig) -> Self {
        Self {
            confirm,
            stop_interval: Duration::from_millis(250),
            stop_attempts: 10,
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.start_confirm.clone())
    }

    /// Change how often, and how many times, stop checks for the process
    /// to exit before escalating to SIGKILL
    pub fn with_stop_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.stop_interval = interval;
        self.stop_attempts = attempts;
        self
    }

    /// Start `instance` unless it is already running
    pub async fn start(&self, instance: &Instance, options: &StartOptions) -> Result<StartOutcome> {
        if let Some(pid) = find_pid(instance).await? {
            tracing::debug!("{}: already running as pid {}", instance, pid);
            return Ok(StartOutcome::AlreadyRunning { pid });
        }
        if instance.is_disabled().await {
            return Err(GeneosError::Disabled(instance.to_string()));
        }

        let program = PathBuf::from(instance.setting("program"));
        match instance.host().stat(&program).await {
            Ok(info) if !info.is_dir() => {}
            Ok(_) => {
                return Err(GeneosError::InvalidArgument(format!(
                    "{}: program {} is a directory",
                    instance,
                    program.display()
                )))
            }
            Err(e) if e.is_not_found() => {
                return Err(GeneosError::NotFound(format!(
                    "{}: program {}",
                    instance,
                    program.display()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        let credentials = run_as(instance)?;
        let command = build_command(instance, program, options, credentials).await;
        tracing::info!("{}: starting {}", instance, command.shell_line());
        instance.host().start(&command).await?;

        let mut backoff = ExponentialBackoff::from_config(&self.confirm);
        while let Some(delay) = backoff.next_delay() {
            tokio::time::sleep(delay).await;
            if let Some(pid) = find_pid(instance).await? {
                tracing::info!("{}: started with pid {}", instance, pid);
                return Ok(StartOutcome::Started { pid });
            }
        }
        Err(GeneosError::Process(format!(
            "{}: process not found after start, see {}",
            instance,
            command.errfile.display()
        )))
    }

    /// Stop `instance`, escalating to SIGKILL if SIGTERM is ignored
    pub async fn stop(&self, instance: &Instance, options: StopOptions) -> Result<StopOutcome> {
        let Some(pid) = find_pid(instance).await? else {
            return Ok(StopOutcome::NotRunning);
        };
        if instance.settings().get_bool("protected") && !options.force {
            return Err(GeneosError::Protected(instance.to_string()));
        }

        if !options.kill {
            match self.terminate(instance, pid).await? {
                Some(outcome) => return Ok(outcome),
                None => tracing::warn!(
                    "{}: pid {} ignored SIGTERM, sending SIGKILL",
                    instance,
                    pid
                ),
            }
        }

        match instance.host().signal(pid, Signal::Kill).await {
            Ok(()) | Err(HostError::ProcessNotRunning) => {}
            Err(HostError::PermissionDenied(reason)) => return Ok(refused(instance, pid, &reason)),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(self.stop_interval).await;
        match find_pid(instance).await? {
            None => {
                tracing::info!("{}: killed pid {}", instance, pid);
                Ok(StopOutcome::Killed { pid })
            }
            Some(pid) => Err(GeneosError::Process(format!(
                "{}: pid {} still running after SIGKILL",
                instance, pid
            ))),
        }
    }

    /// SIGTERM and wait. `None` means the process outlived every check.
    async fn terminate(&self, instance: &Instance, pid: u32) -> Result<Option<StopOutcome>> {
        match instance.host().signal(pid, Signal::Term).await {
            Ok(()) => {}
            Err(HostError::ProcessNotRunning) => return Ok(Some(StopOutcome::Stopped { pid })),
            Err(HostError::PermissionDenied(reason)) => {
                return Ok(Some(refused(instance, pid, &reason)))
            }
            Err(e) => return Err(e.into()),
        }

        for _ in 0..self.stop_attempts {
            tokio::time::sleep(self.stop_interval).await;
            if find_pid(instance).await?.is_none() {
                tracing::info!("{}: stopped pid {}", instance, pid);
                return Ok(Some(StopOutcome::Stopped { pid }));
            }
            match instance.host().signal(pid, Signal::Term).await {
                Ok(()) => {}
                Err(HostError::ProcessNotRunning) => {
                    return Ok(Some(StopOutcome::Stopped { pid }))
                }
                Err(HostError::PermissionDenied(reason)) => {
                    return Ok(Some(refused(instance, pid, &reason)))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Stop then start
    pub async fn restart(
        &self,
        instance: &Instance,
        stop: StopOptions,
        start: &StartOptions,
    ) -> Result<StartOutcome> {
        self.stop(instance, stop).await?;
        self.start(instance, start).await
    }

    /// Ask a running instance to reload its configuration
    pub async fn reload(&self, instance: &Instance) -> Result<u32> {
        let Some(signal) = instance.component().reload_signal() else {
            return Err(GeneosError::NotSupported(format!(
                "reload of {}",
                instance.kind()
            )));
        };
        let pid = find_pid(instance)
            .await?
            .ok_or(GeneosError::Host(HostError::ProcessNotRunning))?;
        instance.host().signal(pid, signal).await?;
        tracing::info!("{}: sent {} to pid {}", instance, signal, pid);
        Ok(pid)
    }

    /// Remove the type's clean globs from home. A full clean also removes
    /// the purge globs, stopping the instance first and starting it again
    /// afterwards if it was running.
    pub async fn clean(&self, instance: &Instance, config: &GlobalConfig, full: bool) -> Result<usize> {
        let component = instance.component();
        let mut patterns = split_list(
            config
                .type_setting(component.name(), "clean")
                .unwrap_or_else(|| component.default_clean()),
        );
        if !full {
            return instance.remove_files(&patterns).await;
        }

        patterns.extend(split_list(
            config
                .type_setting(component.name(), "purge")
                .unwrap_or_else(|| component.default_purge()),
        ));
        let was_running = match self.stop(instance, StopOptions::default()).await? {
            StopOutcome::NotRunning => false,
            StopOutcome::Refused { pid } => {
                return Err(GeneosError::PermissionDenied(format!(
                    "{}: cannot stop pid {} for a full clean",
                    instance, pid
                )))
            }
            StopOutcome::Stopped { .. } | StopOutcome::Killed { .. } => true,
        };
        let removed = instance.remove_files(&patterns).await?;
        if was_running {
            self.start(instance, &StartOptions::default()).await?;
        }
        Ok(removed)
    }
}

fn refused(instance: &Instance, pid: u32, reason: &str) -> StopOutcome {
    tracing::warn!("{}: pid {}: {}", instance, pid, reason);
    StopOutcome::Refused { pid }
}

/// The identity to start `instance` as, or `None` to run as ourselves.
///
/// Only root on the local host can switch to a different configured user.
fn run_as(instance: &Instance) -> Result<Option<Credentials>> {
    let user = instance.setting("user");
    let host = instance.host();
    if user.is_empty() || user == host.username() {
        return Ok(None);
    }
    if host.is_local() && users::is_superuser() {
        return Ok(Some(users::lookup_user(&user)?));
    }
    Err(GeneosError::PermissionDenied(format!(
        "{} is configured to run as {}, not {}",
        instance,
        user,
        host.username()
    )))
}

/// TLS arguments from `certificate`, `privatekey` and `certchain`.
///
/// Nothing is added without a certificate. The chain defaults to
/// `<root>/tls/geneos-chain.pem` when that file exists.
async fn secure_args(instance: &Instance) -> Vec<String> {
    let (cert, key, chain, secure_flag) = instance.with_view(|view| {
        (
            view.path_setting("certificate"),
            view.path_setting("privatekey"),
            view.path_setting("certchain"),
            instance.component().secure_flag(),
        )
    });
    let Some(cert) = cert else {
        return vec![];
    };

    let mut args = Vec::new();
    if secure_flag {
        args.push("-secure".to_string());
    }
    args.push("-ssl-certificate".to_string());
    args.push(cert.display().to_string());
    if let Some(key) = key {
        args.push("-ssl-certificate-key".to_string());
        args.push(key.display().to_string());
    }
    let chain = chain.unwrap_or_else(|| instance.root().join("tls").join("geneos-chain.pem"));
    if matches!(instance.host().stat(&chain).await, Ok(info) if info.is_file()) {
        args.push("-ssl-certificate-chain".to_string());
        args.push(chain.display().to_string());
    }
    args
}

/// Assemble the full command for `instance`
pub async fn build_command(
    instance: &Instance,
    program: PathBuf,
    options: &StartOptions,
    credentials: Option<Credentials>,
) -> StartCommand {
    let secure = secure_args(instance).await;
    let launch = instance.with_view(|view| instance.component().command(view, secure));
    let settings = instance.settings();

    let mut args = launch.args;
    args.extend(
        settings
            .get_string("options")
            .split_whitespace()
            .map(str::to_string),
    );
    args.extend(options.extra_args.iter().cloned());

    let home = match &credentials {
        Some(creds) => Some(creds.home.clone()),
        None if instance.host().is_local() => std::env::var_os("HOME").map(PathBuf::from),
        // a remote login shell provides its own
        None => None,
    };
    let env = build_environment(
        launch.env,
        &settings.get_string("libpaths"),
        settings.get_list("env"),
        &options.extra_env,
        home,
    );

    StartCommand {
        program,
        args,
        env,
        dir: instance.home(),
        errfile: instance.errfile(),
        credentials,
    }
}

fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(key, _)| key)
}

/// Replace any entry with the same key, keeping the newest last
fn set(env: &mut Vec<String>, entry: String) {
    let key = env_key(&entry).to_string();
    env.retain(|e| env_key(e) != key);
    env.push(entry);
}

/// Merge environment sources in order: the component's own entries, the
/// configured `env` list, then caller additions. `LD_LIBRARY_PATH` is built
/// from `libpaths` followed by any configured `LD_LIBRARY_PATH=` entries.
/// `HOME` and `PATH` get defaults if nothing set them.
pub fn build_environment(
    component_env: Vec<String>,
    libpaths: &str,
    configured: Vec<String>,
    extra: &[String],
    home: Option<PathBuf>,
) -> Vec<String> {
    let mut env: Vec<String> = Vec::new();

    for entry in component_env {
        set(&mut env, entry);
    }

    let mut libs: Vec<String> = split_list(libpaths);
    for entry in configured {
        match entry.strip_prefix("LD_LIBRARY_PATH=") {
            Some(paths) => libs.extend(split_list(paths)),
            None if entry.contains('=') => set(&mut env, entry),
            None => tracing::warn!("ignoring environment entry {:?} without '='", entry),
        }
    }
    if !libs.is_empty() {
        set(&mut env, format!("{}={}", LD_LIBRARY_PATH, libs.join(":")));
    }

    for entry in extra {
        set(&mut env, entry.clone());
    }

    if !env.iter().any(|e| env_key(e) == "HOME") {
        if let Some(home) = home {
            env.push(format!("HOME={}", home.display()));
        }
    }
    if !env.iter().any(|e| env_key(e) == "PATH") {
        env.push(format!("PATH={}", DEFAULT_PATH));
    }
    env
}
