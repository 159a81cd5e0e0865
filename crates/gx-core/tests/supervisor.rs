//! Supervisor tests against real short-lived processes
//!
//! The netprobe "binary" is a link to `/bin/sh`, so the command line
//! `netprobe.linux_64 NAME -port 7036` runs the script `NAME` in the
//! instance home. The process keeps its argv and is found like a real probe.

#![cfg(target_os = "linux")]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gx_core::config::BackoffConfig;
use gx_core::process::find_pid;
use gx_core::{
    ComponentKind, Context, GeneosError, GlobalConfig, HostsFile, Instance, StartOptions,
    StartOutcome, StopOptions, StopOutcome, Supervisor,
};
use tempfile::TempDir;

fn supervisor() -> Supervisor {
    Supervisor::new(BackoffConfig {
        initial: Duration::from_millis(50),
        max: Duration::from_millis(200),
        multiplier: 2.0,
        jitter: 0.0,
        attempts: 20,
    })
    .with_stop_polling(Duration::from_millis(50), 40)
}

fn context(root: &Path) -> Context {
    let config = GlobalConfig {
        root: root.to_path_buf(),
        ..GlobalConfig::default()
    };
    Context::new(config, HostsFile::default())
}

/// A netprobe whose process loops until signalled. Names must be unique
/// across tests, which run concurrently.
fn fake_probe(ctx: &Context, root: &Path, name: &str, script: &str) -> Arc<Instance> {
    let bin = root.join("packages/netprobe/active_prod");
    std::fs::create_dir_all(&bin).unwrap();
    let program = bin.join("netprobe.linux_64");
    if !program.exists() {
        std::os::unix::fs::symlink("/bin/sh", &program).unwrap();
    }

    let probe = ctx
        .instance(ComponentKind::Netprobe, name, "localhost")
        .unwrap();
    std::fs::create_dir_all(probe.home()).unwrap();
    std::fs::write(probe.home().join(name), script).unwrap();
    probe
}

const LOOP: &str = "while :; do sleep 1; done\n";

#[tokio::test]
async fn test_double_start_spawns_once() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-double-start", LOOP);
    let sup = supervisor();

    let StartOutcome::Started { pid } = sup.start(&probe, &StartOptions::default()).await.unwrap()
    else {
        panic!("first start did not start");
    };
    assert_eq!(
        sup.start(&probe, &StartOptions::default()).await.unwrap(),
        StartOutcome::AlreadyRunning { pid }
    );

    assert_eq!(
        sup.stop(&probe, StopOptions::default()).await.unwrap(),
        StopOutcome::Stopped { pid }
    );
    assert_eq!(find_pid(&probe).await.unwrap(), None);
    assert!(probe.errfile().exists());
}

#[tokio::test]
async fn test_stop_when_stopped_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-never-started", LOOP);

    assert_eq!(
        supervisor().stop(&probe, StopOptions::default()).await.unwrap(),
        StopOutcome::NotRunning
    );
}

#[tokio::test]
async fn test_protected_needs_force() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-protected", LOOP);
    probe.update(|s| s.set("protected", true));
    let sup = supervisor();

    let StartOutcome::Started { pid } = sup.start(&probe, &StartOptions::default()).await.unwrap()
    else {
        panic!("did not start");
    };
    let err = sup.stop(&probe, StopOptions::default()).await.unwrap_err();
    assert!(matches!(err, GeneosError::Protected(_)));
    assert_eq!(find_pid(&probe).await.unwrap(), Some(pid));

    let forced = StopOptions {
        force: true,
        kill: false,
    };
    assert_eq!(sup.stop(&probe, forced).await.unwrap(), StopOutcome::Stopped { pid });
}

#[tokio::test]
async fn test_ignored_sigterm_escalates() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(
        &ctx,
        dir.path(),
        "gx-test-stubborn",
        &format!("trap '' TERM\n{}", LOOP),
    );
    let sup = supervisor().with_stop_polling(Duration::from_millis(50), 3);

    let StartOutcome::Started { pid } = sup.start(&probe, &StartOptions::default()).await.unwrap()
    else {
        panic!("did not start");
    };
    assert_eq!(
        sup.stop(&probe, StopOptions::default()).await.unwrap(),
        StopOutcome::Killed { pid }
    );
}

#[tokio::test]
async fn test_kill_option() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-kill", LOOP);
    let sup = supervisor();

    let StartOutcome::Started { pid } = sup.start(&probe, &StartOptions::default()).await.unwrap()
    else {
        panic!("did not start");
    };
    let kill = StopOptions {
        force: false,
        kill: true,
    };
    assert_eq!(sup.stop(&probe, kill).await.unwrap(), StopOutcome::Killed { pid });
}

#[tokio::test]
async fn test_exit_during_start_is_an_error() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-exits", "echo giving up >&2\nexit 1\n");
    let sup = Supervisor::new(BackoffConfig {
        initial: Duration::from_millis(50),
        max: Duration::from_millis(50),
        multiplier: 1.0,
        jitter: 0.0,
        attempts: 4,
    });

    let err = sup
        .start(&probe, &StartOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GeneosError::Process(_)));
    let output = std::fs::read_to_string(probe.errfile()).unwrap();
    assert!(output.contains("giving up"));
}

#[tokio::test]
async fn test_full_clean_restarts() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let probe = fake_probe(&ctx, dir.path(), "gx-test-purge", LOOP);
    std::fs::write(probe.home().join("netprobe.log"), "log").unwrap();
    std::fs::write(probe.home().join("netprobe.txt.old"), "old").unwrap();
    let sup = supervisor();

    let StartOutcome::Started { pid } = sup.start(&probe, &StartOptions::default()).await.unwrap()
    else {
        panic!("did not start");
    };

    sup.clean(&probe, ctx.config(), false).await.unwrap();
    assert!(!probe.home().join("netprobe.txt.old").exists());
    assert!(probe.home().join("netprobe.log").exists());
    assert_eq!(find_pid(&probe).await.unwrap(), Some(pid));

    sup.clean(&probe, ctx.config(), true).await.unwrap();
    assert!(!probe.home().join("netprobe.log").exists());
    let restarted = find_pid(&probe).await.unwrap().expect("restarted after purge");
    assert_ne!(restarted, pid);

    sup.stop(&probe, StopOptions::default()).await.unwrap();
}
