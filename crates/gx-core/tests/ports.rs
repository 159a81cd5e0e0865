//! Port allocation against instances on disk

use std::collections::BTreeSet;
use std::path::Path;

use gx_core::ports::next_free_port;
use gx_core::process::listening_sockets;
use gx_core::{ComponentKind, Context, GlobalConfig, HostsFile};
use gx_host::Local;
use tempfile::TempDir;

fn context(root: &Path, ranges: &[(&str, &str)]) -> Context {
    let mut config = GlobalConfig {
        root: root.to_path_buf(),
        ..GlobalConfig::default()
    };
    for (key, value) in ranges {
        config.settings.insert(key.to_string(), value.to_string());
    }
    Context::new(config, HostsFile::default())
}

fn write_instance(root: &Path, dir: &str, file: &str, port: u16) {
    let home = root.join(dir);
    std::fs::create_dir_all(&home).unwrap();
    std::fs::write(home.join(file), format!("{{\"port\": {}}}", port)).unwrap();
}

/// Whatever the machine running the tests is listening on
async fn busy() -> BTreeSet<u16> {
    listening_sockets(&Local::new())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.port)
        .collect()
}

#[tokio::test]
async fn test_skips_ports_of_every_type() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    // a gateway and a netprobe whose ranges overlap
    write_instance(root, "gateway/gateways/gw1", "gateway.json", 47100);
    write_instance(root, "netprobe/netprobes/p1", "netprobe.json", 47101);
    let ctx = context(
        root,
        &[("gateway::ports", "47100-47120"), ("netprobe::ports", "47101-47120")],
    );

    let busy = busy().await;
    let expected = (47102..=47120).find(|p| !busy.contains(p)).unwrap();

    let gateway = next_free_port(&ctx, "localhost", ComponentKind::Gateway)
        .await
        .unwrap();
    assert_eq!(gateway, expected);
    let netprobe = next_free_port(&ctx, "localhost", ComponentKind::Netprobe)
        .await
        .unwrap();
    assert_eq!(netprobe, expected);
}

#[tokio::test]
async fn test_legacy_instances_count() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let home = root.join("gateway/gateways/old");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::write(home.join("gateway.rc"), "GatePort=47300\n").unwrap();
    let ctx = context(root, &[("gateway::ports", "47300,47301")]);

    let busy = busy().await;
    let port = next_free_port(&ctx, "localhost", ComponentKind::Gateway).await;
    if busy.contains(&47301) {
        assert!(port.unwrap_err().is_not_found());
    } else {
        assert_eq!(port.unwrap(), 47301);
    }
}

#[tokio::test]
async fn test_unusable_range() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), &[("licd::ports", "none,of-these")]);
    let err = next_free_port(&ctx, "localhost", ComponentKind::Licd)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), gx_core::ErrorKind::InvalidArgument);
}
