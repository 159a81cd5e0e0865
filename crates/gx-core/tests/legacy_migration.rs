//! Legacy configuration tests
//!
//! Loads `.rc` files written by older tooling and checks that the first
//! save converts them to JSON.

use std::path::Path;
use std::sync::Arc;

use gx_core::results::for_each;
use gx_core::{ComponentKind, Context, GlobalConfig, HostsFile, Instance, Result};
use tempfile::TempDir;

fn context(root: &Path) -> Context {
    let config = GlobalConfig {
        root: root.to_path_buf(),
        ..GlobalConfig::default()
    };
    Context::new(config, HostsFile::default())
}

#[tokio::test]
async fn test_gateway_rc_becomes_json() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("gateway/gateways/gw1");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::write(
        home.join("gateway.rc"),
        "GateName=Example\nGatePort=7039\nTZ=UTC\n",
    )
    .unwrap();

    let ctx = context(dir.path());
    let gw = ctx.instance(ComponentKind::Gateway, "gw1", "localhost").unwrap();
    gw.load().await.unwrap();

    assert!(gw.is_legacy());
    assert_eq!(gw.setting("name"), "Example");
    assert_eq!(gw.settings().get_u16("port"), Some(7039));
    assert_eq!(gw.settings().get_list("env"), vec!["TZ=UTC"]);

    gw.save().await.unwrap();

    assert!(!gw.is_legacy());
    assert!(home.join("gateway.json").exists());
    assert!(home.join("gateway.rc.orig").exists());
    assert!(!home.join("gateway.rc").exists());

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(home.join("gateway.json")).unwrap()).unwrap();
    assert_eq!(json["name"], "Example");
    assert_eq!(json["port"], 7039);

    // a fresh load reads the JSON, not the original
    ctx.unload(&gw);
    let again = ctx.instance(ComponentKind::Gateway, "gw1", "localhost").unwrap();
    again.load().await.unwrap();
    assert!(!again.is_legacy());
    assert_eq!(again.setting("name"), "Example");
}

#[tokio::test]
async fn test_json_wins_over_rc() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("netprobe/netprobes/probe1");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::write(home.join("netprobe.rc"), "NetpPort=7036\n").unwrap();
    std::fs::write(home.join("netprobe.json"), r#"{"port": 7777}"#).unwrap();

    let ctx = context(dir.path());
    let probe = ctx
        .instance(ComponentKind::Netprobe, "probe1", "localhost")
        .unwrap();
    probe.load().await.unwrap();
    assert!(!probe.is_legacy());
    assert_eq!(probe.settings().get_u16("port"), Some(7777));

    // nothing to migrate
    assert!(!probe.migrate().await.unwrap());
    assert!(home.join("netprobe.rc").exists());
}

async fn migrate(instance: Arc<Instance>) -> Result<String> {
    instance.load().await?;
    Ok(if instance.migrate().await? {
        "migrated".to_string()
    } else {
        "unchanged".to_string()
    })
}

#[tokio::test]
async fn test_migrate_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for (path, file, text) in [
        ("gateway/gateways/gw1", "gateway.rc", "GatePort=7039\n"),
        ("netprobe/netprobes/p1", "netprobe.json", "{\"port\": 7036}"),
        ("san/sans/s1", "san.rc", "SanPort=7200\n"),
    ] {
        std::fs::create_dir_all(root.join(path)).unwrap();
        std::fs::write(root.join(path).join(file), text).unwrap();
    }

    let ctx = context(root);
    let instances = ctx.matching(&[]).await.unwrap();
    assert_eq!(instances.len(), 3);

    let responses = for_each(&instances, migrate).await;
    assert!(responses.is_success());

    let outcomes: Vec<(String, String)> = responses
        .iter()
        .map(|r| (r.id(), r.result.as_ref().unwrap().clone()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("gateway:gw1@localhost".to_string(), "migrated".to_string()),
            ("netprobe:p1@localhost".to_string(), "unchanged".to_string()),
            ("san:s1@localhost".to_string(), "migrated".to_string()),
        ]
    );
    assert!(root.join("gateway/gateways/gw1/gateway.json").is_file());
    assert!(root.join("netprobe/sans/s1/san.json").is_file());
    assert!(!root.join("san/sans/s1").exists());
}

#[tokio::test]
async fn test_missing_configuration() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let gw = ctx.instance(ComponentKind::Gateway, "nothing-here", "localhost").unwrap();
    assert!(gw.load().await.unwrap_err().is_not_found());
}
