//! CLI integration tests
//!
//! Runs the geneos binary against a throwaway root using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn geneos(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("geneos")
        .expect("Failed to locate geneos binary - ensure it's built before running tests");
    cmd.env("GENEOS_HOME", dir.join("root"))
        .env("GENEOS_CONFIG", dir.join("geneos.toml"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("geneos"))
        .stdout(predicate::str::contains("Manage Geneos instances"));
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("geneos"));
}

#[test]
fn test_cli_stop_help() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .args(["stop", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--kill"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_cli_unknown_command() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_list_empty_root() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No instances found"));
}

#[test]
fn test_add_show_and_set() {
    let dir = TempDir::new().unwrap();

    geneos(dir.path())
        .args(["add", "netprobe", "probe1", "--port", "7036"])
        .assert()
        .success()
        .stdout(predicate::str::contains("probe1"));

    let config = dir
        .path()
        .join("root/netprobe/netprobes/probe1/netprobe.json");
    assert!(config.exists());
    assert!(!dir.path().join("root/netprobe/netprobe_shared").exists());

    geneos(dir.path())
        .args(["add", "netprobe", "probe1"])
        .assert()
        .failure();

    geneos(dir.path())
        .args(["set", "probe1", "--", "options=-debug"])
        .assert()
        .success();

    geneos(dir.path())
        .args(["show", "netprobe:probe1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"port\": 7036"))
        .stdout(predicate::str::contains("-debug"));

    geneos(dir.path())
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("probe1"))
        .stdout(predicate::str::contains("7036"));
}

#[test]
fn test_set_rejects_bare_word() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .args(["set", "probe1", "--", "options"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn test_disable_then_enable() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .args(["add", "gateway", "gw1", "-p", "7039"])
        .assert()
        .success();
    assert!(dir.path().join("root/gateway/gateway_shared/keyfiles").is_dir());

    geneos(dir.path())
        .args(["disable", "gw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
    assert!(dir
        .path()
        .join("root/gateway/gateways/gw1/gateway.disabled")
        .exists());

    geneos(dir.path())
        .args(["list", "gateway:gw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));

    geneos(dir.path())
        .args(["start", "gw1"])
        .assert()
        .failure();

    geneos(dir.path())
        .args(["enable", "gw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("enabled"));
    assert!(!dir
        .path()
        .join("root/gateway/gateways/gw1/gateway.disabled")
        .exists());
}

#[test]
fn test_hosts_add_and_list() {
    let dir = TempDir::new().unwrap();
    geneos(dir.path())
        .args([
            "hosts",
            "add",
            "db1",
            "--hostname",
            "db1.example.com",
            "--port",
            "2222",
            "--user",
            "geneos",
        ])
        .assert()
        .success();

    let saved = std::fs::read_to_string(dir.path().join("hosts.toml")).unwrap();
    assert!(saved.contains("db1.example.com"));

    geneos(dir.path())
        .arg("hosts")
        .assert()
        .success()
        .stdout(predicate::str::contains("localhost"))
        .stdout(predicate::str::contains("db1.example.com"))
        .stdout(predicate::str::contains("2222"));

    geneos(dir.path())
        .args(["hosts", "add", "localhost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reserved"));
}

#[test]
fn test_roll_staged_file() {
    let dir = TempDir::new().unwrap();
    let live = dir.path().join("gateway.setup.xml");
    std::fs::write(&live, "old").unwrap();
    std::fs::write(dir.path().join("gateway.setup.xml.new"), "new").unwrap();

    geneos(dir.path())
        .arg("roll")
        .arg(&live)
        .assert()
        .success()
        .stdout(predicate::str::contains("rolled out"));

    assert_eq!(std::fs::read_to_string(&live).unwrap(), "new");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("gateway.setup.xml.old")).unwrap(),
        "old"
    );
    assert!(!dir.path().join("gateway.setup.xml.new").exists());

    geneos(dir.path())
        .arg("roll")
        .arg(&live)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing staged"));
}
