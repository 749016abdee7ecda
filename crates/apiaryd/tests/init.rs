//! Runs the apiaryd binary in a subprocess against a scratch home directory.

use std::process::{Command, Output};

use tempdir::TempDir;

fn apiaryd(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_apiaryd"))
        .arg("--home")
        .arg(home.path())
        .args(args)
        .output()
        .expect("failed to run apiaryd")
}

#[test]
fn test_init_writes_config() {
    let home = TempDir::new("apiaryd").unwrap();

    let out = apiaryd(&home, &["init", "--network-id", "7", "--swarm-port", "0"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let config = std::fs::read_to_string(home.path().join("config.toml")).unwrap();

    assert!(config.contains("network_id = 7"), "config:\n{config}");
    assert!(config.contains("overlay_key"), "config:\n{config}");
    assert!(config.contains("peer_id"), "config:\n{config}");
}

#[test]
fn test_init_refuses_existing_node() {
    let home = TempDir::new("apiaryd").unwrap();

    assert!(apiaryd(&home, &["init"]).status.success());

    let out = apiaryd(&home, &["init"]);
    assert!(!out.status.success());

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("already initialized"),
        "stderr should explain the refusal; stderr:\n{stderr}"
    );

    assert!(apiaryd(&home, &["init", "--force"]).status.success());
}

#[test]
fn test_init_rejects_bootstrap_without_peer_id() {
    let home = TempDir::new("apiaryd").unwrap();

    let out = apiaryd(&home, &["init", "--boot-nodes", "/ip4/127.0.0.1/tcp/1634"]);
    assert!(!out.status.success());

    assert!(!home.path().join("config.toml").exists());
}

#[test]
fn test_run_requires_init() {
    let home = TempDir::new("apiaryd").unwrap();

    let out = apiaryd(&home, &["run"]);
    assert!(!out.status.success());

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("not initialized"),
        "stderr should mention the missing config; stderr:\n{stderr}"
    );
}
