//! CLI integration tests
//!
//! Drives the fwdmng binary against temporary config files.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fwdmng(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fwdmng")
        .expect("Failed to locate fwdmng binary - ensure it's built before running tests");
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

fn config_path(dir: &TempDir) -> PathBuf {
    dir.path().join("fwdconfig.toml")
}

fn read_config(path: &Path) -> toml::Table {
    toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn add_bastion(path: &Path) {
    fwdmng(path)
        .args(["add-host", "bastion", "bastion.example:2222", "--key", "/keys/id", "--user", "ops"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added host 'bastion'"));
}

fn forwards(path: &Path) -> Vec<toml::Value> {
    let config = read_config(path);
    config["SSHHosts"][0]["Fwds"].as_array().unwrap().clone()
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    fwdmng(&config_path(&dir))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SSH port-forwarding manager"));
}

#[test]
fn test_cli_unknown_command() {
    let dir = TempDir::new().unwrap();
    fwdmng(&config_path(&dir))
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_list_without_config() {
    let dir = TempDir::new().unwrap();
    fwdmng(&config_path(&dir))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No hosts configured"));
}

#[test]
fn test_config_path_honors_env() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    Command::cargo_bin("fwdmng")
        .unwrap()
        .env("FWDMNG_CONFIG", &path)
        .arg("config-path")
        .assert()
        .success()
        .stdout(predicate::str::contains(path.to_string_lossy().as_ref()));
}

#[test]
fn test_add_host_writes_template() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    let config = read_config(&path);
    let host = &config["SSHHosts"][0];
    assert_eq!(host["Name"].as_str(), Some("bastion"));
    assert_eq!(host["Hostname"].as_str(), Some("bastion.example:2222"));
    assert_eq!(host["User"].as_str(), Some("ops"));
    assert_eq!(host["Privkey"].as_str(), Some("/keys/id"));

    let fwds = forwards(&path);
    assert_eq!(fwds.len(), 1);
    assert_eq!(fwds[0]["Name"].as_str(), Some("unknown"));
    assert_eq!(fwds[0]["Local"].as_str(), Some(":0"));
    assert_eq!(fwds[0]["Remote"].as_str(), Some("127.0.0.1:0"));

    fwdmng(&path)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("bastion"))
        .stdout(predicate::str::contains("└ unknown"));
}

#[cfg(unix)]
#[test]
fn test_saved_config_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_duplicate_host_rejected() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    fwdmng(&path)
        .args(["add-host", "bastion", "other.example", "--key", "/keys/id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_forward_editing() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    fwdmng(&path)
        .args(["edit-forward", "bastion", "unknown", "--name", "web", "--local", "127.0.0.1:9000", "--remote", "10.0.0.5:80"])
        .assert()
        .success();
    fwdmng(&path)
        .args(["add-forward", "bastion", "--name", "db", "--local", ":15432", "--remote", "10.0.0.6:5432"])
        .assert()
        .success();

    let fwds = forwards(&path);
    assert_eq!(fwds.len(), 2);
    assert_eq!(fwds[0]["Name"].as_str(), Some("web"));
    assert_eq!(fwds[0]["Local"].as_str(), Some("127.0.0.1:9000"));
    assert_eq!(fwds[1]["Remote"].as_str(), Some("10.0.0.6:5432"));

    fwdmng(&path)
        .args(["remove-forward", "bastion", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed forward 'web'"));
    assert_eq!(forwards(&path).len(), 1);
}

#[test]
fn test_invalid_forward_address_rejected() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    fwdmng(&path)
        .args(["add-forward", "bastion", "--local", "no-port", "--remote", "10.0.0.5:80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid local address"));
    assert_eq!(forwards(&path).len(), 1);
}

#[test]
fn test_removing_last_forward_removes_host() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    fwdmng(&path)
        .args(["remove-forward", "bastion", "unknown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed host 'bastion'"));

    fwdmng(&path)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No hosts configured"));
}

#[test]
fn test_edit_host() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    add_bastion(&path);

    fwdmng(&path)
        .args(["edit-host", "bastion", "--rename", "jump", "--proxy", "proxy.corp:3128"])
        .assert()
        .success();

    let config = read_config(&path);
    let host = &config["SSHHosts"][0];
    assert_eq!(host["Name"].as_str(), Some("jump"));
    assert_eq!(host["Proxy"].as_str(), Some("proxy.corp:3128"));

    fwdmng(&path)
        .args(["edit-host", "jump", "--proxy", ""])
        .assert()
        .success();
    assert!(read_config(&path)["SSHHosts"][0].get("Proxy").is_none());
}

#[test]
fn test_unknown_host() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);

    fwdmng(&path)
        .args(["remove-host", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown host 'ghost'"));
    fwdmng(&path)
        .args(["run", "--host", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown host 'ghost'"));
}

#[test]
fn test_run_with_no_hosts_exits() {
    let dir = TempDir::new().unwrap();
    fwdmng(&config_path(&dir))
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("No hosts configured"));
}

#[test]
fn test_malformed_config_reported() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    std::fs::write(&path, "SSHHosts = 3").unwrap();

    fwdmng(&path)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}
