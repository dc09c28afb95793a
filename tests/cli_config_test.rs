//! Integration tests for `wb config` and `wb version`.
//!
//! - `config set` writes connection settings to config.kdl and the token to
//!   state.kdl (0600)
//! - `config show` reports each value's source and never prints the token
//! - precedence: flag > environment > file > default

mod common;

use common::{TestEnv, stdout_json};
use predicates::prelude::*;
use std::fs;

const TOKEN: &str = "abcd1234efgh5678ijkl";

fn setting<'a>(json: &'a serde_json::Value, key: &str) -> &'a serde_json::Value {
    json["settings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["key"] == key)
        .unwrap_or_else(|| panic!("no setting {}", key))
}

#[test]
fn test_config_set_writes_config_file() {
    let env = TestEnv::new();

    env.wb()
        .args(["config", "set", "organization", "contoso"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key\":\"organization\""));

    let content = fs::read_to_string(env.config_path()).unwrap();
    assert!(content.contains("organization"));
    assert!(content.contains("contoso"));
    assert!(!env.state_path().exists());
}

#[test]
fn test_config_set_pat_goes_to_state_file() {
    let env = TestEnv::new();

    env.wb()
        .args(["config", "set", "pat", TOKEN])
        .assert()
        .success();

    let state = fs::read_to_string(env.state_path()).unwrap();
    assert!(state.contains(TOKEN));
    assert!(!env.config_path().exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(env.state_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_config_set_unknown_key_fails() {
    let env = TestEnv::new();

    env.wb()
        .args(["config", "set", "colour", "blue", "-H"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: "))
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn test_config_set_invalid_port_fails() {
    let env = TestEnv::new();

    env.wb()
        .args(["config", "set", "port", "http"])
        .assert()
        .failure()
        .code(1);
    assert!(!env.config_path().exists());
}

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();

    let output = env.wb().args(["config", "show"]).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["configured"], false);
    assert_eq!(setting(&json, "port")["value"], "3001");
    assert_eq!(setting(&json, "port")["source"], "default");
    assert_eq!(setting(&json, "host")["value"], "127.0.0.1");
    assert!(setting(&json, "organization")["value"].is_null());
}

#[test]
fn test_config_show_masks_token() {
    let env = TestEnv::new();
    env.wb().args(["config", "set", "organization", "contoso"]).assert().success();
    env.wb().args(["config", "set", "project", "Shop"]).assert().success();
    env.wb().args(["config", "set", "pat", TOKEN]).assert().success();

    let output = env.wb().args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains(TOKEN), "token leaked: {}", stdout);

    let json = stdout_json(&output);
    assert_eq!(json["configured"], true);
    assert_eq!(setting(&json, "pat")["value"], "abcd...ijkl");
    assert_eq!(setting(&json, "pat")["source"], "file");
    assert_eq!(setting(&json, "organization")["value"], "contoso");
}

#[test]
fn test_config_show_precedence() {
    let env = TestEnv::new();
    env.wb().args(["config", "set", "organization", "from-file"]).assert().success();
    env.wb().args(["config", "set", "project", "from-file"]).assert().success();

    let output = env
        .wb()
        .args(["config", "show", "--org", "from-flag"])
        .env("ADO_ORG", "from-env")
        .env("ADO_PROJECT", "from-env")
        .env("PORT", "8080")
        .output()
        .unwrap();
    let json = stdout_json(&output);

    assert_eq!(setting(&json, "organization")["value"], "from-flag");
    assert_eq!(setting(&json, "organization")["source"], "cli");
    assert_eq!(setting(&json, "project")["value"], "from-env");
    assert_eq!(setting(&json, "project")["source"], "env:ADO_PROJECT");
    assert_eq!(setting(&json, "port")["value"], "8080");
}

#[test]
fn test_config_show_blank_env_is_ignored() {
    let env = TestEnv::new();
    env.wb().args(["config", "set", "team", "Payments"]).assert().success();

    let output = env
        .wb()
        .args(["config", "show"])
        .env("ADO_TEAM", "  ")
        .output()
        .unwrap();
    let json = stdout_json(&output);
    assert_eq!(setting(&json, "team")["value"], "Payments");
    assert_eq!(setting(&json, "team")["source"], "file");
}

#[test]
fn test_config_show_team_flag_wins() {
    let env = TestEnv::new();
    env.wb().args(["config", "set", "team", "Payments"]).assert().success();

    let output = env
        .wb()
        .args(["config", "show", "--team", "Search"])
        .env("ADO_TEAM", "Platform")
        .output()
        .unwrap();
    let json = stdout_json(&output);
    assert_eq!(setting(&json, "team")["value"], "Search");
    assert_eq!(setting(&json, "team")["source"], "cli");
}

#[test]
fn test_config_show_human_hints_when_unconfigured() {
    let env = TestEnv::new();

    env.wb()
        .args(["config", "show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(not set)"))
        .stdout(predicate::str::contains("Not configured"));
}

#[test]
fn test_version() {
    let env = TestEnv::new();

    let output = env.wb().arg("version").output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["commit"].is_string());

    env.wb()
        .args(["version", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("wb "));
}
