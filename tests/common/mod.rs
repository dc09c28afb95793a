//! Common test utilities for workboard integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never read the
//! user's `~/.config/workboard/` files or the developer's `ADO_*` variables.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// Environment variables that would leak real tracker settings into a test.
const SCRUBBED_ENV: &[&str] = &[
    "ADO_ORG",
    "ADO_PROJECT",
    "ADO_TEAM",
    "ADO_PAT",
    "PORT",
    "WB_FIXTURE",
    "WB_LOG",
];

/// A small sprint: one epic, one feature, two sprint items and a stray story.
///
/// ```text
/// 1 Epic "Checkout revamp"
/// └── 2 Feature "Payment step"
///     └── 3 User Story "Card form"        (Shop\Sprint 4, kim)
///         └── 4 Task "Validate CVC"       (Shop\Sprint 4, ana)
/// 5 User Story "Wishlist"                 (Shop\Sprint 5)
/// ```
pub const SPRINT_FIXTURE: &str = r#"{
  "count": 5,
  "value": [
    {
      "id": 1,
      "fields": {
        "System.WorkItemType": "Epic",
        "System.Title": "Checkout revamp",
        "System.State": "Active",
        "System.IterationPath": "Shop"
      }
    },
    {
      "id": 2,
      "fields": {
        "System.WorkItemType": "Feature",
        "System.Title": "Payment step",
        "System.State": "Active",
        "System.IterationPath": "Shop"
      },
      "relations": [
        { "rel": "System.LinkTypes.Hierarchy-Reverse", "url": "https://dev.azure.com/contoso/_apis/wit/workItems/1" }
      ]
    },
    {
      "id": 3,
      "fields": {
        "System.WorkItemType": "User Story",
        "System.Title": "Card form",
        "System.State": "New",
        "System.IterationPath": "Shop\\Sprint 4",
        "System.AssignedTo": { "displayName": "Kim Lee", "uniqueName": "kim@contoso.com" }
      },
      "relations": [
        { "rel": "System.LinkTypes.Hierarchy-Reverse", "url": "https://dev.azure.com/contoso/_apis/wit/workItems/2" },
        { "rel": "System.LinkTypes.Hierarchy-Forward", "url": "https://dev.azure.com/contoso/_apis/wit/workItems/4" }
      ]
    },
    {
      "id": 4,
      "fields": {
        "System.WorkItemType": "Task",
        "System.Title": "Validate CVC",
        "System.State": "New",
        "System.IterationPath": "Shop\\Sprint 4",
        "System.AssignedTo": "ana@contoso.com"
      },
      "relations": [
        { "rel": "System.LinkTypes.Hierarchy-Reverse", "url": "https://dev.azure.com/contoso/_apis/wit/workItems/3" }
      ]
    },
    {
      "id": 5,
      "fields": {
        "System.WorkItemType": "User Story",
        "System.Title": "Wishlist",
        "System.State": "New",
        "System.IterationPath": "Shop\\Sprint 5"
      }
    }
  ]
}"#;

/// A test environment with isolated configuration.
///
/// `config_dir` holds config.kdl and state.kdl (via `WB_CONFIG_DIR`).
/// The `wb()` method returns a `Command` that sets it per-invocation,
/// making tests parallel-safe.
pub struct TestEnv {
    pub config_dir: TempDir,
    pub work_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the wb binary with an isolated config directory.
    pub fn wb(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_wb"));
        cmd.current_dir(self.work_dir.path());
        for var in SCRUBBED_ENV {
            cmd.env_remove(var);
        }
        cmd.env("WB_CONFIG_DIR", self.config_dir.path());
        cmd
    }

    /// Write a fixture file into the work directory and return its path.
    pub fn write_fixture(&self, name: &str, content: &str) -> PathBuf {
        let path = self.work_dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// The standard sprint fixture.
    pub fn sprint_fixture(&self) -> PathBuf {
        self.write_fixture("sprint.json", SPRINT_FIXTURE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.kdl")
    }

    pub fn state_path(&self) -> PathBuf {
        self.config_dir.path().join("state.kdl")
    }

    pub fn work_path(&self) -> &Path {
        self.work_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Ids of the items in a `{ "value": [...] }` response, in order.
pub fn value_ids(json: &serde_json::Value) -> Vec<u64> {
    json["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect()
}
