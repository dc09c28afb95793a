//! KDL schema definitions for config.kdl and state.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation and key-based updates for `wb config set`

use chrono::{DateTime, Utc};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::Serialize;

use crate::{Error, Result};

/// Upper bound for `fetch-concurrency`.
pub const MAX_FETCH_CONCURRENCY: usize = 16;

/// Keys accepted by config.kdl.
pub const CONFIG_KEYS: [&str; 8] = [
    "organization",
    "project",
    "team",
    "host",
    "port",
    "api-version",
    "request-timeout-secs",
    "fetch-concurrency",
];

/// Keys accepted by state.kdl.
pub const STATE_KEYS: [&str; 1] = ["pat"];

/// Required permissions for state.kdl (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

/// Tracker connection and server preferences stored in config.kdl.
///
/// File permissions: 0644 (rw-r--r--)
///
/// # KDL Schema
///
/// ```kdl
/// organization "contoso"
/// project "Web"
/// team "Web Team"
/// host "127.0.0.1"
/// port 3001
/// api-version "7.1"
/// request-timeout-secs 30
/// fetch-concurrency 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkboardConfig {
    /// Azure DevOps organization name
    pub organization: Option<String>,
    /// Project within the organization
    pub project: Option<String>,
    /// Team used for iteration lookups (defaults to "<project> Team")
    pub team: Option<String>,
    /// Address `wb serve` binds to
    pub host: Option<String>,
    /// Port `wb serve` listens on
    pub port: Option<u16>,
    /// REST api-version sent with every tracker request
    pub api_version: Option<String>,
    /// Per-request timeout against the tracker
    pub request_timeout_secs: Option<u64>,
    /// Batch requests in flight at once
    pub fetch_concurrency: Option<usize>,
}

impl WorkboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if let Some(c) = self.fetch_concurrency {
            if !(1..=MAX_FETCH_CONCURRENCY).contains(&c) {
                return Err(Error::Config(format!(
                    "fetch-concurrency must be 1-{}, got {}",
                    MAX_FETCH_CONCURRENCY, c
                )));
            }
        }
        if self.request_timeout_secs == Some(0) {
            return Err(Error::Config(
                "request-timeout-secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            organization: string_node(doc, "organization"),
            project: string_node(doc, "project"),
            team: string_node(doc, "team"),
            host: string_node(doc, "host"),
            port: integer_node(doc, "port").and_then(|i| u16::try_from(i).ok()),
            api_version: string_node(doc, "api-version"),
            request_timeout_secs: integer_node(doc, "request-timeout-secs")
                .and_then(|i| u64::try_from(i).ok()),
            fetch_concurrency: integer_node(doc, "fetch-concurrency")
                .and_then(|i| usize::try_from(i).ok()),
        }
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        push_string(&mut doc, "organization", self.organization.as_deref());
        push_string(&mut doc, "project", self.project.as_deref());
        push_string(&mut doc, "team", self.team.as_deref());
        push_string(&mut doc, "host", self.host.as_deref());
        push_integer(&mut doc, "port", self.port.map(i128::from));
        push_string(&mut doc, "api-version", self.api_version.as_deref());
        push_integer(
            &mut doc,
            "request-timeout-secs",
            self.request_timeout_secs.map(i128::from),
        );
        push_integer(
            &mut doc,
            "fetch-concurrency",
            self.fetch_concurrency.map(|c| c as i128),
        );
        doc.autoformat();
        doc
    }

    /// Set one key from its textual value, then validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "organization" => self.organization = Some(non_empty(key, value)?),
            "project" => self.project = Some(non_empty(key, value)?),
            "team" => self.team = Some(non_empty(key, value)?),
            "host" => self.host = Some(non_empty(key, value)?),
            "api-version" => self.api_version = Some(non_empty(key, value)?),
            "port" => self.port = Some(parse_number(key, value)?),
            "request-timeout-secs" => self.request_timeout_secs = Some(parse_number(key, value)?),
            "fetch-concurrency" => self.fetch_concurrency = Some(parse_number(key, value)?),
            _ => {
                return Err(Error::Config(format!(
                    "Unknown config key '{}'. Valid keys: {}, {}",
                    key,
                    CONFIG_KEYS.join(", "),
                    STATE_KEYS.join(", ")
                )));
            }
        }
        self.validate()
    }
}

/// Secrets stored in state.kdl.
///
/// **MUST be created with 0600 permissions (owner read/write only)**.
///
/// # KDL Schema
///
/// ```kdl
/// pat "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"
/// pat-updated-at "2026-01-31T09:00:00Z"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkboardState {
    /// Personal access token for the tracker (sensitive!)
    pub pat: Option<String>,
    /// When the token was last written
    pub pat_updated_at: Option<DateTime<Utc>>,
}

impl WorkboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new token and stamp the update time.
    pub fn set_pat(&mut self, pat: &str) -> Result<()> {
        self.pat = Some(non_empty("pat", pat.trim())?);
        self.pat_updated_at = Some(Utc::now());
        Ok(())
    }

    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            pat: string_node(doc, "pat"),
            pat_updated_at: string_node(doc, "pat-updated-at")
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        push_string(&mut doc, "pat", self.pat.as_deref());
        let updated = self.pat_updated_at.map(|t| t.to_rfc3339());
        push_string(&mut doc, "pat-updated-at", updated.as_deref());
        doc.autoformat();
        doc
    }
}

/// Mask a secret for display, keeping the first and last 4 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        let head: String = chars.iter().take(4).collect();
        format!("{}...", head)
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_node(doc: &KdlDocument, name: &str) -> Option<String> {
    first_value(doc, name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn integer_node(doc: &KdlDocument, name: &str) -> Option<i128> {
    first_value(doc, name).and_then(|v| v.as_integer())
}

fn push_string(doc: &mut KdlDocument, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let mut node = KdlNode::new(name);
        node.push(KdlEntry::new(KdlValue::String(value.to_string())));
        doc.nodes_mut().push(node);
    }
}

fn push_integer(doc: &mut KdlDocument, name: &str, value: Option<i128>) {
    if let Some(value) = value {
        let mut node = KdlNode::new(name);
        node.push(KdlEntry::new(KdlValue::Integer(value)));
        doc.nodes_mut().push(node);
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} must not be empty", key)));
    }
    Ok(value.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}
