//! Precedence resolution for configuration and state.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`ADO_ORG`, `ADO_PROJECT`, `ADO_TEAM`, `ADO_PAT`, `PORT`)
//! 3. config.kdl / state.kdl
//! 4. Built-in defaults
//!
//! Environment access goes through a lookup function so resolution can be
//! tested without touching the process environment.

use std::time::Duration;

use serde::Serialize;

use super::schema::{MAX_FETCH_CONCURRENCY, WorkboardConfig, WorkboardState, mask_secret};
use crate::hierarchy::{ClosureOptions, DEFAULT_CONCURRENCY};
use crate::store::AdoSettings;
use crate::store::ado::DEFAULT_BASE_URL;
use crate::{Error, Result};

pub const ORG_ENV: &str = "ADO_ORG";
pub const PROJECT_ENV: &str = "ADO_PROJECT";
pub const TEAM_ENV: &str = "ADO_TEAM";
pub const PAT_ENV: &str = "ADO_PAT";
pub const PORT_ENV: &str = "PORT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_VERSION: &str = "7.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl or state.kdl
    File,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub team: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub organization: Option<Resolved<String>>,
    pub project: Option<Resolved<String>>,
    pub team: Option<Resolved<String>>,
    pub pat: Option<Resolved<String>>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub api_version: Resolved<String>,
    pub request_timeout_secs: Resolved<u64>,
    pub fetch_concurrency: Resolved<usize>,
}

impl ResolvedConfig {
    pub fn organization(&self) -> Option<&str> {
        self.organization.as_ref().map(|r| r.value.as_str())
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_ref().map(|r| r.value.as_str())
    }

    pub fn team(&self) -> Option<&str> {
        self.team.as_ref().map(|r| r.value.as_str())
    }

    pub fn pat(&self) -> Option<&str> {
        self.pat.as_ref().map(|r| r.value.as_str())
    }

    /// The token with its middle hidden, for display.
    pub fn masked_pat(&self) -> Option<String> {
        self.pat().map(mask_secret)
    }

    /// Whether organization, project and token are all present.
    pub fn is_configured(&self) -> bool {
        self.organization.is_some() && self.project.is_some() && self.pat.is_some()
    }

    /// Connection settings for the remote tracker.
    pub fn ado_settings(&self) -> Result<AdoSettings> {
        let organization = self
            .organization()
            .ok_or_else(|| Error::NotConfigured(format!("organization ({})", ORG_ENV)))?;
        let project = self
            .project()
            .ok_or_else(|| Error::NotConfigured(format!("project ({})", PROJECT_ENV)))?;
        let pat = self
            .pat()
            .ok_or_else(|| Error::NotConfigured(format!("personal access token ({})", PAT_ENV)))?;

        Ok(AdoSettings {
            organization: organization.to_string(),
            project: project.to_string(),
            team: self.team().map(str::to_string),
            pat: pat.to_string(),
            api_version: self.api_version.value.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(self.request_timeout_secs.value),
        })
    }

    /// Resolution options derived from these settings.
    pub fn closure_options(&self) -> ClosureOptions {
        ClosureOptions {
            concurrency: self.fetch_concurrency.value,
            ..ClosureOptions::default()
        }
    }
}

/// Pick the first present value: CLI, then environment, then file.
fn pick_string(
    cli: Option<&String>,
    env_name: Option<&str>,
    file: Option<&String>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<Resolved<String>> {
    if let Some(v) = cli {
        return Some(Resolved::new(v.clone(), ValueSource::CliFlag));
    }
    if let Some(name) = env_name {
        if let Some(v) = env(name).filter(|v| !v.trim().is_empty()) {
            return Some(Resolved::new(v, ValueSource::EnvVar(name.to_string())));
        }
    }
    file.map(|v| Resolved::new(v.clone(), ValueSource::File))
}

/// Resolve settings from files, environment and CLI overrides.
pub fn resolve(
    config: &WorkboardConfig,
    state: &WorkboardState,
    overrides: &ConfigOverrides,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    config.validate()?;

    let organization = pick_string(
        overrides.organization.as_ref(),
        Some(ORG_ENV),
        config.organization.as_ref(),
        env,
    );
    let project = pick_string(
        overrides.project.as_ref(),
        Some(PROJECT_ENV),
        config.project.as_ref(),
        env,
    );
    let team = pick_string(overrides.team.as_ref(), Some(TEAM_ENV), config.team.as_ref(), env);
    let pat = pick_string(None, Some(PAT_ENV), state.pat.as_ref(), env);

    let host = pick_string(overrides.host.as_ref(), None, config.host.as_ref(), env)
        .unwrap_or_else(|| Resolved::new(DEFAULT_HOST.to_string(), ValueSource::Default));

    let port = if let Some(p) = overrides.port {
        Resolved::new(p, ValueSource::CliFlag)
    } else if let Some(raw) = env(PORT_ENV).filter(|v| !v.trim().is_empty()) {
        let p = raw
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| Error::Config(format!("{} must be a port number, got '{}'", PORT_ENV, raw)))?;
        Resolved::new(p, ValueSource::EnvVar(PORT_ENV.to_string()))
    } else if let Some(p) = config.port {
        Resolved::new(p, ValueSource::File)
    } else {
        Resolved::new(crate::server::DEFAULT_PORT, ValueSource::Default)
    };
    if port.value == 0 {
        return Err(Error::Config("port must be non-zero".to_string()));
    }

    let api_version = pick_string(None, None, config.api_version.as_ref(), env)
        .unwrap_or_else(|| Resolved::new(DEFAULT_API_VERSION.to_string(), ValueSource::Default));

    let request_timeout_secs = match config.request_timeout_secs {
        Some(t) => Resolved::new(t, ValueSource::File),
        None => Resolved::new(DEFAULT_TIMEOUT_SECS, ValueSource::Default),
    };

    let fetch_concurrency = match config.fetch_concurrency {
        Some(c) => Resolved::new(c.clamp(1, MAX_FETCH_CONCURRENCY), ValueSource::File),
        None => Resolved::new(DEFAULT_CONCURRENCY, ValueSource::Default),
    };

    Ok(ResolvedConfig {
        organization,
        project,
        team,
        pat,
        host,
        port,
        api_version,
        request_timeout_secs,
        fetch_concurrency,
    })
}

/// Resolve against the real process environment.
pub fn resolve_from_process_env(
    config: &WorkboardConfig,
    state: &WorkboardState,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    resolve(config, state, overrides, &|name| std::env::var(name).ok())
}
