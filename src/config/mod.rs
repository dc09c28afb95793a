//! Configuration and state management for Workboard.
//!
//! This module defines KDL schemas for two distinct files:
//!
//! ## config.kdl - Tracker connection and server preferences
//!
//! Located at `~/.config/workboard/config.kdl`. Contains `organization`,
//! `project`, `team`, `host`, `port`, `api-version`, `request-timeout-secs`
//! and `fetch-concurrency`.
//!
//! ## state.kdl - Secrets (machine-specific)
//!
//! Located at `~/.local/share/workboard/state.kdl`. Contains `pat` (the
//! personal access token) and `pat-updated-at`.
//!
//! ## Security
//!
//! **CRITICAL**: `state.kdl` MUST be created with 0600 permissions (owner read/write only)
//! because it contains the access token.
//!
//! ## Location override
//!
//! When `WB_CONFIG_DIR` is set, both files live directly in that directory.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

use kdl::KdlDocument;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve, resolve_from_process_env,
};
pub use schema::{STATE_KEYS, WorkboardConfig, WorkboardState, mask_secret};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};

/// Environment variable that relocates both config files.
pub const CONFIG_DIR_ENV: &str = "WB_CONFIG_DIR";

const APP_DIR: &str = "workboard";
const CONFIG_FILE: &str = "config.kdl";
const STATE_FILE: &str = "state.kdl";

/// Locations of config.kdl and state.kdl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
}

impl ConfigPaths {
    /// Both files inside one directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_file: dir.join(CONFIG_FILE),
            state_file: dir.join(STATE_FILE),
        }
    }

    /// `$WB_CONFIG_DIR`, otherwise the platform config and data directories.
    pub fn locate() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::in_dir(Path::new(&dir)));
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?;
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| Error::Config("cannot determine data directory".to_string()))?;
        Ok(Self {
            config_file: config_dir.join(APP_DIR).join(CONFIG_FILE),
            state_file: data_dir.join(APP_DIR).join(STATE_FILE),
        })
    }

    pub fn read_config(&self) -> Result<WorkboardConfig> {
        Ok(read_kdl(&self.config_file)?
            .map(|doc| WorkboardConfig::from_kdl(&doc))
            .unwrap_or_default())
    }

    pub fn read_state(&self) -> Result<WorkboardState> {
        Ok(read_kdl(&self.state_file)?
            .map(|doc| WorkboardState::from_kdl(&doc))
            .unwrap_or_default())
    }

    pub fn write_config(&self, config: &WorkboardConfig) -> Result<()> {
        config.validate()?;
        write_kdl(&self.config_file, &config.to_kdl())?;
        #[cfg(unix)]
        set_mode(&self.config_file, CONFIG_FILE_MODE)?;
        Ok(())
    }

    pub fn write_state(&self, state: &WorkboardState) -> Result<()> {
        write_kdl(&self.state_file, &state.to_kdl())?;
        #[cfg(unix)]
        set_mode(&self.state_file, STATE_FILE_MODE)?;
        Ok(())
    }

    /// Set one key in whichever file owns it. Returns the path written.
    pub fn set_value(&self, key: &str, value: &str) -> Result<&Path> {
        if STATE_KEYS.contains(&key) {
            let mut state = self.read_state()?;
            state.set_pat(value)?;
            self.write_state(&state)?;
            tracing::debug!(path = %self.state_file.display(), "token updated");
            return Ok(self.state_file.as_path());
        }

        let mut config = self.read_config()?;
        config.set(key, value)?;
        self.write_config(&config)?;
        tracing::debug!(key, path = %self.config_file.display(), "config updated");
        Ok(self.config_file.as_path())
    }
}

/// Read and parse a KDL file; a missing file is `None`.
fn read_kdl(path: &Path) -> Result<Option<KdlDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e)))?;
    Ok(Some(doc))
}

fn write_kdl(path: &Path, doc: &KdlDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, doc.to_string())?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}
