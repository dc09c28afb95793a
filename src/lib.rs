//! Workboard - A dashboard backend over an Azure DevOps work tracker.
//!
//! This library provides the core functionality for the `wb` CLI and its
//! HTTP server, including batched record fetching and the ancestor-closure
//! resolution that turns a flat sprint into a renderable hierarchy.

pub mod cli;
pub mod commands;
pub mod config;
pub mod hierarchy;
pub mod models;
pub mod queries;
pub mod server;
pub mod store;

use models::ItemId;
use store::StoreError;

/// Library-level error type for Workboard operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Remote store request failed{}: {source}", describe_ids(.ids))]
    RemoteStore {
        ids: Vec<ItemId>,
        #[source]
        source: StoreError,
    },

    #[error("Work item not found: {0}")]
    NotFound(ItemId),

    #[error("Not configured: missing {0} (run `wb config set` or set the environment variable)")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a store failure that is not tied to a batch of ids.
    pub fn store(source: StoreError) -> Self {
        Error::RemoteStore {
            ids: Vec::new(),
            source,
        }
    }
}

fn describe_ids(ids: &[ItemId]) -> String {
    match ids.len() {
        0 => String::new(),
        1..=10 => format!(" for ids [{}]", models::join_ids(ids)),
        n => format!(
            " for {} ids [{},...]",
            n,
            models::join_ids(&ids[..10])
        ),
    }
}

/// Result type alias for Workboard operations.
pub type Result<T> = std::result::Result<T, Error>;
