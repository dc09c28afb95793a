//! Remote item store interfaces and implementations.
//!
//! This module provides the seams between the hierarchy engine and the
//! remote tracker:
//! - `ItemStore` - The two primitive item operations the core consumes
//! - `ProjectDirectory` - Pass-through project metadata (iterations, teams, PRs)
//! - `AdoClient` - Azure DevOps REST implementation of both
//! - `InMemoryStore` - Fixture-backed implementation for demos and tests

pub mod ado;
pub mod memory;
pub mod wiql;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Item, ItemId, ItemQuery};

pub use ado::{AdoClient, AdoSettings};
pub use memory::InMemoryStore;

/// Maximum number of ids the tracker accepts in one fetch-by-id call.
pub const BATCH_LIMIT: usize = 200;

/// Errors reported by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (DNS, TLS, timeout, ...)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The tracker rejected the credentials (401, or a 203 sign-in page)
    #[error("unauthorized: the tracker returned 401 (check the personal access token)")]
    Unauthorized,

    /// Any other non-success status
    #[error("tracker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("failed to decode tracker response: {0}")]
    Decode(String),

    /// A caller passed more ids than one request may carry
    #[error("batch of {0} ids exceeds the limit of {BATCH_LIMIT}")]
    BatchTooLarge(usize),

    /// The store cannot serve requests right now
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The item operations the hierarchy engine depends on.
///
/// Implementations must be safe to share across concurrent requests; they
/// carry configuration only, never per-call state.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Resolve a filter to matching ids. No ordering guarantee.
    async fn find_ids(&self, query: &ItemQuery) -> Result<Vec<ItemId>, StoreError>;

    /// Fetch the records for `ids` that exist; unknown ids are omitted.
    ///
    /// Callers guarantee `ids.len() <= BATCH_LIMIT`.
    async fn fetch_by_ids(
        &self,
        ids: &[ItemId],
        include_relations: bool,
    ) -> Result<Vec<Item>, StoreError>;

    /// Ids of the direct children of `parent`.
    async fn child_ids(&self, parent: ItemId) -> Result<Vec<ItemId>, StoreError>;
}

/// Project metadata forwarded verbatim to dashboard clients.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Team iterations; only the current one when `current_only`.
    async fn iterations(&self, team: Option<&str>, current_only: bool)
    -> Result<Value, StoreError>;

    async fn teams(&self) -> Result<Value, StoreError>;

    async fn team_members(&self, team: &str) -> Result<Value, StoreError>;

    /// Pull requests across the project's repositories.
    async fn pull_requests(&self, status: &str, top: u32) -> Result<Value, StoreError>;

    /// Run a raw WIQL query and return the tracker's response.
    async fn run_wiql(&self, query: &str) -> Result<Value, StoreError>;
}
