//! Hierarchy resolution.
//!
//! - `BatchFetcher` - Splits id lists into store-sized batches
//! - `HierarchyResolver` - Walks parent links until the ancestor set is closed
//! - `resolve_ancestor_closure` - Filter in, closed item set out

mod batch;
mod closure;

pub use batch::{BatchFetcher, DEFAULT_CONCURRENCY};
pub use closure::{Closure, ClosureLimits, HierarchyResolver, MAX_LOOPS, MAX_TOTAL, Termination};

use serde::Serialize;

use crate::models::{Item, ItemId, ItemQuery};
use crate::store::ItemStore;
use crate::{Error, Result};

/// Tuning knobs for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureOptions {
    pub limits: ClosureLimits,
    /// Batch requests in flight at once within a round
    pub concurrency: usize,
}

impl Default for ClosureOptions {
    fn default() -> Self {
        Self {
            limits: ClosureLimits::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Wire shape of a resolved closure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    /// Seeds and ancestors, in first-seen order
    pub value: Vec<Item>,
    /// Ids the filter matched, before expansion
    pub sprint_ids: Vec<ItemId>,
    /// False when a safety cap cut the walk short
    pub complete: bool,
    pub termination: Termination,
    pub rounds: usize,
}

impl From<Closure> for TreeView {
    fn from(closure: Closure) -> Self {
        Self {
            complete: closure.is_complete(),
            termination: closure.termination,
            rounds: closure.rounds,
            value: closure.items,
            sprint_ids: closure.seed_ids,
        }
    }
}

/// Resolve `query` to seed ids, then collect the seeds and all their ancestors.
pub async fn resolve_ancestor_closure(
    store: &dyn ItemStore,
    query: &ItemQuery,
    options: ClosureOptions,
) -> Result<Closure> {
    let seed_ids = store.find_ids(query).await.map_err(|source| {
        tracing::warn!(error = %source, "filter query failed");
        Error::store(source)
    })?;
    tracing::debug!(seeds = seed_ids.len(), "filter resolved");

    let fetcher = BatchFetcher::new(store).with_concurrency(options.concurrency);
    HierarchyResolver::new(fetcher)
        .with_limits(options.limits)
        .resolve(seed_ids)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn sprint_store() -> InMemoryStore {
        InMemoryStore::from_items([
            Item::new(10u64).with_field("System.WorkItemType", "Epic"),
            Item::new(55u64)
                .with_field("System.WorkItemType", "Feature")
                .with_parent(10u64),
            Item::new(101u64)
                .with_field("System.WorkItemType", "Task")
                .with_field("System.IterationPath", "Proj\\Sprint 1")
                .with_parent(55u64),
            Item::new(102u64)
                .with_field("System.WorkItemType", "Task")
                .with_field("System.IterationPath", "Proj\\Sprint 2")
                .with_parent(55u64),
        ])
    }

    #[tokio::test]
    async fn test_resolve_from_iteration_filter() {
        let store = sprint_store();
        let query = ItemQuery::iteration("Proj\\Sprint 1").unwrap();

        let closure = resolve_ancestor_closure(&store, &query, ClosureOptions::default())
            .await
            .unwrap();

        assert_eq!(closure.seed_ids, vec![ItemId(101)]);
        let mut got: Vec<u64> = closure.items.iter().map(|i| i.id.0).collect();
        got.sort_unstable();
        assert_eq!(got, vec![10, 55, 101]);
        assert!(closure.is_complete());
    }

    #[tokio::test]
    async fn test_empty_sprint_is_not_an_error() {
        let store = sprint_store();
        let query = ItemQuery::iteration("Proj\\Sprint 9").unwrap();

        let closure = resolve_ancestor_closure(&store, &query, ClosureOptions::default())
            .await
            .unwrap();

        assert!(closure.items.is_empty());
        assert_eq!(closure.termination, Termination::EmptySeed);
        assert!(store.fetch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_options_limits_are_applied() {
        let store = sprint_store();
        let query = ItemQuery::iteration("Proj\\Sprint 2").unwrap();
        let options = ClosureOptions {
            limits: ClosureLimits {
                max_total: MAX_TOTAL,
                max_loops: 1,
            },
            concurrency: 1,
        };

        let closure = resolve_ancestor_closure(&store, &query, options).await.unwrap();

        assert_eq!(closure.termination, Termination::LoopCapReached);
        assert_eq!(closure.items.len(), 2);
    }

    #[tokio::test]
    async fn test_tree_view_shape() {
        let store = sprint_store();
        let query = ItemQuery::iteration("Proj\\Sprint 1").unwrap();
        let closure = resolve_ancestor_closure(&store, &query, ClosureOptions::default())
            .await
            .unwrap();

        let json = serde_json::to_value(TreeView::from(closure)).unwrap();
        assert_eq!(json["sprintIds"], serde_json::json!([101]));
        assert_eq!(json["complete"], true);
        assert_eq!(json["termination"], "closed");
        assert_eq!(json["value"].as_array().unwrap().len(), 3);
    }
}
