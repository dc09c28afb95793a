//! In-memory item store.
//!
//! Serves items from a fixed set of records, for fixture-driven runs of the
//! CLI and server and for tests. Every fetch call is recorded so callers
//! can assert how the tracker would have been queried, and individual ids
//! can be marked as failing to simulate an unavailable tracker.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::{BATCH_LIMIT, ItemStore, ProjectDirectory, StoreError};
use crate::models::{Item, ItemId, ItemQuery};
use crate::{Error, Result};

/// One recorded `fetch_by_ids` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub ids: Vec<ItemId>,
    pub include_relations: bool,
}

/// Store backed by a map of records.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: BTreeMap<ItemId, Item>,
    failing: HashSet<ItemId>,
    lookups_fail: bool,
    calls: Mutex<Vec<FetchCall>>,
}

/// Accepted fixture layouts: a bare array or the tracker's `{ "value": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Fixture {
    Wrapped { value: Vec<Item> },
    Bare(Vec<Item>),
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records. Later duplicates replace earlier ones.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Load a JSON fixture file.
    pub fn from_fixture_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read fixture {}: {}", path.display(), e))
        })?;
        Self::from_fixture_str(&content)
    }

    pub fn from_fixture_str(content: &str) -> Result<Self> {
        let items = match serde_json::from_str::<Fixture>(content)? {
            Fixture::Wrapped { value } => value,
            Fixture::Bare(items) => items,
        };
        Ok(Self::from_items(items))
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    /// Make every fetch whose batch contains `id` fail.
    pub fn fail_on(mut self, id: impl Into<ItemId>) -> Self {
        self.failing.insert(id.into());
        self
    }

    /// Make every `find_ids` and `child_ids` call fail.
    pub fn fail_lookups(mut self) -> Self {
        self.lookups_fail = true;
        self
    }

    fn check_lookup(&self) -> std::result::Result<(), StoreError> {
        if self.lookups_fail {
            return Err(StoreError::Unavailable("id lookup is unreachable".to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All fetch calls made so far, in order.
    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times `id` was requested across all fetch calls.
    pub fn times_fetched(&self, id: ItemId) -> usize {
        self.fetch_calls()
            .iter()
            .map(|call| call.ids.iter().filter(|i| **i == id).count())
            .sum()
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn find_ids(&self, query: &ItemQuery) -> std::result::Result<Vec<ItemId>, StoreError> {
        self.check_lookup()?;
        Ok(self
            .items
            .values()
            .filter(|item| query.matches(item))
            .map(|item| item.id)
            .collect())
    }

    async fn fetch_by_ids(
        &self,
        ids: &[ItemId],
        include_relations: bool,
    ) -> std::result::Result<Vec<Item>, StoreError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FetchCall {
                ids: ids.to_vec(),
                include_relations,
            });

        if ids.len() > BATCH_LIMIT {
            return Err(StoreError::BatchTooLarge(ids.len()));
        }
        if let Some(bad) = ids.iter().find(|id| self.failing.contains(id)) {
            return Err(StoreError::Unavailable(format!("item {} is unreachable", bad)));
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.items.get(id))
            .map(|item| {
                if include_relations {
                    item.clone()
                } else {
                    item.without_relations()
                }
            })
            .collect())
    }

    async fn child_ids(&self, parent: ItemId) -> std::result::Result<Vec<ItemId>, StoreError> {
        self.check_lookup()?;
        Ok(self
            .items
            .values()
            .filter(|item| item.parent_id() == Some(parent) && item.id != parent)
            .map(|item| item.id)
            .collect())
    }
}

/// Fixtures carry no project metadata; every listing is empty.
#[async_trait]
impl ProjectDirectory for InMemoryStore {
    async fn iterations(
        &self,
        _team: Option<&str>,
        _current_only: bool,
    ) -> std::result::Result<Value, StoreError> {
        Ok(empty_listing())
    }

    async fn teams(&self) -> std::result::Result<Value, StoreError> {
        Ok(empty_listing())
    }

    async fn team_members(&self, _team: &str) -> std::result::Result<Value, StoreError> {
        Ok(empty_listing())
    }

    async fn pull_requests(
        &self,
        _status: &str,
        _top: u32,
    ) -> std::result::Result<Value, StoreError> {
        Ok(empty_listing())
    }

    async fn run_wiql(&self, _query: &str) -> std::result::Result<Value, StoreError> {
        Err(StoreError::Unavailable(
            "raw WIQL is not supported by the fixture store".to_string(),
        ))
    }
}

fn empty_listing() -> Value {
    json!({ "count": 0, "value": [] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::from_items([
            Item::new(1u64).with_field("System.WorkItemType", "Epic"),
            Item::new(2u64)
                .with_field("System.WorkItemType", "Feature")
                .with_parent(1u64),
            Item::new(3u64)
                .with_field("System.WorkItemType", "Feature")
                .with_parent(1u64),
        ])
    }

    #[tokio::test]
    async fn test_fetch_omits_unknown_ids() {
        let store = store();
        let items = store
            .fetch_by_ids(&[ItemId(1), ItemId(99), ItemId(3)], true)
            .await
            .unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![ItemId(1), ItemId(3)]);
    }

    #[tokio::test]
    async fn test_fetch_without_relations_strips_links() {
        let store = store();
        let items = store.fetch_by_ids(&[ItemId(2)], false).await.unwrap();
        assert!(items[0].relations.is_empty());
        assert_eq!(
            store.fetch_calls(),
            vec![FetchCall {
                ids: vec![ItemId(2)],
                include_relations: false
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_batch() {
        let store = store();
        let ids: Vec<ItemId> = (0..201).map(ItemId).collect();
        let err = store.fetch_by_ids(&ids, true).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge(201)));
    }

    #[tokio::test]
    async fn test_fail_on_marks_batches_unavailable() {
        let store = store().fail_on(3u64);
        assert!(store.fetch_by_ids(&[ItemId(1)], true).await.is_ok());
        let err = store.fetch_by_ids(&[ItemId(1), ItemId(3)], true).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_fail_lookups_leaves_fetch_working() {
        let store = store().fail_lookups();
        assert!(matches!(store.child_ids(ItemId(1)).await, Err(StoreError::Unavailable(_))));
        let query = ItemQuery::title("card").unwrap();
        assert!(matches!(store.find_ids(&query).await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.fetch_by_ids(&[ItemId(2)], false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_child_ids() {
        let store = store();
        assert_eq!(store.child_ids(ItemId(1)).await.unwrap(), vec![ItemId(2), ItemId(3)]);
        assert!(store.child_ids(ItemId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_ids_uses_query() {
        let store = store();
        let q = ItemQuery::by_types(vec![crate::models::WorkItemType::parse("Feature").unwrap()]);
        assert_eq!(store.find_ids(&q).await.unwrap(), vec![ItemId(2), ItemId(3)]);
    }

    #[test]
    fn test_fixture_layouts() {
        let bare = InMemoryStore::from_fixture_str(r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = InMemoryStore::from_fixture_str(r#"{"value": [{"id": 5}]}"#).unwrap();
        assert_eq!(wrapped.len(), 1);

        assert!(InMemoryStore::from_fixture_str("{").is_err());
    }

    #[tokio::test]
    async fn test_times_fetched() {
        let store = store();
        store.fetch_by_ids(&[ItemId(1), ItemId(2)], true).await.unwrap();
        store.fetch_by_ids(&[ItemId(1)], true).await.unwrap();
        assert_eq!(store.times_fetched(ItemId(1)), 2);
        assert_eq!(store.times_fetched(ItemId(2)), 1);
        assert_eq!(store.times_fetched(ItemId(3)), 0);
    }
}
