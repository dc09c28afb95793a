//! Dashboard read operations.
//!
//! Each operation resolves a filter or id list against an `ItemStore` and
//! fetches the records through `BatchFetcher`. Both the HTTP handlers and
//! the CLI commands are thin wrappers over `Queries`.

use serde::Serialize;
use std::collections::HashSet;

use crate::hierarchy::{BatchFetcher, Closure, ClosureOptions, resolve_ancestor_closure};
use crate::models::{Item, ItemId, ItemQuery, WorkItemType};
use crate::store::ItemStore;
use crate::{Error, Result};

/// Maximum number of hits a title search returns.
pub const SEARCH_LIMIT: usize = 100;

/// Items in the tracker's list shape: `{ "count": n, "value": [...] }`.
#[derive(Debug, Clone, Serialize)]
pub struct ItemList {
    pub count: usize,
    pub value: Vec<Item>,
}

impl From<Vec<Item>> for ItemList {
    fn from(value: Vec<Item>) -> Self {
        Self {
            count: value.len(),
            value,
        }
    }
}

/// Read operations over one store.
#[derive(Clone, Copy)]
pub struct Queries<'a> {
    store: &'a dyn ItemStore,
    options: ClosureOptions,
}

impl<'a> Queries<'a> {
    pub fn new(store: &'a dyn ItemStore) -> Self {
        Self {
            store,
            options: ClosureOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClosureOptions) -> Self {
        self.options = options;
        self
    }

    fn fetcher(&self) -> BatchFetcher<'a> {
        BatchFetcher::new(self.store).with_concurrency(self.options.concurrency)
    }

    async fn find_and_fetch(&self, query: &ItemQuery, include_relations: bool) -> Result<Vec<Item>> {
        let ids = self.store.find_ids(query).await.map_err(|source| {
            tracing::warn!(error = %source, "filter query failed");
            Error::store(source)
        })?;
        self.fetcher().fetch(&ids, include_relations).await
    }

    /// Non-removed items of the given types, with relations.
    pub async fn items_by_type(&self, types: Vec<WorkItemType>) -> Result<Vec<Item>> {
        self.find_and_fetch(&ItemQuery::by_types(types), true).await
    }

    pub async fn epics(&self) -> Result<Vec<Item>> {
        self.items_by_type(vec![WorkItemType::epic()]).await
    }

    /// Items in an iteration, optionally narrowed to an assignee and a type.
    pub async fn iteration_items(
        &self,
        iteration_path: &str,
        assigned_to: Option<&str>,
        work_item_type: Option<WorkItemType>,
    ) -> Result<Vec<Item>> {
        let query = ItemQuery::iteration(iteration_path)?
            .assigned_to(assigned_to)?
            .of_type(work_item_type);
        self.find_and_fetch(&query, true).await
    }

    /// Items in an iteration plus every ancestor needed to render them as a tree.
    pub async fn iteration_tree(
        &self,
        iteration_path: &str,
        assigned_to: Option<&str>,
    ) -> Result<Closure> {
        let query = ItemQuery::iteration(iteration_path)?.assigned_to(assigned_to)?;
        resolve_ancestor_closure(self.store, &query, self.options).await
    }

    /// Direct children of `parent`, with relations.
    pub async fn children(&self, parent: ItemId) -> Result<Vec<Item>> {
        let ids = self.store.child_ids(parent).await.map_err(|source| {
            tracing::warn!(%parent, error = %source, "child lookup failed");
            Error::store(source)
        })?;
        self.fetcher().fetch(&ids, true).await
    }

    /// Title search.
    ///
    /// A purely numeric query is treated as an id lookup. Blank queries
    /// return nothing. At most `SEARCH_LIMIT` hits, without relations.
    pub async fn search(&self, text: &str, work_item_type: Option<WorkItemType>) -> Result<Vec<Item>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        if let Ok(id) = text.parse::<ItemId>() {
            let items = self.fetcher().fetch(&[id], false).await?;
            return Ok(items
                .into_iter()
                .filter(|item| match work_item_type {
                    Some(ref t) => item.work_item_type() == Some(t.as_str()),
                    None => true,
                })
                .collect());
        }

        let query = ItemQuery::title(text)?.of_type(work_item_type);
        let mut ids = self.store.find_ids(&query).await.map_err(|source| {
            tracing::warn!(error = %source, "title search failed");
            Error::store(source)
        })?;
        ids.truncate(SEARCH_LIMIT);
        self.fetcher().fetch(&ids, false).await
    }

    /// Records for an explicit id list, with relations. Duplicate ids are
    /// requested once.
    pub async fn batch(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        let mut seen = HashSet::new();
        let unique: Vec<ItemId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        self.fetcher().fetch(&unique, true).await
    }

    /// One record with relations.
    pub async fn item(&self, id: ItemId) -> Result<Item> {
        self.fetcher()
            .fetch(&[id], true)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NotFound(id))
    }
}
