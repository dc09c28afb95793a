//! Batched record fetching.
//!
//! The tracker accepts at most `BATCH_LIMIT` ids per fetch. `BatchFetcher`
//! splits arbitrary id lists into contiguous chunks, issues them with
//! bounded concurrency and concatenates the results in chunk order.

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::models::{Item, ItemId, join_ids};
use crate::store::{BATCH_LIMIT, ItemStore};
use crate::{Error, Result};

/// Default number of chunk requests in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Splits id lists into store-sized batches.
#[derive(Clone, Copy)]
pub struct BatchFetcher<'a> {
    store: &'a dyn ItemStore,
    batch_size: usize,
    concurrency: usize,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(store: &'a dyn ItemStore) -> Self {
        Self {
            store,
            batch_size: BATCH_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Chunk requests in flight at once (1 = strictly sequential).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Smaller batches than the store limit; values above the limit are clamped.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, BATCH_LIMIT);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of store calls `fetch` makes for `len` ids.
    pub fn calls_for(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    /// Fetch every record in `ids` that the store knows.
    ///
    /// All-or-nothing: the first failing chunk aborts the fetch, in-flight
    /// chunks are dropped and the error carries the failing chunk's ids.
    pub async fn fetch(&self, ids: &[ItemId], include_relations: bool) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store;
        let chunks: Vec<Vec<Item>> = stream::iter(ids.chunks(self.batch_size))
            .map(|chunk| async move {
                tracing::debug!(size = chunk.len(), "fetching batch");
                store
                    .fetch_by_ids(chunk, include_relations)
                    .await
                    .map_err(|source| {
                        tracing::warn!(ids = %join_ids(chunk), error = %source, "batch fetch failed");
                        Error::RemoteStore {
                            ids: chunk.to_vec(),
                            source,
                        }
                    })
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }
}
