//! Ancestor closure resolution.
//!
//! Given seed ids, walks child-of links root-ward one frontier at a time
//! until every seed's ancestor chain is present or a safety cap is hit.
//! The walk is an explicit state machine:
//!
//! ```text
//! Init -> SeedFetch -> Expand* -> Terminal
//! ```
//!
//! Rounds are strictly sequential (frontier N+1 depends on round N), while
//! the batches inside one round are fetched concurrently by `BatchFetcher`.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::BatchFetcher;
use crate::Result;
use crate::models::{Item, ItemId};

/// Upper bound on items collected by one resolution.
pub const MAX_TOTAL: usize = 4000;

/// Upper bound on expand rounds after the seed fetch.
pub const MAX_LOOPS: usize = 50;

/// Safety caps for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureLimits {
    /// No new round starts once this many items are collected
    pub max_total: usize,
    /// Maximum number of expand rounds
    pub max_loops: usize,
}

impl Default for ClosureLimits {
    fn default() -> Self {
        Self {
            max_total: MAX_TOTAL,
            max_loops: MAX_LOOPS,
        }
    }
}

/// Why a resolution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No seeds were given
    EmptySeed,
    /// The frontier drained: every reachable ancestor is present
    Closed,
    /// `max_total` was reached with ancestors still pending
    TotalCapReached,
    /// `max_loops` rounds ran with ancestors still pending
    LoopCapReached,
}

impl Termination {
    /// Whether the closure is known to be complete.
    pub fn is_complete(self) -> bool {
        matches!(self, Termination::EmptySeed | Termination::Closed)
    }
}

/// Result of one resolution.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Every collected item, in first-seen order
    pub items: Vec<Item>,
    /// The seed ids as given by the caller
    pub seed_ids: Vec<ItemId>,
    /// Expand rounds run after the seed fetch
    pub rounds: usize,
    pub termination: Termination,
}

impl Closure {
    pub fn is_complete(&self) -> bool {
        self.termination.is_complete()
    }

    pub fn item_ids(&self) -> HashSet<ItemId> {
        self.items.iter().map(|i| i.id).collect()
    }
}

/// Items discovered so far; first-seen record wins.
#[derive(Debug, Default)]
struct ClosedSet {
    by_id: HashMap<ItemId, Item>,
    order: Vec<ItemId>,
}

impl ClosedSet {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn contains(&self, id: &ItemId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert records not yet present and return the ids that were new.
    fn absorb(&mut self, items: Vec<Item>) -> Vec<ItemId> {
        let mut inserted = Vec::new();
        for item in items {
            if self.by_id.contains_key(&item.id) {
                continue;
            }
            inserted.push(item.id);
            self.order.push(item.id);
            self.by_id.insert(item.id, item);
        }
        inserted
    }

    /// Parents of `ids` that are neither collected nor already requested.
    fn unresolved_parents(&self, ids: &[ItemId], requested: &HashSet<ItemId>) -> HashSet<ItemId> {
        ids.iter()
            .filter_map(|id| self.by_id.get(id))
            .filter_map(Item::parent_id)
            .filter(|parent| !self.contains(parent) && !requested.contains(parent))
            .collect()
    }

    fn into_items(mut self) -> Vec<Item> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .collect()
    }
}

enum Phase {
    Init,
    SeedFetch,
    Expand(HashSet<ItemId>),
    Terminal(Termination),
}

/// Resolves ancestor closures against one store.
#[derive(Clone, Copy)]
pub struct HierarchyResolver<'a> {
    fetcher: BatchFetcher<'a>,
    limits: ClosureLimits,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(fetcher: BatchFetcher<'a>) -> Self {
        Self {
            fetcher,
            limits: ClosureLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ClosureLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Collect `seed_ids` and all their ancestors.
    ///
    /// Store failures abort the whole resolution; hitting a cap does not
    /// (the result then reports an incomplete `termination`).
    pub async fn resolve(&self, seed_ids: Vec<ItemId>) -> Result<Closure> {
        let mut closed = ClosedSet::default();
        let mut requested: HashSet<ItemId> = HashSet::new();
        let mut rounds = 0;
        let mut phase = Phase::Init;

        let termination = loop {
            phase = match phase {
                Phase::Init if seed_ids.is_empty() => Phase::Terminal(Termination::EmptySeed),
                Phase::Init => Phase::SeedFetch,

                Phase::SeedFetch => {
                    requested.extend(seed_ids.iter().copied());
                    let fetched = self.fetcher.fetch(&seed_ids, true).await?;
                    let inserted = closed.absorb(fetched);
                    tracing::debug!(seeds = seed_ids.len(), found = inserted.len(), "seed fetch");
                    Phase::Expand(closed.unresolved_parents(&inserted, &requested))
                }

                Phase::Expand(frontier) if frontier.is_empty() => {
                    Phase::Terminal(Termination::Closed)
                }
                Phase::Expand(_) if closed.len() >= self.limits.max_total => {
                    Phase::Terminal(Termination::TotalCapReached)
                }
                Phase::Expand(_) if rounds >= self.limits.max_loops => {
                    Phase::Terminal(Termination::LoopCapReached)
                }
                Phase::Expand(frontier) => {
                    rounds += 1;
                    let mut ids: Vec<ItemId> = frontier.into_iter().collect();
                    ids.sort_unstable();
                    requested.extend(ids.iter().copied());

                    let fetched = self.fetcher.fetch(&ids, true).await?;
                    let inserted = closed.absorb(fetched);
                    tracing::debug!(
                        round = rounds,
                        requested = ids.len(),
                        inserted = inserted.len(),
                        total = closed.len(),
                        "expand round"
                    );
                    Phase::Expand(closed.unresolved_parents(&inserted, &requested))
                }

                Phase::Terminal(termination) => break termination,
            };
        };

        if termination.is_complete() {
            tracing::info!(items = closed.len(), rounds, "ancestor closure resolved");
        } else {
            tracing::warn!(
                items = closed.len(),
                rounds,
                reason = ?termination,
                "ancestor closure truncated by safety cap"
            );
        }

        Ok(Closure {
            items: closed.into_items(),
            seed_ids,
            rounds,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::store::{BATCH_LIMIT, InMemoryStore};

    fn resolver(store: &InMemoryStore) -> HierarchyResolver<'_> {
        HierarchyResolver::new(BatchFetcher::new(store))
    }

    fn ids(raw: &[u64]) -> HashSet<ItemId> {
        raw.iter().copied().map(ItemId).collect()
    }

    /// A linear chain `len -> len-1 -> ... -> 1` where 1 is the root.
    fn chain(len: u64) -> InMemoryStore {
        InMemoryStore::from_items((1..=len).map(|i| {
            if i == 1 {
                Item::new(1u64)
            } else {
                Item::new(i).with_parent(i - 1)
            }
        }))
    }

    #[tokio::test]
    async fn test_three_level_chain() {
        let store = InMemoryStore::from_items([
            Item::new(101u64).with_parent(55u64),
            Item::new(55u64).with_parent(10u64),
            Item::new(10u64),
        ]);

        let closure = resolver(&store).resolve(vec![ItemId(101)]).await.unwrap();

        assert_eq!(closure.item_ids(), ids(&[101, 55, 10]));
        assert_eq!(closure.seed_ids, vec![ItemId(101)]);
        assert_eq!(closure.termination, Termination::Closed);
        assert_eq!(closure.rounds, 2);
    }

    #[tokio::test]
    async fn test_shared_parent_fetched_once() {
        let store = InMemoryStore::from_items([
            Item::new(5u64).with_parent(2u64),
            Item::new(6u64).with_parent(2u64),
            Item::new(2u64),
        ]);

        let closure = resolver(&store)
            .resolve(vec![ItemId(5), ItemId(6)])
            .await
            .unwrap();

        assert_eq!(closure.item_ids(), ids(&[5, 6, 2]));
        assert_eq!(store.times_fetched(ItemId(2)), 1);
    }

    #[tokio::test]
    async fn test_empty_seed_returns_immediately() {
        let store = chain(3);
        let closure = resolver(&store).resolve(Vec::new()).await.unwrap();

        assert!(closure.items.is_empty());
        assert!(closure.seed_ids.is_empty());
        assert_eq!(closure.termination, Termination::EmptySeed);
        assert!(store.fetch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_two_item_cycle_terminates() {
        let store = InMemoryStore::from_items([
            Item::new(1u64).with_parent(2u64),
            Item::new(2u64).with_parent(1u64),
        ]);

        let closure = resolver(&store).resolve(vec![ItemId(1)]).await.unwrap();

        assert_eq!(closure.item_ids(), ids(&[1, 2]));
        assert!(closure.rounds <= MAX_LOOPS);
        assert!(closure.is_complete());
        assert_eq!(store.times_fetched(ItemId(1)), 1);
    }

    #[tokio::test]
    async fn test_self_parent_is_root() {
        let store = InMemoryStore::from_items([Item::new(7u64).with_parent(7u64)]);

        let closure = resolver(&store).resolve(vec![ItemId(7)]).await.unwrap();

        assert_eq!(closure.item_ids(), ids(&[7]));
        assert_eq!(closure.rounds, 0);
        assert_eq!(store.fetch_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_seed_and_missing_parent_are_omitted() {
        let store = InMemoryStore::from_items([
            Item::new(1u64).with_parent(404u64),
            Item::new(2u64).with_parent(404u64),
        ]);

        let closure = resolver(&store)
            .resolve(vec![ItemId(1), ItemId(2), ItemId(999)])
            .await
            .unwrap();

        assert_eq!(closure.item_ids(), ids(&[1, 2]));
        assert_eq!(closure.seed_ids.len(), 3);
        assert!(closure.is_complete());
        assert_eq!(store.times_fetched(ItemId(404)), 1);
    }

    #[tokio::test]
    async fn test_missing_parent_not_requested_twice_across_rounds() {
        // 3 -> 2 -> 404 (missing) and 1 -> 404, discovered in different rounds.
        let store = InMemoryStore::from_items([
            Item::new(1u64).with_parent(404u64),
            Item::new(3u64).with_parent(2u64),
            Item::new(2u64).with_parent(404u64),
        ]);

        let closure = resolver(&store)
            .resolve(vec![ItemId(1), ItemId(3)])
            .await
            .unwrap();

        assert_eq!(closure.item_ids(), ids(&[1, 2, 3]));
        assert_eq!(store.times_fetched(ItemId(404)), 1);
    }

    #[tokio::test]
    async fn test_full_closure_property() {
        // Three trees of depth 4 with a shared root.
        let mut items = vec![Item::new(1u64)];
        for branch in 0..3u64 {
            let base = 100 * (branch + 1);
            items.push(Item::new(base).with_parent(1u64));
            items.push(Item::new(base + 1).with_parent(base));
            items.push(Item::new(base + 2).with_parent(base + 1));
        }
        let store = InMemoryStore::from_items(items);
        let seeds = vec![ItemId(102), ItemId(202), ItemId(302)];

        let closure = resolver(&store).resolve(seeds.clone()).await.unwrap();
        let got = closure.item_ids();

        for seed in &seeds {
            assert!(got.contains(seed));
        }
        for item in &closure.items {
            if let Some(parent) = item.parent_id() {
                assert!(got.contains(&parent), "parent {} of {} missing", parent, item.id);
            }
        }
        assert_eq!(got.len(), 10);
    }

    #[tokio::test]
    async fn test_idempotent_as_sets() {
        let store = chain(30);
        let r = resolver(&store);

        let first = r.resolve(vec![ItemId(30), ItemId(13)]).await.unwrap();
        let second = r.resolve(vec![ItemId(30), ItemId(13)]).await.unwrap();

        assert_eq!(first.item_ids(), second.item_ids());
        assert_eq!(first.item_ids().len(), 30);
    }

    #[tokio::test]
    async fn test_loop_cap_truncates() {
        let store = chain(100);
        let closure = resolver(&store)
            .with_limits(ClosureLimits {
                max_total: MAX_TOTAL,
                max_loops: 5,
            })
            .resolve(vec![ItemId(100)])
            .await
            .unwrap();

        assert_eq!(closure.termination, Termination::LoopCapReached);
        assert_eq!(closure.rounds, 5);
        assert_eq!(closure.items.len(), 6);
        assert!(!closure.is_complete());
    }

    #[tokio::test]
    async fn test_default_loop_cap_on_deep_chain() {
        let store = chain(200);
        let closure = resolver(&store).resolve(vec![ItemId(200)]).await.unwrap();

        assert_eq!(closure.termination, Termination::LoopCapReached);
        assert_eq!(closure.rounds, 50);
        assert_eq!(closure.items.len(), 51);
    }

    #[test]
    fn test_limits_match_tracker_contract() {
        assert_eq!((MAX_TOTAL, MAX_LOOPS, BATCH_LIMIT), (4000, 50, 200));
        assert_eq!(
            ClosureLimits::default(),
            ClosureLimits {
                max_total: 4000,
                max_loops: 50,
            }
        );
    }

    #[tokio::test]
    async fn test_default_total_cap_after_seed_fetch() {
        // 4001 seeds, each with a distinct parent that must never be fetched.
        let mut items = Vec::new();
        for i in 0..4001u64 {
            items.push(Item::new(i).with_parent(100_000 + i));
            items.push(Item::new(100_000 + i));
        }
        let store = InMemoryStore::from_items(items);
        let seeds: Vec<ItemId> = (0..4001u64).map(ItemId).collect();

        let closure = resolver(&store).resolve(seeds).await.unwrap();

        assert_eq!(closure.termination, Termination::TotalCapReached);
        assert_eq!(closure.rounds, 0);
        assert_eq!(closure.items.len(), 4001);
        assert!(!closure.is_complete());
        assert_eq!(store.fetch_calls().len(), 21);
        assert_eq!(store.times_fetched(ItemId(100_000)), 0);
    }

    #[tokio::test]
    async fn test_total_cap_stops_new_rounds() {
        // 10 seeds, each with its own parent chain of depth 3.
        let mut items = Vec::new();
        for s in 0..10u64 {
            let base = 1000 * (s + 1);
            items.push(Item::new(base).with_parent(base + 1));
            items.push(Item::new(base + 1).with_parent(base + 2));
            items.push(Item::new(base + 2).with_parent(base + 3));
            items.push(Item::new(base + 3));
        }
        let store = InMemoryStore::from_items(items);
        let seeds: Vec<ItemId> = (0..10u64).map(|s| ItemId(1000 * (s + 1))).collect();

        let closure = resolver(&store)
            .with_limits(ClosureLimits {
                max_total: 15,
                max_loops: MAX_LOOPS,
            })
            .resolve(seeds)
            .await
            .unwrap();

        // seeds (10) + first parents (10) = 20 >= 15, so no further round.
        assert_eq!(closure.termination, Termination::TotalCapReached);
        assert_eq!(closure.items.len(), 20);
        assert_eq!(closure.rounds, 1);
    }

    #[tokio::test]
    async fn test_250_seeds_batch_per_round() {
        let mut items = Vec::new();
        for i in 0..250u64 {
            items.push(Item::new(i).with_parent(10_000 + i));
            items.push(Item::new(10_000 + i));
        }
        let store = InMemoryStore::from_items(items);
        let seeds: Vec<ItemId> = (0..250u64).map(ItemId).collect();

        let closure = resolver(&store).resolve(seeds).await.unwrap();

        let sizes: Vec<usize> = store.fetch_calls().iter().map(|c| c.ids.len()).collect();
        assert_eq!(sizes, vec![200, 50, 200, 50]);
        assert_eq!(closure.items.len(), 500);
        assert!(store.fetch_calls().iter().all(|c| c.include_relations));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_resolution() {
        let store = InMemoryStore::from_items([
            Item::new(101u64).with_parent(55u64),
            Item::new(55u64).with_parent(10u64),
            Item::new(10u64),
        ])
        .fail_on(10u64);

        let err = resolver(&store).resolve(vec![ItemId(101)]).await.unwrap_err();

        match err {
            Error::RemoteStore { ids, .. } => assert_eq!(ids, vec![ItemId(10)]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_items_in_first_seen_order() {
        let store = InMemoryStore::from_items([
            Item::new(101u64).with_parent(55u64),
            Item::new(55u64).with_parent(10u64),
            Item::new(10u64),
        ]);

        let closure = resolver(&store).resolve(vec![ItemId(101)]).await.unwrap();
        let order: Vec<ItemId> = closure.items.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![ItemId(101), ItemId(55), ItemId(10)]);
    }
}
