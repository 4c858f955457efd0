//! Weighted, sharded LRU store.
//!
//! The store maps [`TileKey`]s to [`CachedTileEntry`]s and keeps the total
//! weight of its entries at or below a global bound (`capacity * threshold`).
//!
//! # Sharding
//!
//! Entries are spread over `concurrency_level` shards, each an unbounded
//! [`LruCache`] behind its own mutex. The weight bound is global: the running
//! total lives in an atomic, and an insert that pushes it over the bound
//! evicts from its own shard first, then walks the other shards.
//!
//! # Notifications
//!
//! Every insert and removal is reported to the [`StoreListener`] while the
//! affected shard is still locked, so a listener that mirrors the store
//! (the per-image key index) can never disagree with it for a given key.
//! Listeners must be quick and must not call back into the store.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::tile::{CachedTileEntry, TileKey};

use super::policy::{EvictionPolicy, LruPolicy};

// =============================================================================
// Removal Notifications
// =============================================================================

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Removed by `remove` or `remove_all`
    Explicit,
    /// Replaced by a `put` for the same key
    Replaced,
    /// Evicted to stay within the weight bound
    Size,
    /// Dropped by `drain`
    Cleared,
}

impl RemovalCause {
    /// Returns `true` if the store chose to remove the entry.
    pub fn was_evicted(self) -> bool {
        matches!(self, RemovalCause::Size)
    }
}

/// Observer of store mutations, called under the shard lock.
pub trait StoreListener: Send + Sync {
    fn on_insert(&self, _entry: &CachedTileEntry) {}

    fn on_removal(&self, _entry: &CachedTileEntry, _cause: RemovalCause) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl StoreListener for NoopListener {}

// =============================================================================
// Put Outcome
// =============================================================================

/// Result of [`BoundedStore::put`].
#[derive(Debug, Default)]
pub struct PutOutcome {
    /// Entry previously stored under the same key
    pub previous: Option<Arc<CachedTileEntry>>,
    /// Entries evicted by this insert, in eviction order
    pub evicted: Vec<Arc<CachedTileEntry>>,
    /// `false` if the new entry alone outweighs the bound and was not stored
    pub admitted: bool,
}

// =============================================================================
// Bounded Store
// =============================================================================

struct Slot {
    entry: Arc<CachedTileEntry>,
    weight: u64,
}

struct Shard {
    entries: LruCache<TileKey, Slot>,
    weight: u64,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            weight: 0,
        }
    }
}

/// Concurrent, weight-bounded tile store with pluggable eviction.
pub struct BoundedStore {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
    max_weight: u64,
    total_weight: AtomicU64,
    len: AtomicUsize,
    evictions: AtomicU64,
    policy: Arc<dyn EvictionPolicy>,
    listener: Arc<dyn StoreListener>,
}

impl BoundedStore {
    /// Create a store with LRU eviction and no listener.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(LruPolicy), Arc::new(NoopListener))
    }

    /// Create a store with the given eviction policy and listener.
    ///
    /// Fails if the configuration is invalid.
    pub fn with_parts(
        config: &CacheConfig,
        policy: Arc<dyn EvictionPolicy>,
        listener: Arc<dyn StoreListener>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let shards = (0..config.concurrency_level)
            .map(|_| Mutex::new(Shard::new()))
            .collect();

        Ok(Self {
            shards,
            hasher: RandomState::new(),
            max_weight: config.max_weight(),
            total_weight: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            evictions: AtomicU64::new(0),
            policy,
            listener,
        })
    }

    fn shard_index(&self, key: &TileKey) -> usize {
        (self.hasher.hash_one(key) % self.shards.len() as u64) as usize
    }

    fn over_bound(&self) -> bool {
        self.total_weight.load(Ordering::Acquire) > self.max_weight
    }

    fn release(&self, shard: &mut Shard, weight: u64) {
        shard.weight -= weight;
        self.total_weight.fetch_sub(weight, Ordering::AcqRel);
        self.len.fetch_sub(1, Ordering::AcqRel);
    }

    /// Insert or replace an entry, evicting others if the bound is exceeded.
    ///
    /// The new entry is never chosen as a victim by its own insert. An entry
    /// heavier than the whole bound is not stored; it is reported in
    /// `evicted` and any previous entry under its key is removed.
    pub fn put(&self, entry: Arc<CachedTileEntry>) -> PutOutcome {
        let key = entry.key().clone();
        let weight = self.policy.weigh(&entry);
        let home = self.shard_index(&key);
        let mut outcome = PutOutcome::default();

        {
            let mut shard = self.shards[home].lock();

            if weight > self.max_weight {
                if let Some(slot) = shard.entries.pop(&key) {
                    self.release(&mut shard, slot.weight);
                    self.listener.on_removal(&slot.entry, RemovalCause::Size);
                    outcome.previous = Some(slot.entry);
                }
                debug!(
                    weight,
                    max_weight = self.max_weight,
                    "Tile outweighs the cache bound, not admitted"
                );
                self.evictions.fetch_add(1, Ordering::Relaxed);
                outcome.evicted.push(entry);
                return outcome;
            }

            let slot = Slot {
                entry: entry.clone(),
                weight,
            };
            shard.weight += weight;
            self.total_weight.fetch_add(weight, Ordering::AcqRel);

            match shard.entries.put(key.clone(), slot) {
                Some(previous) => {
                    shard.weight -= previous.weight;
                    self.total_weight.fetch_sub(previous.weight, Ordering::AcqRel);
                    self.listener
                        .on_removal(&previous.entry, RemovalCause::Replaced);
                    outcome.previous = Some(previous.entry);
                }
                None => {
                    self.len.fetch_add(1, Ordering::AcqRel);
                }
            }

            self.listener.on_insert(&entry);
            outcome.admitted = true;

            self.evict_from(&mut shard, Some(&key), &mut outcome.evicted);
        }

        // Still over: the home shard ran out of candidates, spill to the others
        let count = self.shards.len();
        for offset in 1..count {
            if !self.over_bound() {
                break;
            }
            let mut shard = self.shards[(home + offset) % count].lock();
            self.evict_from(&mut shard, None, &mut outcome.evicted);
        }

        outcome
    }

    /// Evict from one shard until the store is within bound or the policy
    /// has no more victims.
    fn evict_from(
        &self,
        shard: &mut Shard,
        pinned: Option<&TileKey>,
        evicted: &mut Vec<Arc<CachedTileEntry>>,
    ) {
        while self.over_bound() {
            let victim = {
                let mut candidates = shard
                    .entries
                    .iter()
                    .rev()
                    .filter(|(key, _)| pinned != Some(*key))
                    .map(|(_, slot)| slot.entry.as_ref());
                self.policy.select_victim(&mut candidates)
            };

            let Some(victim) = victim else { break };
            let Some(slot) = shard.entries.pop(&victim) else {
                break;
            };

            self.release(shard, slot.weight);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.listener.on_removal(&slot.entry, RemovalCause::Size);
            evicted.push(slot.entry);
        }
    }

    /// Look up an entry, marking it as recently used.
    pub fn get(&self, key: &TileKey) -> Option<Arc<CachedTileEntry>> {
        let mut shard = self.shards[self.shard_index(key)].lock();
        shard.entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Look up an entry without touching its recency.
    pub fn peek(&self, key: &TileKey) -> Option<Arc<CachedTileEntry>> {
        let shard = self.shards[self.shard_index(key)].lock();
        shard.entries.peek(key).map(|slot| slot.entry.clone())
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        let shard = self.shards[self.shard_index(key)].lock();
        shard.entries.contains(key)
    }

    /// Remove one entry.
    pub fn remove(&self, key: &TileKey) -> Option<Arc<CachedTileEntry>> {
        let mut shard = self.shards[self.shard_index(key)].lock();
        let slot = shard.entries.pop(key)?;
        self.release(&mut shard, slot.weight);
        self.listener.on_removal(&slot.entry, RemovalCause::Explicit);
        Some(slot.entry)
    }

    /// Remove a batch of entries, locking each shard once.
    ///
    /// Returns the number of entries actually removed.
    pub fn remove_all<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = TileKey>,
    {
        let mut by_shard: Vec<Vec<TileKey>> = vec![Vec::new(); self.shards.len()];
        for key in keys {
            by_shard[self.shard_index(&key)].push(key);
        }

        let mut removed = 0;
        for (index, keys) in by_shard.into_iter().enumerate() {
            if keys.is_empty() {
                continue;
            }
            let mut shard = self.shards[index].lock();
            for key in keys {
                if let Some(slot) = shard.entries.pop(&key) {
                    self.release(&mut shard, slot.weight);
                    self.listener.on_removal(&slot.entry, RemovalCause::Explicit);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Remove and return every entry, notifying the listener for each.
    pub fn drain(&self) -> Vec<Arc<CachedTileEntry>> {
        let mut drained = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            while let Some((_, slot)) = shard.entries.pop_lru() {
                self.release(&mut shard, slot.weight);
                self.listener.on_removal(&slot.entry, RemovalCause::Cleared);
                drained.push(slot.entry);
            }
        }
        drained
    }

    /// Remove every entry without per-entry notifications.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            self.total_weight.fetch_sub(shard.weight, Ordering::AcqRel);
            self.len.fetch_sub(shard.entries.len(), Ordering::AcqRel);
            shard.entries.clear();
            shard.weight = 0;
        }
    }

    /// Evict until the store is within its bound.
    pub fn enforce_bound(&self) -> Vec<Arc<CachedTileEntry>> {
        let mut evicted = Vec::new();
        for shard in self.shards.iter() {
            if !self.over_bound() {
                break;
            }
            self.evict_from(&mut shard.lock(), None, &mut evicted);
        }
        evicted
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the weights of all stored entries.
    pub fn total_weight(&self) -> u64 {
        self.total_weight.load(Ordering::Acquire)
    }

    /// Weight bound: `capacity * threshold`.
    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    /// Number of entries evicted (or refused) under memory pressure.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn concurrency_level(&self) -> usize {
        self.shards.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
