//! Eviction policies for the bounded store.

use crate::tile::{CachedTileEntry, TileKey};

/// Default number of least-recently-used entries a [`CostAwarePolicy`] inspects.
pub const DEFAULT_COST_WINDOW: usize = 8;

/// Weighing and victim selection for the bounded store.
///
/// The store asks the policy for one victim at a time while it is over its
/// weight bound. Candidates are offered in least-recently-used-first order
/// and never include the entry whose insertion triggered the eviction.
pub trait EvictionPolicy: Send + Sync {
    /// Weight of an entry against the store's bound.
    fn weigh(&self, entry: &CachedTileEntry) -> u64 {
        entry.byte_weight()
    }

    /// Pick the entry to evict, or `None` to stop evicting from this shard.
    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = &CachedTileEntry>,
    ) -> Option<TileKey>;
}

/// Evict the least recently used entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = &CachedTileEntry>,
    ) -> Option<TileKey> {
        candidates.next().map(|entry| entry.key().clone())
    }
}

/// Evict the cheapest-to-recompute entry among the least recently used ones.
///
/// Looks at up to `window` candidates from the cold end of the LRU order and
/// picks the lowest cost. Entries without a cost count as free to recompute.
/// Ties go to the least recently used.
#[derive(Debug, Clone, Copy)]
pub struct CostAwarePolicy {
    window: usize,
}

impl CostAwarePolicy {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for CostAwarePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COST_WINDOW)
    }
}

impl EvictionPolicy for CostAwarePolicy {
    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = &CachedTileEntry>,
    ) -> Option<TileKey> {
        candidates
            .take(self.window)
            .min_by(|a, b| {
                let a = a.cost().unwrap_or(0.0);
                let b = b.cost().unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .map(|entry| entry.key().clone())
    }
}
