use serde::Serialize;

/// Point-in-time view of the cache.
///
/// Counters (`hits`, `misses`, `evictions`) accumulate over the lifetime of
/// the cache and survive flushes; the other fields describe the current
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Number of cached tiles
    pub tiles: usize,
    /// Number of images with at least one cached tile
    pub images: usize,
    /// Total byte weight of cached tiles
    pub weight: u64,
    /// Weight bound (`memory_capacity * memory_threshold`)
    pub max_weight: u64,
    pub memory_capacity: u64,
    pub memory_threshold: f32,
    pub concurrency_level: usize,
    pub diagnostics: bool,
    /// Lookups that found a tile
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Tiles evicted or refused under memory pressure
    pub evictions: u64,
}

impl CacheStatistics {
    /// Fraction of lookups that were hits, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Fraction of the weight bound currently in use.
    pub fn fill_ratio(&self) -> f64 {
        if self.max_weight == 0 {
            0.0
        } else {
            self.weight as f64 / self.max_weight as f64
        }
    }
}
