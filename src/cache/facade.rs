use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, warn};

use crate::config::{validate_concurrency_level, validate_threshold, CacheConfig};
use crate::diagnostics::{DiagnosticChannel, ObserverId, TileObserver};
use crate::error::CacheError;
use crate::store::{BoundedStore, EvictionPolicy, ImageKeyIndex, LruPolicy};
use crate::tile::{CachedTileEntry, ImageKey, PixelBuffer, TileAction, TileKey, TiledImage};

use super::stats::CacheStatistics;

/// Tile ordering hook of the legacy tile cache interface (unsupported).
pub type TileComparator =
    Arc<dyn Fn(&CachedTileEntry, &CachedTileEntry) -> CmpOrdering + Send + Sync>;

// =============================================================================
// Cache State
// =============================================================================

/// Store, index and the configuration they were built from.
///
/// Replaced wholesale on flush and on every configuration change.
struct CacheState {
    config: CacheConfig,
    store: BoundedStore,
    index: Arc<ImageKeyIndex>,
}

impl CacheState {
    fn new(config: CacheConfig, policy: Arc<dyn EvictionPolicy>) -> Result<Self, CacheError> {
        let index = Arc::new(ImageKeyIndex::new());
        let store = BoundedStore::with_parts(&config, policy, index.clone())?;
        Ok(Self {
            config,
            store,
            index,
        })
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Concurrent, memory-bounded cache of rendered tiles.
///
/// Tiles are keyed by their owning image and grid position. The cache holds
/// owners weakly, bounds the total byte weight of its tiles to
/// `memory_capacity * memory_threshold`, and can invalidate every tile of an
/// image in one call.
///
/// # Diagnostics
///
/// With diagnostics off (the default) operations run concurrently on the
/// sharded store. With diagnostics on, all mutating calls and `get` are
/// serialized by one reentrant lock, so every tile's lifecycle events reach
/// observers in order and exactly once. Observers may call back into the
/// cache.
///
/// The diagnostics flag only changes while a flush holds the state write
/// lock, so an operation that started with diagnostics off finishes on the
/// store it started on before the switch takes effect.
///
/// # Reconfiguration
///
/// Every setter validates its value, applies it and then flushes: the store
/// and index are rebuilt from scratch and all cached tiles are dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use raster_tile_cache::{CacheConfig, PixelBuffer, SampleType, TileCache, TiledImage};
///
/// struct Mosaic;
///
/// impl TiledImage for Mosaic {
///     fn unique_tag(&self) -> Option<&[u8]> {
///         Some(b"mosaic-1")
///     }
///
///     fn num_x_tiles(&self) -> u32 {
///         16
///     }
/// }
///
/// let cache = TileCache::new(CacheConfig::with_capacity(8 * 1024 * 1024)).unwrap();
/// let image = Arc::new(Mosaic);
///
/// let tile = PixelBuffer::single_bank(SampleType::U8, vec![0u8; 1024]);
/// cache.add(&image, 0, 0, tile.clone()).unwrap();
///
/// assert_eq!(cache.get(&image, 0, 0), Some(tile));
/// assert_eq!(cache.size(), 1);
/// ```
pub struct TileCache {
    state: RwLock<Arc<CacheState>>,
    policy: Arc<dyn EvictionPolicy>,
    diagnostics: DiagnosticChannel,
    serial: ReentrantMutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Create a cache with LRU eviction.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        Self::with_policy(config, Arc::new(LruPolicy))
    }

    /// Create a cache with a custom eviction policy.
    pub fn with_policy(
        config: CacheConfig,
        policy: Arc<dyn EvictionPolicy>,
    ) -> Result<Self, CacheError> {
        let diagnostics = DiagnosticChannel::new(config.diagnostics);
        let state = CacheState::new(config, policy.clone())?;

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            policy,
            diagnostics,
            serial: ReentrantMutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn state(&self) -> Arc<CacheState> {
        self.state.read().clone()
    }

    /// Run `op` against the current state.
    ///
    /// With diagnostics off, `op` runs under the state read lock, which keeps
    /// both the state and the diagnostics flag fixed until it returns. `op`
    /// publishes nothing in that mode and must not read `self.state` again.
    ///
    /// With diagnostics on, `op` runs under the serial lock and outside the
    /// state lock, so observers it notifies may re-enter the cache.
    fn access<R>(&self, op: impl FnOnce(&CacheState) -> R) -> R {
        if !self.diagnostics.is_enabled() {
            let state = self.state.read();
            // Checked again now that a flush can no longer flip it
            if !self.diagnostics.is_enabled() {
                return op(&**state);
            }
        }

        let _serial = self.serial.lock();
        let state = self.state();
        op(&*state)
    }

    // =========================================================================
    // Adding Tiles
    // =========================================================================

    /// Cache tile `(col, row)` of `owner`.
    ///
    /// Replaces any tile already cached at that position. Fails only if the
    /// byte size of `data` cannot be determined.
    pub fn add<I: TiledImage + 'static>(
        &self,
        owner: &Arc<I>,
        col: i32,
        row: i32,
        data: PixelBuffer,
    ) -> Result<(), CacheError> {
        self.add_with_cost(owner, col, row, data, None)
    }

    /// Cache a tile together with the cost of recomputing it.
    pub fn add_with_cost<I: TiledImage + 'static>(
        &self,
        owner: &Arc<I>,
        col: i32,
        row: i32,
        data: PixelBuffer,
        cost: Option<f64>,
    ) -> Result<(), CacheError> {
        let entry = Arc::new(CachedTileEntry::new(owner, col, row, data, cost)?);
        self.access(|state| self.insert(state, entry));
        Ok(())
    }

    /// Cache a tile of an owner only known as a trait object.
    pub fn add_shared(
        &self,
        owner: &Arc<dyn TiledImage>,
        col: i32,
        row: i32,
        data: PixelBuffer,
        cost: Option<f64>,
    ) -> Result<(), CacheError> {
        let entry = Arc::new(CachedTileEntry::from_shared(owner, col, row, data, cost)?);
        self.access(|state| self.insert(state, entry));
        Ok(())
    }

    /// Cache several tiles of one image.
    ///
    /// Every buffer is checked before anything is inserted, so a bad buffer
    /// leaves the cache untouched.
    pub fn add_tiles<I, T>(&self, owner: &Arc<I>, tiles: T) -> Result<(), CacheError>
    where
        I: TiledImage + 'static,
        T: IntoIterator<Item = (i32, i32, PixelBuffer)>,
    {
        let entries = tiles
            .into_iter()
            .map(|(col, row, data)| {
                CachedTileEntry::new(owner, col, row, data, None).map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.access(|state| {
            for entry in entries {
                self.insert(state, entry);
            }
        });
        Ok(())
    }

    fn insert(&self, state: &CacheState, entry: Arc<CachedTileEntry>) {
        let outcome = state.store.put(entry.clone());

        if let Some(previous) = &outcome.previous {
            self.diagnostics
                .publish(previous, TileAction::SubstitutionFromAdd);
        }
        self.diagnostics.publish(&entry, TileAction::Addition);

        if !outcome.evicted.is_empty() {
            self.evictions
                .fetch_add(outcome.evicted.len() as u64, Ordering::Relaxed);
            for evicted in &outcome.evicted {
                self.diagnostics
                    .publish(evicted, TileAction::RemovalFromEviction);
            }
        }
    }

    // =========================================================================
    // Reading Tiles
    // =========================================================================

    /// Pixel data of tile `(col, row)` of `owner`, if cached.
    pub fn get<I: TiledImage + ?Sized>(
        &self,
        owner: &Arc<I>,
        col: i32,
        row: i32,
    ) -> Option<PixelBuffer> {
        let key = TileKey::derive(owner.as_ref(), col, row);
        self.access(|state| self.lookup(state, &key))
            .map(|entry| entry.data().clone())
    }

    /// Pixel data for several positions of one image, in request order.
    pub fn get_tiles<I: TiledImage + ?Sized>(
        &self,
        owner: &Arc<I>,
        positions: &[(i32, i32)],
    ) -> Vec<Option<PixelBuffer>> {
        self.access(|state| {
            positions
                .iter()
                .map(|&(col, row)| {
                    let key = TileKey::derive(owner.as_ref(), col, row);
                    self.lookup(state, &key)
                        .map(|entry| entry.data().clone())
                })
                .collect()
        })
    }

    fn lookup(&self, state: &CacheState, key: &TileKey) -> Option<Arc<CachedTileEntry>> {
        match state.store.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if self.diagnostics.is_enabled() {
                    entry.touch();
                    self.diagnostics
                        .publish(&entry, TileAction::UpdatingTileFromGetTile);
                }
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Every cached tile of `owner`.
    ///
    /// Does not count as an access: recency, counters and diagnostics are
    /// left untouched.
    pub fn tiles_of<I: TiledImage + ?Sized>(&self, owner: &Arc<I>) -> Vec<Arc<CachedTileEntry>> {
        let image = ImageKey::derive(owner.as_ref());
        let state = self.state();
        state
            .index
            .get_tile_keys(&image)
            .unwrap_or_default()
            .iter()
            .filter_map(|key| state.store.peek(key))
            .collect()
    }

    /// Whether tile `(col, row)` of `owner` is cached. Does not count as an access.
    pub fn contains<I: TiledImage + ?Sized>(&self, owner: &Arc<I>, col: i32, row: i32) -> bool {
        let key = TileKey::derive(owner.as_ref(), col, row);
        self.state().store.contains(&key)
    }

    /// Entry stored under a precomputed key. Does not count as an access.
    ///
    /// Useful once the owner is gone: a tagged key stays valid after its
    /// image has been dropped.
    pub fn entry(&self, key: &TileKey) -> Option<Arc<CachedTileEntry>> {
        self.state().store.peek(key)
    }

    // =========================================================================
    // Removing Tiles
    // =========================================================================

    /// Remove tile `(col, row)` of `owner`.
    ///
    /// Returns `true` if a tile was removed.
    pub fn remove<I: TiledImage + ?Sized>(&self, owner: &Arc<I>, col: i32, row: i32) -> bool {
        let key = TileKey::derive(owner.as_ref(), col, row);
        self.access(|state| self.remove_key(state, &key))
    }

    fn remove_key(&self, state: &CacheState, key: &TileKey) -> bool {
        if !self.diagnostics.is_enabled() {
            return state.store.remove(key).is_some();
        }

        let Some(entry) = state.store.peek(key) else {
            return false;
        };
        self.diagnostics.publish(&entry, TileAction::AboutToRemove);

        match state.store.remove(key) {
            Some(removed) => {
                self.diagnostics
                    .publish(&removed, TileAction::ManualRemoval);
                true
            }
            None => false,
        }
    }

    /// Remove every cached tile of `owner`.
    ///
    /// Returns the number of tiles removed.
    pub fn remove_all<I: TiledImage + ?Sized>(&self, owner: &Arc<I>) -> usize {
        let image = ImageKey::derive(owner.as_ref());

        self.access(|state| {
            let keys = state.index.get_tile_keys(&image).unwrap_or_default();
            if self.diagnostics.is_enabled() {
                // Per-tile removal keeps the bracketing events for each tile
                keys.iter()
                    .filter(|key| self.remove_key(state, key))
                    .count()
            } else {
                // The index drops each key as the store removes it
                state.store.remove_all(keys)
            }
        })
    }

    /// Drop every cached tile and rebuild the store and index.
    pub fn flush(&self) {
        let _serial = self.serial.lock();
        let config = self.state().config.clone();
        // The current configuration has already been validated
        if let Err(e) = self.install(config) {
            warn!(error = %e, "Flush failed to rebuild the tile store");
        }
    }

    /// Evict tiles until the cached weight is within the bound.
    pub fn memory_control(&self) {
        self.access(|state| {
            let evicted = state.store.enforce_bound();

            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            for entry in &evicted {
                self.diagnostics
                    .publish(entry, TileAction::RemovalFromEviction);
            }
        })
    }

    /// Swap in a fresh store and index built from `config`.
    ///
    /// Callers hold the serial lock.
    fn install(&self, config: CacheConfig) -> Result<(), CacheError> {
        let fresh = Arc::new(CacheState::new(config, self.policy.clone())?);
        let previous = {
            // Waits for operations still running on the old state
            let mut state = self.state.write();
            self.diagnostics.set_enabled(fresh.config.diagnostics);
            std::mem::replace(&mut *state, fresh.clone())
        };

        if fresh.config.diagnostics {
            for entry in previous.store.drain() {
                self.diagnostics
                    .publish(&entry, TileAction::RemovalFromFlush);
            }
        } else {
            previous.store.clear();
            previous.index.clear();
        }

        let config = &fresh.config;
        debug!(
            capacity = config.memory_capacity,
            threshold = config.memory_threshold,
            concurrency_level = config.concurrency_level,
            diagnostics = config.diagnostics,
            "Tile cache flushed"
        );
        Ok(())
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current configuration.
    pub fn config(&self) -> CacheConfig {
        self.state().config.clone()
    }

    /// Replace the whole configuration, then flush.
    pub fn reconfigure(&self, config: CacheConfig) -> Result<(), CacheError> {
        config.validate()?;

        let _serial = self.serial.lock();
        self.install(config)
    }

    fn update(&self, apply: impl FnOnce(&mut CacheConfig)) -> Result<(), CacheError> {
        let _serial = self.serial.lock();
        let mut config = self.config();
        apply(&mut config);
        self.reconfigure(config)
    }

    /// Set the memory capacity in bytes, then flush.
    pub fn set_memory_capacity(&self, capacity: u64) -> Result<(), CacheError> {
        self.update(|config| config.memory_capacity = capacity)
    }

    /// Set the fill threshold, then flush. Rejects values outside `[0, 1]`.
    pub fn set_memory_threshold(&self, threshold: f32) -> Result<(), CacheError> {
        validate_threshold(threshold)?;
        self.update(|config| config.memory_threshold = threshold)
    }

    /// Set the number of store shards, then flush. Rejects 0.
    pub fn set_concurrency_level(&self, level: usize) -> Result<(), CacheError> {
        validate_concurrency_level(level)?;
        self.update(|config| config.concurrency_level = level)
    }

    /// Switch diagnostics on or off, then flush.
    pub fn set_diagnostics(&self, enabled: bool) -> Result<(), CacheError> {
        self.update(|config| config.diagnostics = enabled)
    }

    pub fn memory_capacity(&self) -> u64 {
        self.state().config.memory_capacity
    }

    pub fn memory_threshold(&self) -> f32 {
        self.state().config.memory_threshold
    }

    pub fn concurrency_level(&self) -> usize {
        self.state().config.concurrency_level
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.is_enabled()
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Register an observer of tile lifecycle events.
    ///
    /// Observers stay registered across flushes and reconfiguration; they
    /// only receive events while diagnostics are enabled.
    pub fn add_observer(&self, observer: Arc<dyn TileObserver>) -> ObserverId {
        self.diagnostics.subscribe(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.diagnostics.unsubscribe(id)
    }

    /// Number of observer panics caught so far.
    pub fn observer_failures(&self) -> u64 {
        self.diagnostics.failures()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Number of cached tiles.
    pub fn size(&self) -> usize {
        self.state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total byte weight of cached tiles.
    pub fn total_weight(&self) -> u64 {
        self.state().store.total_weight()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let state = self.state();
        CacheStatistics {
            tiles: state.store.len(),
            images: state.index.image_count(),
            weight: state.store.total_weight(),
            max_weight: state.store.max_weight(),
            memory_capacity: state.config.memory_capacity,
            memory_threshold: state.config.memory_threshold,
            concurrency_level: state.store.concurrency_level(),
            diagnostics: self.diagnostics.is_enabled(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Unsupported Legacy Operations
    // =========================================================================

    /// Tile-count capacity is not part of this cache; weight is the only bound.
    pub fn set_tile_capacity(&self, _tiles: usize) -> Result<(), CacheError> {
        Err(CacheError::unsupported("set_tile_capacity"))
    }

    pub fn tile_capacity(&self) -> Result<usize, CacheError> {
        Err(CacheError::unsupported("tile_capacity"))
    }

    /// Custom tile ordering is not supported; use an [`EvictionPolicy`].
    pub fn set_tile_comparator(&self, _comparator: TileComparator) -> Result<(), CacheError> {
        Err(CacheError::unsupported("set_tile_comparator"))
    }

    pub fn tile_comparator(&self) -> Result<TileComparator, CacheError> {
        Err(CacheError::unsupported("tile_comparator"))
    }

    pub fn reset_counters(&self) -> Result<(), CacheError> {
        Err(CacheError::unsupported("reset_counters"))
    }
}

// =============================================================================
// Tests
// =============================================================================
