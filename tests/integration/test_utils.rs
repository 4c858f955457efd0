//! Test utilities for integration tests.
//!
//! Provides test images, tile buffers of known size and an observer that
//! records lifecycle events.

use std::sync::{Arc, Once};

use parking_lot::Mutex;

use raster_tile_cache::{
    CacheConfig, CachedTileEntry, PixelBuffer, SampleType, TileAction, TileCache, TileKey,
    TiledImage,
};

pub const KB: usize = 1024;
pub const MB: usize = 1024 * 1024;

// =============================================================================
// Logging
// =============================================================================

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Test Images
// =============================================================================

/// A tiled image that only carries identity.
pub struct TestImage {
    tag: Option<Vec<u8>>,
    num_x_tiles: u32,
}

impl TestImage {
    /// Image with a unique tag built from `id`.
    pub fn tagged(id: u64) -> Arc<Self> {
        Arc::new(Self {
            tag: Some(id.to_be_bytes().to_vec()),
            num_x_tiles: 64,
        })
    }

    /// Image addressed by its identity hash only.
    pub fn untagged() -> Arc<Self> {
        Arc::new(Self {
            tag: None,
            num_x_tiles: 64,
        })
    }
}

impl TiledImage for TestImage {
    fn unique_tag(&self) -> Option<&[u8]> {
        self.tag.as_deref()
    }

    fn num_x_tiles(&self) -> u32 {
        self.num_x_tiles
    }
}

// =============================================================================
// Tiles and Caches
// =============================================================================

/// Single-bank byte tile of exactly `size` bytes filled with `fill`.
pub fn tile(size: usize, fill: u8) -> PixelBuffer {
    PixelBuffer::single_bank(SampleType::U8, vec![fill; size])
}

/// Cache with threshold 1.0 so the bound equals the capacity.
pub fn cache_with_capacity(capacity: usize) -> TileCache {
    init_tracing();
    TileCache::new(CacheConfig::with_capacity(capacity as u64).with_threshold(1.0))
        .expect("valid config")
}

/// Cache with diagnostics on.
pub fn diagnostic_cache(capacity: usize) -> TileCache {
    init_tracing();
    let config = CacheConfig::with_capacity(capacity as u64)
        .with_threshold(1.0)
        .with_diagnostics(true);
    TileCache::new(config).expect("valid config")
}

// =============================================================================
// Event Recording
// =============================================================================

/// One observed lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub key: TileKey,
    pub col: i32,
    pub row: i32,
    pub action: TileAction,
}

/// Observer that records every event it receives.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Create a log and register it with `cache`.
    pub fn attach(cache: &TileCache) -> Self {
        let log = Self::default();
        let sink = log.events.clone();
        cache.add_observer(Arc::new(move |entry: &CachedTileEntry, action: TileAction| {
            sink.lock().push(Event {
                key: entry.key().clone(),
                col: entry.tile_col(),
                row: entry.tile_row(),
                action,
            });
        }));
        log
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<TileAction> {
        self.events.lock().iter().map(|e| e.action).collect()
    }

    pub fn count(&self, action: TileAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .count()
    }

    /// Actions observed for one tile, in order.
    pub fn actions_for(&self, key: &TileKey) -> Vec<TileAction> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.key == key)
            .map(|e| e.action)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
