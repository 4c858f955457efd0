//! # Raster Tile Cache
//!
//! A bounded, weighted, concurrent cache for the tiles of large rendered
//! raster images.
//!
//! Tile-rendering pipelines compute images one tile at a time. This crate
//! keeps the computed pixel buffers around so repeated requests for the same
//! tile are served from memory, within a fixed memory budget.
//!
//! ## Features
//!
//! - **Weighted capacity**: tiles are weighed by their byte size and the total
//!   is kept within `capacity * threshold`
//! - **Sharded store**: a configurable number of independently locked LRU shards
//! - **Per-image invalidation**: every tile of one image can be dropped without
//!   scanning the whole cache
//! - **Weak ownership**: the cache never keeps an owning image alive
//! - **Lifecycle diagnostics**: optional, off by default, observer callbacks for
//!   every add, replacement, access, removal, eviction and flush
//!
//! ## Architecture
//!
//! - [`tile`] - Tile identity, key derivation and cached entries
//! - [`store`] - Weight-bounded sharded store, eviction policies, per-image index
//! - [`diagnostics`] - Observer registration and event publishing
//! - [`cache`] - The [`TileCache`] facade and its statistics
//! - [`config`] - Configuration
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use raster_tile_cache::{CacheConfig, PixelBuffer, SampleType, TileCache, TiledImage};
//!
//! struct Scene {
//!     id: u64,
//! }
//!
//! impl TiledImage for Scene {
//!     fn unique_tag(&self) -> Option<&[u8]> {
//!         None
//!     }
//!
//!     fn num_x_tiles(&self) -> u32 {
//!         8
//!     }
//! }
//!
//! let config = CacheConfig::with_capacity(16 * 1024 * 1024).with_threshold(0.9);
//! let cache = TileCache::new(config).unwrap();
//!
//! let scene = Arc::new(Scene { id: 7 });
//! let tile = PixelBuffer::single_bank(SampleType::U8, vec![scene.id as u8; 256 * 256]);
//!
//! if cache.get(&scene, 2, 3).is_none() {
//!     cache.add(&scene, 2, 3, tile).unwrap();
//! }
//!
//! assert_eq!(cache.remove_all(&scene), 1);
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use cache::{CacheStatistics, TileCache, TileComparator};
pub use config::{
    parse_byte_size, CacheConfig, DEFAULT_CONCURRENCY_LEVEL, DEFAULT_MEMORY_CAPACITY,
    DEFAULT_MEMORY_THRESHOLD,
};
pub use diagnostics::{DiagnosticChannel, ObserverId, TileObserver};
pub use error::{CacheError, ConfigError, EntryError};
pub use store::{
    BoundedStore, CostAwarePolicy, EvictionPolicy, ImageKeyIndex, LruPolicy, NoopListener,
    PutOutcome, RemovalCause, StoreListener,
};
pub use tile::{
    linear_tile_index, CachedTileEntry, ImageKey, PixelBuffer, SampleType, TileAction, TileKey,
    TiledImage,
};
