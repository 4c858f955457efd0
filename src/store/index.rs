//! Image-to-tile index kept beside the bounded store.
//!
//! ```text
//! ImageKey ──► { TileKey, TileKey, ... }
//! ```
//!
//! The store notifies the index from under its shard lock, so a tile is in
//! the index exactly while it is in the store. Callers that drop an image's
//! tiles read a snapshot of its key set and remove through the store.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::tile::{CachedTileEntry, ImageKey, TileKey};

use super::bounded::{RemovalCause, StoreListener};

/// Per-image index of the tile keys currently cached.
///
/// Lets the cache invalidate every tile of one image without scanning the
/// whole store. A set exists only while it is non-empty; the first insert
/// for an image creates it atomically under the map's shard lock.
///
/// Registered as the store's [`StoreListener`], the index follows inserts,
/// removals and evictions as they happen.
#[derive(Debug, Default)]
pub struct ImageKeyIndex {
    map: DashMap<ImageKey, HashSet<TileKey>>,
}

impl ImageKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tile` under `image`. Idempotent.
    ///
    /// Returns `true` if the key was not already present.
    pub fn add_tile_key(&self, image: ImageKey, tile: TileKey) -> bool {
        self.map.entry(image).or_default().insert(tile)
    }

    /// Forget `tile` under `image`, dropping the image's set once empty.
    ///
    /// Returns `true` if the key was present. Removing an absent key is a no-op.
    pub fn remove_tile_key(&self, image: &ImageKey, tile: &TileKey) -> bool {
        let mut removed = false;
        // The predicate runs under the shard write lock, so the removal and
        // the emptiness check are atomic
        self.map.remove_if_mut(image, |_, tiles| {
            removed = tiles.remove(tile);
            tiles.is_empty()
        });
        removed
    }

    /// Snapshot of the tile keys cached for `image`.
    pub fn get_tile_keys(&self, image: &ImageKey) -> Option<Vec<TileKey>> {
        self.map
            .get(image)
            .map(|tiles| tiles.iter().cloned().collect())
    }

    pub fn contains(&self, image: &ImageKey, tile: &TileKey) -> bool {
        self.map
            .get(image)
            .is_some_and(|tiles| tiles.contains(tile))
    }

    /// Number of images with at least one cached tile.
    pub fn image_count(&self) -> usize {
        self.map.len()
    }

    /// Number of indexed tile keys across all images.
    pub fn tile_count(&self) -> usize {
        self.map.iter().map(|tiles| tiles.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl StoreListener for ImageKeyIndex {
    fn on_insert(&self, entry: &CachedTileEntry) {
        self.add_tile_key(entry.image_key().clone(), entry.key().clone());
    }

    fn on_removal(&self, entry: &CachedTileEntry, cause: RemovalCause) {
        // A replacement keeps the key alive; on_insert follows for the new entry
        if cause != RemovalCause::Replaced {
            self.remove_tile_key(entry.image_key(), entry.key());
        }
    }
}
