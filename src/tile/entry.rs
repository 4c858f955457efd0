use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::EntryError;

use super::buffer::PixelBuffer;
use super::image::TiledImage;
use super::key::{ImageKey, TileKey};

// =============================================================================
// Tile Action
// =============================================================================

/// Last lifecycle action applied to a cached tile.
///
/// Only recorded while diagnostics are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TileAction {
    /// Tile was added to the cache
    Addition = 1,
    /// Tile was replaced by a newer add for the same key
    SubstitutionFromAdd = 2,
    /// Tile was evicted under memory pressure
    RemovalFromEviction = 3,
    /// Tile was dropped by a flush
    RemovalFromFlush = 4,
    /// Tile is about to be removed by an explicit call
    AboutToRemove = 5,
    /// Tile was removed by an explicit call
    ManualRemoval = 6,
    /// Tile was read from the cache
    UpdatingTileFromGetTile = 7,
}

impl TileAction {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => TileAction::Addition,
            2 => TileAction::SubstitutionFromAdd,
            3 => TileAction::RemovalFromEviction,
            4 => TileAction::RemovalFromFlush,
            5 => TileAction::AboutToRemove,
            6 => TileAction::ManualRemoval,
            7 => TileAction::UpdatingTileFromGetTile,
            _ => return None,
        })
    }
}

// =============================================================================
// Cached Tile Entry
// =============================================================================

/// A tile held by the cache.
///
/// Identity fields are fixed at construction. The access timestamp and the
/// last action are updated in place through shared references, so an entry
/// can be handed to observers and store shards as an `Arc`.
///
/// The owner is held weakly: the cache never keeps an image alive.
pub struct CachedTileEntry {
    key: TileKey,
    image_key: ImageKey,
    owner: Weak<dyn TiledImage>,
    data: PixelBuffer,
    col: i32,
    row: i32,
    cost: Option<f64>,
    weight: u64,
    /// Milliseconds since the Unix epoch
    last_access: AtomicU64,
    /// Encoded `TileAction`, 0 when unset
    last_action: AtomicU8,
}

impl CachedTileEntry {
    /// Create an entry for tile `(col, row)` of `owner`.
    ///
    /// Fails if the byte weight of `data` cannot be determined.
    pub fn new<I: TiledImage + 'static>(
        owner: &Arc<I>,
        col: i32,
        row: i32,
        data: PixelBuffer,
        cost: Option<f64>,
    ) -> Result<Self, EntryError> {
        let weak: Weak<I> = Arc::downgrade(owner);
        Self::with_owner(owner.as_ref(), weak, col, row, data, cost)
    }

    /// Create an entry for a tile of a type-erased owner.
    pub fn from_shared(
        owner: &Arc<dyn TiledImage>,
        col: i32,
        row: i32,
        data: PixelBuffer,
        cost: Option<f64>,
    ) -> Result<Self, EntryError> {
        Self::with_owner(owner.as_ref(), Arc::downgrade(owner), col, row, data, cost)
    }

    fn with_owner(
        image: &dyn TiledImage,
        owner: Weak<dyn TiledImage>,
        col: i32,
        row: i32,
        data: PixelBuffer,
        cost: Option<f64>,
    ) -> Result<Self, EntryError> {
        let weight = data.byte_weight()?;

        Ok(Self {
            key: TileKey::derive(image, col, row),
            image_key: ImageKey::derive(image),
            owner,
            data,
            col,
            row,
            cost,
            weight,
            last_access: AtomicU64::new(now_millis()),
            last_action: AtomicU8::new(0),
        })
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn image_key(&self) -> &ImageKey {
        &self.image_key
    }

    /// The owning image, or `None` once it has been dropped.
    pub fn owner(&self) -> Option<Arc<dyn TiledImage>> {
        self.owner.upgrade()
    }

    pub fn data(&self) -> &PixelBuffer {
        &self.data
    }

    pub fn tile_col(&self) -> i32 {
        self.col
    }

    pub fn tile_row(&self) -> i32 {
        self.row
    }

    /// Cost of recomputing this tile, if the producer supplied one.
    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    /// Memory cost in bytes, fixed at construction.
    pub fn byte_weight(&self) -> u64 {
        self.weight
    }

    pub fn last_access(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.last_access.load(Ordering::Relaxed))
    }

    pub fn set_last_access(&self, at: SystemTime) {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_access.store(millis, Ordering::Relaxed);
    }

    /// Set the access timestamp to now.
    pub fn touch(&self) {
        self.last_access.store(now_millis(), Ordering::Relaxed);
    }

    pub fn last_action(&self) -> Option<TileAction> {
        TileAction::from_u8(self.last_action.load(Ordering::Acquire))
    }

    pub fn set_last_action(&self, action: TileAction) {
        self.last_action.store(action as u8, Ordering::Release);
    }
}

impl fmt::Debug for CachedTileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTileEntry")
            .field("key", &self.key)
            .field("image_key", &self.image_key)
            .field("col", &self.col)
            .field("row", &self.row)
            .field("weight", &self.weight)
            .field("cost", &self.cost)
            .field("owner_alive", &(self.owner.strong_count() > 0))
            .field("last_action", &self.last_action())
            .finish()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
