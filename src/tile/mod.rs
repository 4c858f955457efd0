//! Tile identity and cached tile entries.
//!
//! The cache never interprets pixels. A tile is reduced to:
//! - its identity ([`TileKey`]), derived from the owning image and grid position
//! - the identity of its owning image ([`ImageKey`]), used for bulk invalidation
//! - its memory cost, computed from the [`PixelBuffer`] layout
//!
//! Owning images are described by the [`TiledImage`] trait and are only ever
//! referenced weakly from a [`CachedTileEntry`].

mod buffer;
mod entry;
mod image;
mod key;

pub use buffer::{PixelBuffer, SampleType};
pub use entry::{CachedTileEntry, TileAction};
pub use image::TiledImage;
pub use key::{linear_tile_index, ImageKey, TileKey};
