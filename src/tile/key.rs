//! Tile and image key derivation.
//!
//! Keys come in two flavours, chosen by whether the owning image carries a
//! unique tag:
//!
//! - **Tagged**: the tag bytes followed by the 8-byte big-endian linear tile
//!   index (`row * num_x_tiles + col`). Distinct tags never collide and
//!   distinct in-grid coordinates never collide, whatever the grid size.
//! - **Hashed**: identity hash in the upper 32 bits, masked linear tile index
//!   in the lower 32 bits. Distinct images whose identity hashes collide get
//!   colliding keys; this is accepted for images without a tag.

use bytes::{BufMut, Bytes, BytesMut};

use super::image::TiledImage;

/// Identity of one cached tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TileKey {
    /// Unique tag bytes with the linear tile index appended
    Tagged(Bytes),
    /// Identity hash (high 32 bits) and linear tile index (low 32 bits)
    Hashed(u64),
}

/// Identity of one owning image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// Unique tag bytes, verbatim
    Tagged(Bytes),
    /// Identity hash
    Hashed(u32),
}

/// Linearized tile index: `row * num_x_tiles + col`.
pub fn linear_tile_index(num_x_tiles: u32, col: i32, row: i32) -> i64 {
    i64::from(row) * i64::from(num_x_tiles) + i64::from(col)
}

impl TileKey {
    /// Derive the key of tile `(col, row)` of `image`.
    pub fn derive<I: TiledImage + ?Sized>(image: &I, col: i32, row: i32) -> Self {
        let index = linear_tile_index(image.num_x_tiles(), col, row);

        match image.unique_tag() {
            Some(tag) => {
                let mut buf = BytesMut::with_capacity(tag.len() + 8);
                buf.put_slice(tag);
                buf.put_i64(index);
                TileKey::Tagged(buf.freeze())
            }
            None => {
                let high = u64::from(image.identity_hash()) << 32;
                let low = (index as u64) & 0xFFFF_FFFF;
                TileKey::Hashed(high | low)
            }
        }
    }

    /// Returns `true` if this key was derived from a unique tag.
    pub fn is_tagged(&self) -> bool {
        matches!(self, TileKey::Tagged(_))
    }
}

impl ImageKey {
    /// Derive the key of `image`.
    pub fn derive<I: TiledImage + ?Sized>(image: &I) -> Self {
        match image.unique_tag() {
            Some(tag) => ImageKey::Tagged(Bytes::copy_from_slice(tag)),
            None => ImageKey::Hashed(image.identity_hash()),
        }
    }
}
