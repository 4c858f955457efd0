/// The owning-image abstraction consumed by the cache.
///
/// The cache only needs enough of an image to identify it and to linearize
/// tile coordinates; it never reads pixels from it.
pub trait TiledImage: Send + Sync {
    /// Stable, globally unique identity tag, as big-endian two's-complement
    /// bytes of an arbitrary-precision integer.
    ///
    /// Images returning a tag get collision-free keys. Images returning
    /// `None` fall back to [`TiledImage::identity_hash`].
    fn unique_tag(&self) -> Option<&[u8]> {
        None
    }

    /// Default identity hash of this image instance.
    ///
    /// Derived from the object's address, which is stable while the image is
    /// alive but may be reused once it has been dropped.
    fn identity_hash(&self) -> u32 {
        let addr = self as *const Self as *const () as usize as u64;
        (addr ^ (addr >> 32)) as u32
    }

    /// Number of tiles along the X axis of the tile grid.
    fn num_x_tiles(&self) -> u32;
}
