use thiserror::Error;

/// Errors raised when a cache configuration is rejected.
///
/// Values are never clamped: an out-of-range setting is reported to the
/// caller of the constructor or setter that supplied it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Memory threshold outside of `[0.0, 1.0]` (or NaN)
    #[error("Invalid memory threshold: expected a value in [0.0, 1.0], got {0}")]
    ThresholdOutOfRange(f32),

    /// Concurrency level must be at least 1
    #[error("Invalid concurrency level: expected at least 1, got {0}")]
    InvalidConcurrencyLevel(usize),

    /// A human-readable byte size could not be parsed
    #[error("Invalid byte size: {0}")]
    InvalidByteSize(String),
}

/// Errors raised when the byte weight of a tile buffer cannot be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// The buffer has no banks at all
    #[error("Pixel buffer has no banks")]
    NoBanks,

    /// Banks of a single buffer must all hold the same number of bytes
    #[error("Unequal bank sizes: expected {expected} bytes, got {actual}")]
    UnequalBanks { expected: usize, actual: usize },

    /// A bank is not a whole number of samples
    #[error("Bank of {len} bytes is not a multiple of the {sample_bytes}-byte sample size")]
    MisalignedBank { len: usize, sample_bytes: usize },
}

/// Errors surfaced by the tile cache facade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tile buffer rejected
    #[error("Entry error: {0}")]
    Entry(#[from] EntryError),

    /// Operation exists in the legacy tile cache interface but is not part
    /// of this cache's design
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: &'static str },
}

impl CacheError {
    pub(crate) fn unsupported(operation: &'static str) -> Self {
        CacheError::Unsupported { operation }
    }

    /// Returns `true` for the "not supported by design" signal.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CacheError::Unsupported { .. })
    }
}
