//! Configuration for the tile cache.
//!
//! The cache is configured through a single [`CacheConfig`] value:
//! - Memory capacity in bytes
//! - Memory threshold (fraction of the capacity that may actually be filled)
//! - Concurrency level (number of internal store shards)
//! - Diagnostics switch (lifecycle events for observers)
//!
//! `CacheConfig` can be embedded in a host application's command line via
//! `#[command(flatten)]`, or in its configuration file via serde.
//!
//! # Environment Variables
//!
//! When flattened into a clap parser, every option can also be set from the
//! environment:
//!
//! - `TILE_CACHE_CAPACITY` - Memory capacity, e.g. `64MiB` or `1GB` (default: 64MiB)
//! - `TILE_CACHE_THRESHOLD` - Fill fraction in `[0, 1]` (default: 0.75)
//! - `TILE_CACHE_CONCURRENCY` - Number of store shards (default: 4)
//! - `TILE_CACHE_DIAGNOSTICS` - Enable lifecycle events (default: false)

use std::str::FromStr;

use bytesize::ByteSize;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Default Values
// =============================================================================

/// Default memory capacity: 64MiB
pub const DEFAULT_MEMORY_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default fraction of the capacity that may be filled before eviction.
pub const DEFAULT_MEMORY_THRESHOLD: f32 = 0.75;

/// Default number of store shards.
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 4;

// =============================================================================
// Cache Configuration
// =============================================================================

/// Tile cache configuration.
///
/// Every field is validated by [`CacheConfig::validate`]; the cache facade
/// validates before applying, so an invalid value never reaches the store.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory capacity of the tile cache in bytes (accepts `MB`, `MiB`, `GB`, ...).
    #[arg(
        long = "tile-cache-capacity",
        default_value_t = DEFAULT_MEMORY_CAPACITY,
        value_parser = parse_byte_size,
        env = "TILE_CACHE_CAPACITY"
    )]
    pub memory_capacity: u64,

    /// Fraction of the capacity that may be filled before tiles are evicted.
    #[arg(
        long = "tile-cache-threshold",
        default_value_t = DEFAULT_MEMORY_THRESHOLD,
        env = "TILE_CACHE_THRESHOLD"
    )]
    pub memory_threshold: f32,

    /// Number of independently locked store shards.
    #[arg(
        long = "tile-cache-concurrency",
        default_value_t = DEFAULT_CONCURRENCY_LEVEL,
        env = "TILE_CACHE_CONCURRENCY"
    )]
    pub concurrency_level: usize,

    /// Publish tile lifecycle events to registered observers.
    ///
    /// Serializes all mutating cache calls; leave off in production.
    #[arg(
        long = "tile-cache-diagnostics",
        default_value_t = false,
        env = "TILE_CACHE_DIAGNOSTICS"
    )]
    pub diagnostics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            diagnostics: false,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the given capacity and default settings.
    pub fn with_capacity(memory_capacity: u64) -> Self {
        Self {
            memory_capacity,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, memory_threshold: f32) -> Self {
        self.memory_threshold = memory_threshold;
        self
    }

    pub fn with_concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.memory_threshold)?;
        validate_concurrency_level(self.concurrency_level)?;
        Ok(())
    }

    /// Total byte weight the store may hold: `capacity * threshold`.
    pub fn max_weight(&self) -> u64 {
        (self.memory_capacity as f64 * f64::from(self.memory_threshold)).floor() as u64
    }
}

pub(crate) fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    // NaN fails the range check as well
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange(threshold))
    }
}

pub(crate) fn validate_concurrency_level(level: usize) -> Result<(), ConfigError> {
    if level == 0 {
        return Err(ConfigError::InvalidConcurrencyLevel(level));
    }
    Ok(())
}

// =============================================================================
// Byte Size Parsing
// =============================================================================

/// Parse a human-readable byte size such as `"64MiB"`, `"1.5GB"` or `"4096"`.
///
/// `KB`/`MB`/`GB` are decimal and `KiB`/`MiB`/`GiB` binary.
pub fn parse_byte_size(input: &str) -> Result<u64, ConfigError> {
    ByteSize::from_str(input.trim())
        .map(|size| size.as_u64())
        .map_err(|_| ConfigError::InvalidByteSize(input.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
