//! Storage layer of the tile cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              BoundedStore               │
//! │  ┌─────────┐ ┌─────────┐   ┌─────────┐  │
//! │  │ shard 0 │ │ shard 1 │ … │ shard n │  │  (concurrency level)
//! │  │  (LRU)  │ │  (LRU)  │   │  (LRU)  │  │
//! │  └─────────┘ └─────────┘   └─────────┘  │
//! │        EvictionPolicy (victims)         │
//! └────────────────────┬────────────────────┘
//!                      │ StoreListener (under shard lock)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             ImageKeyIndex               │
//! │     ImageKey → { TileKey, ... }         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`BoundedStore`]: weight-bounded, sharded LRU map from tile key to entry
//! - [`EvictionPolicy`]: weighing and victim selection ([`LruPolicy`], [`CostAwarePolicy`])
//! - [`StoreListener`]: synchronous insert/removal notifications
//! - [`ImageKeyIndex`]: per-image tile key sets for bulk invalidation

mod bounded;
mod index;
mod policy;

pub use bounded::{BoundedStore, NoopListener, PutOutcome, RemovalCause, StoreListener};
pub use index::ImageKeyIndex;
pub use policy::{CostAwarePolicy, EvictionPolicy, LruPolicy, DEFAULT_COST_WINDOW};
