//! Tile cache facade.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Tile rendering pipeline          │
//! └────────────────────┬────────────────────┘
//!                      │ add / get / remove / remove_all / flush
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileCache                 │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ BoundedStore │─▶│  ImageKeyIndex  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! │  ┌───────────────────────────────────┐  │
//! │  │ DiagnosticChannel (optional)      │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Tile Lifecycle
//!
//! A tile is absent until `add`, cached until it is evicted, removed,
//! replaced or flushed, and absent again afterwards. With diagnostics
//! enabled each transition is published as a [`TileAction`](crate::tile::TileAction):
//!
//! | Transition                | Events                                   |
//! |---------------------------|------------------------------------------|
//! | `add` over an existing    | `SubstitutionFromAdd`, then `Addition`   |
//! | `add`                     | `Addition`                               |
//! | `get` hit                 | `UpdatingTileFromGetTile`                |
//! | `remove`                  | `AboutToRemove`, then `ManualRemoval`    |
//! | memory pressure           | `RemovalFromEviction`                    |
//! | `flush` / reconfiguration | `RemovalFromFlush`                       |

mod facade;
mod stats;

pub use facade::{TileCache, TileComparator};
pub use stats::CacheStatistics;
