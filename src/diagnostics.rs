//! Tile lifecycle diagnostics.
//!
//! When diagnostics are enabled, every mutation of the cache publishes a
//! [`TileAction`] for the affected entry to all registered
//! [`TileObserver`]s. Delivery is synchronous: observers have seen the event
//! before the cache call that caused it returns.
//!
//! Publishing is a no-op while diagnostics are disabled, so the hot path pays
//! only an atomic load.
//!
//! A panicking observer is isolated: the panic is caught, logged and counted,
//! and the remaining observers still receive the event.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::tile::{CachedTileEntry, TileAction};

/// Receiver of tile lifecycle events.
///
/// Observers get a shared reference and must not rely on mutating the entry.
/// They may call back into the cache.
pub trait TileObserver: Send + Sync {
    fn on_tile_event(&self, entry: &CachedTileEntry, action: TileAction);
}

impl<F> TileObserver for F
where
    F: Fn(&CachedTileEntry, TileAction) + Send + Sync,
{
    fn on_tile_event(&self, entry: &CachedTileEntry, action: TileAction) {
        self(entry, action)
    }
}

/// Handle returned by observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Publish point for tile lifecycle events.
pub struct DiagnosticChannel {
    enabled: AtomicBool,
    observers: RwLock<Vec<(ObserverId, Arc<dyn TileObserver>)>>,
    next_id: AtomicU64,
    failures: AtomicU64,
}

impl DiagnosticChannel {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn subscribe(&self, observer: Arc<dyn TileObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Number of observer panics caught so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Record `action` on `entry` and deliver it to every observer.
    pub fn publish(&self, entry: &CachedTileEntry, action: TileAction) {
        if !self.is_enabled() {
            return;
        }

        entry.set_last_action(action);

        // Deliver from a snapshot so observers may (un)subscribe re-entrantly
        let observers = self.observers.read().clone();
        for (id, observer) in &observers {
            let delivered = catch_unwind(AssertUnwindSafe(|| {
                observer.on_tile_event(entry, action);
            }));

            if let Err(panic) = delivered {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    observer = id.0,
                    ?action,
                    reason = panic_message(panic.as_ref()),
                    "Tile observer panicked, event dropped for this observer"
                );
            }
        }
    }
}

impl fmt::Debug for DiagnosticChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChannel")
            .field("enabled", &self.is_enabled())
            .field("observers", &self.observer_count())
            .field("failures", &self.failures())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
