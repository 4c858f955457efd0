//! Tests of the cache under concurrent use from worker threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use raster_tile_cache::{
    CacheConfig, CachedTileEntry, EvictionPolicy, LruPolicy, TileAction, TileCache, TileKey,
};

use super::test_utils::{
    cache_with_capacity, diagnostic_cache, init_tracing, tile, EventLog, TestImage, KB, MB,
};

const WORKERS: usize = 8;

/// Sum of the tiles reachable through the per-image index.
fn indexed_tiles(cache: &TileCache, images: &[Arc<TestImage>]) -> usize {
    images.iter().map(|image| cache.tiles_of(image).len()).sum()
}

#[test]
fn test_concurrent_adds_respect_bound() {
    init_tracing();
    let config = CacheConfig::with_capacity(64 * KB as u64)
        .with_threshold(1.0)
        .with_concurrency_level(4);
    let cache = TileCache::new(config).unwrap();
    let images: Vec<_> = (0..WORKERS as u64).map(TestImage::tagged).collect();
    let peak = AtomicU64::new(0);

    thread::scope(|scope| {
        for image in &images {
            let cache = &cache;
            let peak = &peak;
            scope.spawn(move || {
                for i in 0..200 {
                    cache.add(image, i % 32, i / 32, tile(KB, i as u8)).unwrap();
                    peak.fetch_max(cache.total_weight(), Ordering::Relaxed);
                    cache.get(image, i % 32, 0);
                }
            });
        }
    });

    let stats = cache.statistics();
    assert!(stats.weight <= stats.max_weight);
    assert_eq!(stats.weight, stats.tiles as u64 * KB as u64);
    assert_eq!(indexed_tiles(&cache, &images), cache.size());
    assert!(stats.evictions > 0);

    // Between an insert and its eviction the total may briefly exceed the
    // bound, by at most one tile per concurrent writer
    assert!(peak.load(Ordering::Relaxed) <= stats.max_weight + (WORKERS * KB) as u64);
}

#[test]
fn test_concurrent_add_and_remove_all_keep_index_consistent() {
    let cache = cache_with_capacity(256 * KB);
    let images: Vec<_> = (0..4).map(TestImage::tagged).collect();

    thread::scope(|scope| {
        for (n, image) in images.iter().enumerate() {
            let cache = &cache;
            scope.spawn(move || {
                for round in 0..50 {
                    for col in 0..8 {
                        cache.add(image, col, round, tile(KB, n as u8)).unwrap();
                    }
                    if round % 5 == 0 {
                        cache.remove_all(image);
                    }
                }
            });
        }

        // Remover racing the writers on every image
        let cache = &cache;
        let images = &images;
        scope.spawn(move || {
            for _ in 0..100 {
                for image in images {
                    cache.remove(image, 0, 0);
                    cache.remove_all(image);
                }
            }
        });
    });

    assert_eq!(indexed_tiles(&cache, &images), cache.size());
    assert_eq!(cache.total_weight(), cache.size() as u64 * KB as u64);

    for image in &images {
        cache.remove_all(image);
    }
    assert!(cache.is_empty());
    assert_eq!(cache.statistics().images, 0);
}

#[test]
fn test_racing_removals_of_same_tile() {
    let cache = cache_with_capacity(256 * KB);
    let image = TestImage::tagged(1);
    let removed = AtomicU64::new(0);

    for _ in 0..20 {
        cache.add(&image, 3, 3, tile(KB, 0)).unwrap();

        thread::scope(|scope| {
            for _ in 0..WORKERS {
                scope.spawn(|| {
                    if cache.remove(&image, 3, 3) {
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert!(cache.tiles_of(&image).is_empty());
        assert_eq!(cache.statistics().images, 0);
    }

    assert_eq!(removed.load(Ordering::Relaxed), 20);
}

#[test]
fn test_diagnostics_deliver_each_event_once() {
    let cache = diagnostic_cache(32 * KB);
    let log = EventLog::attach(&cache);
    let images: Vec<_> = (0..4).map(TestImage::tagged).collect();

    thread::scope(|scope| {
        for image in &images {
            let cache = &cache;
            scope.spawn(move || {
                for col in 0..40 {
                    cache.add(image, col, 0, tile(KB, 0)).unwrap();
                    cache.get(image, col, 0);
                }
            });
        }
    });

    assert_eq!(log.count(TileAction::Addition), 160);
    let stats = cache.statistics();
    assert_eq!(stats.hits + stats.misses, 160);
    assert_eq!(
        log.count(TileAction::UpdatingTileFromGetTile) as u64,
        stats.hits
    );
    assert_eq!(
        log.count(TileAction::RemovalFromEviction) as u64,
        stats.evictions
    );
    assert_eq!(log.count(TileAction::RemovalFromEviction) + cache.size(), 160);

    // Per tile: added first, evicted at most once, nothing after eviction
    for image in &images {
        for col in 0..40 {
            let actions = log.actions_for(&TileKey::derive(image.as_ref(), col, 0));
            assert_eq!(actions[0], TileAction::Addition);
            let evictions = actions
                .iter()
                .filter(|a| **a == TileAction::RemovalFromEviction)
                .count();
            assert!(evictions <= 1);
            if evictions == 1 {
                assert_eq!(actions.last(), Some(&TileAction::RemovalFromEviction));
            }
        }
    }
}

/// LRU eviction whose first `weigh` call parks the inserting thread until
/// the test lets it go.
struct PausingPolicy {
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl PausingPolicy {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl EvictionPolicy for PausingPolicy {
    fn weigh(&self, entry: &CachedTileEntry) -> u64 {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        entry.byte_weight()
    }

    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = &CachedTileEntry>,
    ) -> Option<TileKey> {
        LruPolicy.select_victim(candidates)
    }
}

#[test]
fn test_enabling_diagnostics_waits_for_add_in_progress() {
    init_tracing();
    let policy = Arc::new(PausingPolicy::new());
    let config = CacheConfig::with_capacity(MB as u64).with_threshold(1.0);
    let cache = TileCache::with_policy(config, policy.clone()).unwrap();
    let log = EventLog::attach(&cache);
    let image = TestImage::tagged(1);
    let key = TileKey::derive(image.as_ref(), 0, 0);

    thread::scope(|scope| {
        scope.spawn(|| cache.add(&image, 0, 0, tile(KB, 0)).unwrap());
        policy.entered.wait();

        scope.spawn(|| cache.set_diagnostics(true).unwrap());
        // Let the switch queue up behind the parked add
        thread::sleep(Duration::from_millis(50));
        policy.release.wait();
    });

    // The add landed in the store the switch then flushed
    assert!(cache.diagnostics_enabled());
    assert!(!cache.contains(&image, 0, 0));
    assert_eq!(cache.size(), 0);
    assert_eq!(log.count(TileAction::Addition), 0);
    assert_eq!(log.actions_for(&key), vec![TileAction::RemovalFromFlush]);
}

#[test]
fn test_enabling_diagnostics_during_adds_reports_cached_tiles_only() {
    let cache = cache_with_capacity(MB);
    let log = EventLog::attach(&cache);
    let images: Vec<_> = (0..4).map(TestImage::tagged).collect();

    thread::scope(|scope| {
        for image in &images {
            let cache = &cache;
            scope.spawn(move || {
                for col in 0..200 {
                    cache.add(image, col, 0, tile(64, 0)).unwrap();
                }
            });
        }

        let cache = &cache;
        scope.spawn(move || {
            thread::sleep(Duration::from_millis(1));
            cache.set_diagnostics(true).unwrap();
        });
    });

    assert!(cache.diagnostics_enabled());
    for (n, image) in images.iter().enumerate() {
        for col in 0..200 {
            let key = TileKey::derive(image.as_ref(), col, 0);
            let last = log.actions_for(&key).last().copied();
            assert_eq!(
                last == Some(TileAction::Addition),
                cache.contains(image, col, 0),
                "tile {col} of image {n}: last event {last:?}"
            );
        }
    }
}

#[test]
fn test_index_never_lags_store_during_remove_all() {
    const TILES: i32 = 20_000;
    let config = CacheConfig::with_capacity(MB as u64)
        .with_threshold(1.0)
        .with_concurrency_level(1);
    let cache = TileCache::new(config).unwrap();
    let image = TestImage::tagged(1);
    cache
        .add_tiles(&image, (0..TILES).map(|i| (i % 64, i / 64, tile(1, 0))))
        .unwrap();
    assert_eq!(cache.size(), TILES as usize);

    let done = AtomicBool::new(false);
    let mismatches = AtomicU64::new(0);

    thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                // Index first: any tile still stored afterwards was already
                // stored, and indexed, at that point
                let images = cache.statistics().images;
                if images == 0 && cache.size() > 0 {
                    mismatches.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        assert_eq!(cache.remove_all(&image), TILES as usize);
        done.store(true, Ordering::Release);
    });

    assert_eq!(mismatches.load(Ordering::Relaxed), 0);
    assert!(cache.is_empty());
    assert_eq!(cache.statistics().images, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_cache_across_blocking_tasks() {
    init_tracing();
    let cache = Arc::new(cache_with_capacity(128 * KB));
    let image = TestImage::untagged();

    let mut handles = Vec::new();
    for worker in 0..WORKERS as i32 {
        let cache = cache.clone();
        let image = image.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut hits = 0;
            for col in 0..16 {
                if cache.get(&image, col, worker).is_none() {
                    cache.add(&image, col, worker, tile(KB, col as u8)).unwrap();
                } else {
                    hits += 1;
                }
            }
            hits
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 0);
    }

    assert_eq!(cache.size(), WORKERS * 16);
    assert_eq!(cache.remove_all(&image), WORKERS * 16);
    assert!(cache.is_empty());
}
