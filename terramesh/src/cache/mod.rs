//! Bounded tile cache.
//!
//! Keyed store of built meshes with an eviction policy driven by recency
//! and visibility. The cache has a single writer, the frame thread; build
//! workers never touch it. Their results arrive through the completion
//! channel and are inserted during the frame's drain step.
//!
//! # Entry lifecycle
//!
//! Created `Pending` when a tile is first requested, promoted to
//! `Resident` when its build completes, or `Failed` permanently when the
//! source handed back a malformed grid. Resident entries are evicted when
//! untouched for a configurable number of frames and not pinned by the
//! current frontier or its ancestor chain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coord::TileKey;
use crate::mesh::TileMesh;

/// Tile-count and byte budgets for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBudget {
    /// Maximum resident meshes.
    pub max_tiles: usize,
    /// Maximum total mesh bytes.
    pub max_bytes: usize,
}

/// State of one cache entry.
#[derive(Debug, Clone)]
pub enum EntryState {
    /// Requested, build not yet complete.
    Pending,
    /// Mesh resident and renderable.
    Resident(Arc<TileMesh>),
    /// Permanently failed for this session (malformed source data). The
    /// parent tile remains the stand-in; no retry storm.
    Failed,
}

/// A cache slot: entry state plus recency bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    state: EntryState,
    last_touched_frame: u64,
}

impl CacheEntry {
    /// Current state.
    pub fn state(&self) -> &EntryState {
        &self.state
    }

    /// Frame number of the last touch.
    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    /// The resident mesh, if any.
    pub fn mesh(&self) -> Option<&Arc<TileMesh>> {
        match &self.state {
            EntryState::Resident(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, EntryState::Pending)
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.state, EntryState::Resident(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, EntryState::Failed)
    }
}

/// Cache statistics, updated with relaxed atomics so reads can share the
/// cache reference.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    completions: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub completions: u64,
    pub failures: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Bounded, keyed store of built tile meshes.
pub struct TileCache {
    entries: HashMap<TileKey, CacheEntry>,
    resident_bytes: usize,
    stats: CacheStats,
}

impl TileCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            resident_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    /// Looks up an entry, recording hit/miss statistics.
    pub fn get(&self, key: &TileKey) -> Option<&CacheEntry> {
        let entry = self.entries.get(key);
        match entry {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        entry
    }

    /// Looks up an entry without recording statistics.
    ///
    /// The selector reads through this so that repeated selection passes
    /// over unchanged state are observably identical.
    pub fn peek(&self, key: &TileKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// The resident mesh for a key, if built.
    pub fn resident_mesh(&self, key: &TileKey) -> Option<&Arc<TileMesh>> {
        self.entries.get(key).and_then(|e| e.mesh())
    }

    /// Whether the key has a resident mesh.
    pub fn is_resident(&self, key: &TileKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.is_resident())
    }

    /// Creates a pending entry for a newly requested tile.
    ///
    /// Returns `false` when an entry already exists; the caller's request
    /// coalesces onto the in-flight one rather than issuing a duplicate.
    pub fn insert_pending(&mut self, key: TileKey, frame: u64) -> bool {
        use std::collections::hash_map::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    state: EntryState::Pending,
                    last_touched_frame: frame,
                });
                true
            }
        }
    }

    /// Promotes a key to resident with its built mesh.
    ///
    /// Insertion is atomic per entry: the mesh is visible to the next
    /// selection pass in full or not at all. Completing a key that was
    /// never requested (or was evicted while in flight) still inserts;
    /// the work is done and the next frame may want it.
    pub fn complete_build(&mut self, key: TileKey, mesh: Arc<TileMesh>, frame: u64) {
        self.stats.completions.fetch_add(1, Ordering::Relaxed);
        self.resident_bytes += mesh.size_bytes();
        if let Some(old) = self.entries.insert(
            key,
            CacheEntry {
                state: EntryState::Resident(mesh),
                last_touched_frame: frame,
            },
        ) {
            if let EntryState::Resident(old_mesh) = old.state {
                self.resident_bytes -= old_mesh.size_bytes();
            }
        }
    }

    /// Marks a key permanently failed for this session.
    pub fn mark_failed(&mut self, key: TileKey, frame: u64) {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = self.entries.insert(
            key,
            CacheEntry {
                state: EntryState::Failed,
                last_touched_frame: frame,
            },
        ) {
            if let EntryState::Resident(old_mesh) = old.state {
                self.resident_bytes -= old_mesh.size_bytes();
            }
        }
    }

    /// Removes a pending entry whose request was cancelled.
    ///
    /// Resident and failed entries are untouched; only the bookkeeping
    /// for a build that will never complete is cleared. Returns `true`
    /// when an entry was removed.
    pub fn remove_pending(&mut self, key: &TileKey) -> bool {
        if self.entries.get(key).is_some_and(|e| e.is_pending()) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Drops pending entries that fail the predicate.
    ///
    /// Clears orphans: entries whose request was dropped at saturation
    /// and whose tile has since left the wanted set. Resident and failed
    /// entries are untouched.
    pub fn retain_pending<F: Fn(&TileKey) -> bool>(&mut self, keep: F) {
        self.entries
            .retain(|key, entry| !entry.is_pending() || keep(key));
    }

    /// Refreshes an entry's recency stamp.
    pub fn touch(&mut self, key: &TileKey, frame: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_touched_frame = frame;
        }
    }

    /// Evicts resident entries to fit the budget.
    ///
    /// Candidates are resident entries not in `pinned` (the current
    /// frontier and its ancestor chain). Entries untouched for
    /// `eviction_age` frames are evicted outright; under budget pressure
    /// the least-recently-touched candidates go first until the budget
    /// holds. Pending and failed entries are never evicted here: pending
    /// entries track in-flight work, failed entries suppress retries.
    ///
    /// Returns the number of entries evicted.
    pub fn evict_if_needed(
        &mut self,
        budget: CacheBudget,
        pinned: &HashSet<TileKey>,
        current_frame: u64,
        eviction_age: u64,
    ) -> usize {
        let mut candidates: Vec<(TileKey, u64, usize)> = self
            .entries
            .iter()
            .filter(|(key, entry)| entry.is_resident() && !pinned.contains(key))
            .map(|(key, entry)| {
                let bytes = entry.mesh().map(|m| m.size_bytes()).unwrap_or(0);
                (*key, entry.last_touched_frame, bytes)
            })
            .collect();
        // Oldest first; key order breaks ties deterministically
        candidates.sort_by_key(|(key, frame, _)| (*frame, *key));

        let mut evicted = 0;
        for (key, last_touched, bytes) in candidates {
            let stale = current_frame.saturating_sub(last_touched) >= eviction_age;
            let over_budget = self.resident_count() > budget.max_tiles
                || self.resident_bytes > budget.max_bytes;
            if !stale && !over_budget {
                break;
            }
            self.entries.remove(&key);
            self.resident_bytes -= bytes;
            evicted += 1;
            debug!(tile = %key, stale, "evicted tile mesh");
        }
        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Number of entries in any state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of resident meshes.
    pub fn resident_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_resident()).count()
    }

    /// Total bytes held by resident meshes.
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
