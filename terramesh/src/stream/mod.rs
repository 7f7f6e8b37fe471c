//! Asynchronous tile streaming.
//!
//! The [`StreamingCoordinator`] owns the path between "the selector wants
//! this tile" and "the cache holds its mesh": a bounded priority queue
//! feeding a fixed pool of workers, each running the two sequential
//! stages per tile (elevation fetch, then mesh build). Different tiles'
//! pipelines overlap freely; a single tile never has more than one build
//! in flight.
//!
//! Workers never touch the cache. Results cross back to the frame thread
//! through an unbounded completion channel drained at the start of each
//! frame, so the frame thread never blocks on in-flight work.

mod policy;
mod queue;

pub use policy::{
    Priority, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS,
};
pub use queue::{PushOutcome, QueuedRequest, RequestQueue};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coord::{CardinalDirection, TileKey};
use crate::elevation::{EdgeStrip, ElevationGrid, ElevationSource, NeighborEdges, SourceError};
use crate::mesh::{MeshBuilder, TileMesh};
use crate::select::EdgeLodMask;

/// Streaming configuration, fixed at engine initialization.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Number of concurrent tile pipelines.
    pub worker_pool_size: usize,
    /// Maximum queued (not yet executing) requests before the lowest
    /// priority request is dropped.
    pub max_queued: usize,
    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            max_queued: 256,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one tile's fetch+build pipeline.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Mesh built (a flat placeholder when the source had no data).
    Resident(Arc<TileMesh>),
    /// Permanent failure (malformed source data); the tile's parent
    /// remains the stand-in for the rest of the session.
    Failed,
}

/// A completed build handed back to the frame thread.
#[derive(Debug, Clone)]
pub struct BuildCompletion {
    pub key: TileKey,
    pub outcome: CompletionOutcome,
}

/// Point-in-time streaming counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub requested: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retried: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct StreamStats {
    requested: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
    cancelled: AtomicU64,
}

impl StreamStats {
    fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            requested: self.requested.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the coordinator handle and its workers.
struct Shared {
    queue: Mutex<RequestQueue>,
    notify: Notify,
    /// At-most-one in-flight pipeline per key; the token cancels it.
    in_flight: DashMap<TileKey, CancellationToken>,
    /// Keys cancelled while their pipeline might still complete; their
    /// late completions are discarded at the drain.
    cancelled: Mutex<HashSet<TileKey>>,
    source: Arc<dyn ElevationSource>,
    builder: MeshBuilder,
    retry: RetryPolicy,
    completion_tx: mpsc::UnboundedSender<BuildCompletion>,
    shutdown: CancellationToken,
    stats: StreamStats,
}

/// Issues asynchronous fetch+build work for tiles the selector wants but
/// the cache lacks.
pub struct StreamingCoordinator {
    shared: Arc<Shared>,
    completion_rx: mpsc::UnboundedReceiver<BuildCompletion>,
}

impl StreamingCoordinator {
    /// Starts the worker pool on the given runtime.
    pub fn new(
        config: StreamConfig,
        source: Arc<dyn ElevationSource>,
        builder: MeshBuilder,
        handle: &tokio::runtime::Handle,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(RequestQueue::new(config.max_queued)),
            notify: Notify::new(),
            in_flight: DashMap::new(),
            cancelled: Mutex::new(HashSet::new()),
            source,
            builder,
            retry: config.retry.clone(),
            completion_tx,
            shutdown: CancellationToken::new(),
            stats: StreamStats::default(),
        });

        for _ in 0..config.worker_pool_size.max(1) {
            handle.spawn(worker_loop(Arc::clone(&shared)));
        }

        Self {
            shared,
            completion_rx,
        }
    }

    /// Requests a tile build; non-blocking.
    ///
    /// A request for a key already in flight coalesces: the queued entry's
    /// priority is refreshed and no duplicate pipeline is issued. Returns
    /// `true` when a new pipeline was enqueued.
    pub fn request_tile(&self, key: TileKey, priority: Priority, edge_lods: EdgeLodMask) -> bool {
        use dashmap::mapref::entry::Entry;

        if self.shared.shutdown.is_cancelled() {
            return false;
        }
        // A re-request supersedes any pending cancellation tombstone
        self.shared.cancelled.lock().remove(&key);

        // Reserve the in-flight slot; the map entry guard must not be
        // held across any other in_flight access
        let reserved = match self.shared.in_flight.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.shared.shutdown.child_token());
                true
            }
        };
        if !reserved {
            // Coalesce: refresh the queued entry's priority, no duplicate
            self.shared.queue.lock().update_priority(&key, priority);
            return false;
        }

        self.shared.stats.requested.fetch_add(1, Ordering::Relaxed);
        let outcome = self.shared.queue.lock().push(key, priority, edge_lods);
        match outcome {
            PushOutcome::Queued => {
                self.shared.notify.notify_one();
                true
            }
            PushOutcome::Dropped(dropped) if dropped == key => {
                // Saturated and this request was the least urgent
                self.shared.in_flight.remove(&key);
                self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(tile = %key, "request queue saturated, dropping request");
                false
            }
            PushOutcome::Dropped(dropped) => {
                if let Some((_, token)) = self.shared.in_flight.remove(&dropped) {
                    token.cancel();
                }
                self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(tile = %dropped, "request queue saturated, dropping lowest priority");
                self.shared.notify.notify_one();
                true
            }
        }
    }

    /// Cancels a tile's request, best-effort.
    ///
    /// Queued requests are removed outright; an executing pipeline is
    /// cancelled cooperatively and its late completion, if any, is
    /// discarded at the next drain. Returns `true` when there was
    /// anything to cancel.
    pub fn cancel(&self, key: TileKey) -> bool {
        let Some((_, token)) = self.shared.in_flight.remove(&key) else {
            return false;
        };
        token.cancel();
        self.shared.queue.lock().remove(&key);
        self.shared.cancelled.lock().insert(key);
        self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %key, "cancelled tile request");
        true
    }

    /// Cancels every request not in the wanted set.
    ///
    /// Called once per frame with the selector's current missing set, so
    /// requests that scrolled out of view stop consuming source
    /// bandwidth. Returns the cancelled keys.
    pub fn retain(&self, wanted: &HashSet<TileKey>) -> Vec<TileKey> {
        let stale: Vec<TileKey> = self
            .shared
            .in_flight
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| !wanted.contains(key))
            .collect();
        let mut cancelled = Vec::with_capacity(stale.len());
        for key in stale {
            if self.cancel(key) {
                cancelled.push(key);
            }
        }
        cancelled
    }

    /// Drains completed builds; never blocks.
    ///
    /// Completions for cancelled requests are discarded here rather than
    /// inserted, per the cancellation contract.
    pub fn drain_completions(&mut self) -> Vec<BuildCompletion> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.shared.cancelled.lock().remove(&completion.key) {
                debug!(tile = %completion.key, "discarding completion of cancelled request");
                continue;
            }
            completions.push(completion);
        }
        completions
    }

    /// Number of pipelines currently in flight (queued or executing).
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Whether a key has a pipeline in flight.
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.shared.in_flight.contains_key(key)
    }

    /// Streaming counters snapshot.
    pub fn stats(&self) -> StreamStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for StreamingCoordinator {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        self.shared.notify.notify_waiters();
    }
}

/// One worker: pops the highest-priority request and runs its pipeline.
async fn worker_loop(shared: Arc<Shared>) {
    loop {
        let request = shared.queue.lock().pop();
        let Some(request) = request else {
            tokio::select! {
                _ = shared.shutdown.cancelled() => return,
                _ = shared.notify.notified() => continue,
            }
        };
        // The token disappears when the request was cancelled while queued
        let token = match shared.in_flight.get(&request.key) {
            Some(entry) => entry.value().clone(),
            None => continue,
        };
        process_request(&shared, request, token).await;
    }
}

/// Runs one tile's two-stage pipeline: fetch, then build.
async fn process_request(shared: &Shared, request: QueuedRequest, token: CancellationToken) {
    let key = request.key;

    let fetched = fetch_with_retry(shared, key, &token).await;
    if token.is_cancelled() {
        shared.in_flight.remove(&key);
        return;
    }

    let outcome = match fetched {
        Ok(grid) => {
            let edges = edge_strips_for(&grid, key, &request.edge_lods);
            match shared.builder.build(key, &grid, &edges) {
                Ok(mesh) => {
                    shared.stats.completed.fetch_add(1, Ordering::Relaxed);
                    CompletionOutcome::Resident(Arc::new(mesh))
                }
                Err(err) => {
                    shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(tile = %key, error = %err, "mesh build failed permanently");
                    CompletionOutcome::Failed
                }
            }
        }
        Err(FetchFailure::NotAvailable) => {
            // Render a flat placeholder rather than surfacing an error
            debug!(tile = %key, "no elevation data, building placeholder");
            shared.stats.completed.fetch_add(1, Ordering::Relaxed);
            CompletionOutcome::Resident(Arc::new(shared.builder.build_placeholder(key)))
        }
        Err(FetchFailure::Cancelled) => {
            shared.in_flight.remove(&key);
            return;
        }
    };

    shared.in_flight.remove(&key);
    // Receiver gone means the engine is shutting down
    let _ = shared.completion_tx.send(BuildCompletion { key, outcome });
}

enum FetchFailure {
    NotAvailable,
    Cancelled,
}

/// Fetches a tile's grid, retrying transient failures with backoff.
///
/// Exhausted retries degrade to [`FetchFailure::NotAvailable`], which the
/// caller turns into a placeholder tile.
async fn fetch_with_retry(
    shared: &Shared,
    key: TileKey,
    token: &CancellationToken,
) -> Result<ElevationGrid, FetchFailure> {
    let mut attempt = 1u32;
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => return Err(FetchFailure::Cancelled),
            result = shared.source.fetch(key) => result,
        };
        match result {
            Ok(grid) => return Ok(grid),
            Err(SourceError::NotAvailable(_)) => return Err(FetchFailure::NotAvailable),
            Err(SourceError::Cancelled(_)) => return Err(FetchFailure::Cancelled),
            Err(SourceError::Transient { reason, .. }) => match shared.retry.delay_for(attempt) {
                Some(delay) => {
                    debug!(
                        tile = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason,
                        "transient fetch failure, backing off"
                    );
                    shared.stats.retried.fetch_add(1, Ordering::Relaxed);
                    tokio::select! {
                        _ = token.cancelled() => return Err(FetchFailure::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                None => {
                    warn!(tile = %key, attempts = attempt, "fetch retries exhausted, degrading to placeholder");
                    return Err(FetchFailure::NotAvailable);
                }
            },
        }
    }
}

/// Derives neighbor edge strips from the edge LOD mask.
///
/// For each side with a coarser neighbor, the tile's own edge is
/// decimated to the neighbor's resolution; the skirt built from it then
/// follows the surface the neighbor actually renders along the shared
/// border.
fn edge_strips_for(grid: &ElevationGrid, key: TileKey, mask: &EdgeLodMask) -> NeighborEdges {
    let mut edges = NeighborEdges::none();
    for side in CardinalDirection::ALL {
        let neighbor_level = mask.level(side);
        if neighbor_level >= key.level() {
            continue;
        }
        let factor = 1usize << (key.level() - neighbor_level).min(16);
        if let Some(strip) = EdgeStrip::decimate_from(&grid.edge(side), factor) {
            edges = edges.with_side(side, strip);
        }
    }
    edges
}
