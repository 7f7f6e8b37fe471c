//! The frame loop driver.
//!
//! [`TerrainEngine`] wires the components together and owns the per-frame
//! sequence on the frame thread:
//!
//! 1. drain build completions into the cache (never waits on in-flight work)
//! 2. run LOD selection against the updated cache
//! 3. touch and pin the frontier and its ancestor chain
//! 4. issue streaming requests for missing tiles, cancel stale ones
//! 5. evict beyond-budget cache entries
//! 6. assemble the draw list
//!
//! The frame thread is the sole cache writer; workers hand results over
//! through the coordinator's completion channel. No step here blocks.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cache::TileCache;
use crate::config::EngineConfig;
use crate::elevation::ElevationSource;
use crate::error::EngineError;
use crate::frame::{DrawList, FrameAssembler};
use crate::mesh::MeshBuilder;
use crate::registry::AttributeRegistry;
use crate::select::{CameraState, LodSelector, SelectionResult, SelectorConfig};
use crate::stream::{
    CompletionOutcome, Priority, StreamConfig, StreamStatsSnapshot, StreamingCoordinator,
};
use crate::telemetry::FrameMetrics;

/// The terrain tessellation engine.
///
/// One instance per viewer. Owned and driven by the frame thread; the
/// worker pool it spawns lives on the supplied tokio runtime.
pub struct TerrainEngine {
    config: EngineConfig,
    selector: LodSelector,
    cache: TileCache,
    coordinator: StreamingCoordinator,
    assembler: FrameAssembler,
    metrics: Arc<FrameMetrics>,
    frame_number: u64,
}

impl TerrainEngine {
    /// Builds an engine from validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration, validated here
    /// * `source` - Elevation data source shared with the worker pool
    /// * `registry` - Attribute registry for overlay/texture lookups
    /// * `handle` - Runtime the worker pool spawns onto
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ElevationSource>,
        registry: AttributeRegistry,
        handle: &tokio::runtime::Handle,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let selector = LodSelector::new(SelectorConfig::new(
            config.pixel_error_threshold,
            config.max_level,
            config.grid_size,
        ));
        let builder = MeshBuilder::new(config.grid_size, config.skirt_depth);
        let coordinator = StreamingCoordinator::new(
            StreamConfig {
                worker_pool_size: config.worker_pool_size,
                max_queued: config.max_queued_requests,
                retry: config.retry.clone(),
            },
            source,
            builder,
            handle,
        );

        Ok(Self {
            config,
            selector,
            cache: TileCache::new(),
            coordinator,
            assembler: FrameAssembler::new(registry),
            metrics: Arc::new(FrameMetrics::new()),
            frame_number: 0,
        })
    }

    /// Runs one frame: drain, select, stream, evict, assemble.
    ///
    /// Returns the draw list for the graphics sink. Never blocks; tiles
    /// still streaming appear as the selection's coarser stand-ins until
    /// a later frame.
    pub fn render_frame(&mut self, camera: &CameraState) -> DrawList {
        self.frame_number += 1;
        let frame = self.frame_number;

        // 1. Completions enqueued before this point are visible to this
        //    frame's selection
        let completions = self.coordinator.drain_completions();
        let mut completed = 0u64;
        let mut failed = 0u64;
        for completion in completions {
            match completion.outcome {
                CompletionOutcome::Resident(mesh) => {
                    self.cache.complete_build(completion.key, mesh, frame);
                    completed += 1;
                }
                CompletionOutcome::Failed => {
                    self.cache.mark_failed(completion.key, frame);
                    failed += 1;
                }
            }
        }

        // 2. Selection is a pure read of camera + cache
        let selection = self.selector.select(camera, &self.cache);

        // 3. Pin the frontier and its ancestors against eviction
        let pinned = selection.pinned_keys();
        for key in &pinned {
            self.cache.touch(key, frame);
        }

        // 4. Stream the gaps; drop requests the camera moved away from
        let requested = self.issue_requests(&selection, frame);

        // 5. Evict outside the pinned set
        let evicted = self.cache.evict_if_needed(
            self.config.cache_budget,
            &pinned,
            frame,
            self.config.eviction_age_frames,
        );

        // 6. Assemble
        let draw_list = self.assembler.assemble(&selection, &self.cache, frame);

        self.metrics.record_frame(
            selection.tiles().len() as u64,
            draw_list.commands().len() as u64,
            draw_list.pending() as u64,
            requested,
            completed,
            failed,
            evicted as u64,
            selection.culled() as u64,
        );
        debug!(
            frame,
            drawn = draw_list.commands().len(),
            pending = draw_list.pending(),
            requested,
            completed,
            evicted,
            "frame complete"
        );
        draw_list
    }

    /// Issues build requests for the selection's missing tiles and
    /// cancels in-flight work that is no longer wanted.
    fn issue_requests(&mut self, selection: &SelectionResult, frame: u64) -> u64 {
        let mut wanted: HashSet<crate::coord::TileKey> =
            HashSet::with_capacity(selection.missing().len());
        let mut requested = 0u64;
        for missing in selection.missing() {
            wanted.insert(missing.key);
            self.cache.insert_pending(missing.key, frame);
            if self.coordinator.request_tile(
                missing.key,
                Priority::from_sse(missing.sse),
                missing.edge_lods,
            ) {
                requested += 1;
            }
        }

        for key in self.coordinator.retain(&wanted) {
            self.cache.remove_pending(&key);
        }

        // Saturation drops leave pending entries with no pipeline behind
        // them; clear the ones nothing wants anymore
        let coordinator = &self.coordinator;
        self.cache
            .retain_pending(|key| wanted.contains(key) || coordinator.is_in_flight(key));
        requested
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the tile cache.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Shared frame metrics.
    pub fn metrics(&self) -> Arc<FrameMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Streaming counters.
    pub fn stream_stats(&self) -> StreamStatsSnapshot {
        self.coordinator.stats()
    }

    /// Frames rendered so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}
