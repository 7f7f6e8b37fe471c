//! Engine configuration.
//!
//! All policy values are supplied once at initialization and fixed for
//! the engine's lifetime: pixel-error threshold, grid resolution, cache
//! budget, worker-pool size, and maximum LOD. Defaults are deployment
//! starting points, not constants of nature; the threshold and skirt
//! depth in particular are tuned empirically per dataset.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheBudget;
use crate::coord::MAX_LEVEL;
use crate::stream::RetryPolicy;

/// Default screen-space error threshold in pixels.
pub const DEFAULT_PIXEL_ERROR_THRESHOLD: f64 = 2.0;

/// Default elevation grid resolution (samples per side). A power of two
/// plus one, so edge decimation divides evenly at every LOD delta.
pub const DEFAULT_GRID_SIZE: usize = 65;

/// Default deepest refinement level.
pub const DEFAULT_MAX_LEVEL: u8 = 18;

/// Default skirt depth in meters. Deep enough to cover the elevation gap
/// between adjacent LODs of any real-world terrain.
pub const DEFAULT_SKIRT_DEPTH: f64 = 1_000.0;

/// Default resident-tile budget.
pub const DEFAULT_CACHE_MAX_TILES: usize = 600;

/// Default cache byte budget (256 MiB of mesh data).
pub const DEFAULT_CACHE_MAX_BYTES: usize = 256 * 1024 * 1024;

/// Default frames a tile may go untouched before it becomes an eviction
/// candidate (two seconds at 60 fps).
pub const DEFAULT_EVICTION_AGE_FRAMES: u64 = 120;

/// Default worker pool size for fetch+build pipelines.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Default bound on queued (not yet executing) tile requests.
pub const DEFAULT_MAX_QUEUED_REQUESTS: usize = 256;

/// Errors from configuration validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Grid size below the two-sample minimum.
    #[error("Grid size {0} too small (minimum: 2)")]
    GridTooSmall(usize),

    /// Maximum level beyond what the tiling scheme supports.
    #[error("Max level {0} exceeds supported maximum {max}", max = MAX_LEVEL)]
    MaxLevelTooDeep(u8),

    /// Non-positive pixel error threshold would refine forever.
    #[error("Pixel error threshold must be positive, got {0}")]
    NonPositiveThreshold(f64),

    /// Zero-size worker pool can never complete a build.
    #[error("Worker pool size must be at least 1")]
    EmptyWorkerPool,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Accept a tile once its screen-space error is at or below this many
    /// pixels.
    pub pixel_error_threshold: f64,

    /// Elevation grid resolution, samples per side.
    pub grid_size: usize,

    /// Deepest quadtree level the selector refines to.
    pub max_level: u8,

    /// Skirt drop depth in meters.
    pub skirt_depth: f64,

    /// Cache budgets.
    pub cache_budget: CacheBudget,

    /// Frames a tile may go untouched before eviction.
    pub eviction_age_frames: u64,

    /// Concurrent fetch+build pipelines.
    pub worker_pool_size: usize,

    /// Bound on queued tile requests.
    pub max_queued_requests: usize,

    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pixel_error_threshold: DEFAULT_PIXEL_ERROR_THRESHOLD,
            grid_size: DEFAULT_GRID_SIZE,
            max_level: DEFAULT_MAX_LEVEL,
            skirt_depth: DEFAULT_SKIRT_DEPTH,
            cache_budget: CacheBudget {
                max_tiles: DEFAULT_CACHE_MAX_TILES,
                max_bytes: DEFAULT_CACHE_MAX_BYTES,
            },
            eviction_age_frames: DEFAULT_EVICTION_AGE_FRAMES,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            max_queued_requests: DEFAULT_MAX_QUEUED_REQUESTS,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the pixel error threshold.
    pub fn with_pixel_error_threshold(mut self, threshold: f64) -> Self {
        self.pixel_error_threshold = threshold;
        self
    }

    /// Sets the grid resolution.
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Sets the deepest refinement level.
    pub fn with_max_level(mut self, max_level: u8) -> Self {
        self.max_level = max_level;
        self
    }

    /// Sets the skirt depth in meters.
    pub fn with_skirt_depth(mut self, depth: f64) -> Self {
        self.skirt_depth = depth;
        self
    }

    /// Sets the cache budget.
    pub fn with_cache_budget(mut self, budget: CacheBudget) -> Self {
        self.cache_budget = budget;
        self
    }

    /// Sets the worker pool size.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < 2 {
            return Err(ConfigError::GridTooSmall(self.grid_size));
        }
        if self.max_level > MAX_LEVEL {
            return Err(ConfigError::MaxLevelTooDeep(self.max_level));
        }
        if self.pixel_error_threshold <= 0.0 {
            return Err(ConfigError::NonPositiveThreshold(
                self.pixel_error_threshold,
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::EmptyWorkerPool);
        }
        Ok(())
    }
}
