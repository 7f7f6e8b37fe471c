//! Frame-loop telemetry.
//!
//! Lock-free atomic counters updated by the engine each frame, with a
//! point-in-time snapshot for display. The counters live behind an `Arc`
//! so observers (CLI status line, tests) can read them without touching
//! the engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative frame-loop counters.
#[derive(Debug, Default)]
pub struct FrameMetrics {
    frames: AtomicU64,
    tiles_selected: AtomicU64,
    tiles_drawn: AtomicU64,
    tiles_pending: AtomicU64,
    requests_issued: AtomicU64,
    completions_applied: AtomicU64,
    builds_failed: AtomicU64,
    evictions: AtomicU64,
    subtrees_culled: AtomicU64,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame's outcomes in a single call.
    #[allow(clippy::too_many_arguments)]
    pub fn record_frame(
        &self,
        selected: u64,
        drawn: u64,
        pending: u64,
        requested: u64,
        completed: u64,
        failed: u64,
        evicted: u64,
        culled: u64,
    ) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.tiles_selected.fetch_add(selected, Ordering::Relaxed);
        self.tiles_drawn.fetch_add(drawn, Ordering::Relaxed);
        self.tiles_pending.fetch_add(pending, Ordering::Relaxed);
        self.requests_issued.fetch_add(requested, Ordering::Relaxed);
        self.completions_applied
            .fetch_add(completed, Ordering::Relaxed);
        self.builds_failed.fetch_add(failed, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        self.subtrees_culled.fetch_add(culled, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy for display.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            tiles_selected: self.tiles_selected.load(Ordering::Relaxed),
            tiles_drawn: self.tiles_drawn.load(Ordering::Relaxed),
            tiles_pending: self.tiles_pending.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            completions_applied: self.completions_applied.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            subtrees_culled: self.subtrees_culled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FrameMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub frames: u64,
    pub tiles_selected: u64,
    pub tiles_drawn: u64,
    pub tiles_pending: u64,
    pub requests_issued: u64,
    pub completions_applied: u64,
    pub builds_failed: u64,
    pub evictions: u64,
    pub subtrees_culled: u64,
}

impl TelemetrySnapshot {
    /// Average selected tiles per frame.
    pub fn avg_tiles_per_frame(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.tiles_selected as f64 / self.frames as f64
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames: {}, tiles/frame: {:.1}, drawn: {}, pending: {}, requested: {}, completed: {}, failed: {}, evicted: {}, culled: {}",
            self.frames,
            self.avg_tiles_per_frame(),
            self.tiles_drawn,
            self.tiles_pending,
            self.requests_issued,
            self.completions_applied,
            self.builds_failed,
            self.evictions,
            self.subtrees_culled,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = FrameMetrics::new();
        metrics.record_frame(10, 8, 2, 4, 3, 0, 1, 5);
        metrics.record_frame(12, 12, 0, 0, 2, 1, 0, 6);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.tiles_selected, 22);
        assert_eq!(snapshot.tiles_drawn, 20);
        assert_eq!(snapshot.tiles_pending, 2);
        assert_eq!(snapshot.requests_issued, 4);
        assert_eq!(snapshot.completions_applied, 5);
        assert_eq!(snapshot.builds_failed, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.subtrees_culled, 11);
    }

    #[test]
    fn test_avg_tiles_per_frame() {
        let metrics = FrameMetrics::new();
        assert_eq!(metrics.snapshot().avg_tiles_per_frame(), 0.0);
        metrics.record_frame(10, 10, 0, 0, 0, 0, 0, 0);
        metrics.record_frame(20, 20, 0, 0, 0, 0, 0, 0);
        assert!((metrics.snapshot().avg_tiles_per_frame() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_display_is_single_line() {
        let metrics = FrameMetrics::new();
        metrics.record_frame(1, 1, 0, 0, 0, 0, 0, 0);
        let text = metrics.snapshot().to_string();
        assert!(text.contains("frames: 1"));
        assert!(!text.contains('\n'));
    }
}
