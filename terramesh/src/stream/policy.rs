//! Scheduling and retry policies for tile streaming.
//!
//! [`Priority`] orders the request queue: it is recomputed by the engine
//! every frame from the selector's screen-space-error estimate, so the
//! most visually impactful missing tile is served first. [`RetryPolicy`]
//! controls how transient fetch failures back off before the tile
//! degrades to a placeholder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (5 seconds).
///
/// Tile relevance decays in seconds as the camera moves; backing off
/// longer than this just wastes the request slot.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 5;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default number of fetch attempts before degrading to a placeholder.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Quantization factor mapping fractional screen-space error to integer
/// priority without collapsing nearby values.
const SSE_PRIORITY_SCALE: f64 = 16.0;

/// Task scheduling priority (higher = more important).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i32);

impl Priority {
    /// Lowest possible priority.
    pub const MIN: Priority = Priority(i32::MIN);

    /// Creates a priority from a raw value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Derives a priority from a screen-space-error estimate in pixels.
    ///
    /// Larger on-screen error means the missing tile is more visible, so
    /// it sorts earlier. The error is quantized so that floating-point
    /// jitter between frames does not reshuffle the queue.
    pub fn from_sse(sse: f64) -> Self {
        let clamped = sse.clamp(0.0, 1.0e6);
        Self((clamped * SSE_PRIORITY_SCALE).round() as i32)
    }

    /// Raw priority value.
    pub fn value(self) -> i32 {
        self.0
    }
}

/// How a fetch handles transient failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Fixed number of retries with constant delay between attempts.
    Fixed {
        /// Total attempts including the first.
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponentially growing delay between attempts, capped.
    Exponential {
        /// Total attempts including the first.
        max_attempts: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Upper bound on the delay.
        max_delay: Duration,
        /// Growth factor per retry.
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Creates an exponential policy with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::Exponential {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                (*max_attempts).max(1)
            }
        }
    }

    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for(1)`), or `None` when attempts are
    /// exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay = initial_delay.as_secs_f64() * factor;
                Some(Duration::from_secs_f64(delay.min(max_delay.as_secs_f64())))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS)
    }
}
