//! Rolling Inference Latency
//!
//! The control loop refuses forward motion when recent inference is too slow:
//! a steering prediction computed 150ms ago describes a road the vehicle has
//! already left. `LatencyTracker` keeps the last N durations and reports
//! their mean.
//!
//! Samples are seconds as `f32`. The average is rounded to three decimals so
//! that the value logged, displayed and compared against the threshold is the
//! same number.
//!
//! ```rust
//! use autodrive_core::latency::LatencyTracker;
//!
//! let mut tracker: LatencyTracker = LatencyTracker::new();
//! tracker.record(0.030);
//! tracker.record(0.050);
//! assert_eq!(tracker.average(), 0.04);
//! ```

use crate::buffer::CircularBuffer;
use crate::constants::timing::{LATENCY_DECIMALS, LATENCY_WINDOW};

/// Mean of the most recent `N` latency samples
#[derive(Clone, Debug, Default)]
pub struct LatencyTracker<const N: usize = LATENCY_WINDOW> {
    samples: CircularBuffer<f32, N>,
}

impl<const N: usize> LatencyTracker<N> {
    /// Create an empty tracker
    pub const fn new() -> Self {
        Self {
            samples: CircularBuffer::new(),
        }
    }

    /// Record one operation duration in seconds
    ///
    /// Overwrites the oldest sample once `N` have been recorded. Negative and
    /// non-finite durations are clamped to zero so one bad clock read cannot
    /// poison the window.
    pub fn record(&mut self, duration_s: f32) {
        let sample = if duration_s.is_finite() && duration_s > 0.0 {
            duration_s
        } else {
            0.0
        };
        self.samples.push(sample);
    }

    /// Average of the retained samples in seconds, rounded to 3 decimals
    ///
    /// Returns 0.0 before the first sample. While the window is partially
    /// filled only the recorded samples count.
    pub fn average(&self) -> f32 {
        let count = self.samples.len();
        if count == 0 {
            return 0.0;
        }

        let sum: f32 = self.samples.iter().sum();
        round_to(sum / count as f32, LATENCY_DECIMALS)
    }

    /// Average in whole milliseconds, for status displays
    pub fn average_ms(&self) -> u32 {
        libm::roundf(self.average() * 1000.0) as u32
    }

    /// Most recent sample
    pub fn last(&self) -> Option<f32> {
        self.samples.last().copied()
    }

    /// Samples currently in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples recorded since creation or the last reset
    pub fn total_count(&self) -> u64 {
        self.samples.total_pushed()
    }

    /// Drop all samples
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = libm::powf(10.0, decimals as f32);
    libm::roundf(value * scale) / scale
}
