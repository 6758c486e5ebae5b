//! Time Sources for the Control Core
//!
//! Rate limiting and model-switch timeouts both measure elapsed time, so the
//! clock is injected rather than read from a global:
//!
//! - `MonotonicClock`: `std::time::Instant` based, for real driving
//! - `MockTimeSource`: manually advanced, for deterministic tests and replays
//!
//! Timestamps are milliseconds on a monotonic scale. Only differences between
//! timestamps from the same source are meaningful.

/// Timestamp in milliseconds since the clock's origin
pub type Timestamp = u64;

/// Source of time for the system
///
/// ## Implementation Requirements
///
/// - `now()` must never go backwards for a monotonic source
/// - Clones of a source should share the same origin so that components
///   holding different clones agree on elapsed time
pub trait TimeSource: Send {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Milliseconds elapsed since `earlier`
    ///
    /// Saturates at zero if `earlier` is in the future.
    fn elapsed_since(&self, earlier: Timestamp) -> u64 {
        self.now().saturating_sub(earlier)
    }
}

/// Monotonic clock backed by `std::time::Instant`
///
/// Starts at 0 when created; clones share the same origin.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Controllable time source for tests
///
/// Clones share one counter, so a test can keep a handle and advance the
/// time seen by every component it handed a clone to.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    now_ms: std::sync::Arc<core::sync::atomic::AtomicU64>,
}

#[cfg(feature = "std")]
impl MockTimeSource {
    /// Create a mock clock at `start` milliseconds
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: std::sync::Arc::new(core::sync::atomic::AtomicU64::new(start)),
        }
    }

    /// Set the current time
    pub fn set(&self, timestamp: Timestamp) {
        self.now_ms
            .store(timestamp, core::sync::atomic::Ordering::SeqCst);
    }

    /// Move time forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now_ms
            .fetch_add(ms, core::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(feature = "std")]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now_ms.load(core::sync::atomic::Ordering::SeqCst)
    }
}
