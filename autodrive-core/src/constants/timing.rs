//! Time-Related Constants
//!
//! This module defines the intervals, timeouts and polling periods that shape
//! the control core's real-time behavior. All of them are defaults: the
//! runtime values come from [`crate::config`].

// ===== COMMAND RATE LIMITING =====

/// Minimum interval between a motor command and the previous write (milliseconds).
///
/// The microcontroller's command parser drops tokens that arrive faster
/// than about 20 Hz while the motor driver is ramping. Steering commands are
/// exempt from the check but still count as the previous write.
///
/// Source: microcontroller firmware timing
pub const MIN_SEND_INTERVAL_MS: u64 = 50;

// ===== SERIAL LINK =====

/// Serial baud rate.
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// Per-call serial read timeout (milliseconds).
///
/// Bounds how long the reader thread can hold the connection lock.
pub const SERIAL_READ_TIMEOUT_MS: u64 = 100;

/// Reader thread sleep between polls (milliseconds).
///
/// Keeps the reader from spinning while still surfacing device lines
/// promptly.
pub const READER_POLL_INTERVAL_MS: u64 = 1;

/// Maximum wait for the reader thread to finish during shutdown (milliseconds).
pub const READER_JOIN_TIMEOUT_MS: u64 = 1000;

/// Settle delay after opening a port or sending an initialization command (milliseconds).
pub const LINK_SETTLE_MS: u64 = 50;

// ===== SAFE STOP =====

/// Number of stop attempts made during shutdown.
pub const SHUTDOWN_ATTEMPTS: u8 = 3;

/// Delay before retrying a failed stop attempt (milliseconds).
pub const SHUTDOWN_RETRY_DELAY_MS: u64 = 100;

// ===== MODEL SWITCHING =====

/// Time a non-default model stays active without being reasserted (milliseconds).
///
/// Long enough to carry the vehicle through a curve, short enough that a
/// stale switch does not outlive the condition that caused it.
pub const MODEL_SWITCH_TIMEOUT_MS: u64 = 7000;

/// Consecutive identical automatic requests needed to confirm a switch.
pub const SWITCH_CONFIRMATION_COUNT: u8 = 3;

// ===== LATENCY GATE =====

/// Number of inference latencies kept for the rolling average.
pub const LATENCY_WINDOW: usize = 20;

/// Average inference latency above which the vehicle stops (seconds).
///
/// At 100ms the vehicle travels several centimeters on a stale prediction.
pub const LATENCY_THRESHOLD_S: f32 = 0.1;

/// Decimal places kept in the reported latency average.
pub const LATENCY_DECIMALS: i32 = 3;
