//! Constants for the Control Core
//!
//! This module centralizes the numeric values the control core relies on.
//! Every value that reaches the microcontroller or shapes a timing decision is
//! defined here, with its unit in the name.
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **Protocol**: Wire values understood by the vehicle's microcontroller
//! - **Timing**: Send intervals, timeouts and polling periods
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Runtime-tunable values also appear in [`crate::config`] with these as
//!    their defaults
//! 3. Use descriptive names that include units

/// Serial protocol values: servo angles, motor codes, duty range.
pub mod protocol;

/// Time-related constants for rate limiting, timeouts and polling.
pub mod timing;

// Re-export commonly used constants for convenience
pub use protocol::{
    SERVO_MIN_DEG, SERVO_MAX_DEG, SERVO_CENTER_DEG,
    MOTOR_STOP, MOTOR_REVERSE, FORWARD_DUTY_MIN, FORWARD_DUTY_MAX,
    DEFAULT_FORWARD_DUTY,
};

pub use timing::{
    MIN_SEND_INTERVAL_MS, MODEL_SWITCH_TIMEOUT_MS, LATENCY_THRESHOLD_S,
    SHUTDOWN_ATTEMPTS,
};
