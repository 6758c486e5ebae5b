//! Error Types for the Control Core
//!
//! ## Design Philosophy
//!
//! The control core talks to physical hardware, so its errors are built to be
//! handled, never thrown past the control loop:
//!
//! 1. **Small Size**: Variants carry `&'static str` reasons and inline model
//!    names only. Nothing here allocates, so the same type works without `std`.
//!
//! 2. **Return Values, Not Faults**: Every failure a caller can hit during
//!    normal driving (a dropped write, a throttled command, an unknown model)
//!    comes back as a `ControlError`. The control loop keeps running across
//!    individual I/O hiccups.
//!
//! 3. **Details Are Logged Where They Happen**: OS-level error text from the
//!    serial port is logged by the component that saw it. The error value only
//!    says which operation failed.
//!
//! ## Error Categories
//!
//! ### Connection
//! - `ConnectionNotFound`: No serial device matched the identification pattern
//! - `NotConnected`: A send was attempted before `connect` or after `shutdown`
//! - `TransientIo`: A single read or write failed
//! - `ShutdownIncomplete`: The safe-stop could not be confirmed
//!
//! ### Commands
//! - `RateLimited`: A motor command arrived inside the minimum send interval
//! - `InvalidCommand`: A value that is not part of the serial protocol
//!
//! ### Models
//! - `UnknownModel`: A switch request named a model that is not loaded
//! - `NoModelsLoaded`, `TooManyModels`, `ModelNameTooLong`: construction issues
//! - `Perception`: The inference collaborator failed for one frame
//!
//! ### Configuration
//! - `InvalidConfig`: A configuration value is out of its allowed range
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use autodrive_core::errors::ControlError;
//!
//! fn on_send_result(result: Result<(), ControlError>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(ControlError::RateLimited { .. }) => {
//!             // Try again next frame
//!         }
//!         Err(ControlError::NotConnected) => {
//!             // Ask the operator to reconnect
//!         }
//!         Err(_) => {
//!             // Logged by the channel already
//!         }
//!     }
//! }
//! # on_send_result(Ok(()));
//! ```

use thiserror_no_std::Error;

use crate::switcher::ModelName;

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Control core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// No serial port matched the expected identification pattern
    #[error("No matching device among {probed} candidate ports")]
    ConnectionNotFound {
        /// Number of candidate ports that were looked at
        probed: usize,
    },

    /// Channel has no open connection
    #[error("Command channel is not connected")]
    NotConnected,

    /// Command rejected by the minimum send interval
    #[error("Command {value} rate limited: {elapsed_ms}ms since last send, need {min_interval_ms}ms")]
    RateLimited {
        /// Wire value that was rejected
        value: i32,
        /// Time since the last successful write
        elapsed_ms: u64,
        /// Configured minimum interval
        min_interval_ms: u64,
    },

    /// A single serial operation failed
    #[error("Transient I/O failure during {operation}")]
    TransientIo {
        /// Operation that failed (write, flush, read, ...)
        operation: &'static str,
    },

    /// Value is not part of the serial protocol
    #[error("Value {value} is not a valid command")]
    InvalidCommand {
        /// Offending wire value
        value: i32,
    },

    /// Requested model is not loaded
    #[error("Unknown model '{name}'")]
    UnknownModel {
        /// Name that was requested
        name: ModelName,
    },

    /// A switcher needs at least one model
    #[error("No models loaded")]
    NoModelsLoaded,

    /// More models than the switcher can track
    #[error("Too many models: capacity is {capacity}")]
    TooManyModels {
        /// Maximum number of models
        capacity: usize,
    },

    /// Model name does not fit the inline name buffer
    #[error("Model name longer than {capacity} bytes")]
    ModelNameTooLong {
        /// Maximum name length in bytes
        capacity: usize,
    },

    /// Safe-stop was not confirmed after every attempt
    #[error("Safe stop not confirmed after {attempts} attempts")]
    ShutdownIncomplete {
        /// Number of stop attempts made
        attempts: u8,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: &'static str,
    },

    /// Inference failed for the current frame
    #[error("Perception failed: {reason}")]
    Perception {
        reason: &'static str,
    },
}

impl ControlError {
    /// Whether the failure only affects the current command or frame
    ///
    /// Transient errors never stop the control loop; the next frame simply
    /// tries again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::TransientIo { .. } | Self::Perception { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let write = ControlError::TransientIo { operation: "write" };
        assert!(write.is_transient());
        assert!(ControlError::RateLimited {
            value: 400,
            elapsed_ms: 10,
            min_interval_ms: 50
        }
        .is_transient());
        assert!(!ControlError::NotConnected.is_transient());
        let incomplete = ControlError::ShutdownIncomplete { attempts: 3 };
        assert!(!incomplete.is_transient());
    }

    #[cfg(feature = "std")]
    #[test]
    fn messages_are_readable() {
        let err = ControlError::RateLimited {
            value: 400,
            elapsed_ms: 12,
            min_interval_ms: 50,
        };
        assert_eq!(
            err.to_string(),
            "Command 400 rate limited: 12ms since last send, need 50ms"
        );

        let err = ControlError::ShutdownIncomplete { attempts: 3 };
        assert_eq!(err.to_string(), "Safe stop not confirmed after 3 attempts");
    }
}
