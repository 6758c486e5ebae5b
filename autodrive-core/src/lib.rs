//! Real-time control core for autodrive
//!
//! Turns steering predictions into rate-limited serial commands for a small
//! robotic vehicle, and decides from inference latency whether it is safe to
//! move at all.
//!
//! Key constraints:
//! - One control thread, one serial reader thread, one mutex between them
//! - Steering is never throttled; motor commands are
//! - Shutdown always releases the port, even if the vehicle does not answer
//!
//! The protocol codec, steering math, latency tracker and model switcher build
//! without `std`. The command channel, control loop and configuration need the
//! `std` feature (default).
//!
//! ```no_run
//! use autodrive_core::config::ControlConfig;
//! use autodrive_core::control::ControlLoop;
//! use autodrive_core::link::LoopbackConnector;
//! use autodrive_core::time::MonotonicClock;
//!
//! let config = ControlConfig::default();
//! let mut control = ControlLoop::new(&config, &["primary", "curve"], MonotonicClock::new())?;
//!
//! let (mut connector, _device) = LoopbackConnector::new();
//! control.connect(&mut connector, &LoopbackConnector::candidates())?;
//! control.start();
//!
//! // control.tick(&frame, &mut perception) once per camera frame
//!
//! control.shutdown()?;
//! # Ok::<(), autodrive_core::errors::ControlError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod buffer;
pub mod constants;
pub mod errors;
pub mod latency;
pub mod protocol;
pub mod steering;
pub mod switcher;
pub mod time;

#[cfg(feature = "std")]
pub mod channel;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod control;
#[cfg(feature = "std")]
pub mod link;
#[cfg(feature = "std")]
pub mod perception;

// Public API
pub use errors::{ControlError, ControlResult};
pub use latency::LatencyTracker;
pub use protocol::Command;
pub use switcher::{ModelSwitcher, SwitchOutcome, SwitchPolicy};
pub use time::{TimeSource, Timestamp};

#[cfg(feature = "std")]
pub use channel::CommandChannel;
#[cfg(feature = "std")]
pub use config::ControlConfig;
#[cfg(feature = "std")]
pub use control::{ControlLoop, LoopState, OperatorCommand, TickReport};
#[cfg(feature = "std")]
pub use link::{PortCandidate, SerialConnector, SerialLink};
#[cfg(feature = "std")]
pub use perception::{Perception, Prediction, SteeringModel};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
