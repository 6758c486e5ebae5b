//! Hardware Connectors for the Vehicle Link
//!
//! ## Overview
//!
//! `autodrive-core` drives the vehicle through its
//! [`SerialLink`](autodrive_core::link::SerialLink) and
//! [`SerialConnector`](autodrive_core::link::SerialConnector) traits and ships
//! only an in-memory loopback. This crate provides the real device side.
//!
//! ## Serial (feature `serial`, default)
//!
//! - [`serial::discover_ports`] lists OS serial ports as
//!   [`PortCandidate`](autodrive_core::link::PortCandidate)s, with USB
//!   adapters described so the default `"USB"` port pattern finds them
//! - [`serial::SerialPortConnector`] opens a candidate at 115200 8N1, no flow
//!   control, with the read timeout from the channel configuration
//! - [`serial::SerialPortLink`] assembles device output into lines for the
//!   channel's reader thread
//!
//! ## Example Usage
//!
//! ```no_run
//! use autodrive_connectors::serial::{discover_ports, SerialPortConnector};
//! use autodrive_core::{config::ControlConfig, channel::CommandChannel, time::MonotonicClock};
//!
//! let config = ControlConfig::default();
//! let mut connector = SerialPortConnector::from_config(&config.channel);
//! let mut channel = CommandChannel::new(config.channel, MonotonicClock::new());
//!
//! channel.connect(&mut connector, &discover_ports()?)?;
//! channel.send_command(90, false);
//! channel.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]

#[cfg(feature = "serial")]
pub mod serial;

use thiserror::Error;

/// Errors raised outside an open link
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The OS port list could not be read
    #[error("Port enumeration failed: {0}")]
    Enumeration(String),

    /// No port matched
    #[error("No serial port matches '{0}'")]
    NoMatchingPort(String),
}
