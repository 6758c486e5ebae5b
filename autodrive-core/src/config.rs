//! Runtime Configuration
//!
//! Every tunable value is carried in one [`ControlConfig`] that is handed to
//! component constructors. There are no process-wide settings.
//!
//! Configuration is JSON. Missing fields take the defaults from
//! [`crate::constants`], so an empty object is a valid configuration:
//!
//! ```rust
//! use autodrive_core::config::ControlConfig;
//!
//! let config = ControlConfig::from_json_str(r#"{
//!     "channel": { "port_pattern": "CH340" },
//!     "control": { "forward_speed": 520 }
//! }"#).unwrap();
//!
//! assert_eq!(config.channel.port_pattern, "CH340");
//! assert_eq!(config.channel.min_send_interval_ms, 50);
//! assert_eq!(config.switcher.confirmation_threshold, 3);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::constants::protocol::{
    DEFAULT_FORWARD_DUTY, FORWARD_DUTY_MAX, FORWARD_DUTY_MIN, SERVO_MAX_DEG, SERVO_MIN_DEG,
};
use crate::constants::timing::{
    LATENCY_THRESHOLD_S, LINK_SETTLE_MS, MIN_SEND_INTERVAL_MS, MODEL_SWITCH_TIMEOUT_MS,
    READER_JOIN_TIMEOUT_MS, READER_POLL_INTERVAL_MS, SERIAL_BAUD_RATE, SERIAL_READ_TIMEOUT_MS,
    SHUTDOWN_ATTEMPTS, SHUTDOWN_RETRY_DELAY_MS, SWITCH_CONFIRMATION_COUNT,
};
use crate::errors::ControlError;
use crate::switcher::{SwitchPolicy, MODEL_NAME_CAPACITY};

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file: {detail}")]
    Io {
        /// OS error description
        detail: String,
    },

    /// The JSON did not match the expected shape
    #[error("Malformed config: {detail}")]
    Parse {
        /// Parser error description
        detail: String,
    },

    /// Values parsed but are inconsistent
    #[error("Invalid config: {0}")]
    Invalid(ControlError),
}

/// Serial command channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Per-call read timeout
    pub read_timeout_ms: u64,
    /// Substring a port description must contain to be opened
    pub port_pattern: String,
    /// Minimum time between the previous write and a motor command
    pub min_send_interval_ms: u64,
    /// Lowest steering angle; the servo range is exempt from rate limiting
    pub servo_min_deg: u8,
    /// Highest steering angle
    pub servo_max_deg: u8,
    /// Pause after each connection-time initialization command
    pub settle_ms: u64,
    /// Stop attempts made during shutdown
    pub shutdown_attempts: u8,
    /// Pause before retrying a failed stop attempt
    pub shutdown_retry_delay_ms: u64,
    /// Reader thread sleep between polls
    pub reader_poll_interval_ms: u64,
    /// Bounded wait for the reader thread during shutdown
    pub reader_join_timeout_ms: u64,
    /// Device lines buffered before the oldest unread ones are dropped
    pub diagnostic_queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            baud_rate: SERIAL_BAUD_RATE,
            read_timeout_ms: SERIAL_READ_TIMEOUT_MS,
            port_pattern: "USB".to_string(),
            min_send_interval_ms: MIN_SEND_INTERVAL_MS,
            servo_min_deg: SERVO_MIN_DEG,
            servo_max_deg: SERVO_MAX_DEG,
            settle_ms: LINK_SETTLE_MS,
            shutdown_attempts: SHUTDOWN_ATTEMPTS,
            shutdown_retry_delay_ms: SHUTDOWN_RETRY_DELAY_MS,
            reader_poll_interval_ms: READER_POLL_INTERVAL_MS,
            reader_join_timeout_ms: READER_JOIN_TIMEOUT_MS,
            diagnostic_queue_capacity: 64,
        }
    }
}

/// Model switching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitcherConfig {
    /// Model that runs by default and that timeouts revert to
    pub default_model: String,
    /// Time a non-default model stays active without reassertion
    pub switch_timeout_ms: u64,
    /// Consecutive automatic requests needed to confirm a switch
    pub confirmation_threshold: u8,
}

impl SwitcherConfig {
    /// Timing and debounce policy for [`crate::switcher::ModelSwitcher`]
    pub fn policy(&self) -> SwitchPolicy {
        SwitchPolicy {
            timeout_ms: self.switch_timeout_ms,
            confirmation_threshold: self.confirmation_threshold,
        }
    }
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            default_model: "primary".to_string(),
            switch_timeout_ms: MODEL_SWITCH_TIMEOUT_MS,
            confirmation_threshold: SWITCH_CONFIRMATION_COUNT,
        }
    }
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Average inference latency above which the vehicle stops (seconds)
    pub latency_threshold_s: f32,
    /// Forward duty used when the latency gate allows motion
    pub forward_speed: u16,
    /// Minimum time stopped after a latency stop before moving again; 0 disables
    pub resume_dwell_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            latency_threshold_s: LATENCY_THRESHOLD_S,
            forward_speed: DEFAULT_FORWARD_DUTY,
            resume_dwell_ms: 0,
        }
    }
}

/// Complete control core configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Serial command channel
    pub channel: ChannelConfig,
    /// Model switching
    pub switcher: SwitcherConfig,
    /// Control loop
    pub control: LoopConfig,
}

impl ControlConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            detail: format!("{}: {}", path.display(), e),
        })?;
        let config = Self::from_json_str(&json)?;
        log_info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Pretty-printed JSON, suitable for writing a starter file
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ControlError> {
        let channel = &self.channel;
        if channel.servo_min_deg >= channel.servo_max_deg {
            return Err(invalid("servo_min_deg must be below servo_max_deg"));
        }
        if channel.servo_min_deg < SERVO_MIN_DEG || channel.servo_max_deg > SERVO_MAX_DEG {
            return Err(invalid("servo range exceeds the steering linkage limits"));
        }
        if channel.shutdown_attempts == 0 {
            return Err(invalid("shutdown_attempts must be at least 1"));
        }
        if channel.diagnostic_queue_capacity == 0 {
            return Err(invalid("diagnostic_queue_capacity must be at least 1"));
        }
        if channel.baud_rate == 0 {
            return Err(invalid("baud_rate must be positive"));
        }

        let switcher = &self.switcher;
        if switcher.confirmation_threshold == 0 {
            return Err(invalid("confirmation_threshold must be at least 1"));
        }
        if switcher.default_model.is_empty() {
            return Err(invalid("default_model must not be empty"));
        }
        if switcher.default_model.len() > MODEL_NAME_CAPACITY {
            return Err(ControlError::ModelNameTooLong {
                capacity: MODEL_NAME_CAPACITY,
            });
        }

        let control = &self.control;
        if !(control.latency_threshold_s.is_finite() && control.latency_threshold_s > 0.0) {
            return Err(invalid("latency_threshold_s must be a positive number"));
        }
        if control.forward_speed < FORWARD_DUTY_MIN || control.forward_speed > FORWARD_DUTY_MAX {
            return Err(invalid("forward_speed must be within the forward duty range"));
        }

        Ok(())
    }
}

fn invalid(reason: &'static str) -> ControlError {
    ControlError::InvalidConfig { reason }
}
