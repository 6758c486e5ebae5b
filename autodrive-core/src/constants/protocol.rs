//! Serial Protocol Constants
//!
//! Values understood by the vehicle's microcontroller. Each command is an
//! ASCII decimal integer terminated by `\n`; the numeric range selects the
//! actuator.

// ===== STEERING SERVO =====

/// Minimum steering servo angle (degrees).
///
/// Full lock in one direction. The linkage binds below this angle.
pub const SERVO_MIN_DEG: u8 = 45;

/// Maximum steering servo angle (degrees).
///
/// Full lock in the other direction.
pub const SERVO_MAX_DEG: u8 = 135;

/// Centered steering (degrees).
pub const SERVO_CENTER_DEG: u8 = 90;

/// Degrees of servo travel per unit of normalized steering.
///
/// A normalized steering value of ±1.0 maps to ±45° around center.
pub const SERVO_HALF_RANGE_DEG: f32 = 45.0;

// ===== DRIVE MOTOR =====

/// Motor stop command.
pub const MOTOR_STOP: i32 = 0;

/// Motor reverse command.
///
/// The firmware drives backwards at a fixed duty when it sees -1.
pub const MOTOR_REVERSE: i32 = -1;

/// Lowest forward duty the firmware accepts.
///
/// Values between the servo range and this bound are ignored by the
/// microcontroller; below it the motor stalls anyway.
pub const FORWARD_DUTY_MIN: u16 = 181;

/// Highest forward duty (10-bit PWM full scale).
pub const FORWARD_DUTY_MAX: u16 = 1023;

/// Default cruising duty for autonomous driving.
pub const DEFAULT_FORWARD_DUTY: u16 = 450;

// ===== PREDICTION SCALE =====

/// Center of the 0-100 display scale used for steering predictions.
pub const DISPLAY_CENTER: f32 = 50.0;

/// Maximum length of one encoded command, including the newline.
///
/// "-1\n" and "1023\n" are the shortest and longest tokens.
pub const MAX_COMMAND_LEN: usize = 8;
