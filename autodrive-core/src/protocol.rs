//! Serial Command Protocol
//!
//! The microcontroller reads one ASCII decimal integer per line. The numeric
//! range selects the actuator:
//!
//! | Value      | Meaning                          |
//! |------------|----------------------------------|
//! | 45..=135   | Steering servo angle, 90 = center |
//! | 0          | Motor stop                       |
//! | -1         | Motor reverse                    |
//! | 181..=1023 | Motor forward at this duty       |
//!
//! Anything else is ignored by the firmware, so [`Command::from_value`]
//! rejects it before it reaches the wire.

use core::fmt::Write;

use heapless::String;

use crate::constants::protocol::{
    FORWARD_DUTY_MAX, FORWARD_DUTY_MIN, MAX_COMMAND_LEN, MOTOR_REVERSE, MOTOR_STOP,
    SERVO_CENTER_DEG, SERVO_MAX_DEG, SERVO_MIN_DEG,
};
use crate::errors::{ControlError, ControlResult};

/// Encoded command line, newline included
pub type EncodedCommand = String<MAX_COMMAND_LEN>;

/// A single command understood by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Steering servo angle in degrees (45..=135)
    Steer(u8),
    /// Stop the drive motor
    MotorStop,
    /// Drive backwards at the firmware's fixed duty
    MotorReverse,
    /// Drive forward at this duty (181..=1023)
    MotorForward(u16),
}

impl Command {
    /// Centered steering
    pub const CENTER: Command = Command::Steer(SERVO_CENTER_DEG);

    /// Wire value of this command
    pub fn value(&self) -> i32 {
        match *self {
            Command::Steer(angle) => i32::from(angle),
            Command::MotorStop => MOTOR_STOP,
            Command::MotorReverse => MOTOR_REVERSE,
            Command::MotorForward(duty) => i32::from(duty),
        }
    }

    /// Decode a wire value
    ///
    /// Values between the servo range and the forward duty range, and values
    /// outside both, return [`ControlError::InvalidCommand`].
    pub fn from_value(value: i32) -> ControlResult<Self> {
        if is_servo_value(value) {
            return Ok(Command::Steer(value as u8));
        }
        match value {
            MOTOR_STOP => Ok(Command::MotorStop),
            MOTOR_REVERSE => Ok(Command::MotorReverse),
            v if v >= i32::from(FORWARD_DUTY_MIN) && v <= i32::from(FORWARD_DUTY_MAX) => {
                Ok(Command::MotorForward(v as u16))
            }
            _ => Err(ControlError::InvalidCommand { value }),
        }
    }

    /// True for steering commands
    pub fn is_servo(&self) -> bool {
        matches!(self, Command::Steer(_))
    }

    /// True for commands that leave the motor turning
    pub fn is_motion(&self) -> bool {
        matches!(self, Command::MotorForward(_) | Command::MotorReverse)
    }

    /// Newline-terminated ASCII token
    pub fn encode(&self) -> EncodedCommand {
        encode_value(self.value())
    }
}

/// True if `value` falls in the steering servo range
pub fn is_servo_value(value: i32) -> bool {
    value >= i32::from(SERVO_MIN_DEG) && value <= i32::from(SERVO_MAX_DEG)
}

/// Encode a raw wire value as a newline-terminated token
///
/// Tokens longer than [`MAX_COMMAND_LEN`] come back empty; every protocol
/// value fits.
pub fn encode_value(value: i32) -> EncodedCommand {
    let mut line = EncodedCommand::new();
    if writeln!(line, "{}", value).is_err() {
        line.clear();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ranges_decode() {
        assert_eq!(Command::from_value(45), Ok(Command::Steer(45)));
        assert_eq!(Command::from_value(135), Ok(Command::Steer(135)));
        assert_eq!(Command::from_value(0), Ok(Command::MotorStop));
        assert_eq!(Command::from_value(-1), Ok(Command::MotorReverse));
        assert_eq!(Command::from_value(181), Ok(Command::MotorForward(181)));
        assert_eq!(Command::from_value(1023), Ok(Command::MotorForward(1023)));
    }

    #[test]
    fn gaps_are_rejected() {
        for value in [-2, 1, 44, 136, 180, 1024] {
            assert_eq!(
                Command::from_value(value),
                Err(ControlError::InvalidCommand { value })
            );
        }
    }

    #[test]
    fn encoding_is_newline_terminated() {
        assert_eq!(Command::CENTER.encode().as_str(), "90\n");
        assert_eq!(Command::MotorStop.encode().as_str(), "0\n");
        assert_eq!(Command::MotorReverse.encode().as_str(), "-1\n");
        assert_eq!(Command::MotorForward(450).encode().as_str(), "450\n");
    }

    #[test]
    fn classification() {
        assert!(Command::Steer(60).is_servo());
        assert!(!Command::MotorStop.is_servo());
        assert!(Command::MotorForward(400).is_motion());
        assert!(Command::MotorReverse.is_motion());
        assert!(!Command::MotorStop.is_motion());
        assert!(is_servo_value(90));
        assert!(!is_servo_value(400));
    }
}
