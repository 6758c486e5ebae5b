//! Steering Value Conversions
//!
//! Three scales meet in the control loop:
//!
//! ```text
//! model output     display scale      normalized        servo angle
//!   [-1, 1]   →      [0, 100]     →    [-1, 1]     →    [45, 135]
//!            postprocess   display_to_steering   steering_to_angle
//! ```
//!
//! The display scale is what operators see and what recorded labels use;
//! positive normalized steering turns toward the smaller servo angle.

use crate::constants::protocol::{
    DISPLAY_CENTER, FORWARD_DUTY_MAX, FORWARD_DUTY_MIN, SERVO_CENTER_DEG, SERVO_HALF_RANGE_DEG,
    SERVO_MAX_DEG, SERVO_MIN_DEG,
};

/// Map a raw model output in [-1, 1] to the 0-100 display scale
///
/// Not clamped: a model that overshoots shows up as a value outside 0-100.
pub fn postprocess(raw: f32) -> f32 {
    (raw + 1.0) * DISPLAY_CENTER
}

/// Map a display-scale value to normalized steering in [-1, 1]
pub fn display_to_steering(display: f32) -> f32 {
    clamp_unit((display - DISPLAY_CENTER) / DISPLAY_CENTER)
}

/// Map normalized steering to a servo angle
///
/// `angle = 90 - round(s × 45)`, clamped to the servo range. NaN steers
/// straight.
pub fn steering_to_angle(steering: f32) -> u8 {
    if steering.is_nan() {
        return SERVO_CENTER_DEG;
    }
    let offset = libm::roundf(steering * SERVO_HALF_RANGE_DEG);
    let angle = f32::from(SERVO_CENTER_DEG) - offset;
    angle.clamp(f32::from(SERVO_MIN_DEG), f32::from(SERVO_MAX_DEG)) as u8
}

/// Inverse of [`steering_to_angle`] for angles inside the servo range
pub fn angle_to_steering(angle: u8) -> f32 {
    (f32::from(SERVO_CENTER_DEG) - f32::from(angle)) / SERVO_HALF_RANGE_DEG
}

/// Raw model output straight to a servo angle
pub fn raw_to_angle(raw: f32) -> u8 {
    steering_to_angle(display_to_steering(postprocess(raw)))
}

/// Clamp a forward duty into the range the firmware accepts
pub fn clamp_forward_duty(duty: u16) -> u16 {
    duty.clamp(FORWARD_DUTY_MIN, FORWARD_DUTY_MAX)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postprocess_maps_to_display_scale() {
        assert_eq!(postprocess(-1.0), 0.0);
        assert_eq!(postprocess(0.0), 50.0);
        assert_eq!(postprocess(1.0), 100.0);
    }

    #[test]
    fn display_maps_to_unit_range() {
        assert_eq!(display_to_steering(50.0), 0.0);
        assert_eq!(display_to_steering(100.0), 1.0);
        assert_eq!(display_to_steering(0.0), -1.0);
        assert_eq!(display_to_steering(140.0), 1.0);
        assert_eq!(display_to_steering(-20.0), -1.0);
    }

    #[test]
    fn angle_formula_and_clamp() {
        assert_eq!(steering_to_angle(0.0), 90);
        assert_eq!(steering_to_angle(1.0), 45);
        assert_eq!(steering_to_angle(-1.0), 135);
        assert_eq!(steering_to_angle(0.5), 67);
        assert_eq!(steering_to_angle(3.0), 45);
        assert_eq!(steering_to_angle(-3.0), 135);
        assert_eq!(steering_to_angle(f32::NAN), 90);
    }

    #[test]
    fn raw_to_angle_end_to_end() {
        assert_eq!(raw_to_angle(0.0), 90);
        assert_eq!(raw_to_angle(1.0), 45);
        assert_eq!(raw_to_angle(-1.0), 135);
    }

    #[test]
    fn angle_round_trips_at_range_ends() {
        assert_eq!(angle_to_steering(90), 0.0);
        assert_eq!(angle_to_steering(45), 1.0);
        assert_eq!(angle_to_steering(135), -1.0);
    }

    #[test]
    fn forward_duty_is_clamped() {
        assert_eq!(clamp_forward_duty(0), 181);
        assert_eq!(clamp_forward_duty(450), 450);
        assert_eq!(clamp_forward_duty(5000), 1023);
    }
}
