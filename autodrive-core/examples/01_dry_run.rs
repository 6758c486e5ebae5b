//! Dry Run Example
//!
//! Drives the full control core against a loopback device instead of a
//! vehicle: a lane-following model on the default slot, a curve model the
//! lane follower asks for when the lane bends hard, and a short session of
//! synthetic frames.
//!
//! ## What You'll Learn
//!
//! - Wrapping models in a `ModelSet` so the loop can time them
//! - Connecting, arming and ticking a `ControlLoop`
//! - Reading back the commands the device would have received
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_dry_run
//! ```

use std::thread;
use std::time::Duration;

use autodrive_core::{
    config::ControlConfig,
    control::ControlLoop,
    errors::ControlResult,
    link::LoopbackConnector,
    perception::{ModelOutput, ModelSet, SteeringModel},
    time::MonotonicClock,
};

/// Frame: lateral lane offset in [-1, 1] as a camera pipeline might report it
type LaneOffset = f32;

struct LaneModel {
    name: &'static str,
    gain: f32,
    /// Offset magnitude above which the model asks for the curve model
    curve_above: Option<f32>,
}

impl SteeringModel<LaneOffset> for LaneModel {
    fn name(&self) -> &str {
        self.name
    }

    fn predict(&mut self, frame: &LaneOffset) -> ControlResult<ModelOutput> {
        let mut output = ModelOutput::steering((frame * self.gain).clamp(-1.0, 1.0));
        if let Some(limit) = self.curve_above {
            if frame.abs() > limit {
                output.direction_hint = Some("curve".to_string());
            }
        }
        Ok(output)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("autodrive Dry Run Example");
    println!("=========================\n");

    let mut perception = ModelSet::new(vec![
        LaneModel {
            name: "primary",
            gain: 0.8,
            curve_above: Some(0.6),
        },
        LaneModel {
            name: "curve",
            gain: 1.2,
            curve_above: None,
        },
    ]);

    let mut config = ControlConfig::default();
    config.channel.settle_ms = 5;
    let clock = MonotonicClock::new();
    let mut control = ControlLoop::for_perception(&config, &perception, clock)?;

    let (mut connector, device) = LoopbackConnector::new();
    control.connect(&mut connector, &LoopbackConnector::candidates())?;
    println!("Connected; init commands: {:?}", device.written_values());
    device.clear_written();

    // Let the rate-limit interval armed by the init commands expire
    thread::sleep(Duration::from_millis(60));
    control.start();

    let offsets = [0.0, 0.1, 0.3, 0.7, 0.75, 0.8, 0.5, 0.2, -0.1, -0.3];
    for (i, offset) in offsets.iter().enumerate() {
        let report = control.tick(offset, &mut perception);
        println!(
            "frame {:2}: offset {:+.2} model {:8} angle {:>4} speed {:>4} latency {:.3}s",
            i,
            offset,
            control.active_model(),
            report
                .steering_angle
                .map_or("-".to_string(), |a| a.to_string()),
            report
                .speed_command
                .map_or("-".to_string(), |s| s.to_string()),
            report.average_latency_s,
        );
        thread::sleep(Duration::from_millis(33));
    }

    println!("\nStatus:\n{}", serde_json::to_string_pretty(&control.status())?);

    control.shutdown()?;
    println!("\nWire traffic: {:?}", device.written_values());
    println!("Port closed: {}", !device.is_open());

    Ok(())
}
