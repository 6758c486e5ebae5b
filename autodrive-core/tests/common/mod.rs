//! Common test utilities for integration tests
//!
//! This module provides:
//! - A control rig: mock clock, loopback device and fast-settling config
//! - A scripted perception collaborator
//! - Assertion helpers for wire traffic

#![allow(dead_code)]

use std::collections::VecDeque;

use autodrive_core::{
    channel::CommandChannel,
    config::ControlConfig,
    control::ControlLoop,
    errors::{ControlError, ControlResult},
    link::{LoopbackConnector, LoopbackHandle},
    perception::{Perception, Prediction},
    time::MockTimeSource,
};

/// Configuration with no settle or retry sleeps
pub fn fast_config() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.channel.settle_ms = 0;
    config.channel.shutdown_retry_delay_ms = 0;
    config.channel.reader_join_timeout_ms = 500;
    config.switcher.default_model = "laneD1".to_string();
    config
}

/// Command channel connected to a loopback device
///
/// The init pair is cleared from the record and the clock moved past the
/// rate-limit interval it armed.
pub struct ChannelRig {
    pub channel: CommandChannel<MockTimeSource>,
    pub device: LoopbackHandle,
    pub clock: MockTimeSource,
}

impl ChannelRig {
    pub fn connected() -> Self {
        Self::connected_with(fast_config())
    }

    pub fn connected_with(config: ControlConfig) -> Self {
        let clock = MockTimeSource::new(10_000);
        let mut channel = CommandChannel::new(config.channel, clock.clone());
        let (mut connector, device) = LoopbackConnector::new();
        channel
            .connect(&mut connector, &LoopbackConnector::candidates())
            .expect("loopback connects");
        device.clear_written();
        clock.advance(1_000);
        Self {
            channel,
            device,
            clock,
        }
    }
}

/// Control loop connected to a loopback device and armed
pub struct LoopRig {
    pub control: ControlLoop<MockTimeSource>,
    pub device: LoopbackHandle,
    pub clock: MockTimeSource,
    pub perception: ScriptedPerception,
}

impl LoopRig {
    pub fn armed() -> Self {
        Self::armed_with(fast_config())
    }

    pub fn armed_with(config: ControlConfig) -> Self {
        let clock = MockTimeSource::new(10_000);
        let perception = ScriptedPerception::new(&["laneD1", "laneD2"]);
        let mut control = ControlLoop::for_perception(&config, &perception, clock.clone())
            .expect("valid config");
        let (mut connector, device) = LoopbackConnector::new();
        control
            .connect(&mut connector, &LoopbackConnector::candidates())
            .expect("loopback connects");
        device.clear_written();
        clock.advance(1_000);
        control.start();
        Self {
            control,
            device,
            clock,
            perception,
        }
    }

    /// Queue one prediction and tick once
    pub fn drive(&mut self, raw: f32, elapsed_s: f32) -> autodrive_core::control::TickReport {
        self.perception.push(raw, elapsed_s, None);
        self.control.tick(&(), &mut self.perception)
    }

    /// Queue one prediction with a direction hint and tick once
    pub fn drive_with_hint(&mut self, raw: f32, hint: &str) -> autodrive_core::control::TickReport {
        self.perception.push(raw, 0.01, Some(hint));
        self.control.tick(&(), &mut self.perception)
    }
}

/// Perception collaborator that replays queued predictions
pub struct ScriptedPerception {
    models: Vec<String>,
    queue: VecDeque<Prediction>,
    pub requested_models: Vec<String>,
}

impl ScriptedPerception {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            queue: VecDeque::new(),
            requested_models: Vec::new(),
        }
    }

    pub fn push(&mut self, raw: f32, elapsed_s: f32, hint: Option<&str>) {
        self.queue.push_back(Prediction {
            raw,
            elapsed_s,
            direction_hint: hint.map(str::to_string),
        });
    }
}

impl Perception for ScriptedPerception {
    type Frame = ();

    fn available_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn predict(&mut self, _frame: &(), model: &str) -> ControlResult<Prediction> {
        self.requested_models.push(model.to_string());
        self.queue.pop_front().ok_or(ControlError::Perception {
            reason: "no frame scripted",
        })
    }
}

/// Assert the exact command values the device received
pub fn assert_wire(device: &LoopbackHandle, expected: &[i32]) {
    assert_eq!(device.written_values(), expected, "wire traffic");
}
