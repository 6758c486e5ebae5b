//! Latency-Gated Control Loop
//!
//! ## Overview
//!
//! `ControlLoop` runs once per camera frame on the control thread. It owns
//! the [`CommandChannel`], the [`ModelSwitcher`] and the [`LatencyTracker`]
//! and turns one prediction into at most one steering and one speed command.
//!
//! ## Per-Tick Sequence (Armed)
//!
//! 1. Run the active model on the frame, record the inference latency
//! 2. Forward any direction hint as a debounced automatic switch request
//! 3. Map the raw prediction to a servo angle and send it if it changed
//! 4. Latency gate: average above the threshold while moving sends a
//!    bypassing stop; otherwise a stopped vehicle is sent the forward speed
//! 5. Check the model switch timeout
//!
//! Idle ticks only run step 5. Disarming sends a single stop.
//!
//! ## Speed State
//!
//! `current_speed` changes only when a speed command actually goes out. A
//! forward command refused by the rate limiter leaves the vehicle recorded as
//! stopped, so the next tick tries again. A steering write counts toward the
//! interval, so a tick that changes the angle usually defers the forward
//! command to a later tick.

use serde::{Deserialize, Serialize};

use crate::channel::CommandChannel;
use crate::config::{ControlConfig, LoopConfig};
use crate::constants::protocol::{MOTOR_STOP, SERVO_CENTER_DEG};
use crate::errors::ControlResult;
use crate::latency::LatencyTracker;
use crate::link::{PortCandidate, SerialConnector};
use crate::perception::Perception;
use crate::protocol::Command;
use crate::steering::{
    angle_to_steering, clamp_forward_duty, display_to_steering, postprocess, steering_to_angle,
};
use crate::switcher::{ModelSwitcher, SwitchOutcome, SwitcherStatus};
use crate::time::{TimeSource, Timestamp};

/// Manual steering changes smaller than this are not sent (degrees)
const MANUAL_STEER_DEADBAND_DEG: u8 = 1;

/// Whether autonomous motion is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    /// No commands issued by ticks
    Idle,
    /// Ticks steer and gate speed
    Armed,
}

/// Operator input, decoupled from the input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Arm if idle, disarm if armed
    ToggleDrive,
    /// Arm
    Start,
    /// Disarm
    Stop,
    /// Manual model switch
    SelectModel(String),
    /// Leave the drive session
    Quit,
}

impl OperatorCommand {
    /// Map a keyboard key: `s` toggles, `q` quits, `1`-`9` select a model by position
    pub fn from_key(key: char, models: &[String]) -> Option<Self> {
        match key {
            's' | 'S' => Some(OperatorCommand::ToggleDrive),
            'q' | 'Q' => Some(OperatorCommand::Quit),
            '1'..='9' => {
                let index = key.to_digit(10)? as usize - 1;
                models
                    .get(index)
                    .map(|name| OperatorCommand::SelectModel(name.clone()))
            }
            _ => None,
        }
    }
}

/// What the caller should do after an operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Keep ticking
    Continue,
    /// Shut down
    Quit,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Loop idle; no perception, no commands
    Idle,
    /// Perception failed; frame skipped
    Skipped,
    /// Prediction processed
    Drove,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// What the tick did
    pub action: TickAction,
    /// Steering angle sent this tick
    pub steering_angle: Option<u8>,
    /// Speed command sent this tick
    pub speed_command: Option<i32>,
    /// Rolling average inference latency after this tick (seconds)
    pub average_latency_s: f32,
    /// True if the latency gate held the vehicle stopped
    pub latency_gated: bool,
    /// Outcome of a direction hint forwarded this tick
    pub switch_request: Option<SwitchOutcome>,
    /// True if the switch timeout reverted to the default model
    pub model_reverted: bool,
}

impl TickReport {
    fn new(action: TickAction, average_latency_s: f32) -> Self {
        Self {
            action,
            steering_angle: None,
            speed_command: None,
            average_latency_s,
            latency_gated: false,
            switch_request: None,
            model_reverted: false,
        }
    }
}

/// Serializable loop snapshot for overlays and telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatus {
    /// Idle or armed
    pub state: LoopState,
    /// Model switching state
    pub switcher: SwitcherStatus,
    /// Last normalized steering in [-1, 1]
    pub steering: f32,
    /// Last speed command that went out
    pub speed: i32,
    /// Forward duty used when moving
    pub forward_speed: u16,
    /// Rolling average inference latency
    pub average_latency_ms: u32,
    /// Last prediction on the 0-100 display scale
    pub last_display: Option<f32>,
    /// True while the serial link is open
    pub connected: bool,
}

/// Per-frame orchestrator
pub struct ControlLoop<C: TimeSource + Clone> {
    config: LoopConfig,
    channel: CommandChannel<C>,
    switcher: ModelSwitcher<C>,
    latency: LatencyTracker,
    clock: C,
    state: LoopState,
    current_steering: f32,
    last_angle: Option<u8>,
    current_speed: i32,
    forward_speed: u16,
    last_display: Option<f32>,
    latency_stop_at: Option<Timestamp>,
}

impl<C: TimeSource + Clone> ControlLoop<C> {
    /// Build an idle, unconnected loop over the loaded `models`
    pub fn new(config: &ControlConfig, models: &[&str], clock: C) -> ControlResult<Self> {
        config.validate()?;

        let switcher = ModelSwitcher::new(
            models,
            &config.switcher.default_model,
            config.switcher.policy(),
            clock.clone(),
        )?;
        let channel = CommandChannel::new(config.channel.clone(), clock.clone());

        Ok(Self {
            config: config.control.clone(),
            channel,
            switcher,
            latency: LatencyTracker::new(),
            clock,
            state: LoopState::Idle,
            current_steering: 0.0,
            last_angle: None,
            current_speed: MOTOR_STOP,
            forward_speed: clamp_forward_duty(config.control.forward_speed),
            last_display: None,
            latency_stop_at: None,
        })
    }

    /// Build a loop over the models a perception collaborator reports
    pub fn for_perception<P: Perception>(
        config: &ControlConfig,
        perception: &P,
        clock: C,
    ) -> ControlResult<Self> {
        let names = perception.available_models();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::new(config, &names, clock)
    }

    /// Connect the command channel
    pub fn connect(
        &mut self,
        connector: &mut dyn SerialConnector,
        candidates: &[PortCandidate],
    ) -> ControlResult<()> {
        self.channel.connect(connector, candidates)?;
        self.current_speed = MOTOR_STOP;
        self.last_angle = Some(SERVO_CENTER_DEG);
        self.current_steering = 0.0;
        Ok(())
    }

    /// Process one frame
    pub fn tick<P: Perception>(&mut self, frame: &P::Frame, perception: &mut P) -> TickReport {
        let mut report = match self.state {
            LoopState::Idle => TickReport::new(TickAction::Idle, self.latency.average()),
            LoopState::Armed => self.drive(frame, perception),
        };
        report.model_reverted = self.switcher.check_timeout();
        report
    }

    fn drive<P: Perception>(&mut self, frame: &P::Frame, perception: &mut P) -> TickReport {
        let prediction = match perception.predict(frame, self.switcher.active_model()) {
            Ok(prediction) => prediction,
            Err(e) => {
                log_warn!(
                    "Perception failed on '{}', skipping frame: {}",
                    self.switcher.active_model(),
                    e
                );
                return TickReport::new(TickAction::Skipped, self.latency.average());
            }
        };

        self.latency.record(prediction.elapsed_s);
        let mut report = TickReport::new(TickAction::Drove, self.latency.average());

        if let Some(hint) = prediction.direction_hint.as_deref() {
            match self.switcher.request_automatic(hint) {
                Ok(outcome) => report.switch_request = Some(outcome),
                Err(e) => log_warn!("Ignoring direction hint '{}': {}", hint, e),
            }
        }

        let display = postprocess(prediction.raw);
        self.last_display = Some(display);
        let steering = display_to_steering(display);
        self.current_steering = steering;
        let angle = steering_to_angle(steering);
        if self.last_angle != Some(angle) && self.send_steering(angle) {
            report.steering_angle = Some(angle);
        }

        let average = report.average_latency_s;
        if average > self.config.latency_threshold_s {
            report.latency_gated = true;
            if self.current_speed != MOTOR_STOP {
                log_warn!(
                    "Average latency {:.3}s above {:.3}s, stopping",
                    average,
                    self.config.latency_threshold_s
                );
                if self.send_speed(Command::MotorStop, true) {
                    report.speed_command = Some(MOTOR_STOP);
                    self.latency_stop_at = Some(self.clock.now());
                }
            }
        } else if self.current_speed == MOTOR_STOP {
            if self.resume_allowed() {
                let forward = Command::MotorForward(self.forward_speed);
                if self.send_speed(forward, false) {
                    report.speed_command = Some(forward.value());
                    self.latency_stop_at = None;
                }
            } else {
                report.latency_gated = true;
            }
        }

        report
    }

    fn resume_allowed(&self) -> bool {
        match self.latency_stop_at {
            Some(stopped_at) if self.config.resume_dwell_ms > 0 => {
                self.clock.elapsed_since(stopped_at) >= self.config.resume_dwell_ms
            }
            _ => true,
        }
    }

    fn send_steering(&mut self, angle: u8) -> bool {
        let sent = self.channel.send_command(i32::from(angle), false);
        if sent {
            self.last_angle = Some(angle);
        }
        sent
    }

    fn send_speed(&mut self, command: Command, bypass_rate_limit: bool) -> bool {
        let sent = self.channel.send(command, bypass_rate_limit).is_ok();
        if sent {
            self.current_speed = command.value();
        }
        sent
    }

    /// Arm autonomous driving; returns false if already armed
    pub fn start(&mut self) -> bool {
        if self.state == LoopState::Armed {
            return false;
        }
        log_info!("Autonomous driving armed");
        self.state = LoopState::Armed;
        true
    }

    /// Disarm and send one stop
    ///
    /// Returns true if the stop went out. The loop is idle afterwards either
    /// way; calling it while idle does nothing and returns false.
    pub fn stop(&mut self) -> bool {
        if self.state == LoopState::Idle {
            return false;
        }
        log_info!("Autonomous driving disarmed");
        self.state = LoopState::Idle;
        let sent = self.send_speed(Command::MotorStop, true);
        if !sent {
            log_warn!("Stop command on disarm did not go out");
        }
        sent
    }

    /// Flip between armed and idle
    pub fn toggle(&mut self) -> LoopState {
        match self.state {
            LoopState::Idle => {
                self.start();
            }
            LoopState::Armed => {
                self.stop();
            }
        }
        self.state
    }

    /// Apply an operator command
    pub fn handle_operator(&mut self, command: OperatorCommand) -> LoopControl {
        match command {
            OperatorCommand::ToggleDrive => {
                self.toggle();
            }
            OperatorCommand::Start => {
                self.start();
            }
            OperatorCommand::Stop => {
                self.stop();
            }
            OperatorCommand::SelectModel(name) => {
                self.request_model(&name);
            }
            OperatorCommand::Quit => return LoopControl::Quit,
        }
        LoopControl::Continue
    }

    /// Manual model switch; false if the model is unknown
    pub fn request_model(&mut self, name: &str) -> bool {
        self.switcher.switch_manual(name).is_ok()
    }

    /// Debounced automatic switch; true only once confirmed
    pub fn request_model_automatic(&mut self, name: &str) -> bool {
        self.switcher
            .request_automatic(name)
            .map_or(false, |outcome| outcome.is_confirmed())
    }

    /// Steer from a manual input in [-1, 1]
    ///
    /// Sends only when the angle moves by more than one degree. Returns true
    /// if a command went out.
    pub fn steer_manual(&mut self, steering: f32) -> bool {
        let angle = steering_to_angle(steering);
        let moved = self
            .last_angle
            .map_or(true, |last| last.abs_diff(angle) > MANUAL_STEER_DEADBAND_DEG);
        if !moved {
            return false;
        }
        let sent = self.send_steering(angle);
        if sent {
            self.current_steering = angle_to_steering(angle);
        }
        sent
    }

    /// Send a speed command immediately, bypassing the rate limiter
    pub fn set_speed_manual(&mut self, command: Command) -> bool {
        if command.is_servo() {
            return false;
        }
        self.send_speed(command, true)
    }

    /// Change the autonomous forward duty; returns the clamped value in use
    pub fn set_forward_speed(&mut self, duty: u16) -> u16 {
        self.forward_speed = clamp_forward_duty(duty);
        self.forward_speed
    }

    /// Disarm and run the channel's safe stop
    pub fn shutdown(&mut self) -> ControlResult<()> {
        self.state = LoopState::Idle;
        let result = self.channel.shutdown();
        self.current_speed = MOTOR_STOP;
        self.last_angle = None;
        result
    }

    /// Snapshot for displays
    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.state,
            switcher: self.switcher.status(),
            steering: self.current_steering,
            speed: self.current_speed,
            forward_speed: self.forward_speed,
            average_latency_ms: self.latency.average_ms(),
            last_display: self.last_display,
            connected: self.channel.is_connected(),
        }
    }

    /// Idle or armed
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Last speed command that went out
    pub fn current_speed(&self) -> i32 {
        self.current_speed
    }

    /// Last normalized steering
    pub fn current_steering(&self) -> f32 {
        self.current_steering
    }

    /// Forward duty used when moving
    pub fn forward_speed(&self) -> u16 {
        self.forward_speed
    }

    /// Name of the model driving steering
    pub fn active_model(&self) -> &str {
        self.switcher.active_model()
    }

    /// Command channel
    pub fn channel(&self) -> &CommandChannel<C> {
        &self.channel
    }

    /// Command channel, for diagnostics draining
    pub fn channel_mut(&mut self) -> &mut CommandChannel<C> {
        &mut self.channel
    }

    /// Model switcher
    pub fn switcher(&self) -> &ModelSwitcher<C> {
        &self.switcher
    }

    /// Latency window
    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ControlError;
    use crate::link::{LoopbackConnector, LoopbackHandle};
    use crate::perception::Prediction;
    use crate::time::MockTimeSource;
    use std::collections::VecDeque;

    /// Perception that replays scripted predictions
    struct Scripted {
        models: Vec<String>,
        queue: VecDeque<ControlResult<Prediction>>,
        asked_for: Vec<String>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                models: vec!["primary".into(), "curve".into()],
                queue: VecDeque::new(),
                asked_for: Vec::new(),
            }
        }

        fn push(&mut self, raw: f32, elapsed_s: f32) {
            self.queue.push_back(Ok(Prediction {
                raw,
                elapsed_s,
                direction_hint: None,
            }));
        }

        fn push_hint(&mut self, raw: f32, hint: &str) {
            self.queue.push_back(Ok(Prediction {
                raw,
                elapsed_s: 0.01,
                direction_hint: Some(hint.to_string()),
            }));
        }
    }

    impl Perception for Scripted {
        type Frame = ();

        fn available_models(&self) -> Vec<String> {
            self.models.clone()
        }

        fn predict(&mut self, _frame: &(), model: &str) -> ControlResult<Prediction> {
            self.asked_for.push(model.to_string());
            self.queue.pop_front().unwrap_or(Err(ControlError::Perception {
                reason: "script exhausted",
            }))
        }
    }

    fn test_config() -> ControlConfig {
        let mut config = ControlConfig::default();
        config.channel.settle_ms = 0;
        config.channel.shutdown_retry_delay_ms = 0;
        config
    }

    type Rig = (
        ControlLoop<MockTimeSource>,
        LoopbackHandle,
        MockTimeSource,
        Scripted,
    );

    fn armed_loop(config: &ControlConfig) -> Rig {
        let clock = MockTimeSource::new(0);
        let perception = Scripted::new();
        let mut control = ControlLoop::for_perception(config, &perception, clock.clone())
            .unwrap();
        let (mut connector, handle) = LoopbackConnector::new();
        control
            .connect(&mut connector, &LoopbackConnector::candidates())
            .unwrap();
        handle.clear_written();
        clock.advance(100);
        control.start();
        (control, handle, clock, perception)
    }

    #[test]
    fn idle_tick_issues_nothing() {
        let (mut control, handle, _clock, mut perception) = armed_loop(&test_config());
        control.stop();
        handle.clear_written();
        perception.push(0.5, 0.01);

        let report = control.tick(&(), &mut perception);
        assert_eq!(report.action, TickAction::Idle);
        assert!(handle.written().is_empty());
        assert!(perception.asked_for.is_empty());
    }

    #[test]
    fn armed_tick_steers_and_starts_moving() {
        let (mut control, handle, clock, mut perception) = armed_loop(&test_config());
        perception.push(0.5, 0.02);
        perception.push(0.5, 0.02);

        // The steering write arms the interval for the forward command
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.action, TickAction::Drove);
        // raw 0.5 → display 75 → steering 0.5 → 90 - 23
        assert_eq!(report.steering_angle, Some(67));
        assert_eq!(report.speed_command, None);
        assert_eq!(control.current_speed(), 0);

        clock.advance(50);
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.steering_angle, None);
        assert_eq!(report.speed_command, Some(450));
        assert_eq!(handle.written_values(), vec![67, 450]);
        assert_eq!(control.current_speed(), 450);
        assert_eq!(perception.asked_for, vec!["primary", "primary"]);
    }

    #[test]
    fn steering_change_delays_forward_until_interval_passes() {
        let (mut control, handle, clock, mut perception) = armed_loop(&test_config());
        perception.push(0.0, 0.01);
        control.tick(&(), &mut perception);
        control.stop();
        control.start();
        handle.clear_written();

        clock.advance(60);
        perception.push(-0.4, 0.01);
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.steering_angle, Some(108));
        assert_eq!(report.speed_command, None);

        clock.advance(30);
        perception.push(-0.4, 0.01);
        assert_eq!(control.tick(&(), &mut perception).speed_command, None);

        clock.advance(20);
        perception.push(-0.4, 0.01);
        assert_eq!(control.tick(&(), &mut perception).speed_command, Some(450));
        assert_eq!(handle.written_values(), vec![108, 450]);
    }

    #[test]
    fn unchanged_angle_is_not_resent() {
        let (mut control, handle, clock, mut perception) = armed_loop(&test_config());
        perception.push(0.0, 0.02);
        perception.push(0.0, 0.02);

        control.tick(&(), &mut perception);
        clock.advance(30);
        let report = control.tick(&(), &mut perception);

        assert_eq!(report.steering_angle, None);
        assert_eq!(report.speed_command, None);
        assert_eq!(handle.written_values(), vec![450]);
    }

    #[test]
    fn high_latency_stops_then_recovers() {
        let (mut control, handle, clock, mut perception) = armed_loop(&test_config());
        perception.push(0.0, 0.05);
        control.tick(&(), &mut perception);
        assert_eq!(control.current_speed(), 450);

        clock.advance(60);
        perception.push(0.0, 0.5);
        let report = control.tick(&(), &mut perception);
        assert!(report.latency_gated);
        assert_eq!(report.speed_command, Some(0));
        assert_eq!(control.current_speed(), 0);

        // Still above threshold: no repeated stop
        perception.push(0.0, 0.05);
        let report = control.tick(&(), &mut perception);
        assert!(report.latency_gated);
        assert_eq!(report.speed_command, None);

        // Flood the window with fast samples
        for _ in 0..20 {
            clock.advance(60);
            perception.push(0.0, 0.01);
            control.tick(&(), &mut perception);
        }
        assert_eq!(control.current_speed(), 450);
        assert_eq!(handle.written_values(), vec![450, 0, 450]);
    }

    #[test]
    fn latency_at_threshold_still_drives() {
        let (mut control, _handle, _clock, mut perception) = armed_loop(&test_config());
        perception.push(0.0, 0.1);

        let report = control.tick(&(), &mut perception);
        assert!(!report.latency_gated);
        assert_eq!(report.speed_command, Some(450));
    }

    #[test]
    fn resume_dwell_holds_vehicle() {
        let mut config = test_config();
        config.control.resume_dwell_ms = 500;
        let (mut control, _handle, clock, mut perception) = armed_loop(&config);

        perception.push(0.0, 0.05);
        control.tick(&(), &mut perception);
        clock.advance(60);
        perception.push(0.0, 2.0);
        control.tick(&(), &mut perception);
        assert_eq!(control.current_speed(), 0);

        // Twenty fast samples push the slow one out of the window
        for _ in 0..20 {
            clock.advance(10);
            perception.push(0.0, 0.01);
            control.tick(&(), &mut perception);
        }
        assert_eq!(control.current_speed(), 0);

        clock.advance(500);
        perception.push(0.0, 0.01);
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.speed_command, Some(450));
    }

    #[test]
    fn rate_limited_forward_retries_next_tick() {
        let (mut control, handle, clock, mut perception) = armed_loop(&test_config());
        assert!(control.set_speed_manual(Command::MotorStop));
        perception.push(0.0, 0.01);
        perception.push(0.0, 0.01);

        let report = control.tick(&(), &mut perception);
        assert_eq!(report.speed_command, None);
        assert_eq!(control.current_speed(), 0);

        clock.advance(50);
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.speed_command, Some(450));
        assert_eq!(handle.written_values(), vec![0, 450]);
    }

    #[test]
    fn perception_failure_skips_frame() {
        let (mut control, handle, _clock, mut perception) = armed_loop(&test_config());

        let report = control.tick(&(), &mut perception);
        assert_eq!(report.action, TickAction::Skipped);
        assert!(handle.written().is_empty());
        assert!(control.latency().is_empty());
    }

    #[test]
    fn direction_hints_are_debounced() {
        let (mut control, _handle, clock, mut perception) = armed_loop(&test_config());
        for _ in 0..3 {
            perception.push_hint(0.0, "curve");
        }

        control.tick(&(), &mut perception);
        control.tick(&(), &mut perception);
        assert_eq!(control.active_model(), "primary");
        let report = control.tick(&(), &mut perception);
        assert!(report.switch_request.unwrap().is_confirmed());
        assert_eq!(control.active_model(), "curve");

        clock.advance(7_000);
        perception.push(0.0, 0.01);
        let report = control.tick(&(), &mut perception);
        assert!(report.model_reverted);
        assert_eq!(control.active_model(), "primary");
        assert_eq!(
            perception.asked_for.last().map(String::as_str),
            Some("curve")
        );
    }

    #[test]
    fn timeout_runs_while_idle() {
        let (mut control, _handle, clock, mut perception) = armed_loop(&test_config());
        control.stop();
        assert!(control.request_model("curve"));

        clock.advance(7_000);
        let report = control.tick(&(), &mut perception);
        assert_eq!(report.action, TickAction::Idle);
        assert!(report.model_reverted);
    }

    #[test]
    fn stop_sends_exactly_one_stop() {
        let (mut control, handle, _clock, mut perception) = armed_loop(&test_config());
        perception.push(0.0, 0.01);
        control.tick(&(), &mut perception);
        handle.clear_written();

        assert!(control.stop());
        assert!(!control.stop());
        assert_eq!(handle.written_values(), vec![0]);
        assert_eq!(control.state(), LoopState::Idle);
    }

    #[test]
    fn operator_commands() {
        let (mut control, _handle, _clock, _perception) = armed_loop(&test_config());
        let models = vec!["primary".to_string(), "curve".to_string()];

        assert_eq!(
            OperatorCommand::from_key('2', &models),
            Some(OperatorCommand::SelectModel("curve".into()))
        );
        assert_eq!(OperatorCommand::from_key('3', &models), None);
        assert_eq!(OperatorCommand::from_key('x', &models), None);

        let select = OperatorCommand::from_key('2', &models).unwrap();
        assert_eq!(control.handle_operator(select), LoopControl::Continue);
        assert_eq!(control.active_model(), "curve");

        assert_eq!(
            control.handle_operator(OperatorCommand::ToggleDrive),
            LoopControl::Continue
        );
        assert_eq!(control.state(), LoopState::Idle);
        control.handle_operator(OperatorCommand::Start);
        assert_eq!(control.state(), LoopState::Armed);
        assert_eq!(
            control.handle_operator(OperatorCommand::Quit),
            LoopControl::Quit
        );
        assert!(!control.request_model("bogus"));
    }

    #[test]
    fn manual_steering_deadband() {
        let (mut control, handle, _clock, _perception) = armed_loop(&test_config());
        control.stop();
        handle.clear_written();

        // Centered after connect; 0.02 → 89 is inside the deadband, 0.1 → 85 is not
        assert!(!control.steer_manual(0.02));
        assert!(control.steer_manual(0.1));
        assert!(!control.steer_manual(0.12));
        assert!(control.steer_manual(-1.0));
        assert_eq!(handle.written_values(), vec![85, 135]);
        assert_eq!(control.current_steering(), -1.0);
    }

    #[test]
    fn manual_speed_and_forward_duty() {
        let (mut control, handle, _clock, _perception) = armed_loop(&test_config());

        assert!(control.set_speed_manual(Command::MotorReverse));
        assert!(control.set_speed_manual(Command::MotorStop));
        assert!(!control.set_speed_manual(Command::CENTER));
        assert_eq!(handle.written_values(), vec![-1, 0]);

        assert_eq!(control.set_forward_speed(5_000), 1023);
        assert_eq!(control.set_forward_speed(10), 181);
    }

    #[test]
    fn shutdown_disarms_and_closes() {
        let (mut control, handle, _clock, _perception) = armed_loop(&test_config());

        assert_eq!(control.shutdown(), Ok(()));
        assert_eq!(control.state(), LoopState::Idle);
        assert_eq!(handle.close_count(), 1);
        assert!(!control.status().connected);
    }

    #[test]
    fn status_snapshot() {
        let (mut control, _handle, clock, mut perception) = armed_loop(&test_config());
        perception.push(-1.0, 0.04);
        perception.push(-1.0, 0.04);
        control.tick(&(), &mut perception);
        clock.advance(50);
        control.tick(&(), &mut perception);

        let status = control.status();
        assert_eq!(status.state, LoopState::Armed);
        assert_eq!(status.speed, 450);
        assert_eq!(status.steering, -1.0);
        assert_eq!(status.average_latency_ms, 40);
        assert_eq!(status.last_display, Some(0.0));
        assert_eq!(status.switcher.active_model, "primary");
        assert!(status.connected);
    }
}
