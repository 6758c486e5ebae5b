//! Rate-Limited Serial Command Channel
//!
//! ## Overview
//!
//! `CommandChannel` owns the connection to the vehicle's microcontroller. It
//! is the only path commands take to the wire and it enforces three rules:
//!
//! 1. **Rate limiting**: a motor command less than `min_send_interval_ms`
//!    after the previous write of any kind is rejected. Steering angles are
//!    exempt from the check so the servo never lags the perception loop, but
//!    they still count as writes. Callers may bypass the limiter for safety
//!    stops.
//! 2. **Single access**: one mutex guards the link and its send timestamps.
//!    The background reader and the control thread each hold it for one I/O
//!    operation at a time, never across a sleep.
//! 3. **Safe shutdown**: before the link is released the channel tries a
//!    bounded number of times to stop the motor and center the steering.
//!
//! ## Threads
//!
//! ```text
//!  control thread                       reader thread
//!  ──────────────                       ─────────────
//!  try_send_command ─┐              ┌── bytes_available / read_line
//!                    ▼              ▼
//!              Arc<Mutex<LinkSlot>> (link, last send times)
//!                                   │
//!                                   └─▶ crossbeam bounded queue ─▶ drain_diagnostics
//! ```
//!
//! The reader surfaces device text as diagnostics only; nothing it reads
//! influences control.
//!
//! ## Failure Semantics
//!
//! Sends never panic. `try_send_command` returns a typed error and
//! `send_command` collapses it to a bool. A failed send is not retried: a
//! dropped frame is preferable to a late one. Only `shutdown` retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::ChannelConfig;
use crate::constants::protocol::{MOTOR_STOP, SERVO_CENTER_DEG};
use crate::errors::{ControlError, ControlResult};
use crate::link::{LinkError, PortCandidate, SerialConnector, SerialLink};
use crate::protocol::Command;
use crate::time::{TimeSource, Timestamp};

/// Connection plus the timing state guarded with it
struct LinkSlot {
    link: Option<Box<dyn SerialLink>>,
    /// Last successful write of any command, steering included
    last_send_time: Option<Timestamp>,
}

fn lock_slot(slot: &Mutex<LinkSlot>) -> MutexGuard<'_, LinkSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters for the life of a channel
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    /// Commands written and flushed
    pub commands_sent: u64,
    /// Commands rejected by the rate limiter
    pub commands_rate_limited: u64,
    /// Commands that failed on the link
    pub commands_failed: u64,
    /// Device lines received
    pub diagnostics_received: u64,
    /// Successful connections
    pub connections: u32,
}

/// Owner of the serial connection to the vehicle
pub struct CommandChannel<C: TimeSource> {
    config: ChannelConfig,
    clock: C,
    slot: Arc<Mutex<LinkSlot>>,
    stop_reader: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    diagnostics: Option<Receiver<String>>,
    last_diagnostic: Option<String>,
    port_name: Option<String>,
    stats: ChannelStats,
}

impl<C: TimeSource> CommandChannel<C> {
    /// Create an unconnected channel
    pub fn new(config: ChannelConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            slot: Arc::new(Mutex::new(LinkSlot {
                link: None,
                last_send_time: None,
            })),
            stop_reader: Arc::new(AtomicBool::new(false)),
            reader: None,
            diagnostics: None,
            last_diagnostic: None,
            port_name: None,
            stats: ChannelStats::default(),
        }
    }

    /// Probe `candidates` and open the first matching port
    ///
    /// Ports whose description does not contain the configured pattern are
    /// skipped; ports that fail to open are logged and skipped. On success the
    /// buffers are cleared, the reader thread started and the vehicle put in
    /// a known state (centered, stopped). A missing device is reported once
    /// and not retried.
    pub fn connect(
        &mut self,
        connector: &mut dyn SerialConnector,
        candidates: &[PortCandidate],
    ) -> ControlResult<()> {
        if self.is_connected() {
            log_warn!("Already connected to {:?}", self.port_name);
            return Ok(());
        }

        let pattern = self.config.port_pattern.as_str();
        let mut opened = None;
        for candidate in candidates.iter().filter(|c| c.matches(pattern)) {
            match connector.open(candidate) {
                Ok(link) => {
                    opened = Some((candidate.name.clone(), link));
                    break;
                }
                Err(e) => log_warn!("Skipping {}: {}", candidate.name, e),
            }
        }

        let (port_name, mut link) = match opened {
            Some(found) => found,
            None => {
                log_error!(
                    "No device matching '{}' among {} ports",
                    pattern,
                    candidates.len()
                );
                return Err(ControlError::ConnectionNotFound {
                    probed: candidates.len(),
                });
            }
        };

        if let Err(e) = link.clear_buffers() {
            log_warn!("Could not clear buffers on {}: {}", port_name, e);
        }

        {
            let mut slot = lock_slot(&self.slot);
            slot.link = Some(link);
            slot.last_send_time = None;
        }

        log_info!("Connected to {}", port_name);
        self.port_name = Some(port_name);
        self.stats.connections += 1;
        self.start_reader()?;

        self.settle();
        for command in [Command::CENTER, Command::MotorStop] {
            if let Err(e) = self.send(command, true) {
                log_warn!("Initialization command {:?} failed: {}", command, e);
            }
            self.settle();
        }

        Ok(())
    }

    /// Send a raw command value
    ///
    /// Values in the servo range skip the interval check. Other values are
    /// rejected with [`ControlError::RateLimited`] if the last successful
    /// write, steering included, went out less than `min_send_interval_ms`
    /// ago, unless `bypass_rate_limit` is set.
    pub fn try_send_command(&mut self, value: i32, bypass_rate_limit: bool) -> ControlResult<()> {
        let command = Command::from_value(value)?;
        let is_servo = self.is_servo_value(value);
        let now = self.clock.now();

        let mut slot = lock_slot(&self.slot);
        if slot.link.is_none() {
            return Err(ControlError::NotConnected);
        }

        if !bypass_rate_limit && !is_servo {
            if let Some(last) = slot.last_send_time {
                let elapsed_ms = now.saturating_sub(last);
                if elapsed_ms < self.config.min_send_interval_ms {
                    self.stats.commands_rate_limited += 1;
                    log_debug!(
                        "Rate limited {}: {}ms since last write",
                        value,
                        elapsed_ms
                    );
                    return Err(ControlError::RateLimited {
                        value,
                        elapsed_ms,
                        min_interval_ms: self.config.min_send_interval_ms,
                    });
                }
            }
        }

        let line = command.encode();
        let result = match slot.link.as_mut() {
            Some(link) => link.write_line(&line).and_then(|()| link.flush()),
            None => Err(LinkError::Closed),
        };

        match result {
            Ok(()) => {
                slot.last_send_time = Some(now);
                self.stats.commands_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.commands_failed += 1;
                log_warn!("Failed to send {}: {}", value, e);
                Err(ControlError::TransientIo {
                    operation: e.operation(),
                })
            }
        }
    }

    /// Send a raw command value, reporting only success
    pub fn send_command(&mut self, value: i32, bypass_rate_limit: bool) -> bool {
        self.try_send_command(value, bypass_rate_limit).is_ok()
    }

    /// Send a typed command
    pub fn send(&mut self, command: Command, bypass_rate_limit: bool) -> ControlResult<()> {
        self.try_send_command(command.value(), bypass_rate_limit)
    }

    /// Stop the vehicle and release the connection
    ///
    /// Up to `shutdown_attempts` times: send stop, and once it goes out send
    /// center steering. The reader is then stopped with a bounded wait and
    /// the link closed exactly once, whether or not a stop got through.
    /// Returns [`ControlError::ShutdownIncomplete`] if no stop was confirmed.
    /// Calling it on a closed channel does nothing.
    pub fn shutdown(&mut self) -> ControlResult<()> {
        if !self.is_connected() {
            self.stop_reader();
            return Ok(());
        }

        let attempts = self.config.shutdown_attempts;
        log_info!("Safe stop: up to {} attempts", attempts);

        let mut confirmed = false;
        for attempt in 1..=attempts {
            if self.try_send_command(MOTOR_STOP, true).is_ok() {
                self.settle();
                if let Err(e) = self.try_send_command(i32::from(SERVO_CENTER_DEG), true) {
                    log_warn!("Motor stopped but centering failed: {}", e);
                }
                self.settle();
                confirmed = true;
                break;
            }

            log_warn!("Safe stop attempt {}/{} failed", attempt, attempts);
            if attempt < attempts {
                thread::sleep(Duration::from_millis(self.config.shutdown_retry_delay_ms));
            }
        }

        self.stop_reader();
        self.close_link();

        if confirmed {
            log_info!("Command channel closed");
            Ok(())
        } else {
            log_error!(
                "Safe stop not confirmed after {} attempts; connection released anyway",
                attempts
            );
            Err(ControlError::ShutdownIncomplete { attempts })
        }
    }

    /// True while a link is held
    pub fn is_connected(&self) -> bool {
        lock_slot(&self.slot).link.is_some()
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Time of the last successful write
    pub fn last_send_time(&self) -> Option<Timestamp> {
        lock_slot(&self.slot).last_send_time
    }

    /// True if `value` is a steering angle exempt from rate limiting
    pub fn is_servo_value(&self, value: i32) -> bool {
        let min = i32::from(self.config.servo_min_deg);
        let max = i32::from(self.config.servo_max_deg);
        (min..=max).contains(&value)
    }

    /// Most recent device line
    pub fn last_diagnostic(&mut self) -> Option<&str> {
        self.pull_diagnostics(|_| ());
        self.last_diagnostic.as_deref()
    }

    /// All device lines received since the last drain, oldest first
    pub fn drain_diagnostics(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        self.pull_diagnostics(|line| lines.push(line.to_string()));
        lines
    }

    /// Channel counters
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Active configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn pull_diagnostics(&mut self, mut each: impl FnMut(&str)) {
        let Some(rx) = self.diagnostics.as_ref() else {
            return;
        };
        for line in rx.try_iter() {
            self.stats.diagnostics_received += 1;
            each(&line);
            self.last_diagnostic = Some(line);
        }
    }

    fn start_reader(&mut self) -> ControlResult<()> {
        let (tx, rx) = crossbeam_channel::bounded(self.config.diagnostic_queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let slot = Arc::clone(&self.slot);
        let poll = Duration::from_millis(self.config.reader_poll_interval_ms);

        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || reader_loop(&slot, &thread_stop, &tx, poll))
            .map_err(|e| {
                log_error!("Failed to start serial reader: {}", e);
                ControlError::TransientIo {
                    operation: "spawn reader",
                }
            })?;

        self.stop_reader = stop;
        self.reader = Some(handle);
        self.diagnostics = Some(rx);
        Ok(())
    }

    fn stop_reader(&mut self) {
        self.stop_reader.store(true, Ordering::Release);
        let Some(handle) = self.reader.take() else {
            return;
        };

        let timeout = Duration::from_millis(self.config.reader_join_timeout_ms);
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log_warn!("Serial reader panicked");
            }
        } else {
            log_warn!(
                "Serial reader did not stop within {}ms, leaving it detached",
                timeout.as_millis()
            );
        }
    }

    fn close_link(&mut self) {
        let link = lock_slot(&self.slot).link.take();
        if let Some(mut link) = link {
            if let Err(e) = link.close() {
                log_warn!("Error closing link: {}", e);
            }
        }
        self.pull_diagnostics(|_| ());
        self.diagnostics = None;
        self.port_name = None;
    }

    fn settle(&self) {
        if self.config.settle_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.settle_ms));
        }
    }
}

impl<C: TimeSource> Drop for CommandChannel<C> {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.shutdown();
        } else {
            self.stop_reader();
        }
    }
}

fn reader_loop(
    slot: &Mutex<LinkSlot>,
    stop: &AtomicBool,
    diagnostics: &Sender<String>,
    poll: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        let result = {
            let mut slot = lock_slot(slot);
            let Some(link) = slot.link.as_mut() else {
                break;
            };
            match link.bytes_available() {
                Ok(0) => Err(nb::Error::WouldBlock),
                Ok(_) => link.read_line(),
                Err(e) => Err(nb::Error::Other(e)),
            }
        };

        match result {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    log_debug!("Device: {}", line);
                    match diagnostics.try_send(line.to_string()) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(e)) => {
                if e.is_fatal() {
                    log_warn!("Serial reader stopping: {}", e);
                    break;
                }
                log_warn!("Serial read failed: {}", e);
            }
        }

        thread::sleep(poll);
    }
}
