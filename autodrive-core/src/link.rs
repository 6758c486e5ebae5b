//! Serial Link Abstraction
//!
//! [`CommandChannel`](crate::channel::CommandChannel) talks to the vehicle
//! through the [`SerialLink`] trait rather than a concrete port type. That
//! keeps the channel's locking, rate limiting and shutdown logic independent
//! of the OS serial API, and lets the whole control stack run against the
//! in-memory [`LoopbackLink`] when no hardware is attached.
//!
//! ## Read Semantics
//!
//! `read_line` follows the `nb` convention:
//! - `Ok(line)`: one complete line, terminator stripped
//! - `Err(nb::Error::WouldBlock)`: no complete line available yet
//! - `Err(nb::Error::Other(e))`: the link failed
//!
//! The reader thread never blocks waiting for data; it polls and sleeps.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror_no_std::Error;

/// Errors reported by a serial link
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The link has been closed or the device disappeared
    #[error("Link closed")]
    Closed,

    /// Opening the port failed
    #[error("Failed to open {port}: {detail}")]
    Open {
        /// Port that failed
        port: String,
        /// OS error description
        detail: String,
    },

    /// A write or flush failed
    #[error("Write failed: {0}")]
    Write(String),

    /// A read failed
    #[error("Read failed: {0}")]
    Read(String),
}

impl LinkError {
    /// True if the link cannot recover and the reader should stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Closed)
    }

    /// Short operation name for [`crate::errors::ControlError::TransientIo`]
    pub fn operation(&self) -> &'static str {
        match self {
            LinkError::Closed => "closed",
            LinkError::Open { .. } => "open",
            LinkError::Write(_) => "write",
            LinkError::Read(_) => "read",
        }
    }
}

/// Byte-level connection to the microcontroller
///
/// Implementations are used from two threads, one at a time, behind the
/// channel's mutex.
pub trait SerialLink: Send {
    /// Write one encoded command line
    fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Flush pending output to the device
    fn flush(&mut self) -> Result<(), LinkError>;

    /// Bytes waiting to be read
    fn bytes_available(&mut self) -> Result<usize, LinkError>;

    /// Read one complete line without blocking for longer than the link's read timeout
    fn read_line(&mut self) -> nb::Result<String, LinkError>;

    /// Discard anything buffered in either direction
    fn clear_buffers(&mut self) -> Result<(), LinkError>;

    /// Release the device
    fn close(&mut self) -> Result<(), LinkError>;
}

/// A serial port that could be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// OS port name, e.g. `/dev/ttyUSB0` or `COM3`
    pub name: String,
    /// Human-readable description used for matching
    pub description: String,
}

impl PortCandidate {
    /// Create a candidate
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// True if the description or name contains `pattern`
    ///
    /// An empty pattern matches every port.
    pub fn matches(&self, pattern: &str) -> bool {
        self.description.contains(pattern) || self.name.contains(pattern)
    }
}

/// Opens serial links
pub trait SerialConnector {
    /// Open `port` and return a ready link
    fn open(&mut self, port: &PortCandidate) -> Result<Box<dyn SerialLink>, LinkError>;
}

// ===== LOOPBACK =====

#[derive(Debug)]
struct LoopbackState {
    open: bool,
    written: Vec<String>,
    incoming: VecDeque<String>,
    failing_writes: usize,
    fail_all_writes: bool,
    clear_count: usize,
    close_count: usize,
}

impl Default for LoopbackState {
    fn default() -> Self {
        Self {
            open: true,
            written: Vec::new(),
            incoming: VecDeque::new(),
            failing_writes: 0,
            fail_all_writes: false,
            clear_count: 0,
            close_count: 0,
        }
    }
}

fn lock_state(state: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory serial link
///
/// Records every written line and replays scripted device output. Failures
/// can be injected through the paired [`LoopbackHandle`].
#[derive(Debug)]
pub struct LoopbackLink {
    state: Arc<Mutex<LoopbackState>>,
}

/// Inspection and scripting handle for a [`LoopbackLink`]
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackLink {
    /// Create an open link and its handle
    pub fn new() -> (Self, LoopbackHandle) {
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            LoopbackHandle { state },
        )
    }
}

impl SerialLink for LoopbackLink {
    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut state = lock_state(&self.state);
        if !state.open {
            return Err(LinkError::Closed);
        }
        if state.fail_all_writes {
            return Err(LinkError::Write("injected failure".to_string()));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(LinkError::Write("injected failure".to_string()));
        }
        state.written.push(line.trim_end().to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        if lock_state(&self.state).open {
            Ok(())
        } else {
            Err(LinkError::Closed)
        }
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        let state = lock_state(&self.state);
        if !state.open {
            return Err(LinkError::Closed);
        }
        Ok(state.incoming.iter().map(|line| line.len() + 1).sum())
    }

    fn read_line(&mut self) -> nb::Result<String, LinkError> {
        let mut state = lock_state(&self.state);
        if !state.open {
            return Err(nb::Error::Other(LinkError::Closed));
        }
        state.incoming.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn clear_buffers(&mut self) -> Result<(), LinkError> {
        let mut state = lock_state(&self.state);
        state.incoming.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let mut state = lock_state(&self.state);
        state.open = false;
        state.close_count += 1;
        Ok(())
    }
}

impl LoopbackHandle {
    /// Lines written so far, terminators stripped
    pub fn written(&self) -> Vec<String> {
        lock_state(&self.state).written.clone()
    }

    /// Written lines parsed as command values; unparsable lines are skipped
    pub fn written_values(&self) -> Vec<i32> {
        lock_state(&self.state)
            .written
            .iter()
            .filter_map(|line| line.parse().ok())
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_written(&self) {
        lock_state(&self.state).written.clear();
    }

    /// Queue a line for the device to "send"
    pub fn push_incoming(&self, line: impl Into<String>) {
        lock_state(&self.state).incoming.push_back(line.into());
    }

    /// Lines queued but not yet read
    pub fn pending_incoming(&self) -> usize {
        lock_state(&self.state).incoming.len()
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        lock_state(&self.state).failing_writes = count;
    }

    /// Make every write fail until turned off
    pub fn fail_all_writes(&self, fail: bool) {
        lock_state(&self.state).fail_all_writes = fail;
    }

    /// Simulate the device disappearing
    pub fn disconnect(&self) {
        lock_state(&self.state).open = false;
    }

    /// True until closed or disconnected
    pub fn is_open(&self) -> bool {
        lock_state(&self.state).open
    }

    /// Number of `close` calls received
    pub fn close_count(&self) -> usize {
        lock_state(&self.state).close_count
    }

    /// Number of `clear_buffers` calls received
    pub fn clear_count(&self) -> usize {
        lock_state(&self.state).clear_count
    }
}

/// Connector that hands out one [`LoopbackLink`]
///
/// Ports listed with [`reject`](Self::reject) fail to open, which exercises
/// the channel's probing of later candidates.
#[derive(Debug)]
pub struct LoopbackConnector {
    link: Option<LoopbackLink>,
    rejected: Vec<String>,
    attempts: Vec<String>,
}

impl LoopbackConnector {
    /// Create a connector and the handle of the link it will hand out
    pub fn new() -> (Self, LoopbackHandle) {
        let (link, handle) = LoopbackLink::new();
        (
            Self {
                link: Some(link),
                rejected: Vec::new(),
                attempts: Vec::new(),
            },
            handle,
        )
    }

    /// Candidate list containing one matching loopback port
    pub fn candidates() -> Vec<PortCandidate> {
        vec![PortCandidate::new("loopback0", "Loopback USB Serial")]
    }

    /// Refuse to open the named port
    pub fn reject(mut self, port: impl Into<String>) -> Self {
        self.rejected.push(port.into());
        self
    }

    /// Ports `open` was called with, in order
    pub fn attempts(&self) -> &[String] {
        &self.attempts
    }
}

impl SerialConnector for LoopbackConnector {
    fn open(&mut self, port: &PortCandidate) -> Result<Box<dyn SerialLink>, LinkError> {
        self.attempts.push(port.name.clone());
        if self.rejected.contains(&port.name) {
            return Err(LinkError::Open {
                port: port.name.clone(),
                detail: "device did not respond".to_string(),
            });
        }
        match self.link.take() {
            Some(link) => Ok(Box::new(link)),
            None => Err(LinkError::Open {
                port: port.name.clone(),
                detail: "loopback link already in use".to_string(),
            }),
        }
    }
}
