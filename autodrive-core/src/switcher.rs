//! Model Switch State Machine
//!
//! ## Overview
//!
//! Several perception models can drive steering; exactly one is active. The
//! default model handles ordinary road, specialized models take over for
//! conditions such as tight curves. `ModelSwitcher` decides which one runs.
//!
//! ## Transitions
//!
//! ```text
//!                 manual(name) / auto(name) × threshold
//!   ┌─────────┐ ───────────────────────────────────────▶ ┌─────────────┐
//!   │ default │                                          │ specialized │
//!   └─────────┘ ◀─────────────────────────────────────── └─────────────┘
//!                  timeout elapsed / manual(default)
//! ```
//!
//! - **Manual**: immediate and unconditional. Re-selecting the active model
//!   only refreshes the switch timer.
//! - **Automatic**: debounced. A request is honored once the same name has
//!   been requested `confirmation_threshold` times in a row; any other name in
//!   between resets the run. Until then the request is `Pending` and nothing
//!   changes.
//! - **Timeout**: a specialized model that has not been reasserted for
//!   `timeout_ms` reverts to the default. Reassertion happens through manual
//!   re-selection or a confirmed automatic keep-alive.
//!
//! Unknown model names are rejected on both paths without touching state.
//!
//! ## Example
//!
//! ```rust
//! use autodrive_core::switcher::{ModelSwitcher, SwitchPolicy, SwitchOutcome};
//! use autodrive_core::time::MockTimeSource;
//!
//! let clock = MockTimeSource::new(0);
//! let mut switcher = ModelSwitcher::new(
//!     &["laneD1", "laneD2"],
//!     "laneD1",
//!     SwitchPolicy::default(),
//!     clock.clone(),
//! ).unwrap();
//!
//! assert!(!switcher.request_automatic("laneD2").unwrap().is_confirmed());
//! assert!(!switcher.request_automatic("laneD2").unwrap().is_confirmed());
//! assert!(switcher.request_automatic("laneD2").unwrap().is_confirmed());
//! assert_eq!(switcher.active_model(), "laneD2");
//!
//! clock.advance(7_000);
//! assert!(switcher.check_timeout());
//! assert_eq!(switcher.active_model(), "laneD1");
//! ```

use heapless::{String, Vec};

use crate::constants::timing::{MODEL_SWITCH_TIMEOUT_MS, SWITCH_CONFIRMATION_COUNT};
use crate::errors::{ControlError, ControlResult};
use crate::time::{TimeSource, Timestamp};

/// Maximum number of models a switcher can hold
pub const MAX_MODELS: usize = 8;

/// Maximum length of a model name in bytes
pub const MODEL_NAME_CAPACITY: usize = 24;

/// Fixed-capacity model name
pub type ModelName = String<MODEL_NAME_CAPACITY>;

/// Build a [`ModelName`], rejecting names that do not fit
pub fn model_name(name: &str) -> ControlResult<ModelName> {
    let mut out = ModelName::new();
    out.push_str(name).map_err(|_| ControlError::ModelNameTooLong {
        capacity: MODEL_NAME_CAPACITY,
    })?;
    Ok(out)
}

/// Timing and debounce parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPolicy {
    /// Time a non-default model stays active without reassertion
    pub timeout_ms: u64,
    /// Consecutive automatic requests needed to confirm a switch
    pub confirmation_threshold: u8,
}

impl Default for SwitchPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: MODEL_SWITCH_TIMEOUT_MS,
            confirmation_threshold: SWITCH_CONFIRMATION_COUNT,
        }
    }
}

/// What triggered a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOrigin {
    /// Operator selection
    Manual,
    /// Confirmed automatic request
    Automatic,
    /// Reversion after the switch timeout
    Timeout,
}

/// Result of a switch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The active model changed
    Switched {
        /// Newly active model
        to: ModelName,
        /// What caused the change
        origin: SwitchOrigin,
    },
    /// The requested model was already active; the timer was refreshed
    KeepAlive,
    /// Automatic request counted but not yet confirmed
    Pending {
        /// Consecutive requests so far
        count: u8,
        /// Requests needed
        required: u8,
    },
}

impl SwitchOutcome {
    /// True unless the request is still pending
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, SwitchOutcome::Pending { .. })
    }
}

/// Chooses which loaded model drives steering
pub struct ModelSwitcher<C: TimeSource> {
    models: Vec<ModelName, MAX_MODELS>,
    /// Index into `models`
    default_index: usize,
    /// Index into `models`
    active_index: usize,
    last_non_default: Option<usize>,
    /// Consecutive automatic requests, indexed like `models`
    pending: [u8; MAX_MODELS],
    last_switch_time: Timestamp,
    policy: SwitchPolicy,
    clock: C,
}

impl<C: TimeSource> ModelSwitcher<C> {
    /// Create a switcher over the loaded `models`
    ///
    /// Duplicate names are loaded once. If `default_model` is not among them
    /// the first loaded model becomes the default. The default starts active.
    pub fn new(
        models: &[&str],
        default_model: &str,
        policy: SwitchPolicy,
        clock: C,
    ) -> ControlResult<Self> {
        let mut loaded: Vec<ModelName, MAX_MODELS> = Vec::new();
        for name in models {
            let name = model_name(name)?;
            if loaded.contains(&name) {
                continue;
            }
            loaded.push(name).map_err(|_| ControlError::TooManyModels {
                capacity: MAX_MODELS,
            })?;
        }

        if loaded.is_empty() {
            return Err(ControlError::NoModelsLoaded);
        }

        let default_index = match loaded.iter().position(|m| m.as_str() == default_model) {
            Some(index) => index,
            None => {
                log_warn!(
                    "Default model '{}' not loaded, falling back to '{}'",
                    default_model,
                    loaded[0]
                );
                0
            }
        };

        log_info!(
            "Model switcher ready: {} models, default '{}'",
            loaded.len(),
            loaded[default_index]
        );

        let now = clock.now();
        Ok(Self {
            models: loaded,
            default_index,
            active_index: default_index,
            last_non_default: None,
            pending: [0; MAX_MODELS],
            last_switch_time: now,
            policy,
            clock,
        })
    }

    /// Name of the active model
    pub fn active_model(&self) -> &str {
        &self.models[self.active_index]
    }

    /// Name of the default model
    pub fn default_model(&self) -> &str {
        &self.models[self.default_index]
    }

    /// True while the default model is active
    pub fn is_default_active(&self) -> bool {
        self.active_index == self.default_index
    }

    /// Loaded model names in load order
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.as_str())
    }

    /// True if `name` is loaded
    pub fn is_loaded(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Non-default model most recently switched to, cleared on return to default
    pub fn last_non_default(&self) -> Option<&str> {
        self.last_non_default.map(|i| self.models[i].as_str())
    }

    /// Consecutive automatic requests currently counted for `name`
    pub fn pending_count(&self, name: &str) -> u8 {
        self.index_of(name).map_or(0, |i| self.pending[i])
    }

    /// Time of the last confirmed switch or keep-alive
    pub fn last_switch_time(&self) -> Timestamp {
        self.last_switch_time
    }

    /// Current policy
    pub fn policy(&self) -> SwitchPolicy {
        self.policy
    }

    /// Change the reversion timeout
    pub fn set_switch_timeout(&mut self, timeout_ms: u64) {
        self.policy.timeout_ms = timeout_ms;
    }

    /// Immediate operator switch
    ///
    /// Selecting the active model refreshes the switch timer and reports
    /// [`SwitchOutcome::KeepAlive`].
    pub fn switch_manual(&mut self, name: &str) -> ControlResult<SwitchOutcome> {
        let index = self.resolve(name)?;
        if index == self.active_index {
            self.last_switch_time = self.clock.now();
            return Ok(SwitchOutcome::KeepAlive);
        }
        Ok(self.transition(index, SwitchOrigin::Manual))
    }

    /// Debounced automatic request
    pub fn request_automatic(&mut self, name: &str) -> ControlResult<SwitchOutcome> {
        let index = self.resolve(name)?;

        for (i, count) in self.pending.iter_mut().enumerate() {
            if i != index {
                *count = 0;
            }
        }
        let count = self.pending[index].saturating_add(1);
        self.pending[index] = count;

        let required = self.policy.confirmation_threshold.max(1);
        if count < required {
            log_debug!("Switch to '{}' pending ({}/{})", name, count, required);
            return Ok(SwitchOutcome::Pending { count, required });
        }

        if index == self.active_index {
            self.last_switch_time = self.clock.now();
            return Ok(SwitchOutcome::KeepAlive);
        }
        Ok(self.transition(index, SwitchOrigin::Automatic))
    }

    /// Revert to the default model once the timeout has elapsed
    ///
    /// Returns true if a reversion happened. Call once per control tick.
    pub fn check_timeout(&mut self) -> bool {
        if self.is_default_active() {
            return false;
        }

        let elapsed = self.clock.elapsed_since(self.last_switch_time);
        if elapsed < self.policy.timeout_ms {
            return false;
        }

        log_info!(
            "Model '{}' not reasserted for {}ms, reverting to '{}'",
            self.models[self.active_index],
            elapsed,
            self.models[self.default_index]
        );
        self.transition(self.default_index, SwitchOrigin::Timeout);
        true
    }

    /// Snapshot for status displays
    #[cfg(feature = "std")]
    pub fn status(&self) -> SwitcherStatus {
        SwitcherStatus {
            active_model: self.active_model().into(),
            default_model: self.default_model().into(),
            pending: self
                .models
                .iter()
                .zip(self.pending.iter())
                .filter(|(_, count)| **count > 0)
                .map(|(name, count)| (std::string::String::from(name.as_str()), *count))
                .collect(),
            confirmation_threshold: self.policy.confirmation_threshold,
            ms_since_switch: self.clock.elapsed_since(self.last_switch_time),
        }
    }

    fn transition(&mut self, index: usize, origin: SwitchOrigin) -> SwitchOutcome {
        if origin != SwitchOrigin::Timeout {
            log_info!(
                "Model switch confirmed ({:?}): '{}' -> '{}'",
                origin,
                self.models[self.active_index],
                self.models[index]
            );
        }

        self.active_index = index;
        self.last_switch_time = self.clock.now();
        self.pending = [0; MAX_MODELS];
        self.last_non_default = if index == self.default_index {
            None
        } else {
            Some(index)
        };

        SwitchOutcome::Switched {
            to: self.models[index].clone(),
            origin,
        }
    }

    fn resolve(&self, name: &str) -> ControlResult<usize> {
        match self.index_of(name) {
            Some(index) => Ok(index),
            None => {
                log_warn!("Rejected request for unknown model '{}'", name);
                Err(ControlError::UnknownModel {
                    name: model_name(name)?,
                })
            }
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.models.iter().position(|m| m.as_str() == name)
    }
}

/// Serializable switcher snapshot
#[cfg(feature = "std")]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwitcherStatus {
    /// Active model
    pub active_model: std::string::String,
    /// Default model
    pub default_model: std::string::String,
    /// Models with a non-zero automatic request count
    pub pending: std::vec::Vec<(std::string::String, u8)>,
    /// Requests needed to confirm an automatic switch
    pub confirmation_threshold: u8,
    /// Time since the last confirmed switch or keep-alive
    pub ms_since_switch: u64,
}
