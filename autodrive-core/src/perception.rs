//! Perception Interface
//!
//! The control loop does not know how predictions are made. It asks a
//! [`Perception`] implementation to run the active model on a frame and gets
//! back a raw steering scalar, how long inference took, and optionally a
//! model the perception side would like to switch to (for example when it
//! detects a curve).
//!
//! [`ModelSet`] is the ready-made implementation: a list of opaque
//! [`SteeringModel`]s looked up by name, each inference timed with a
//! monotonic clock.

use std::marker::PhantomData;
use std::time::Instant;

use crate::errors::{ControlError, ControlResult};
use crate::switcher::model_name;

/// One model's answer for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Raw model output, nominally in [-1, 1]
    pub raw: f32,
    /// Inference duration in seconds
    pub elapsed_s: f32,
    /// Model the perception side asks to switch to, debounced by the switcher
    pub direction_hint: Option<String>,
}

/// Inference collaborator consumed by the control loop
pub trait Perception {
    /// Input the models run on
    type Frame;

    /// Names of the loaded models, in load order
    fn available_models(&self) -> Vec<String>;

    /// Run `model` on `frame`
    fn predict(&mut self, frame: &Self::Frame, model: &str) -> ControlResult<Prediction>;
}

/// Output of a single model invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelOutput {
    /// Raw steering scalar, nominally in [-1, 1]
    pub raw: f32,
    /// Optional switch request
    pub direction_hint: Option<String>,
}

impl ModelOutput {
    /// Output with no switch request
    pub fn steering(raw: f32) -> Self {
        Self {
            raw,
            direction_hint: None,
        }
    }
}

/// Opaque steering model
pub trait SteeringModel<F> {
    /// Unique model name
    fn name(&self) -> &str;

    /// Run inference on one frame
    fn predict(&mut self, frame: &F) -> ControlResult<ModelOutput>;
}

impl<F, M: SteeringModel<F> + ?Sized> SteeringModel<F> for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn predict(&mut self, frame: &F) -> ControlResult<ModelOutput> {
        (**self).predict(frame)
    }
}

/// Named collection of steering models
pub struct ModelSet<F, M: SteeringModel<F>> {
    models: Vec<M>,
    last_latency_s: Option<f32>,
    _frame: PhantomData<fn(&F)>,
}

impl<F, M: SteeringModel<F>> ModelSet<F, M> {
    /// Wrap loaded models; later duplicates of a name are unreachable
    pub fn new(models: Vec<M>) -> Self {
        Self {
            models,
            last_latency_s: None,
            _frame: PhantomData,
        }
    }

    /// Duration of the most recent inference in seconds
    pub fn current_model_latency_s(&self) -> Option<f32> {
        self.last_latency_s
    }

    /// Number of loaded models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True if no model is loaded
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl<F, M: SteeringModel<F>> Perception for ModelSet<F, M> {
    type Frame = F;

    fn available_models(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name().to_string()).collect()
    }

    fn predict(&mut self, frame: &F, model: &str) -> ControlResult<Prediction> {
        let Some(selected) = self.models.iter_mut().find(|m| m.name() == model) else {
            return Err(ControlError::UnknownModel {
                name: model_name(model)?,
            });
        };

        let started = Instant::now();
        let output = selected.predict(frame)?;
        let elapsed_s = started.elapsed().as_secs_f32();
        self.last_latency_s = Some(elapsed_s);

        Ok(Prediction {
            raw: output.raw,
            elapsed_s,
            direction_hint: output.direction_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant {
        name: &'static str,
        raw: f32,
    }

    impl SteeringModel<u32> for Constant {
        fn name(&self) -> &str {
            self.name
        }

        fn predict(&mut self, frame: &u32) -> ControlResult<ModelOutput> {
            if *frame == 0 {
                return Err(ControlError::Perception {
                    reason: "empty frame",
                });
            }
            Ok(ModelOutput::steering(self.raw))
        }
    }

    fn set() -> ModelSet<u32, Box<dyn SteeringModel<u32>>> {
        let models: Vec<Box<dyn SteeringModel<u32>>> = vec![
            Box::new(Constant { name: "laneD1", raw: 0.0 }),
            Box::new(Constant { name: "laneD2", raw: -0.5 }),
        ];
        ModelSet::new(models)
    }

    #[test]
    fn lists_models_in_load_order() {
        assert_eq!(set().available_models(), vec!["laneD1", "laneD2"]);
        assert_eq!(set().len(), 2);
    }

    #[test]
    fn predicts_with_named_model_and_times_it() {
        let mut models = set();
        let prediction = models.predict(&1, "laneD2").unwrap();

        assert_eq!(prediction.raw, -0.5);
        assert!(prediction.elapsed_s >= 0.0);
        assert_eq!(models.current_model_latency_s(), Some(prediction.elapsed_s));
    }

    #[test]
    fn unknown_model_and_model_errors_propagate() {
        let mut models = set();
        assert!(matches!(
            models.predict(&1, "laneD9"),
            Err(ControlError::UnknownModel { .. })
        ));
        assert!(matches!(
            models.predict(&0, "laneD1"),
            Err(ControlError::Perception { .. })
        ));
    }
}
