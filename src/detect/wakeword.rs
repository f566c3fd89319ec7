//! Wake-word stage: embedding windows to detections.
//!
//! Each wake-word model gets its own stage instance and thread. The stage
//! slides a 16-embedding window one embedding at a time and smooths the
//! per-frame probabilities through an activation counter with a refractory
//! period.

use crate::config::WakeConfig;
use crate::defaults::{EMB_DIM, WAKE_WINDOW};
use crate::error::{HearkenError, Result};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Embedding, PipelineEvent};
use crate::runtime::{InferenceSession, TensorData};

const WINDOW_VALUES: usize = WAKE_WINDOW * EMB_DIM;

/// Smooths per-frame probabilities into edge-triggered detections.
///
/// The counter climbs by one per over-threshold frame and fires when it
/// reaches the trigger level, then drops to `-refractory` so the next
/// detection requires climbing back through ~1.6 s of frames. Below
/// threshold it decays toward zero from either side.
#[derive(Debug, Clone, Copy)]
pub struct ActivationCounter {
    threshold: f32,
    trigger_level: i32,
    refractory: i32,
    value: i32,
}

impl ActivationCounter {
    pub fn new(config: WakeConfig) -> Self {
        Self {
            threshold: config.threshold,
            trigger_level: config.trigger_level,
            refractory: config.refractory,
            value: 0,
        }
    }

    /// Feeds one probability; returns true exactly once per crossing of the
    /// trigger level.
    pub fn update(&mut self, probability: f32) -> bool {
        if probability > self.threshold {
            self.value += 1;
            if self.value >= self.trigger_level {
                self.value = -self.refractory;
                return true;
            }
        } else if self.value > 0 {
            self.value = (self.value - 1).max(0);
        } else {
            self.value = (self.value + 1).min(0);
        }
        false
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// One wake-word model's classification loop.
pub struct WakeWordStage {
    name: String,
    session: Box<dyn InferenceSession>,
    features: Vec<f32>,
    counter: ActivationCounter,
    config: WakeConfig,
}

impl WakeWordStage {
    /// `name` is the model file stem; it tags every event this stage emits.
    pub fn new(name: String, session: Box<dyn InferenceSession>, config: WakeConfig) -> Self {
        Self {
            name,
            session,
            features: Vec::with_capacity(WINDOW_VALUES * 2),
            counter: ActivationCounter::new(config),
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.name
    }

    pub fn activation(&self) -> i32 {
        self.counter.value()
    }

    fn run_window(&mut self) -> Result<Vec<f32>> {
        let input = TensorData::f32(
            vec![1, WAKE_WINDOW, EMB_DIM],
            self.features[..WINDOW_VALUES].to_vec(),
        );
        let outputs = self.session.run(&[("input", input)])?;

        let (_, tensor) = outputs.into_iter().next().ok_or(HearkenError::Inference {
            message: "wake-word model returned no outputs".to_string(),
        })?;
        let probabilities = tensor.as_f32().ok_or_else(|| HearkenError::ShapeMismatch {
            model: self.name.clone(),
            message: "expected f32 output".to_string(),
        })?;

        if probabilities.is_empty() {
            return Err(HearkenError::ShapeMismatch {
                model: self.name.clone(),
                message: "empty probability output".to_string(),
            });
        }

        Ok(probabilities.to_vec())
    }
}

impl Station for WakeWordStage {
    type Input = Embedding;
    type Output = PipelineEvent;

    fn name(&self) -> &'static str {
        "wake-word"
    }

    fn process(
        &mut self,
        embedding: Embedding,
    ) -> std::result::Result<Vec<PipelineEvent>, StationError> {
        self.features.extend_from_slice(&embedding.values);

        let mut events = Vec::new();
        while self.features.len() >= WINDOW_VALUES {
            match self.run_window() {
                Ok(probabilities) => {
                    for probability in probabilities {
                        let fired = self.counter.update(probability);
                        events.push(PipelineEvent::Score {
                            model: self.name.clone(),
                            score: probability,
                            threshold: self.config.threshold,
                            activation: self.counter.value(),
                            trigger_level: self.config.trigger_level,
                        });
                        if fired {
                            events.push(PipelineEvent::WakeWord {
                                model: self.name.clone(),
                            });
                        }
                    }
                    // Hop: advance by exactly one embedding.
                    self.features.drain(..EMB_DIM);
                }
                Err(err @ HearkenError::ShapeMismatch { .. }) => {
                    return Err(StationError::fatal(err));
                }
                Err(err) => {
                    self.features.drain(..EMB_DIM);
                    return Err(StationError::recoverable(err));
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptedSession;

    fn config(threshold: f32, trigger_level: i32, refractory: i32) -> WakeConfig {
        WakeConfig {
            threshold,
            trigger_level,
            refractory,
        }
    }

    fn embedding(value: f32) -> Embedding {
        Embedding::new(vec![value; EMB_DIM])
    }

    /// Session scripted with a probability per call, repeating the last one.
    fn wake_session(probabilities: Vec<f32>) -> ScriptedSession {
        let mut calls = 0usize;
        ScriptedSession::from_fn(move |_| {
            let probability = probabilities[calls.min(probabilities.len() - 1)];
            calls += 1;
            Ok(vec![("prob".to_string(), TensorData::scalar(probability))])
        })
    }

    #[test]
    fn test_counter_fires_at_trigger_level() {
        let mut counter = ActivationCounter::new(config(0.5, 2, 20));

        assert!(!counter.update(0.9));
        assert_eq!(counter.value(), 1);
        assert!(counter.update(0.9));
        assert_eq!(counter.value(), -20);
    }

    #[test]
    fn test_counter_decays_toward_zero_from_positive() {
        let mut counter = ActivationCounter::new(config(0.5, 3, 20));

        counter.update(0.9);
        counter.update(0.9);
        assert_eq!(counter.value(), 2);

        counter.update(0.1);
        assert_eq!(counter.value(), 1);
        counter.update(0.1);
        assert_eq!(counter.value(), 0);
        counter.update(0.1);
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_counter_climbs_back_from_refractory() {
        let mut counter = ActivationCounter::new(config(0.5, 1, 3));

        assert!(counter.update(0.9));
        assert_eq!(counter.value(), -3);

        // Below threshold the counter climbs toward zero.
        counter.update(0.1);
        counter.update(0.1);
        assert_eq!(counter.value(), -1);
        counter.update(0.1);
        assert_eq!(counter.value(), 0);

        // Fully recovered: the next over-threshold frame fires again.
        assert!(counter.update(0.9));
    }

    #[test]
    fn test_counter_stays_in_bounds() {
        let refractory = 5;
        let trigger_level = 2;
        let mut counter = ActivationCounter::new(config(0.5, trigger_level, refractory));

        let probabilities = [0.9, 0.9, 0.9, 0.1, 0.9, 0.1, 0.1, 0.9, 0.9, 0.9, 0.9, 0.9];
        for &p in probabilities.iter().cycle().take(200) {
            counter.update(p);
            assert!(counter.value() >= -refractory);
            assert!(counter.value() <= trigger_level);
        }
    }

    #[test]
    fn test_no_detection_below_window() {
        let session = wake_session(vec![0.9]);
        let mut stage = WakeWordStage::new("hey_jarvis".to_string(), Box::new(session), config(0.5, 1, 20));

        for _ in 0..WAKE_WINDOW - 1 {
            let events = stage.process(embedding(0.0)).unwrap();
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_detection_tagged_with_model_name() {
        let session = wake_session(vec![0.9]);
        let mut stage =
            WakeWordStage::new("alexa_v0.1".to_string(), Box::new(session), config(0.5, 1, 20));

        let mut wake_events = Vec::new();
        for _ in 0..WAKE_WINDOW {
            for event in stage.process(embedding(0.0)).unwrap() {
                if let PipelineEvent::WakeWord { model } = event {
                    wake_events.push(model);
                }
            }
        }

        assert_eq!(wake_events, vec!["alexa_v0.1"]);
    }

    #[test]
    fn test_refractory_suppresses_back_to_back_fires() {
        // Every window scores above threshold; only the first crossing and
        // the post-refractory climb may fire.
        let session = wake_session(vec![0.9]);
        let refractory = 20;
        let mut stage =
            WakeWordStage::new("model".to_string(), Box::new(session), config(0.5, 1, refractory));

        let mut fires = 0;
        // 16 to prime + 40 hops of continuous over-threshold scores.
        for _ in 0..(WAKE_WINDOW + 40) {
            for event in stage.process(embedding(0.0)).unwrap() {
                if matches!(event, PipelineEvent::WakeWord { .. }) {
                    fires += 1;
                }
            }
        }

        // First fire, then 20 frames climbing from -20 to 0, then a fire on
        // the next over-threshold frame: 41 frames total -> exactly 2 fires.
        assert_eq!(fires, 2);
    }

    #[test]
    fn test_score_events_carry_counter_state() {
        let session = wake_session(vec![0.2]);
        let mut stage =
            WakeWordStage::new("model".to_string(), Box::new(session), config(0.5, 1, 20));

        let mut scores = Vec::new();
        for _ in 0..WAKE_WINDOW + 2 {
            for event in stage.process(embedding(0.0)).unwrap() {
                if let PipelineEvent::Score {
                    score,
                    threshold,
                    activation,
                    trigger_level,
                    ..
                } = event
                {
                    scores.push((score, threshold, activation, trigger_level));
                }
            }
        }

        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|&(s, t, a, l)| {
            (s - 0.2).abs() < f32::EPSILON && t == 0.5 && a == 0 && l == 1
        }));
    }

    #[test]
    fn test_inference_error_is_recoverable() {
        let session = ScriptedSession::failing("transient");
        let mut stage =
            WakeWordStage::new("model".to_string(), Box::new(session), config(0.5, 1, 20));

        for _ in 0..WAKE_WINDOW - 1 {
            stage.process(embedding(0.0)).unwrap();
        }
        let result = stage.process(embedding(0.0));
        assert!(matches!(result, Err(StationError::Recoverable(_))));
    }
}
