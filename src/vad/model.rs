//! Recurrent Silero model step.

use crate::defaults::{SAMPLE_RATE, VAD_CONTEXT_SAMPLES, VAD_STATE_LEN, VAD_WINDOW_SAMPLES};
use crate::error::{HearkenError, Result};
use crate::runtime::{InferenceSession, TensorData};

/// Recurrent state owned by the VAD stage and threaded through each step.
///
/// `context` always holds the last 64 samples fed to the model; both it and
/// the RNN state start at zero.
#[derive(Debug, Clone)]
pub struct VadModelState {
    state: Vec<f32>,
    context: Vec<f32>,
}

impl VadModelState {
    pub fn new() -> Self {
        Self {
            state: vec![0.0; VAD_STATE_LEN],
            context: vec![0.0; VAD_CONTEXT_SAMPLES],
        }
    }

    pub fn reset(&mut self) {
        self.state.fill(0.0);
        self.context.fill(0.0);
    }

    pub fn context(&self) -> &[f32] {
        &self.context
    }
}

impl Default for VadModelState {
    fn default() -> Self {
        Self::new()
    }
}

/// One forward pass per 512-sample chunk, with the 64-sample context prefix
/// and the rolled recurrent state.
pub struct SileroModel {
    session: Box<dyn InferenceSession>,
}

impl SileroModel {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self { session }
    }

    /// Runs one step and returns the speech probability for the chunk.
    ///
    /// `chunk` must hold exactly 512 normalized samples. The state tensor
    /// and context are updated in place on success and untouched on error.
    pub fn step(&mut self, chunk: &[f32], state: &mut VadModelState) -> Result<f32> {
        debug_assert_eq!(chunk.len(), VAD_WINDOW_SAMPLES);

        // input = context ‖ chunk
        let effective = VAD_CONTEXT_SAMPLES + VAD_WINDOW_SAMPLES;
        let mut input = Vec::with_capacity(effective);
        input.extend_from_slice(&state.context);
        input.extend_from_slice(chunk);

        let outputs = self.session.run(&[
            ("input", TensorData::f32(vec![1, effective], input.clone())),
            (
                "state",
                TensorData::f32(vec![2, 1, 128], state.state.clone()),
            ),
            ("sr", TensorData::i64(vec![1], vec![SAMPLE_RATE as i64])),
        ])?;

        let probability = outputs
            .iter()
            .find(|(name, _)| name == "output")
            .or_else(|| outputs.first())
            .and_then(|(_, tensor)| tensor.as_f32())
            .and_then(|values| values.first().copied())
            .ok_or(HearkenError::ShapeMismatch {
                model: "vad".to_string(),
                message: "missing probability output".to_string(),
            })?;

        let next_state = outputs
            .iter()
            .find(|(name, _)| name == "stateN")
            .or_else(|| outputs.get(1))
            .and_then(|(_, tensor)| tensor.as_f32())
            .ok_or(HearkenError::ShapeMismatch {
                model: "vad".to_string(),
                message: "missing recurrent state output".to_string(),
            })?;

        if next_state.len() != VAD_STATE_LEN {
            return Err(HearkenError::ShapeMismatch {
                model: "vad".to_string(),
                message: format!(
                    "expected {} state values, got {}",
                    VAD_STATE_LEN,
                    next_state.len()
                ),
            });
        }

        state.state.copy_from_slice(next_state);
        state
            .context
            .copy_from_slice(&input[effective - VAD_CONTEXT_SAMPLES..]);

        Ok(probability)
    }
}
