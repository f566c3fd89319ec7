//! Embedding stage: sliding mel window to 96-dim speech embeddings.

use crate::defaults::{EMB_DIM, EMB_STEP_FRAMES, EMB_WINDOW_FRAMES, MEL_BINS};
use crate::error::{HearkenError, Result};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Embedding, MelBlock};
use crate::runtime::{InferenceSession, TensorData};

const WINDOW_VALUES: usize = EMB_WINDOW_FRAMES * MEL_BINS;
const STEP_VALUES: usize = EMB_STEP_FRAMES * MEL_BINS;

/// Maintains a rolling mel buffer and emits one embedding per 8-frame hop
/// once 76 frames are available.
///
/// Downstream broadcast to the wake-word stages is handled by the runner;
/// this stage only produces the ordered embedding stream.
pub struct EmbeddingStage {
    session: Box<dyn InferenceSession>,
    mels: Vec<f32>,
}

impl EmbeddingStage {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self {
            session,
            mels: Vec::with_capacity(WINDOW_VALUES * 2),
        }
    }

    /// Mel frames currently buffered.
    pub fn buffered_frames(&self) -> usize {
        self.mels.len() / MEL_BINS
    }

    fn run_window(&mut self) -> Result<Embedding> {
        let input = TensorData::f32(
            vec![1, EMB_WINDOW_FRAMES, MEL_BINS, 1],
            self.mels[..WINDOW_VALUES].to_vec(),
        );
        let outputs = self.session.run(&[("input", input)])?;

        let (_, tensor) = outputs.into_iter().next().ok_or(HearkenError::Inference {
            message: "embedding model returned no outputs".to_string(),
        })?;
        let values = tensor.as_f32().ok_or(HearkenError::ShapeMismatch {
            model: "embedding".to_string(),
            message: "expected f32 output".to_string(),
        })?;

        if values.len() != EMB_DIM {
            return Err(HearkenError::ShapeMismatch {
                model: "embedding".to_string(),
                message: format!("expected {} output values, got {}", EMB_DIM, values.len()),
            });
        }

        Ok(Embedding::new(values.to_vec()))
    }
}

impl Station for EmbeddingStage {
    type Input = MelBlock;
    type Output = Embedding;

    fn name(&self) -> &'static str {
        "embedding"
    }

    fn process(&mut self, block: MelBlock) -> std::result::Result<Vec<Embedding>, StationError> {
        self.mels.extend_from_slice(&block.values);

        let mut embeddings = Vec::new();
        while self.mels.len() >= WINDOW_VALUES {
            match self.run_window() {
                Ok(embedding) => {
                    self.mels.drain(..STEP_VALUES);
                    embeddings.push(embedding);
                }
                Err(err @ HearkenError::ShapeMismatch { .. }) => {
                    return Err(StationError::fatal(err));
                }
                Err(err) => {
                    // Advance past the failed window so the stream keeps moving.
                    self.mels.drain(..STEP_VALUES);
                    return Err(StationError::recoverable(err));
                }
            }
        }

        Ok(embeddings)
    }
}
