//! Mel spectrogram stage: raw PCM to scaled log-mel frames.

use crate::defaults::{MEL_BINS, MEL_FRAME_SAMPLES};
use crate::error::{HearkenError, Result};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioFrame, MelBlock};
use crate::runtime::{InferenceSession, TensorData};

/// Rescale applied to every raw mel value so the range matches the speech
/// embedding model's training distribution.
pub fn scale_mel(raw: f32) -> f32 {
    raw / 10.0 + 2.0
}

/// Accumulates PCM and runs the mel model over fixed 5120-sample windows.
///
/// Samples are consumed exactly once and in order; a trailing partial
/// window at shutdown is discarded.
pub struct MelStage {
    session: Box<dyn InferenceSession>,
    pending: Vec<f32>,
}

impl MelStage {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self {
            session,
            pending: Vec::with_capacity(MEL_FRAME_SAMPLES * 2),
        }
    }

    /// Samples buffered but not yet consumed by an inference call.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    fn run_window(&mut self) -> Result<MelBlock> {
        let input = TensorData::f32(
            vec![1, MEL_FRAME_SAMPLES],
            self.pending[..MEL_FRAME_SAMPLES].to_vec(),
        );
        let outputs = self.session.run(&[("input", input)])?;

        let (_, tensor) = outputs.into_iter().next().ok_or(HearkenError::Inference {
            message: "mel model returned no outputs".to_string(),
        })?;
        let raw = tensor.as_f32().ok_or(HearkenError::ShapeMismatch {
            model: "mel".to_string(),
            message: "expected f32 output".to_string(),
        })?;

        if raw.is_empty() || raw.len() % MEL_BINS != 0 {
            return Err(HearkenError::ShapeMismatch {
                model: "mel".to_string(),
                message: format!("output length {} is not a multiple of {}", raw.len(), MEL_BINS),
            });
        }

        Ok(MelBlock::new(raw.iter().map(|&v| scale_mel(v)).collect()))
    }
}

impl Station for MelStage {
    type Input = AudioFrame;
    type Output = MelBlock;

    fn name(&self) -> &'static str {
        "mel"
    }

    fn process(&mut self, frame: AudioFrame) -> std::result::Result<Vec<MelBlock>, StationError> {
        self.pending.extend_from_slice(&frame.samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= MEL_FRAME_SAMPLES {
            match self.run_window() {
                Ok(block) => {
                    self.pending.drain(..MEL_FRAME_SAMPLES);
                    blocks.push(block);
                }
                Err(err @ HearkenError::ShapeMismatch { .. }) => {
                    // A wrong-shaped model will never produce usable frames.
                    return Err(StationError::fatal(err));
                }
                Err(err) => {
                    // Drop the offending window and keep the stream alive.
                    self.pending.drain(..MEL_FRAME_SAMPLES);
                    return Err(StationError::recoverable(err));
                }
            }
        }

        Ok(blocks)
    }
}
