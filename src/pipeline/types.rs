//! Data types flowing between pipeline stages.
//!
//! No timestamps are carried: sample position from stream start is the only
//! time axis, and each stage derives it from the amount of data consumed.

use crate::defaults::{EMB_DIM, MEL_BINS};

/// A batch of PCM samples entering an inference branch, already converted
/// to f32 by the supervisor.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

/// A block of scaled log-mel values produced by one mel inference.
///
/// The length is always a multiple of `MEL_BINS`; frames are stored
/// row-major in audio-time order.
#[derive(Debug, Clone)]
pub struct MelBlock {
    pub values: Vec<f32>,
}

impl MelBlock {
    pub fn new(values: Vec<f32>) -> Self {
        debug_assert!(values.len() % MEL_BINS == 0);
        Self { values }
    }

    /// Number of mel frames in this block.
    pub fn frames(&self) -> usize {
        self.values.len() / MEL_BINS
    }
}

/// A 96-dim speech embedding covering ~775 ms of audio.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), EMB_DIM);
        Self { values }
    }
}

/// Events converging on the capture stage.
///
/// Wake-word detections, VAD transitions and raw PCM share one channel so
/// their relative order is preserved end to end.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A wake-word model fired; `model` is the model file stem.
    WakeWord { model: String },
    /// The VAD opened a speech segment.
    VadStarted,
    /// The VAD closed a speech segment (raw, before the end delay).
    VadEnded,
    /// Raw PCM as fed by the producer.
    Pcm { samples: Vec<i16> },
    /// Per-frame diagnostic score from a wake-word stage.
    Score {
        model: String,
        score: f32,
        threshold: f32,
        activation: i32,
        trigger_level: i32,
    },
}
