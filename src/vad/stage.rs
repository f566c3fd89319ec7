//! VAD pipeline stage.

use crate::config::VadConfig;
use crate::defaults::VAD_WINDOW_SAMPLES;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioFrame, PipelineEvent};
use crate::vad::model::{SileroModel, VadModelState};
use crate::vad::segmenter::{VadSegmenter, VadTransition};
use crate::runtime::InferenceSession;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cross-thread control for the VAD stage.
///
/// The capture stage enables the VAD and requests a state reset when a wake
/// word fires; the flags avoid a channel cycle between the two stages.
#[derive(Debug)]
pub struct VadControl {
    enabled: AtomicBool,
    reset_requested: AtomicBool,
}

impl VadControl {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            reset_requested: AtomicBool::new(false),
        }
    }

    /// Enable the stage and request a fresh detection state.
    pub fn arm(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::SeqCst)
    }
}

/// Consumes normalized PCM in strict 512-sample chunks and emits raw
/// speech start/end events.
pub struct VadStage {
    model: SileroModel,
    model_state: VadModelState,
    segmenter: VadSegmenter,
    pending: Vec<f32>,
    control: Arc<VadControl>,
}

impl VadStage {
    pub fn new(
        session: Box<dyn InferenceSession>,
        config: &VadConfig,
        control: Arc<VadControl>,
    ) -> Self {
        Self {
            model: SileroModel::new(session),
            model_state: VadModelState::new(),
            segmenter: VadSegmenter::new(config),
            pending: Vec::with_capacity(VAD_WINDOW_SAMPLES * 4),
            control,
        }
    }

    pub fn segmenter(&self) -> &VadSegmenter {
        &self.segmenter
    }
}

impl Station for VadStage {
    type Input = AudioFrame;
    type Output = PipelineEvent;

    fn name(&self) -> &'static str {
        "vad"
    }

    fn process(
        &mut self,
        frame: AudioFrame,
    ) -> std::result::Result<Vec<PipelineEvent>, StationError> {
        if self.control.take_reset() {
            self.segmenter.reset();
            self.model_state.reset();
        }

        if !self.control.is_enabled() {
            // Disabled: discard instead of accumulating stale audio.
            self.pending.clear();
            return Ok(vec![]);
        }

        self.pending.extend_from_slice(&frame.samples);

        let mut events = Vec::new();
        while self.pending.len() >= VAD_WINDOW_SAMPLES {
            let chunk: Vec<f32> = self.pending.drain(..VAD_WINDOW_SAMPLES).collect();

            let probability = match self.model.step(&chunk, &mut self.model_state) {
                Ok(p) => p,
                Err(err) => {
                    // Skip the chunk; recurrent state was left untouched.
                    return Err(StationError::recoverable(err));
                }
            };

            match self.segmenter.step(probability) {
                Some(VadTransition::SpeechStart) => events.push(PipelineEvent::VadStarted),
                Some(VadTransition::SpeechEnd) => events.push(PipelineEvent::VadEnded),
                None => {}
            }
        }

        Ok(events)
    }
}
