//! Hysteresis state machine turning per-chunk speech probabilities into
//! start/end transitions.
//!
//! Probabilities at or above the threshold open a segment; a segment closes
//! only after enough trailing silence below the low band, and segments that
//! outgrow the maximum length are force-ended. All positions are sample
//! indices from stream start.

use crate::config::VadConfig;
use crate::defaults::{MIN_SILENCE_AT_MAX_MS, SAMPLE_RATE, VAD_WINDOW_SAMPLES};

/// A raw segment boundary, before the capture controller's end delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStart,
    SpeechEnd,
}

/// Per-stream segmentation state.
///
/// `current_sample` advances by one 512-sample window per step regardless
/// of the context prefix fed to the model.
#[derive(Debug, Clone)]
pub struct VadSegmenter {
    threshold: f32,
    low_threshold: f32,
    min_silence_samples: u64,
    min_silence_at_max_samples: u64,
    min_speech_samples: i64,
    max_speech_samples: u64,

    triggered: bool,
    current_sample: u64,
    current_speech_start: i64,
    temp_end: u64,
    prev_end: i64,
    next_start: i64,
}

impl VadSegmenter {
    pub fn new(config: &VadConfig) -> Self {
        let sr_per_ms = SAMPLE_RATE as u64 / 1000;
        Self {
            threshold: config.threshold,
            low_threshold: config.low_threshold(),
            min_silence_samples: sr_per_ms * config.min_silence_ms as u64,
            min_silence_at_max_samples: sr_per_ms * MIN_SILENCE_AT_MAX_MS as u64,
            min_speech_samples: (sr_per_ms * config.min_speech_ms as u64) as i64,
            max_speech_samples: (SAMPLE_RATE as f32 * config.max_speech_s) as u64,

            triggered: false,
            current_sample: 0,
            current_speech_start: -1,
            temp_end: 0,
            prev_end: 0,
            next_start: 0,
        }
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    pub fn reset(&mut self) {
        self.triggered = false;
        self.current_sample = 0;
        self.current_speech_start = -1;
        self.temp_end = 0;
        self.prev_end = 0;
        self.next_start = 0;
    }

    fn close_segment(&mut self) {
        self.triggered = false;
        self.current_speech_start = -1;
        self.temp_end = 0;
        self.prev_end = 0;
        self.next_start = 0;
    }

    /// Advances one 512-sample window with the model's probability for it.
    pub fn step(&mut self, probability: f32) -> Option<VadTransition> {
        let window = VAD_WINDOW_SAMPLES as u64;
        self.current_sample += window;

        if probability >= self.threshold {
            if self.temp_end != 0 {
                self.temp_end = 0;
                if self.next_start < self.prev_end {
                    self.next_start = (self.current_sample - window) as i64;
                }
            }
            if !self.triggered {
                self.triggered = true;
                self.current_speech_start = (self.current_sample - window) as i64;
                return Some(VadTransition::SpeechStart);
            }
            return None;
        }

        // Force-end segments that outgrow the maximum length.
        if self.triggered
            && self.current_sample - self.current_speech_start as u64 > self.max_speech_samples
        {
            self.close_segment();
            return Some(VadTransition::SpeechEnd);
        }

        // Inside the hysteresis band nothing changes.
        if probability >= self.low_threshold {
            return None;
        }

        if self.triggered {
            if self.temp_end == 0 {
                self.temp_end = self.current_sample;
            }
            if self.current_sample - self.temp_end > self.min_silence_at_max_samples {
                self.prev_end = self.temp_end as i64;
            }
            if self.current_sample - self.temp_end >= self.min_silence_samples {
                let candidate_end = self.temp_end as i64;
                if candidate_end - self.current_speech_start > self.min_speech_samples {
                    self.close_segment();
                    return Some(VadTransition::SpeechEnd);
                }
            }
        }

        None
    }
}
