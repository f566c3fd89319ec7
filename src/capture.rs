//! Capture controller: assembles the utterance that follows a wake word.
//!
//! Consumes the merged event stream (wake-word firings, raw VAD
//! transitions, PCM) and owns the capture buffer. A VAD end is not applied
//! immediately: it waits out a short delay measured in fed samples, and any
//! speech start during the delay cancels it, so trailing words are not
//! clipped.

use crate::config::CaptureConfig;
use crate::defaults::SAMPLE_RATE;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::PipelineEvent;
use crate::sink::EventSink;
use crate::vad::stage::VadControl;
use std::sync::Arc;

/// State machine bridging wake-word and VAD events into captured
/// utterances.
pub struct CaptureStage {
    sink: Arc<dyn EventSink>,
    vad_control: Option<Arc<VadControl>>,
    capturing: bool,
    pending_wake: Option<String>,
    buffer: Vec<i16>,
    max_samples: usize,
    end_delay_samples: usize,
    /// Samples left until a pending VAD end is applied.
    pending_end: Option<usize>,
}

impl CaptureStage {
    pub fn new(
        config: &CaptureConfig,
        sink: Arc<dyn EventSink>,
        vad_control: Option<Arc<VadControl>>,
    ) -> Self {
        Self {
            sink,
            vad_control,
            capturing: false,
            pending_wake: None,
            buffer: Vec::new(),
            max_samples: config.max_samples(),
            end_delay_samples: config.end_delay_samples(),
            pending_end: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn on_wake_word(&mut self, model: String) {
        self.sink.on_wake_word(&model);

        // Re-arms on every firing: a wake word mid-capture replaces the
        // pending name and restarts the buffer.
        self.pending_wake = Some(model);
        self.capturing = true;
        self.buffer.clear();
        self.pending_end = None;

        if let Some(control) = &self.vad_control {
            control.arm();
        }
    }

    fn on_vad_started(&mut self) {
        self.sink.on_vad_started();
        // Speech resuming during the end delay keeps the window open.
        self.pending_end = None;
    }

    fn on_vad_ended(&mut self) {
        if self.capturing {
            self.pending_end = Some(self.end_delay_samples);
        } else {
            self.sink.on_vad_ended();
        }
    }

    fn on_pcm(&mut self, samples: &[i16]) {
        if self.capturing {
            let room = self.max_samples - self.buffer.len();
            let take = samples.len().min(room);
            self.buffer.extend_from_slice(&samples[..take]);

            if self.buffer.len() >= self.max_samples {
                // Cap hit: truncate silently and force the end of capture.
                self.finish_capture();
                return;
            }
        }

        if let Some(remaining) = self.pending_end {
            if remaining <= samples.len() {
                self.finish_capture();
            } else {
                self.pending_end = Some(remaining - samples.len());
            }
        }
    }

    /// Applies a delayed or forced VAD end to the capture window.
    fn finish_capture(&mut self) {
        self.sink.on_vad_ended();

        if let Some(model) = self.pending_wake.take() {
            self.sink.on_captured(&model, &self.buffer, SAMPLE_RATE);
        }

        self.buffer.clear();
        self.capturing = false;
        self.pending_end = None;
    }
}

impl Station for CaptureStage {
    type Input = PipelineEvent;
    type Output = ();

    fn name(&self) -> &'static str {
        "capture"
    }

    fn process(&mut self, event: PipelineEvent) -> Result<Vec<()>, StationError> {
        match event {
            PipelineEvent::WakeWord { model } => self.on_wake_word(model),
            PipelineEvent::VadStarted => self.on_vad_started(),
            PipelineEvent::VadEnded => self.on_vad_ended(),
            PipelineEvent::Pcm { samples } => self.on_pcm(&samples),
            PipelineEvent::Score {
                model,
                score,
                threshold,
                activation,
                trigger_level,
            } => {
                self.sink
                    .on_score(&model, score, threshold, activation, trigger_level);
            }
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CollectorSink, SinkEvent};

    fn capture_config(end_delay_ms: u32) -> CaptureConfig {
        CaptureConfig {
            max_duration_s: 30,
            end_delay_ms,
        }
    }

    fn stage(end_delay_ms: u32) -> (CaptureStage, Arc<CollectorSink>) {
        let sink = Arc::new(CollectorSink::new());
        let stage = CaptureStage::new(&capture_config(end_delay_ms), sink.clone(), None);
        (stage, sink)
    }

    fn wake(model: &str) -> PipelineEvent {
        PipelineEvent::WakeWord {
            model: model.to_string(),
        }
    }

    fn pcm(samples: Vec<i16>) -> PipelineEvent {
        PipelineEvent::Pcm { samples }
    }

    #[test]
    fn test_wake_then_end_emits_one_capture() {
        let (mut stage, sink) = stage(0);

        stage.process(wake("alexa_v0.1")).unwrap();
        assert!(stage.is_capturing());

        stage.process(pcm(vec![7; 1000])).unwrap();
        stage.process(PipelineEvent::VadStarted).unwrap();
        stage.process(pcm(vec![8; 1000])).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();
        // Zero delay: the next feed tick applies the end.
        stage.process(pcm(vec![9; 100])).unwrap();

        assert!(!stage.is_capturing());
        let captures = sink.captures();
        assert_eq!(captures.len(), 1);
        let (name, samples, rate) = &captures[0];
        assert_eq!(name, "alexa_v0.1");
        assert_eq!(*rate, 16000);
        // Everything fed while capturing is in the buffer, including the
        // batch that applied the delayed end.
        assert_eq!(samples.len(), 2100);
        assert_eq!(samples[0], 7);
        assert_eq!(samples[1500], 8);
    }

    #[test]
    fn test_end_delay_counts_fed_samples() {
        // 500 ms delay = 8000 samples.
        let (mut stage, sink) = stage(500);

        stage.process(wake("model")).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();

        // 7 batches of 1000 samples: still pending.
        for _ in 0..7 {
            stage.process(pcm(vec![0; 1000])).unwrap();
        }
        assert!(stage.is_capturing());
        assert!(sink.captures().is_empty());

        // The eighth batch crosses the threshold.
        stage.process(pcm(vec![0; 1000])).unwrap();
        assert!(!stage.is_capturing());
        assert_eq!(sink.captures().len(), 1);
    }

    #[test]
    fn test_vad_restart_cancels_pending_end() {
        let (mut stage, sink) = stage(500);

        stage.process(wake("model")).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();
        stage.process(pcm(vec![0; 4000])).unwrap();

        // Speech resumes before the delay elapses.
        stage.process(PipelineEvent::VadStarted).unwrap();
        stage.process(pcm(vec![0; 50_000])).unwrap();

        assert!(stage.is_capturing());
        assert!(sink.captures().is_empty());
    }

    #[test]
    fn test_capture_truncated_at_cap() {
        let (mut stage, sink) = stage(500);

        stage.process(wake("model")).unwrap();
        // Feed 31 s of audio in one-second batches; no VAD end at all.
        for _ in 0..31 {
            stage.process(pcm(vec![1; 16000])).unwrap();
        }

        let captures = sink.captures();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].1.len(), 480_000);
        assert!(!stage.is_capturing());
    }

    #[test]
    fn test_second_wake_retags_and_rearms() {
        let (mut stage, sink) = stage(0);

        stage.process(wake("first_model")).unwrap();
        stage.process(pcm(vec![1; 1000])).unwrap();

        // Second firing before the capture completes.
        stage.process(wake("second_model")).unwrap();
        stage.process(pcm(vec![2; 500])).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();
        stage.process(pcm(vec![2; 10])).unwrap();

        assert_eq!(sink.wake_words(), vec!["first_model", "second_model"]);
        let captures = sink.captures();
        assert_eq!(captures.len(), 1);
        // The buffer restarted at the second wake word.
        assert_eq!(captures[0].0, "second_model");
        assert!(captures[0].1.iter().all(|&s| s == 2));
    }

    #[test]
    fn test_vad_events_without_wake_are_ignored() {
        let (mut stage, sink) = stage(0);

        stage.process(PipelineEvent::VadStarted).unwrap();
        stage.process(pcm(vec![1; 1000])).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();
        stage.process(pcm(vec![1; 1000])).unwrap();

        assert!(sink.captures().is_empty());
        assert!(sink.wake_words().is_empty());
        // Diagnostics still flow.
        assert!(sink.events().contains(&SinkEvent::VadStarted));
        assert!(sink.events().contains(&SinkEvent::VadEnded));
    }

    #[test]
    fn test_pcm_outside_capture_is_not_buffered() {
        let (mut stage, sink) = stage(0);

        stage.process(pcm(vec![5; 5000])).unwrap();
        stage.process(wake("model")).unwrap();
        stage.process(pcm(vec![6; 100])).unwrap();
        stage.process(PipelineEvent::VadEnded).unwrap();
        stage.process(pcm(vec![6; 10])).unwrap();

        let captures = sink.captures();
        assert_eq!(captures.len(), 1);
        // Only post-wake audio.
        assert!(captures[0].1.iter().all(|&s| s == 6));
    }

    #[test]
    fn test_scores_forwarded_to_sink() {
        let sink = Arc::new(CollectorSink::new().with_scores());
        let mut stage = CaptureStage::new(&capture_config(0), sink.clone(), None);

        stage
            .process(PipelineEvent::Score {
                model: "m".to_string(),
                score: 0.42,
                threshold: 0.5,
                activation: 0,
                trigger_level: 1,
            })
            .unwrap();

        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_wake_arms_vad_control() {
        let sink = Arc::new(CollectorSink::new());
        let control = Arc::new(VadControl::new(false));
        let mut stage =
            CaptureStage::new(&capture_config(0), sink.clone(), Some(control.clone()));

        assert!(!control.is_enabled());
        stage.process(wake("model")).unwrap();
        assert!(control.is_enabled());
    }
}
