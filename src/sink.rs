//! Event sinks for detections and captured utterances.

use std::sync::Mutex;

/// Receiver for pipeline output events.
///
/// `on_wake_word` and `on_captured` are the primary outputs; the remaining
/// methods are diagnostics with default no-op bodies, delivered best-effort.
/// Implementations must tolerate being called from worker threads.
pub trait EventSink: Send + Sync {
    /// A wake-word model fired. `name` is the model file stem.
    fn on_wake_word(&self, name: &str);

    /// A capture window completed. `sample_rate` is always 16000.
    fn on_captured(&self, name: &str, pcm: &[i16], sample_rate: u32);

    /// The VAD opened a speech segment.
    fn on_vad_started(&self) {}

    /// The VAD closed a speech segment (delivered after the end delay).
    fn on_vad_ended(&self) {}

    /// Per-frame wake-word score diagnostic.
    fn on_score(&self, _name: &str, _score: f32, _threshold: f32, _activation: i32, _trigger_level: i32) {
    }
}

/// Everything a sink can observe, recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    WakeWord(String),
    Captured {
        name: String,
        samples: Vec<i16>,
        sample_rate: u32,
    },
    VadStarted,
    VadEnded,
    Score {
        name: String,
        score: f32,
        activation: i32,
    },
}

/// Sink that records every event; the test workhorse.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<SinkEvent>>,
    record_scores: bool,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record score diagnostics (off by default to keep assertions
    /// focused on the primary events).
    pub fn with_scores(mut self) -> Self {
        self.record_scores = true;
        self
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn wake_words(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::WakeWord(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn captures(&self) -> Vec<(String, Vec<i16>, u32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Captured {
                    name,
                    samples,
                    sample_rate,
                } => Some((name, samples, sample_rate)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectorSink {
    fn on_wake_word(&self, name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::WakeWord(name.to_string()));
    }

    fn on_captured(&self, name: &str, pcm: &[i16], sample_rate: u32) {
        self.events.lock().unwrap().push(SinkEvent::Captured {
            name: name.to_string(),
            samples: pcm.to_vec(),
            sample_rate,
        });
    }

    fn on_vad_started(&self) {
        self.events.lock().unwrap().push(SinkEvent::VadStarted);
    }

    fn on_vad_ended(&self) {
        self.events.lock().unwrap().push(SinkEvent::VadEnded);
    }

    fn on_score(&self, name: &str, score: f32, _threshold: f32, activation: i32, _trigger_level: i32) {
        if self.record_scores {
            self.events.lock().unwrap().push(SinkEvent::Score {
                name: name.to_string(),
                score,
                activation,
            });
        }
    }
}

type WakeCallback = Box<dyn Fn(&str) + Send + Sync>;
type CaptureCallback = Box<dyn Fn(&str, &[i16], u32) + Send + Sync>;

/// Adapter turning a pair of plain callbacks into an `EventSink`.
pub struct ClosureSink {
    on_wake: WakeCallback,
    on_capture: CaptureCallback,
}

impl ClosureSink {
    pub fn new<W, C>(on_wake: W, on_capture: C) -> Self
    where
        W: Fn(&str) + Send + Sync + 'static,
        C: Fn(&str, &[i16], u32) + Send + Sync + 'static,
    {
        Self {
            on_wake: Box::new(on_wake),
            on_capture: Box::new(on_capture),
        }
    }
}

impl EventSink for ClosureSink {
    fn on_wake_word(&self, name: &str) {
        (self.on_wake)(name);
    }

    fn on_captured(&self, name: &str, pcm: &[i16], sample_rate: u32) {
        (self.on_capture)(name, pcm, sample_rate);
    }
}
