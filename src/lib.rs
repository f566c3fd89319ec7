//! hearken - Always-on wake word detection with voice activity capture
//!
//! A streaming pipeline over 16 kHz mono PCM: log-mel features, speech
//! embeddings and per-model wake-word probabilities in one branch, a
//! recurrent VAD in the other, and a capture controller that delivers the
//! utterance following each detection.

pub mod audio;
pub mod capture;
pub mod config;
pub mod defaults;
pub mod detect;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod runtime;
pub mod sink;
pub mod vad;

pub use config::Config;
pub use error::{HearkenError, Result};
pub use pipeline::{Lifecycle, ModelPaths, WakePipeline};
pub use sink::{ClosureSink, CollectorSink, EventSink};
