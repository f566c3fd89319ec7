//! Pipeline supervisor: lifecycle, channel wiring and worker threads.
//!
//! Owns every channel and thread. Audio fans out from `feed()` into the
//! mel branch and the VAD branch, detections and VAD transitions converge
//! on the capture stage, and shutdown is a sender-drop cascade: dropping
//! the ingress senders disconnects each stage's input in dependency order.

use crate::capture::CaptureStage;
use crate::config::Config;
use crate::defaults::JOIN_TIMEOUT_MS;
use crate::detect::WakeWordStage;
use crate::error::{HearkenError, Result};
use crate::features::{EmbeddingStage, MelStage};
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::station::StationRunner;
use crate::pipeline::types::{AudioFrame, PipelineEvent};
use crate::runtime::{InferenceSession, OrtLoader, SessionLoader};
use crate::sink::{ClosureSink, EventSink};
use crate::vad::{VadControl, VadStage};
use crossbeam_channel::{Sender, bounded, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Model files backing one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub mel: PathBuf,
    pub embedding: PathBuf,
    pub wake_words: Vec<PathBuf>,
    /// Without a VAD model the pipeline runs wake-only: detections are
    /// delivered but nothing is captured.
    pub vad: Option<PathBuf>,
}

impl ModelPaths {
    /// Resolves a model directory laid out openwakeword-style:
    /// `melspectrogram.onnx`, `embedding_model.onnx`, optionally
    /// `silero_vad.onnx`, and every other `.onnx` file as a wake-word
    /// model named by its file stem.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut mel = None;
        let mut embedding = None;
        let mut vad = None;
        let mut wake_words = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some("melspectrogram") => mel = Some(path),
                Some("embedding_model") => embedding = Some(path),
                Some("silero_vad") => vad = Some(path),
                Some(_) => wake_words.push(path),
                None => {}
            }
        }
        wake_words.sort();

        let mel = mel.ok_or_else(|| missing_model(dir, "melspectrogram.onnx"))?;
        let embedding = embedding.ok_or_else(|| missing_model(dir, "embedding_model.onnx"))?;
        if wake_words.is_empty() {
            return Err(HearkenError::Other(format!(
                "no wake-word models found in {}",
                dir.display()
            )));
        }

        Ok(Self {
            mel,
            embedding,
            wake_words,
            vad,
        })
    }
}

fn missing_model(dir: &Path, name: &str) -> HearkenError {
    HearkenError::ModelLoad {
        path: dir.join(name).display().to_string(),
        message: "file not found".to_string(),
    }
}

fn model_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Pipeline lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

/// Sessions loaded at init(), consumed by the worker threads at start().
struct LoadedModels {
    mel: Box<dyn InferenceSession>,
    embedding: Box<dyn InferenceSession>,
    wake_words: Vec<(String, Box<dyn InferenceSession>)>,
    vad: Option<Box<dyn InferenceSession>>,
}

/// Ingress senders and worker handles of a running pipeline.
struct RunningPipeline {
    mel_tx: Sender<AudioFrame>,
    vad_tx: Option<Sender<AudioFrame>>,
    event_tx: Sender<PipelineEvent>,
    runners: Vec<StationRunner>,
}

/// The wake-word detection pipeline.
///
/// Lifecycle: `init()` loads models (Uninitialized → Initialized),
/// `start()` spawns the workers (→ Running), `stop()` drains and joins
/// them (→ Stopped), `release()` drops everything (→ Uninitialized).
/// Out-of-order calls are silently ignored so an audio producer may start
/// slightly before the pipeline.
pub struct WakePipeline {
    config: Config,
    loader: Box<dyn SessionLoader>,
    reporter: Arc<dyn ErrorReporter>,
    join_timeout: Duration,
    state: Lifecycle,
    models: Option<LoadedModels>,
    running: Option<RunningPipeline>,
}

impl WakePipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            loader: Box::new(OrtLoader),
            reporter: Arc::new(LogReporter),
            join_timeout: Duration::from_millis(JOIN_TIMEOUT_MS),
            state: Lifecycle::Uninitialized,
            models: None,
            running: None,
        }
    }

    /// Substitutes the session loader (scripted sessions in tests).
    pub fn with_loader(mut self, loader: Box<dyn SessionLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Overrides the per-thread join budget used by stop().
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == Lifecycle::Running
    }

    /// Loads every model and wires nothing yet; threads come with start().
    ///
    /// On any load failure the pipeline stays Uninitialized.
    pub fn init(&mut self, paths: &ModelPaths) -> Result<()> {
        if self.state != Lifecycle::Uninitialized {
            return Ok(());
        }
        if paths.wake_words.is_empty() {
            return Err(HearkenError::Other(
                "no wake-word models provided".to_string(),
            ));
        }

        let mel = self.loader.load(&paths.mel)?;
        let embedding = self.loader.load(&paths.embedding)?;

        let mut wake_words = Vec::with_capacity(paths.wake_words.len());
        for path in &paths.wake_words {
            wake_words.push((model_stem(path), self.loader.load(path)?));
        }

        let vad = match &paths.vad {
            Some(path) => Some(self.loader.load(path)?),
            None => None,
        };

        self.models = Some(LoadedModels {
            mel,
            embedding,
            wake_words,
            vad,
        });
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    /// Spawns the worker threads and begins consuming fed audio.
    pub fn start(&mut self, sink: Arc<dyn EventSink>) -> Result<()> {
        if self.state != Lifecycle::Initialized {
            return Ok(());
        }
        let Some(models) = self.models.take() else {
            return Ok(());
        };

        let mut runners = Vec::new();

        // Ingress channels are unbounded: feed() must never block the
        // audio thread. Inter-stage channels are bounded for back-pressure.
        let (mel_tx, mel_rx) = unbounded::<AudioFrame>();
        let (event_tx, event_rx) = unbounded::<PipelineEvent>();

        let (mel_out_tx, mel_out_rx) = bounded(self.config.channels.mel_buffer);
        runners.push(StationRunner::spawn(
            MelStage::new(models.mel),
            mel_rx,
            mel_out_tx,
            self.reporter.clone(),
        ));

        // One embedding channel per wake-word model, fed atomically.
        let mut embedding_txs = Vec::new();
        let mut embedding_rxs = Vec::new();
        for _ in 0..models.wake_words.len() {
            let (tx, rx) = bounded(self.config.channels.embedding_buffer);
            embedding_txs.push(tx);
            embedding_rxs.push(rx);
        }
        runners.push(StationRunner::spawn_fanout(
            EmbeddingStage::new(models.embedding),
            mel_out_rx,
            embedding_txs,
            self.reporter.clone(),
        ));

        for ((name, session), embedding_rx) in
            models.wake_words.into_iter().zip(embedding_rxs)
        {
            runners.push(StationRunner::spawn(
                WakeWordStage::new(name, session, self.config.wake),
                embedding_rx,
                event_tx.clone(),
                self.reporter.clone(),
            ));
        }

        let (vad_tx, vad_control) = match models.vad {
            Some(session) => {
                let control = Arc::new(VadControl::new(self.config.vad.auto_enable));
                let (vad_tx, vad_rx) = unbounded::<AudioFrame>();
                runners.push(StationRunner::spawn(
                    VadStage::new(session, &self.config.vad, control.clone()),
                    vad_rx,
                    event_tx.clone(),
                    self.reporter.clone(),
                ));
                (Some(vad_tx), Some(control))
            }
            None => (None, None),
        };

        // Terminal station: the capture stage produces no typed output.
        let (capture_out_tx, _capture_out_rx) = bounded::<()>(1);
        runners.push(StationRunner::spawn(
            CaptureStage::new(&self.config.capture, sink, vad_control),
            event_rx,
            capture_out_tx,
            self.reporter.clone(),
        ));

        self.running = Some(RunningPipeline {
            mel_tx,
            vad_tx,
            event_tx,
            runners,
        });
        self.state = Lifecycle::Running;
        Ok(())
    }

    /// Convenience wrapper taking the two primary callbacks directly.
    pub fn start_with_callbacks<W, C>(&mut self, on_wake: W, on_capture: C) -> Result<()>
    where
        W: Fn(&str) + Send + Sync + 'static,
        C: Fn(&str, &[i16], u32) + Send + Sync + 'static,
    {
        self.start(Arc::new(ClosureSink::new(on_wake, on_capture)))
    }

    /// Feeds 16 kHz mono PCM. Dropped silently unless the pipeline is
    /// Running.
    pub fn feed(&self, samples: &[i16]) {
        if self.state != Lifecycle::Running || samples.is_empty() {
            return;
        }
        let Some(running) = &self.running else { return };

        // Independent copies per branch; the mel model takes raw-range f32,
        // the VAD takes normalized samples, the capture buffer keeps i16.
        let raw: Vec<f32> = samples.iter().map(|&s| s as f32).collect();
        let _ = running.mel_tx.send(AudioFrame::new(raw));

        if let Some(vad_tx) = &running.vad_tx {
            let normalized: Vec<f32> = samples.iter().map(|&s| s as f32 / 32767.0).collect();
            let _ = vad_tx.send(AudioFrame::new(normalized));
        }

        let _ = running.event_tx.send(PipelineEvent::Pcm {
            samples: samples.to_vec(),
        });
    }

    /// Stops every worker and joins each within the configured budget.
    ///
    /// Idempotent: calling stop() twice is the same as calling it once.
    /// A straggler past its budget is reported and left to the OS.
    pub fn stop(&mut self) {
        if self.state != Lifecycle::Running {
            return;
        }
        self.state = Lifecycle::Stopping;

        let Some(running) = self.running.take() else {
            self.state = Lifecycle::Stopped;
            return;
        };
        let RunningPipeline {
            mel_tx,
            vad_tx,
            event_tx,
            runners,
        } = running;

        // Disconnect the ingress; each stage exits when its input drains,
        // dropping its own senders and cascading downstream.
        drop(mel_tx);
        drop(vad_tx);
        drop(event_tx);

        for runner in runners {
            if let Err(message) = runner.join_timeout(self.join_timeout) {
                self.reporter
                    .report("supervisor", &StationError::Recoverable(message));
            }
        }

        self.state = Lifecycle::Stopped;
    }

    /// Stops if needed and drops sessions and buffers.
    pub fn release(&mut self) {
        self.stop();
        self.models = None;
        self.running = None;
        self.state = Lifecycle::Uninitialized;
    }
}

impl Drop for WakePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{EMB_DIM, MEL_BINS, VAD_STATE_LEN};
    use crate::runtime::{ScriptedLoader, ScriptedSession, TensorData};
    use crate::sink::CollectorSink;

    /// Loader whose mel model emits 76 frames per call so one 5120-sample
    /// feed primes the embedding window immediately.
    fn scripted_loader(wake_probability: f32) -> ScriptedLoader {
        ScriptedLoader::new()
            .with_model("melspectrogram", || {
                Box::new(ScriptedSession::fixed(vec![(
                    "mel".to_string(),
                    TensorData::f32(vec![1, 76, MEL_BINS], vec![0.0; 76 * MEL_BINS]),
                )]))
            })
            .with_model("embedding_model", || {
                Box::new(ScriptedSession::fixed(vec![(
                    "embedding".to_string(),
                    TensorData::f32(vec![1, EMB_DIM], vec![0.1; EMB_DIM]),
                )]))
            })
            .with_model("hey_jarvis", move || {
                Box::new(ScriptedSession::fixed(vec![(
                    "prob".to_string(),
                    TensorData::scalar(wake_probability),
                )]))
            })
            .with_model("silero_vad", || {
                Box::new(ScriptedSession::fixed(vec![
                    ("output".to_string(), TensorData::scalar(0.0)),
                    (
                        "stateN".to_string(),
                        TensorData::f32(vec![2, 1, 128], vec![0.0; VAD_STATE_LEN]),
                    ),
                ]))
            })
    }

    fn paths(with_vad: bool) -> ModelPaths {
        ModelPaths {
            mel: PathBuf::from("/models/melspectrogram.onnx"),
            embedding: PathBuf::from("/models/embedding_model.onnx"),
            wake_words: vec![PathBuf::from("/models/hey_jarvis.onnx")],
            vad: with_vad.then(|| PathBuf::from("/models/silero_vad.onnx")),
        }
    }

    #[test]
    fn test_init_transitions_to_initialized() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        assert_eq!(pipeline.state(), Lifecycle::Uninitialized);
        pipeline.init(&paths(true)).unwrap();
        assert_eq!(pipeline.state(), Lifecycle::Initialized);
    }

    #[test]
    fn test_init_failure_stays_uninitialized() {
        // Loader knows no models at all.
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(ScriptedLoader::new()));

        let result = pipeline.init(&paths(true));
        assert!(matches!(result, Err(HearkenError::ModelLoad { .. })));
        assert_eq!(pipeline.state(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_init_requires_wake_models() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        let mut no_wake = paths(true);
        no_wake.wake_words.clear();
        assert!(pipeline.init(&no_wake).is_err());
        assert_eq!(pipeline.state(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_start_before_init_is_noop() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        pipeline.start(Arc::new(CollectorSink::new())).unwrap();
        assert_eq!(pipeline.state(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_feed_before_start_is_dropped() {
        let pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));
        // No panic, nothing to observe: the samples vanish.
        pipeline.feed(&[0i16; 1600]);
    }

    #[test]
    fn test_start_and_stop_lifecycle() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        pipeline.init(&paths(true)).unwrap();
        pipeline.start(Arc::new(CollectorSink::new())).unwrap();
        assert!(pipeline.is_running());

        pipeline.stop();
        assert_eq!(pipeline.state(), Lifecycle::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        pipeline.init(&paths(true)).unwrap();
        pipeline.start(Arc::new(CollectorSink::new())).unwrap();

        pipeline.stop();
        let state_after_first = pipeline.state();
        pipeline.stop();
        assert_eq!(pipeline.state(), state_after_first);
    }

    #[test]
    fn test_release_returns_to_uninitialized() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.0)));

        pipeline.init(&paths(true)).unwrap();
        pipeline.start(Arc::new(CollectorSink::new())).unwrap();
        pipeline.release();
        assert_eq!(pipeline.state(), Lifecycle::Uninitialized);

        // A released pipeline can be initialized again.
        pipeline.init(&paths(false)).unwrap();
        assert_eq!(pipeline.state(), Lifecycle::Initialized);
    }

    #[test]
    fn test_no_callbacks_after_stop() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.9)));
        let sink = Arc::new(CollectorSink::new());

        pipeline.init(&paths(true)).unwrap();
        pipeline.start(sink.clone()).unwrap();

        pipeline.feed(&vec![100i16; 5120 * 4]);
        pipeline.stop();

        let events_at_stop = sink.events().len();
        // Feeding after stop is a silent no-op.
        pipeline.feed(&vec![100i16; 5120 * 4]);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.events().len(), events_at_stop);
    }

    #[test]
    fn test_wake_only_pipeline_without_vad() {
        let mut pipeline =
            WakePipeline::new(Config::default()).with_loader(Box::new(scripted_loader(0.9)));
        let sink = Arc::new(CollectorSink::new());

        pipeline.init(&paths(false)).unwrap();
        pipeline.start(sink.clone()).unwrap();

        // Enough audio to prime embeddings and run the classifier.
        for _ in 0..20 {
            pipeline.feed(&vec![100i16; 5120]);
        }
        std::thread::sleep(Duration::from_millis(300));
        pipeline.stop();

        assert!(!sink.wake_words().is_empty());
        // No VAD, no capture.
        assert!(sink.captures().is_empty());
    }

    #[test]
    fn test_model_paths_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "melspectrogram.onnx",
            "embedding_model.onnx",
            "silero_vad.onnx",
            "alexa_v0.1.onnx",
            "hey_jarvis.onnx",
            "readme.txt",
        ] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let paths = ModelPaths::from_dir(dir.path()).unwrap();
        assert!(paths.mel.ends_with("melspectrogram.onnx"));
        assert!(paths.embedding.ends_with("embedding_model.onnx"));
        assert!(paths.vad.is_some());
        let stems: Vec<String> = paths.wake_words.iter().map(|p| model_stem(p)).collect();
        assert_eq!(stems, vec!["alexa_v0.1", "hey_jarvis"]);
    }

    #[test]
    fn test_model_paths_from_dir_requires_core_models() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hey_jarvis.onnx"), b"stub").unwrap();

        assert!(matches!(
            ModelPaths::from_dir(dir.path()),
            Err(HearkenError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_model_stem() {
        assert_eq!(
            model_stem(&PathBuf::from("/models/alexa_v0.1.onnx")),
            "alexa_v0.1"
        );
    }
}
