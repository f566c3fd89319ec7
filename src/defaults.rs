//! Default constants shared across configuration types and pipeline stages.
//!
//! The geometry constants (frame, window and hop sizes) are fixed by the
//! models and must not be made configurable; the tunables mirror the
//! configuration surface in `config`.

/// Audio sample rate in Hz. The pipeline assumes 16 kHz mono PCM input and
/// performs no resampling.
pub const SAMPLE_RATE: u32 = 16000;

/// Number of log-mel bins per mel frame.
pub const MEL_BINS: usize = 32;

/// Samples consumed per mel inference call (320 ms at 16 kHz).
pub const MEL_FRAME_SAMPLES: usize = 5120;

/// Mel frames in one embedding window (~775 ms of audio).
pub const EMB_WINDOW_FRAMES: usize = 76;

/// Mel frames the embedding window advances per inference (80 ms).
pub const EMB_STEP_FRAMES: usize = 8;

/// Embedding vector length.
pub const EMB_DIM: usize = 96;

/// Embeddings in one wake-word classification window (~1.28 s).
pub const WAKE_WINDOW: usize = 16;

/// Samples per VAD step (32 ms at 16 kHz).
pub const VAD_WINDOW_SAMPLES: usize = 512;

/// Samples of trailing context prepended to each VAD step input.
pub const VAD_CONTEXT_SAMPLES: usize = 64;

/// Flattened length of the VAD recurrent state tensor (2 x 1 x 128).
pub const VAD_STATE_LEN: usize = 256;

/// Per-frame probability threshold for wake-word activation.
pub const WAKE_THRESHOLD: f32 = 0.5;

/// Consecutive over-threshold frames required to fire a detection.
pub const TRIGGER_LEVEL: i32 = 1;

/// Embedding frames of enforced silence after a detection (~1.6 s).
pub const REFRACTORY: i32 = 20;

/// High band of the VAD hysteresis. The low band sits 0.15 below it.
pub const VAD_THRESHOLD: f32 = 0.5;

/// Width of the VAD hysteresis band.
pub const VAD_HYSTERESIS: f32 = 0.15;

/// Trailing silence required to end a speech segment.
pub const MIN_SILENCE_MS: u32 = 100;

/// Shorter silence horizon used to remember a fallback end point for
/// segments approaching the maximum length.
pub const MIN_SILENCE_AT_MAX_MS: u32 = 98;

/// Minimum accepted speech segment length.
pub const MIN_SPEECH_MS: u32 = 250;

/// Speech segments longer than this are force-ended.
pub const MAX_SPEECH_S: f32 = 30.0;

/// Reserved pad around detected segments; kept for external trimming and
/// not applied to the capture buffer.
pub const SPEECH_PAD_MS: u32 = 30;

/// Hard cap on the capture buffer, in seconds of audio.
pub const CAPTURE_CAP_S: u32 = 30;

/// Delay before a VAD end is surfaced to the capture controller.
pub const END_DELAY_MS: u32 = 500;

/// Bounded capacity of the mel-to-embedding channel.
pub const MEL_CHANNEL_CAPACITY: usize = 32;

/// Bounded capacity of each embedding-to-wake-word channel.
pub const EMBEDDING_CHANNEL_CAPACITY: usize = 16;

/// Wall-clock budget for joining each worker thread during stop().
pub const JOIN_TIMEOUT_MS: u64 = 2000;
