use crate::defaults;
use crate::error::{HearkenError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub wake: WakeConfig,
    pub vad: VadConfig,
    pub capture: CaptureConfig,
    pub channels: ChannelConfig,
}

/// Wake-word activation configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeConfig {
    /// Per-frame probability threshold.
    pub threshold: f32,
    /// Consecutive over-threshold frames needed to fire (1..=4).
    pub trigger_level: i32,
    /// Embedding frames of enforced silence after a fire.
    pub refractory: i32,
}

/// Voice activity detection configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// High band of the hysteresis; the low band is `threshold - 0.15`.
    pub threshold: f32,
    /// Trailing silence needed to end a speech segment.
    pub min_silence_ms: u32,
    /// Minimum accepted speech segment.
    pub min_speech_ms: u32,
    /// Force-end threshold for runaway segments.
    pub max_speech_s: f32,
    /// Pad reserved for external trimming; not applied to the buffer.
    pub speech_pad_ms: u32,
    /// Whether the VAD stage processes audio before the first wake word.
    pub auto_enable: bool,
}

/// Utterance capture configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Hard cap on capture buffer length, in seconds.
    pub max_duration_s: u32,
    /// Delay before a VAD end is applied to the capture window.
    pub end_delay_ms: u32,
}

/// Bounded channel capacities between pipeline stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub mel_buffer: usize,
    pub embedding_buffer: usize,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::WAKE_THRESHOLD,
            trigger_level: defaults::TRIGGER_LEVEL,
            refractory: defaults::REFRACTORY,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::VAD_THRESHOLD,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            max_speech_s: defaults::MAX_SPEECH_S,
            speech_pad_ms: defaults::SPEECH_PAD_MS,
            auto_enable: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_s: defaults::CAPTURE_CAP_S,
            end_delay_ms: defaults::END_DELAY_MS,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mel_buffer: defaults::MEL_CHANNEL_CAPACITY,
            embedding_buffer: defaults::EMBEDDING_CHANNEL_CAPACITY,
        }
    }
}

impl VadConfig {
    /// Low band of the hysteresis.
    pub fn low_threshold(&self) -> f32 {
        self.threshold - defaults::VAD_HYSTERESIS
    }
}

impl CaptureConfig {
    /// Capture cap expressed in samples.
    pub fn max_samples(&self) -> usize {
        self.max_duration_s as usize * defaults::SAMPLE_RATE as usize
    }

    /// End delay expressed in samples.
    pub fn end_delay_samples(&self) -> usize {
        self.end_delay_ms as usize * defaults::SAMPLE_RATE as usize / 1000
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file
    /// doesn't exist. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(HearkenError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - HEARKEN_WAKE_THRESHOLD → wake.threshold
    /// - HEARKEN_TRIGGER_LEVEL → wake.trigger_level
    /// - HEARKEN_VAD_THRESHOLD → vad.threshold
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("HEARKEN_WAKE_THRESHOLD")
            && let Ok(threshold) = value.parse::<f32>()
        {
            self.wake.threshold = threshold;
        }

        if let Ok(value) = std::env::var("HEARKEN_TRIGGER_LEVEL")
            && let Ok(level) = value.parse::<i32>()
        {
            self.wake.trigger_level = level;
        }

        if let Ok(value) = std::env::var("HEARKEN_VAD_THRESHOLD")
            && let Ok(threshold) = value.parse::<f32>()
        {
            self.vad.threshold = threshold;
        }

        self
    }

    /// Check that tunables are inside their supported ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.wake.threshold) {
            return Err(HearkenError::ConfigInvalidValue {
                key: "wake.threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if !(1..=4).contains(&self.wake.trigger_level) {
            return Err(HearkenError::ConfigInvalidValue {
                key: "wake.trigger_level".to_string(),
                message: "must be between 1 and 4".to_string(),
            });
        }
        if self.wake.refractory < 0 {
            return Err(HearkenError::ConfigInvalidValue {
                key: "wake.refractory".to_string(),
                message: "must be non-negative".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(HearkenError::ConfigInvalidValue {
                key: "vad.threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.vad.max_speech_s <= 0.0 {
            return Err(HearkenError::ConfigInvalidValue {
                key: "vad.max_speech_s".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.capture.max_duration_s == 0 {
            return Err(HearkenError::ConfigInvalidValue {
                key: "capture.max_duration_s".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/hearken/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("hearken")
            .join("config.toml")
    }
}
