//! Error types for hearken.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HearkenError {
    // Model loading and inference errors
    #[error("Failed to load model {path}: {message}")]
    ModelLoad { path: String, message: String },

    #[error("Model {model} does not match the expected tensor contract: {message}")]
    ShapeMismatch { model: String, message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Audio feeder errors (binary side)
    #[error("Audio capture failed: {message}")]
    Audio { message: String },

    // Configuration surface
    #[error("Bad value for config key {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Could not parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    // Underlying I/O
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    // Catch-all for conditions without a dedicated variant
    #[error("{0}")]
    Other(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HearkenError>;
