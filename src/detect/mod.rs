//! Wake-word detection over the embedding stream.

pub mod wakeword;

pub use wakeword::{ActivationCounter, WakeWordStage};
