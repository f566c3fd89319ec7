//! Audio inference pipeline.
//!
//! Implements a multi-station pipeline where each station runs in its own
//! thread, connected by crossbeam channels: unbounded at the ingress,
//! bounded with backpressure between stages.

pub mod error;
pub mod station;
pub mod supervisor;
pub mod types;

pub use error::{ErrorReporter, LogReporter, StationError};
pub use station::{Station, StationRunner};
pub use supervisor::{Lifecycle, ModelPaths, WakePipeline};
pub use types::{AudioFrame, Embedding, MelBlock, PipelineEvent};
