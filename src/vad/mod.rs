//! Streaming voice-activity detection.
//!
//! Split into the recurrent model step (`model`), the pure hysteresis state
//! machine (`segmenter`), and the pipeline stage tying them together
//! (`stage`).

pub mod model;
pub mod segmenter;
pub mod stage;

pub use model::{SileroModel, VadModelState};
pub use segmenter::{VadSegmenter, VadTransition};
pub use stage::{VadControl, VadStage};
