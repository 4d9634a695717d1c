//! Local wake-word detection.
//!
//! Two layers: [`WakeEngine`] runs the per-model streaming classifiers and
//! applies threshold/trigger-level debouncing; [`WakeStage`] gates the
//! microphone behind an amplitude noise detector so the neural models only
//! run while the room is loud enough to matter.

mod engine;
mod stage;

pub use engine::{WakeEngine, WakeModelSpec};
pub use stage::{WakeStage, WakeStageConfig};

use anyhow::Result;
use thiserror::Error;

use crate::audio::AudioError;

/// Seam over the wake-word classifier bank so the stage can be exercised
/// with scripted detections.
pub trait WakeWordEngine: Send {
    /// Advance every model by one frame. Returns the id of a model that
    /// fired on this frame, if any.
    fn process(&mut self, frame: &[i16]) -> Result<Option<String>>;

    /// Clear all per-model recurrent state and debounce windows.
    fn reset(&mut self);

    /// Push `frames` silent frames through every model so first-inference
    /// latency is paid before live audio arrives. State is reset afterwards.
    fn prewarm_frames(&mut self, frames: usize, frame_size: usize) -> Result<()>;
}

/// Errors from the wake stage.
#[derive(Debug, Error)]
pub enum WakeError {
    /// The capture device failed; waiting cannot continue.
    #[error("recorder failure: {0}")]
    Recorder(#[from] AudioError),
    /// Wake model inference failed.
    #[error("wake inference failure: {0}")]
    Inference(anyhow::Error),
}
