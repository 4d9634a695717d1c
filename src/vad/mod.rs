//! Frame-level voice activity detection.
//!
//! Wraps the Silero VAD ONNX model behind the [`SpeechDetector`] seam the
//! capture loop consumes. The model is streaming: recurrent state carries
//! across frames and must be reset between utterances (and after barge-in)
//! for reproducible probabilities.

mod config;
mod detector;
mod model;

pub use config::{VadConfig, VadSampleRate};
pub use detector::SileroVad;
pub use model::VadModel;
pub(crate) use model::model_session;

use anyhow::Result;
use async_trait::async_trait;

/// Seam for frame-level speech classification.
///
/// Contract: `frame` must be exactly [`frame_size`](Self::frame_size) PCM16
/// samples at the configured rate; the result is a speech probability in
/// [0, 1].
#[async_trait]
pub trait SpeechDetector: Send + Sync {
    /// Speech probability of one frame.
    async fn speech_probability(&self, frame: &[i16]) -> Result<f32>;

    /// Clear recurrent state so the next frame starts a fresh stream.
    async fn reset(&self);

    /// Required frame length in samples.
    fn frame_size(&self) -> usize;
}
