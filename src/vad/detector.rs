//! Async wrapper around [`VadModel`].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::VadConfig;
use super::model::VadModel;
use super::SpeechDetector;

/// Thread-safe Silero VAD detector.
///
/// Inference is CPU-bound, so each frame runs under `spawn_blocking` instead
/// of stalling the runtime worker the capture loop lives on.
pub struct SileroVad {
    model: Arc<Mutex<VadModel>>,
    frame_size: usize,
}

impl SileroVad {
    /// Load the model described by `config`.
    pub async fn new(config: VadConfig) -> Result<Self> {
        let frame_size = config.frame_size();
        let model = tokio::task::spawn_blocking(move || VadModel::load(config))
            .await
            .context("VAD model load task was cancelled")??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            frame_size,
        })
    }
}

#[async_trait]
impl SpeechDetector for SileroVad {
    async fn speech_probability(&self, frame: &[i16]) -> Result<f32> {
        let model = Arc::clone(&self.model);
        let frame = frame.to_vec();
        tokio::task::spawn_blocking(move || model.lock().process(&frame))
            .await
            .context("VAD inference task was cancelled")?
    }

    async fn reset(&self) {
        let model = Arc::clone(&self.model);
        let _ = tokio::task::spawn_blocking(move || model.lock().reset()).await;
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }
}
