//! Multi-model streaming wake-word inference.
//!
//! Each model is a streaming ONNX classifier with the same tensor contract
//! as the VAD (`input` `[1, n]` float audio, `state` `[2, 1, 128]` recurrent
//! state, outputs `output` + `stateN`). A model "fires" when its per-frame
//! probability has been at or above its threshold for `trigger_level` of the
//! most recent frames — a sliding count, not a strict run, so one noisy
//! frame in the middle does not restart the debounce.

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::Array3;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use super::WakeWordEngine;
use crate::audio::resample;

/// Debounce window length as a multiple of the trigger level. Hits inside
/// this window need not be consecutive.
const ACTIVATION_WINDOW_FACTOR: usize = 3;

const STATE_DIM: (usize, usize, usize) = (2, 1, 128);

/// One wake-word model to load into the engine.
#[derive(Debug, Clone)]
pub struct WakeModelSpec {
    /// Identifier reported on detection and matched against agent configs.
    pub id: String,
    /// Path to the ONNX model file.
    pub path: PathBuf,
    /// Per-frame activation threshold, [0.1, 0.9].
    pub threshold: f32,
    /// Above-threshold frames (within the sliding window) required to fire.
    pub trigger_level: usize,
}

struct WakeModel {
    id: String,
    threshold: f32,
    trigger_level: usize,
    session: Session,
    state: Array3<f32>,
    /// Recent above-threshold flags, newest last.
    hits: VecDeque<bool>,
}

impl WakeModel {
    fn load(spec: &WakeModelSpec, num_threads: usize) -> Result<Self> {
        info!(id = %spec.id, path = %spec.path.display(), "loading wake model");
        let session = crate::vad::model_session(&spec.path, num_threads)?;
        Ok(Self {
            id: spec.id.clone(),
            threshold: spec.threshold,
            trigger_level: spec.trigger_level.max(1),
            session,
            state: Array3::zeros(STATE_DIM),
            hits: VecDeque::new(),
        })
    }

    fn window_len(&self) -> usize {
        self.trigger_level * ACTIVATION_WINDOW_FACTOR
    }

    /// Run one frame; returns true when the model fires.
    fn advance(&mut self, audio: &[f32]) -> Result<bool> {
        let probability = self.infer(audio)?;

        if self.hits.len() == self.window_len() {
            self.hits.pop_front();
        }
        self.hits.push_back(probability >= self.threshold);

        let hit_count = self.hits.iter().filter(|&&h| h).count();
        if hit_count >= self.trigger_level {
            debug!(id = %self.id, probability, hit_count, "wake model fired");
            return Ok(true);
        }
        Ok(false)
    }

    fn infer(&mut self, audio: &[f32]) -> Result<f32> {
        let input_value = Value::from_array(([1, audio.len()], audio.to_vec()))
            .context("failed to create wake input tensor")?
            .into();
        let state_data: Vec<f32> = self.state.iter().copied().collect();
        let state_value = Value::from_array(([STATE_DIM.0, STATE_DIM.1, STATE_DIM.2], state_data))
            .context("failed to create wake state tensor")?
            .into();

        let outputs = self
            .session
            .run(vec![("input", input_value), ("state", state_value)])
            .with_context(|| format!("wake inference failed for {}", self.id))?;

        let (_, probs) = outputs
            .get("output")
            .context("no 'output' tensor in wake results")?
            .try_extract_tensor::<f32>()
            .context("failed to extract wake output tensor")?;
        let probability = probs.first().copied().unwrap_or(0.0);

        if let Some(state_tensor) = outputs.get("stateN") {
            let (_, state_data) = state_tensor
                .try_extract_tensor::<f32>()
                .context("failed to extract wake stateN tensor")?;
            if state_data.len() == STATE_DIM.0 * STATE_DIM.1 * STATE_DIM.2 {
                self.state = Array3::from_shape_vec(STATE_DIM, state_data.to_vec())
                    .context("failed to reshape wake state")?;
            }
        }

        Ok(probability)
    }

    fn reset(&mut self) {
        self.state = Array3::zeros(STATE_DIM);
        self.hits.clear();
    }
}

/// Bank of wake-word models advanced in lockstep over the frame stream.
/// Models are independent; one firing does not disturb the others' state.
pub struct WakeEngine {
    models: Vec<WakeModel>,
}

impl WakeEngine {
    /// Load every model in `specs`.
    pub fn load(specs: &[WakeModelSpec], num_threads: usize) -> Result<Self> {
        let models = specs
            .iter()
            .map(|spec| WakeModel::load(spec, num_threads))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { models })
    }

}

impl WakeWordEngine for WakeEngine {
    fn process(&mut self, frame: &[i16]) -> Result<Option<String>> {
        let audio = resample::frame_to_f32(frame);
        let mut fired = None;
        // Every model advances on every frame, even after one has fired.
        for model in &mut self.models {
            if model.advance(&audio)? && fired.is_none() {
                fired = Some(model.id.clone());
            }
        }
        Ok(fired)
    }

    fn reset(&mut self) {
        for model in &mut self.models {
            model.reset();
        }
    }

    fn prewarm_frames(&mut self, frames: usize, frame_size: usize) -> Result<()> {
        let silence = vec![0.0f32; frame_size];
        for _ in 0..frames {
            for model in &mut self.models {
                let _ = model.advance(&silence)?;
            }
        }
        self.reset();
        Ok(())
    }
}
