//! ONNX inference for Silero VAD.
//!
//! Model I/O contract:
//! - `input`: `[1, frame + context]` f32 audio in [-1, 1]
//! - `state`: `[2, 1, 128]` recurrent state
//! - `sr`: sample rate as int64 `[1]`
//! - outputs: `output` (speech probability `[1, 1]`) and `stateN`
//!   (updated recurrent state)

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array3;
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::Value;
use tracing::{debug, info};

use super::config::VadConfig;
use crate::audio::resample;

const STATE_DIM_0: usize = 2;
const STATE_DIM_1: usize = 1;
const STATE_DIM_2: usize = 128;
const STATE_SIZE: usize = STATE_DIM_0 * STATE_DIM_1 * STATE_DIM_2;

/// One loaded Silero VAD session plus its recurrent state and context buffer.
/// Not thread safe by itself; [`super::SileroVad`] serializes access.
pub struct VadModel {
    session: Session,
    config: VadConfig,
    state: Array3<f32>,
    /// Last `context_size` samples of the previous frame.
    context: Vec<f32>,
    sample_rate_tensor: i64,
}

impl VadModel {
    /// Load the model from `config.model_path` and initialise zeroed state.
    pub fn load(config: VadConfig) -> Result<Self> {
        info!(path = %config.model_path.display(), "loading VAD model");
        let session = model_session(&config.model_path, config.num_threads)
            .context("failed to load VAD model")?;

        let context = vec![0.0f32; config.context_size()];
        let sample_rate_tensor = config.sample_rate.as_hz() as i64;

        Ok(Self {
            session,
            state: Array3::zeros((STATE_DIM_0, STATE_DIM_1, STATE_DIM_2)),
            context,
            config,
            sample_rate_tensor,
        })
    }

    /// Run one frame through the model and return the speech probability.
    ///
    /// # Errors
    ///
    /// Fails when `frame` is not exactly the configured frame size or when
    /// inference fails.
    pub fn process(&mut self, frame: &[i16]) -> Result<f32> {
        let frame_size = self.config.frame_size();
        if frame.len() != frame_size {
            anyhow::bail!(
                "invalid VAD frame size: got {}, expected {}",
                frame.len(),
                frame_size
            );
        }

        let audio = resample::frame_to_f32(frame);

        let context_size = self.config.context_size();
        let mut input = Vec::with_capacity(context_size + frame_size);
        input.extend_from_slice(&self.context);
        input.extend_from_slice(&audio);
        self.context
            .copy_from_slice(&audio[audio.len() - context_size..]);

        self.infer(&input)
    }

    fn infer(&mut self, input: &[f32]) -> Result<f32> {
        let input_len = input.len();
        let input_value = Value::from_array(([1, input_len], input.to_vec()))
            .context("failed to create input tensor")?
            .into();

        let state_data: Vec<f32> = self.state.iter().copied().collect();
        let state_value = Value::from_array(([STATE_DIM_0, STATE_DIM_1, STATE_DIM_2], state_data))
            .context("failed to create state tensor")?
            .into();

        let sr_value = Value::from_array(([1], vec![self.sample_rate_tensor]))
            .context("failed to create sample rate tensor")?
            .into();

        let inputs: Vec<(&str, Value)> = vec![
            ("input", input_value),
            ("state", state_value),
            ("sr", sr_value),
        ];

        let outputs = self.session.run(inputs).context("VAD inference failed")?;

        let (_, probs) = outputs
            .get("output")
            .context("no 'output' tensor in VAD results")?
            .try_extract_tensor::<f32>()
            .context("failed to extract VAD output tensor")?;
        let speech_prob = probs.first().copied().unwrap_or(0.0);

        if let Some(state_tensor) = outputs.get("stateN") {
            let (_, state_data) = state_tensor
                .try_extract_tensor::<f32>()
                .context("failed to extract stateN tensor")?;
            if state_data.len() == STATE_SIZE {
                self.state = Array3::from_shape_vec(
                    (STATE_DIM_0, STATE_DIM_1, STATE_DIM_2),
                    state_data.to_vec(),
                )
                .context("failed to reshape VAD state")?;
            }
        }

        debug!(speech_prob, "VAD frame");
        Ok(speech_prob)
    }

    /// Zero the recurrent state and the context buffer.
    pub fn reset(&mut self) {
        self.state = Array3::zeros((STATE_DIM_0, STATE_DIM_1, STATE_DIM_2));
        self.context.fill(0.0);
    }

    pub fn frame_size(&self) -> usize {
        self.config.frame_size()
    }
}

/// Shared ONNX session construction for the small streaming models (VAD and
/// wake word): maximum graph optimization, bounded threads.
pub(crate) fn model_session(model_path: &Path, num_threads: usize) -> Result<Session> {
    SessionBuilder::new()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(num_threads)?
        .with_inter_threads(1)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ONNX model {}", model_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_dimensions() {
        assert_eq!(STATE_SIZE, 256);
    }
}
