//! VAD configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rates the Silero model supports. Anything else must be resampled
/// before it reaches the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VadSampleRate {
    /// 8000 Hz, 256-sample frames.
    #[serde(rename = "8000")]
    Rate8kHz,
    /// 16000 Hz, 512-sample frames. The realtime path uses this.
    #[serde(rename = "16000")]
    #[default]
    Rate16kHz,
}

/// Raised when a caller asks for a rate the model cannot run at.
#[derive(Debug, Error)]
#[error("unsupported VAD sample rate: {0} Hz (supported: 8000, 16000)")]
pub struct UnsupportedRate(pub u32);

impl VadSampleRate {
    /// Validating conversion; the blanket `From<u32>` fallback of the old
    /// builder is gone on purpose so misconfiguration surfaces at load time.
    pub fn try_from_hz(hz: u32) -> Result<Self, UnsupportedRate> {
        match hz {
            8000 => Ok(Self::Rate8kHz),
            16000 => Ok(Self::Rate16kHz),
            other => Err(UnsupportedRate(other)),
        }
    }

    pub fn as_hz(&self) -> u32 {
        match self {
            Self::Rate8kHz => 8000,
            Self::Rate16kHz => 16000,
        }
    }

    /// Frame length the model expects (32 ms at either rate).
    pub fn frame_size(&self) -> usize {
        match self {
            Self::Rate8kHz => 256,
            Self::Rate16kHz => 512,
        }
    }

    /// Samples of the previous frame prepended for temporal continuity.
    pub fn context_size(&self) -> usize {
        match self {
            Self::Rate8kHz => 32,
            Self::Rate16kHz => 64,
        }
    }
}

/// Configuration for the Silero VAD detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Sample rate of the frames fed to the model.
    pub sample_rate: VadSampleRate,

    /// Path to the Silero VAD ONNX model file.
    pub model_path: PathBuf,

    /// Threads for ONNX inference. VAD is light; one thread suffices.
    pub num_threads: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: VadSampleRate::Rate16kHz,
            model_path: PathBuf::from("models/silero_vad.onnx"),
            num_threads: 1,
        }
    }
}

impl VadConfig {
    pub fn frame_size(&self) -> usize {
        self.sample_rate.frame_size()
    }

    pub fn context_size(&self) -> usize {
        self.sample_rate.context_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_context_sizes() {
        assert_eq!(VadSampleRate::Rate16kHz.frame_size(), 512);
        assert_eq!(VadSampleRate::Rate8kHz.frame_size(), 256);
        assert_eq!(VadSampleRate::Rate16kHz.context_size(), 64);
        assert_eq!(VadSampleRate::Rate8kHz.context_size(), 32);
    }

    #[test]
    fn test_try_from_hz_rejects_unsupported_rates() {
        assert_eq!(
            VadSampleRate::try_from_hz(16000).unwrap(),
            VadSampleRate::Rate16kHz
        );
        assert_eq!(
            VadSampleRate::try_from_hz(8000).unwrap(),
            VadSampleRate::Rate8kHz
        );
        assert!(VadSampleRate::try_from_hz(44100).is_err());
        assert!(VadSampleRate::try_from_hz(24000).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = VadConfig::default();
        assert_eq!(config.sample_rate, VadSampleRate::Rate16kHz);
        assert_eq!(config.frame_size(), 512);
        assert_eq!(config.num_threads, 1);
    }
}
