//! Audio hardware primitives: microphone capture, speaker playback, and the
//! sample-format/rate conversions between them.
//!
//! The realtime path works in three clocks: the capture device runs at its
//! native rate in 512-sample frames, the VAD consumes 16 kHz frames, and the
//! remote service speaks 24 kHz PCM16 mono in both directions.

mod microphone;
pub mod resample;
mod speaker;

pub use microphone::{FrameSource, Microphone};
pub use speaker::{AudioOutput, MeterCallback, Speaker};

use thiserror::Error;

/// Samples per capture frame on the realtime path.
pub const FRAME_SAMPLES: usize = 512;

/// Sample rate the VAD operates at.
pub const VAD_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of remote uplink and downlink audio.
pub const REMOTE_SAMPLE_RATE: u32 = 24_000;

/// Errors raised by the local audio devices.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio device available: {0}")]
    DeviceUnavailable(String),
    #[error("failed to open audio stream: {0}")]
    StreamBuild(String),
    #[error("audio stream closed unexpectedly")]
    StreamClosed,
}
