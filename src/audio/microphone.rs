//! Microphone capture over cpal.
//!
//! The cpal stream is `!Send`, so it lives on a dedicated capture thread that
//! chops device callbacks into fixed [`FRAME_SAMPLES`]-sample frames and
//! forwards them over a bounded channel. Frame allocation happens once per
//! frame on the capture thread; the steady-state consumer never allocates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{AudioError, FRAME_SAMPLES};

/// Seam for the capture loop: anything that yields fixed-size PCM16 frames.
///
/// The production implementation is [`Microphone`]; tests drive the loops
/// with scripted frame sources.
#[async_trait]
pub trait FrameSource: Send {
    /// Native sample rate of the delivered frames.
    fn sample_rate(&self) -> u32;

    /// Next frame of exactly [`FRAME_SAMPLES`] samples, or an error when the
    /// device failed. Blocks (asynchronously) while audio accumulates.
    async fn next_frame(&mut self) -> Result<Vec<i16>, AudioError>;
}

/// Default capture device, opened at a requested sample rate.
pub struct Microphone {
    sample_rate: u32,
    frames: mpsc::Receiver<Vec<i16>>,
    stop: Arc<AtomicBool>,
}

impl Microphone {
    /// Open the default input device at `sample_rate` (mono, PCM16).
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::DeviceUnavailable`] when no input device exists
    /// and [`AudioError::StreamBuild`] when the stream cannot be opened at
    /// the requested configuration.
    pub fn open(sample_rate: u32) -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no input device".into()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        info!(device = %device_name, sample_rate, "opening microphone");

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Bounded: if the consumer stalls, old audio is dropped rather than
        // growing without limit.
        let (tx, rx) = mpsc::channel::<Vec<i16>>(32);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES);
                let frame_tx = tx.clone();
                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            pending.push(sample);
                            if pending.len() == FRAME_SAMPLES {
                                let frame = std::mem::replace(
                                    &mut pending,
                                    Vec::with_capacity(FRAME_SAMPLES),
                                );
                                if frame_tx.try_send(frame).is_err() {
                                    // Consumer is behind; drop the frame.
                                }
                            }
                        }
                    },
                    |err| warn!("microphone stream error: {}", err),
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            warn!("failed to start microphone stream: {}", e);
                            return;
                        }
                        while !thread_stop.load(Ordering::Relaxed) {
                            std::thread::sleep(std::time::Duration::from_millis(50));
                        }
                        // Stream drops here, closing the channel.
                    }
                    Err(e) => warn!("failed to build microphone stream: {}", e),
                }
            })
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        Ok(Self {
            sample_rate,
            frames: rx,
            stop,
        })
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl FrameSource for Microphone {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_frame(&mut self) -> Result<Vec<i16>, AudioError> {
        self.frames.recv().await.ok_or(AudioError::StreamClosed)
    }
}
