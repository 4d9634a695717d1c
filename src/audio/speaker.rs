//! Speaker playback over cpal.
//!
//! Incoming PCM16 at the remote rate (24 kHz) is converted to floats and
//! enqueued into a bounded ring of roughly one minute of audio. A dedicated
//! playback thread owns the `!Send` cpal stream and drains the ring from the
//! device callback, padding with silence when the ring is empty. A 100 ms
//! meter timer reports the post-mix peak to an optional callback, but only
//! while the ring holds audio, so silence produces no meter traffic.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{AudioError, resample};

/// Seconds of audio the playback ring can hold.
const RING_SECONDS: usize = 60;

/// Meter sampling period.
const METER_PERIOD: Duration = Duration::from_millis(100);

/// Floor of the meter's dynamic range in dBFS.
const METER_FLOOR_DB: f32 = -60.0;

/// Callback receiving the playback level as a byte (0 silent, 255 full scale).
pub type MeterCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Seam for assistant audio playback. The receive loop writes through this
/// trait so tests can observe playback without a sound device.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Enqueue PCM16 little-endian bytes for playback. Non-blocking.
    fn write(&self, pcm: &[u8]);

    /// Drop all buffered audio immediately.
    fn clear(&self);

    /// Resolve once every buffered sample has been handed to the device.
    async fn flush(&self);

    /// Milliseconds of audio actually played since the last
    /// [`AudioOutput::reset_played`].
    fn played_ms(&self) -> u64;

    /// Restart the played-time measurement (called when a new assistant item
    /// begins streaming, so truncation reports per-item playback).
    fn reset_played(&self);
}

/// Map a linear peak in [0, 1] onto the meter byte via dBFS.
pub(crate) fn meter_level(peak: f32) -> u8 {
    if peak <= 0.0 {
        return 0;
    }
    let db = (20.0 * peak.log10()).clamp(METER_FLOOR_DB, 0.0);
    (((db - METER_FLOOR_DB) / -METER_FLOOR_DB) * 255.0).round() as u8
}

struct Shared {
    ring: Mutex<VecDeque<f32>>,
    capacity: usize,
    /// Samples dequeued by the device callback since the last reset.
    played_samples: AtomicU64,
    /// Peak of the most recent device buffer, stored as f32 bits.
    peak_bits: AtomicU32,
    sample_rate: u32,
}

impl Shared {
    fn ring_len(&self) -> usize {
        self.ring.lock().len()
    }
}

/// Playback device for remote assistant audio.
pub struct Speaker {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    meter_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Speaker {
    /// Open the default output device and start playback at `sample_rate`.
    /// When `meter` is given, a 100 ms timer reports the post-mix peak while
    /// audio is buffered.
    pub fn open(sample_rate: u32, meter: Option<MeterCallback>) -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no output device".into()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        info!(device = %device_name, sample_rate, "opening speaker");

        let shared = Arc::new(Shared {
            ring: Mutex::new(VecDeque::with_capacity(sample_rate as usize)),
            capacity: sample_rate as usize * RING_SECONDS,
            played_samples: AtomicU64::new(0),
            peak_bits: AtomicU32::new(0),
            sample_rate,
        });
        let stop = Arc::new(AtomicBool::new(false));

        let thread_shared = Arc::clone(&shared);
        let thread_stop = Arc::clone(&stop);
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        std::thread::Builder::new()
            .name("speaker-playback".into())
            .spawn(move || {
                let cb_shared = Arc::clone(&thread_shared);
                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut ring = cb_shared.ring.lock();
                        let mut peak = 0.0f32;
                        let mut played = 0u64;
                        for slot in data.iter_mut() {
                            match ring.pop_front() {
                                Some(sample) => {
                                    *slot = sample;
                                    peak = peak.max(sample.abs());
                                    played += 1;
                                }
                                None => *slot = 0.0,
                            }
                        }
                        drop(ring);
                        cb_shared
                            .played_samples
                            .fetch_add(played, Ordering::Relaxed);
                        cb_shared.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
                    },
                    |err| warn!("speaker stream error: {}", err),
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            warn!("failed to start speaker stream: {}", e);
                            return;
                        }
                        while !thread_stop.load(Ordering::Relaxed) {
                            std::thread::sleep(Duration::from_millis(50));
                        }
                    }
                    Err(e) => warn!("failed to build speaker stream: {}", e),
                }
            })
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        let meter_task = meter.map(|callback| {
            let meter_shared = Arc::clone(&shared);
            let meter_stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(METER_PERIOD);
                while !meter_stop.load(Ordering::Relaxed) {
                    ticker.tick().await;
                    if meter_shared.ring_len() == 0 {
                        continue;
                    }
                    let peak = f32::from_bits(meter_shared.peak_bits.load(Ordering::Relaxed));
                    callback(meter_level(peak));
                }
            })
        });

        Ok(Self {
            shared,
            stop,
            meter_task: Mutex::new(meter_task),
        })
    }

    /// Stop playback and the meter timer. Also run by `Drop`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.meter_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl AudioOutput for Speaker {
    fn write(&self, pcm: &[u8]) {
        let samples = resample::pcm_to_samples(pcm);
        let mut ring = self.shared.ring.lock();
        let free = self.shared.capacity.saturating_sub(ring.len());
        if samples.len() > free {
            warn!(
                dropped = samples.len() - free,
                "playback ring full; dropping audio"
            );
        }
        for &sample in samples.iter().take(free) {
            ring.push_back(resample::sample_to_f32(sample));
        }
    }

    fn clear(&self) {
        let mut ring = self.shared.ring.lock();
        let dropped = ring.len();
        ring.clear();
        if dropped > 0 {
            debug!(dropped, "cleared playback ring");
        }
    }

    async fn flush(&self) {
        while self.shared.ring_len() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn played_ms(&self) -> u64 {
        let samples = self.shared.played_samples.load(Ordering::Relaxed);
        samples * 1000 / self.shared.sample_rate as u64
    }

    fn reset_played(&self) {
        self.shared.played_samples.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_level_silence_is_zero() {
        assert_eq!(meter_level(0.0), 0);
        assert_eq!(meter_level(-1.0), 0);
    }

    #[test]
    fn test_meter_level_full_scale_is_max() {
        assert_eq!(meter_level(1.0), 255);
    }

    #[test]
    fn test_meter_level_floor_clamps() {
        // -80 dB is below the floor and must clamp to 0, not wrap.
        assert_eq!(meter_level(0.0001), 0);
    }

    #[test]
    fn test_meter_level_midrange_monotone() {
        let quiet = meter_level(0.01); // -40 dB
        let mid = meter_level(0.1); // -20 dB
        let loud = meter_level(0.5); // ~-6 dB
        assert!(quiet < mid && mid < loud && loud < 255);
        // -20 dB sits exactly two thirds up the 60 dB range.
        assert_eq!(mid, ((40.0 / 60.0) * 255.0_f32).round() as u8);
    }
}
