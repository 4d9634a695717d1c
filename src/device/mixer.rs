//! Volume control with a perceptual curve.
//!
//! The logical scale is 0–10. Hardware gain is the logical fraction raised
//! to 0.4, which spreads the lower steps across the range the ear actually
//! hears; `playback_volume` applies the inverse curve so round-tripping a
//! level returns it (±1 from rounding).

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Exponent of the perceptual power curve.
const CURVE_EXPONENT: f32 = 0.4;

/// Highest logical volume step.
pub const MAX_VOLUME: u8 = 10;

/// Hardware side of the mixer (ALSA in production, log-only by default).
pub trait MixerBackend: Send + Sync {
    /// Apply a gain fraction in [0, 1].
    fn set_gain(&self, fraction: f32);
}

/// Log-only backend.
#[derive(Default)]
pub struct LogMixerBackend;

impl MixerBackend for LogMixerBackend {
    fn set_gain(&self, fraction: f32) {
        debug!(fraction, "mixer gain");
    }
}

/// Logical volume controller.
pub struct VolumeMixer {
    backend: Arc<dyn MixerBackend>,
    /// Last applied hardware fraction; source of truth for `playback_volume`.
    fraction: Mutex<f32>,
}

impl VolumeMixer {
    pub fn new(backend: Arc<dyn MixerBackend>) -> Self {
        Self {
            backend,
            fraction: Mutex::new(0.0),
        }
    }

    /// Set the logical volume (clamped to 0–10).
    pub fn set_playback_volume(&self, volume: u8) {
        let volume = volume.min(MAX_VOLUME);
        let fraction = (volume as f32 / MAX_VOLUME as f32).powf(CURVE_EXPONENT);
        *self.fraction.lock() = fraction;
        self.backend.set_gain(fraction);
        info!(volume, fraction, "volume set");
    }

    /// Current logical volume, recovered through the inverse curve.
    pub fn playback_volume(&self) -> u8 {
        let fraction = *self.fraction.lock();
        (fraction.powf(1.0 / CURVE_EXPONENT) * MAX_VOLUME as f32).round() as u8
    }

    pub fn step_up(&self) {
        let current = self.playback_volume();
        self.set_playback_volume((current + 1).min(MAX_VOLUME));
    }

    pub fn step_down(&self) {
        let current = self.playback_volume();
        self.set_playback_volume(current.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> VolumeMixer {
        VolumeMixer::new(Arc::new(LogMixerBackend))
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let mixer = mixer();
        for volume in 0..=MAX_VOLUME {
            mixer.set_playback_volume(volume);
            let read_back = mixer.playback_volume();
            assert!(
                (read_back as i16 - volume as i16).abs() <= 1,
                "volume {volume} read back as {read_back}"
            );
        }
    }

    #[test]
    fn test_perceptual_curve_boosts_low_steps() {
        let mixer = mixer();
        mixer.set_playback_volume(1);
        let low = *mixer.fraction.lock();
        // One step out of ten maps to far more than 10% gain.
        assert!(low > 0.3, "fraction {low}");

        mixer.set_playback_volume(10);
        assert!((*mixer.fraction.lock() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_steps_clamp_at_both_ends() {
        let mixer = mixer();
        mixer.set_playback_volume(0);
        mixer.step_down();
        assert_eq!(mixer.playback_volume(), 0);

        mixer.set_playback_volume(10);
        mixer.step_up();
        assert_eq!(mixer.playback_volume(), 10);
    }

    #[test]
    fn test_step_up_and_down() {
        let mixer = mixer();
        mixer.set_playback_volume(5);
        mixer.step_up();
        assert_eq!(mixer.playback_volume(), 6);
        mixer.step_down();
        mixer.step_down();
        assert_eq!(mixer.playback_volume(), 4);
    }

    #[test]
    fn test_oversized_volume_clamps() {
        let mixer = mixer();
        mixer.set_playback_volume(200);
        assert_eq!(mixer.playback_volume(), 10);
    }
}
