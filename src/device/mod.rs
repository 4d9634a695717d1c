//! Device-visible feedback: LED colour, speakerphone call state, volume.
//!
//! The coordinator is a bus subscriber; the actual GPIO and USB-HID drivers
//! live outside this crate and are reached through the [`LedDriver`] and
//! [`CallStateSink`] traits. The default implementations just log, which is
//! what runs on a development machine.

mod coordinator;
pub mod mixer;

pub use coordinator::DeviceCoordinator;
pub use mixer::{LogMixerBackend, MixerBackend, VolumeMixer};

use tracing::debug;

/// LED colours the device can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off,
    Red,
    Blue,
    /// Assistant speech level; brightness follows the talk meter.
    Green { brightness: u8 },
    LightGreen,
    Orange,
    Yellow,
    White,
}

/// Sink for LED colour changes (GPIO driver in production).
pub trait LedDriver: Send + Sync {
    fn set_color(&self, color: LedColor);
}

/// Sink for the USB-HID speakerphone call state.
pub trait CallStateSink: Send + Sync {
    fn set_call_active(&self, active: bool);
}

/// Log-only LED driver for hosts without GPIO.
#[derive(Default)]
pub struct LogLedDriver;

impl LedDriver for LogLedDriver {
    fn set_color(&self, color: LedColor) {
        debug!(?color, "led");
    }
}

/// Log-only speakerphone sink.
#[derive(Default)]
pub struct LogCallStateSink;

impl CallStateSink for LogCallStateSink {
    fn set_call_active(&self, active: bool) {
        debug!(active, "speakerphone call state");
    }
}
