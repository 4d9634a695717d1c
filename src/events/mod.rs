//! Typed event fabric connecting the subsystems.
//!
//! Every observable transition in the system (wake word heard, conversation
//! started, tool invoked, volume button pressed, ...) is published as an
//! [`Event`] on the [`EventBus`]. Subscribers such as the device coordinator
//! translate bus traffic into externally visible state (LED colour, call
//! state). The taxonomy is closed: new event kinds are added here, never
//! invented ad hoc by publishers.

mod bus;

pub use bus::{EventBus, EventHandler};

use chrono::{DateTime, Utc};

/// Payload taxonomy for bus events.
///
/// The set is closed by design; the device coordinator and supervisor match
/// exhaustively over it.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A conversation became ready for user speech.
    StartListening,
    /// The current conversation ended (any outcome).
    StopListening,
    /// Assistant playback level for LED brightness; `None` clears the meter.
    TalkLevel(Option<u8>),
    /// Process is shutting down.
    Shutdown,
    /// A tool function is about to run.
    FunctionInvoking { name: String },
    /// A tool function finished.
    FunctionInvoked { name: String },
    /// A subsystem failed; the supervisor will recover.
    SystemError { message: String },
    /// The system is healthy and idle.
    SystemOk,
    /// A wake-word model fired.
    WakeWordDetected { model: String },
    /// The noise gate opened (possible speech while idle).
    NoiseDetected,
    /// The wake stage fell back to the idle gate after silence.
    SilenceDetected,
    /// Settings were rewritten; cached sessions must be discarded.
    ConfigChanged,
    /// The user requested hangup (button, or the System tool).
    HangupInput,
    VolumeCtrlUp,
    VolumeCtrlDown,
    NightModeActivated,
    NightModeDeactivated,
}

/// Discriminant used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StartListening,
    StopListening,
    TalkLevel,
    Shutdown,
    FunctionInvoking,
    FunctionInvoked,
    SystemError,
    SystemOk,
    WakeWordDetected,
    NoiseDetected,
    SilenceDetected,
    ConfigChanged,
    HangupInput,
    VolumeCtrlUp,
    VolumeCtrlDown,
    NightModeActivated,
    NightModeDeactivated,
}

impl EventKind {
    /// The subscription key for this payload.
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::StartListening => EventType::StartListening,
            EventKind::StopListening => EventType::StopListening,
            EventKind::TalkLevel(_) => EventType::TalkLevel,
            EventKind::Shutdown => EventType::Shutdown,
            EventKind::FunctionInvoking { .. } => EventType::FunctionInvoking,
            EventKind::FunctionInvoked { .. } => EventType::FunctionInvoked,
            EventKind::SystemError { .. } => EventType::SystemError,
            EventKind::SystemOk => EventType::SystemOk,
            EventKind::WakeWordDetected { .. } => EventType::WakeWordDetected,
            EventKind::NoiseDetected => EventType::NoiseDetected,
            EventKind::SilenceDetected => EventType::SilenceDetected,
            EventKind::ConfigChanged => EventType::ConfigChanged,
            EventKind::HangupInput => EventType::HangupInput,
            EventKind::VolumeCtrlUp => EventType::VolumeCtrlUp,
            EventKind::VolumeCtrlDown => EventType::VolumeCtrlDown,
            EventKind::NightModeActivated => EventType::NightModeActivated,
            EventKind::NightModeDeactivated => EventType::NightModeDeactivated,
        }
    }

    /// Whether this payload is too frequent to be worth tracing.
    fn default_skip_logging(&self) -> bool {
        matches!(self, EventKind::TalkLevel(_))
    }
}

/// One bus event: payload plus publication metadata.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// Short name of the publishing subsystem, for diagnostics.
    pub sender: &'static str,
    /// Suppress per-event debug tracing (per-frame meter levels).
    pub skip_logging: bool,
    pub kind: EventKind,
}

impl Event {
    /// Build an event stamped with the current time. High-frequency kinds
    /// (talk level) default to `skip_logging`.
    pub fn new(sender: &'static str, kind: EventKind) -> Self {
        let skip_logging = kind.default_skip_logging();
        Self {
            timestamp: Utc::now(),
            sender,
            skip_logging,
            kind,
        }
    }
}
