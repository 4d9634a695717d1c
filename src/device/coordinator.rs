//! Bus-to-device translation: LED colour state machine, speakerphone call
//! state, volume buttons.

use std::sync::Arc;

use parking_lot::Mutex;

use super::mixer::VolumeMixer;
use super::{CallStateSink, LedColor, LedDriver};
use crate::events::{Event, EventBus, EventHandler, EventKind, EventType};

/// The condition flags the LED colour is computed from.
#[derive(Debug, Default, Clone)]
struct Flags {
    shutdown: bool,
    error: bool,
    function_invoking: bool,
    talk_level: Option<u8>,
    listening: bool,
    wake_word_detected: bool,
    noise_detected: bool,
    night_mode: bool,
}

/// Highest-priority flag wins.
fn resolve_color(flags: &Flags) -> LedColor {
    if flags.shutdown {
        LedColor::Off
    } else if flags.error {
        LedColor::Red
    } else if flags.function_invoking {
        LedColor::Blue
    } else if let Some(level) = flags.talk_level {
        LedColor::Green { brightness: level }
    } else if flags.listening {
        LedColor::LightGreen
    } else if flags.wake_word_detected {
        LedColor::Orange
    } else if flags.noise_detected {
        LedColor::Yellow
    } else if flags.night_mode {
        LedColor::Off
    } else {
        LedColor::White
    }
}

/// Subscribes to the bus and drives the LED, speakerphone, and mixer.
pub struct DeviceCoordinator {
    led: Arc<dyn LedDriver>,
    call_state: Arc<dyn CallStateSink>,
    mixer: Arc<VolumeMixer>,
    flags: Mutex<Flags>,
    last_color: Mutex<Option<LedColor>>,
}

impl DeviceCoordinator {
    pub fn new(
        led: Arc<dyn LedDriver>,
        call_state: Arc<dyn CallStateSink>,
        mixer: Arc<VolumeMixer>,
    ) -> Self {
        Self {
            led,
            call_state,
            mixer,
            flags: Mutex::new(Flags::default()),
            last_color: Mutex::new(None),
        }
    }

    /// Register for every event kind the coordinator reacts to and show the
    /// initial colour.
    pub fn start(self: &Arc<Self>, bus: &EventBus) {
        bus.subscribe(
            &[
                EventType::StartListening,
                EventType::StopListening,
                EventType::TalkLevel,
                EventType::Shutdown,
                EventType::FunctionInvoking,
                EventType::FunctionInvoked,
                EventType::SystemError,
                EventType::SystemOk,
                EventType::WakeWordDetected,
                EventType::NoiseDetected,
                EventType::SilenceDetected,
                EventType::VolumeCtrlUp,
                EventType::VolumeCtrlDown,
                EventType::NightModeActivated,
                EventType::NightModeDeactivated,
            ],
            Arc::clone(self) as Arc<dyn EventHandler>,
        );
        self.apply();
    }

    /// Current LED colour (resolved from the flags).
    pub fn current_color(&self) -> LedColor {
        resolve_color(&self.flags.lock())
    }

    fn apply(&self) {
        let color = self.current_color();
        let mut last = self.last_color.lock();
        if *last != Some(color) {
            *last = Some(color);
            self.led.set_color(color);
        }
    }
}

impl EventHandler for DeviceCoordinator {
    fn handle(&self, event: &Event) {
        {
            let mut flags = self.flags.lock();
            match &event.kind {
                EventKind::Shutdown => {
                    flags.shutdown = true;
                    self.call_state.set_call_active(false);
                }
                EventKind::SystemError { .. } => flags.error = true,
                EventKind::SystemOk => flags.error = false,
                EventKind::FunctionInvoking { .. } => flags.function_invoking = true,
                EventKind::FunctionInvoked { .. } => flags.function_invoking = false,
                EventKind::TalkLevel(level) => flags.talk_level = *level,
                EventKind::StartListening => {
                    flags.listening = true;
                    flags.wake_word_detected = false;
                    flags.noise_detected = false;
                    self.call_state.set_call_active(true);
                }
                EventKind::StopListening => {
                    flags.listening = false;
                    flags.wake_word_detected = false;
                    flags.talk_level = None;
                    self.call_state.set_call_active(false);
                }
                EventKind::WakeWordDetected { .. } => {
                    flags.wake_word_detected = true;
                    flags.noise_detected = false;
                }
                EventKind::NoiseDetected => flags.noise_detected = true,
                EventKind::SilenceDetected => flags.noise_detected = false,
                EventKind::NightModeActivated => flags.night_mode = true,
                EventKind::NightModeDeactivated => flags.night_mode = false,
                EventKind::VolumeCtrlUp => self.mixer.step_up(),
                EventKind::VolumeCtrlDown => self.mixer.step_down(),
                EventKind::ConfigChanged | EventKind::HangupInput => {}
            }
        }
        self.apply();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mixer::LogMixerBackend;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct RecordingLed {
        colors: PlMutex<Vec<LedColor>>,
    }

    impl LedDriver for RecordingLed {
        fn set_color(&self, color: LedColor) {
            self.colors.lock().push(color);
        }
    }

    #[derive(Default)]
    struct RecordingCallState {
        states: PlMutex<Vec<bool>>,
    }

    impl CallStateSink for RecordingCallState {
        fn set_call_active(&self, active: bool) {
            self.states.lock().push(active);
        }
    }

    struct Rig {
        bus: EventBus,
        coordinator: Arc<DeviceCoordinator>,
        led: Arc<RecordingLed>,
        call: Arc<RecordingCallState>,
        mixer: Arc<VolumeMixer>,
    }

    fn rig() -> Rig {
        let bus = EventBus::new();
        let led = Arc::new(RecordingLed::default());
        let call = Arc::new(RecordingCallState::default());
        let mixer = Arc::new(VolumeMixer::new(Arc::new(LogMixerBackend)));
        let coordinator = Arc::new(DeviceCoordinator::new(
            led.clone(),
            call.clone(),
            mixer.clone(),
        ));
        coordinator.start(&bus);
        Rig {
            bus,
            coordinator,
            led,
            call,
            mixer,
        }
    }

    #[test]
    fn test_default_color_is_white() {
        let rig = rig();
        assert_eq!(rig.coordinator.current_color(), LedColor::White);
        assert_eq!(rig.led.colors.lock().first(), Some(&LedColor::White));
    }

    #[test]
    fn test_priority_ladder() {
        let rig = rig();

        rig.bus.publish_from("t", EventKind::NightModeActivated);
        assert_eq!(rig.coordinator.current_color(), LedColor::Off);

        rig.bus.publish_from("t", EventKind::NoiseDetected);
        assert_eq!(rig.coordinator.current_color(), LedColor::Yellow);

        rig.bus.publish_from(
            "t",
            EventKind::WakeWordDetected {
                model: "vesper".into(),
            },
        );
        assert_eq!(rig.coordinator.current_color(), LedColor::Orange);

        rig.bus.publish_from("t", EventKind::StartListening);
        assert_eq!(rig.coordinator.current_color(), LedColor::LightGreen);

        rig.bus.publish_from("t", EventKind::TalkLevel(Some(100)));
        assert_eq!(
            rig.coordinator.current_color(),
            LedColor::Green { brightness: 100 }
        );

        rig.bus.publish_from(
            "t",
            EventKind::FunctionInvoking {
                name: "CalculatorPlugin-Add".into(),
            },
        );
        assert_eq!(rig.coordinator.current_color(), LedColor::Blue);

        rig.bus.publish_from(
            "t",
            EventKind::SystemError {
                message: "boom".into(),
            },
        );
        assert_eq!(rig.coordinator.current_color(), LedColor::Red);

        rig.bus.publish_from("t", EventKind::Shutdown);
        assert_eq!(rig.coordinator.current_color(), LedColor::Off);
    }

    #[test]
    fn test_error_clears_on_system_ok() {
        let rig = rig();
        rig.bus.publish_from(
            "t",
            EventKind::SystemError {
                message: "x".into(),
            },
        );
        assert_eq!(rig.coordinator.current_color(), LedColor::Red);
        rig.bus.publish_from("t", EventKind::SystemOk);
        assert_eq!(rig.coordinator.current_color(), LedColor::White);
    }

    #[test]
    fn test_talk_level_none_falls_back_to_listening() {
        let rig = rig();
        rig.bus.publish_from("t", EventKind::StartListening);
        rig.bus.publish_from("t", EventKind::TalkLevel(Some(42)));
        assert_eq!(
            rig.coordinator.current_color(),
            LedColor::Green { brightness: 42 }
        );
        rig.bus.publish_from("t", EventKind::TalkLevel(None));
        assert_eq!(rig.coordinator.current_color(), LedColor::LightGreen);
    }

    #[test]
    fn test_call_state_follows_listening() {
        let rig = rig();
        rig.bus.publish_from("t", EventKind::StartListening);
        rig.bus.publish_from("t", EventKind::StopListening);
        assert_eq!(rig.call.states.lock().as_slice(), &[true, false]);
    }

    #[test]
    fn test_shutdown_clears_call_state() {
        let rig = rig();
        rig.bus.publish_from("t", EventKind::StartListening);
        rig.bus.publish_from("t", EventKind::Shutdown);
        assert_eq!(rig.call.states.lock().last(), Some(&false));
    }

    #[test]
    fn test_volume_events_reach_mixer() {
        let rig = rig();
        rig.mixer.set_playback_volume(5);
        rig.bus.publish_from("t", EventKind::VolumeCtrlUp);
        assert_eq!(rig.mixer.playback_volume(), 6);
        rig.bus.publish_from("t", EventKind::VolumeCtrlDown);
        assert_eq!(rig.mixer.playback_volume(), 5);
    }

    #[test]
    fn test_stop_listening_returns_to_default() {
        let rig = rig();
        rig.bus.publish_from("t", EventKind::StartListening);
        rig.bus.publish_from("t", EventKind::TalkLevel(Some(9)));
        rig.bus.publish_from("t", EventKind::StopListening);
        assert_eq!(rig.coordinator.current_color(), LedColor::White);
    }
}
