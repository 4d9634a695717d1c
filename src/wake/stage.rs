//! Noise-gated wake-word listening loop.
//!
//! ```text
//! [Idle] ── 5 consecutive loud frames ──► NoiseDetected ──► [Active]
//!    ▲                                                         │
//!    └──── 50 silent frames ◄── SilenceDetected ◄──────────────┘
//!                                   │
//!                        wake model fires ──► return model id
//! ```
//!
//! While idle, frames only feed an amplitude gate and a short pre-buffer
//! ring, so the neural models stay cold in a quiet room. When the gate opens
//! the pre-buffer is replayed through the engine first, so the onset of the
//! wake phrase is not lost to the gate latency.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{WakeError, WakeWordEngine};
use crate::audio::resample::peak_amplitude;
use crate::audio::FrameSource;
use crate::events::{EventBus, EventKind};

/// Frames retained while idle so the wake phrase onset survives the gate.
pub const PRE_BUFFER_LENGTH: usize = 10;

/// Consecutive non-silent frames required to open the gate.
pub const NOISE_ACTIVATION_FRAME_COUNT: usize = 5;

/// Upper bound on frames replayed into the engine when the gate opens
/// (about three seconds at 16 kHz).
pub const MAX_SPEECH_BUFFER_FRAMES: usize = 100;

/// Silent frames before the stage publishes `SilenceDetected` and returns to
/// the idle gate (about 1.6 s at the 16 kHz frame rate).
pub const MIN_SILENCE_FRAMES: usize = 50;

/// Silent frames injected before live audio to absorb first-inference cost.
const PREWARM_FRAMES: usize = 50;

/// Configuration for the wake stage.
#[derive(Debug, Clone)]
pub struct WakeStageConfig {
    /// Peak-amplitude threshold below which a frame counts as silent.
    /// Zero or negative disables the noise gate entirely.
    pub silence_amplitude_threshold: i32,
    /// Frame length handed to the engine (and used for pre-warming).
    pub frame_size: usize,
}

enum Gate {
    Idle,
    Active,
}

/// Two-stage wake-word listener over a microphone frame stream.
pub struct WakeStage<E: WakeWordEngine> {
    config: WakeStageConfig,
    engine: E,
    bus: EventBus,

    gate: Gate,
    pre_buffer: VecDeque<Vec<i16>>,
    noise_streak: usize,
    silence_frames: usize,
}

impl<E: WakeWordEngine> WakeStage<E> {
    pub fn new(config: WakeStageConfig, engine: E, bus: EventBus) -> Self {
        Self {
            config,
            engine,
            bus,
            gate: Gate::Idle,
            pre_buffer: VecDeque::with_capacity(PRE_BUFFER_LENGTH),
            noise_streak: 0,
            silence_frames: 0,
        }
    }

    fn gated(&self) -> bool {
        self.config.silence_amplitude_threshold > 0
    }

    fn is_silent(&self, frame: &[i16]) -> bool {
        self.gated() && peak_amplitude(frame) < self.config.silence_amplitude_threshold
    }

    /// Reset every buffer and counter back to the idle substate.
    fn reset(&mut self) {
        self.engine.reset();
        self.pre_buffer.clear();
        self.noise_streak = 0;
        self.silence_frames = 0;
        self.gate = Gate::Idle;
    }

    /// Block until a wake word is detected, the capture device fails, or
    /// `cancel` fires.
    ///
    /// Returns `Ok(Some(model_id))` on detection and `Ok(None)` on
    /// cancellation; the stage is reset to idle either way.
    pub async fn wait_for_wake_word<S: FrameSource>(
        &mut self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, WakeError> {
        self.reset();
        self.engine
            .prewarm_frames(PREWARM_FRAMES, self.config.frame_size)
            .map_err(WakeError::Inference)?;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("wake wait cancelled");
                    self.reset();
                    return Ok(None);
                }
                frame = source.next_frame() => frame?,
            };

            if let Some(id) = self.process_frame(&frame).map_err(WakeError::Inference)? {
                info!(model = %id, "wake word detected");
                self.reset();
                return Ok(Some(id));
            }
        }
    }

    /// Advance the gate state machine by one frame. Split out of the wait
    /// loop so tests can drive it synchronously.
    pub fn process_frame(&mut self, frame: &[i16]) -> anyhow::Result<Option<String>> {
        // Gate disabled: every frame goes straight to the models.
        if !self.gated() {
            return self.engine.process(frame);
        }

        let silent = self.is_silent(frame);

        match self.gate {
            Gate::Idle => {
                if self.pre_buffer.len() == PRE_BUFFER_LENGTH {
                    self.pre_buffer.pop_front();
                }
                self.pre_buffer.push_back(frame.to_vec());

                if silent {
                    self.noise_streak = 0;
                    return Ok(None);
                }
                self.noise_streak += 1;
                if self.noise_streak < NOISE_ACTIVATION_FRAME_COUNT {
                    return Ok(None);
                }

                self.bus.publish_from("wake-stage", EventKind::NoiseDetected);
                // Replay the pre-buffer through the engine so the phrase
                // onset is scored too.
                let buffered: Vec<Vec<i16>> = self
                    .pre_buffer
                    .drain(..)
                    .take(MAX_SPEECH_BUFFER_FRAMES)
                    .collect();
                self.gate = Gate::Active;
                self.noise_streak = 0;
                self.silence_frames = 0;
                for buffered_frame in &buffered {
                    if let Some(id) = self.engine.process(buffered_frame)? {
                        return Ok(Some(id));
                    }
                }
                Ok(None)
            }
            Gate::Active => {
                if let Some(id) = self.engine.process(frame)? {
                    return Ok(Some(id));
                }

                if silent {
                    self.silence_frames += 1;
                } else {
                    self.silence_frames = 0;
                }
                if self.silence_frames >= MIN_SILENCE_FRAMES {
                    debug!("wake stage returning to idle gate");
                    self.bus
                        .publish_from("wake-stage", EventKind::SilenceDetected);
                    self.reset();
                }
                Ok(None)
            }
        }
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        matches!(self.gate, Gate::Idle)
    }

    #[cfg(test)]
    fn buffers_empty(&self) -> bool {
        self.pre_buffer.is_empty() && self.noise_streak == 0 && self.silence_frames == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use anyhow::Result;

    /// Scripted engine: fires after seeing `fire_after` frames (0 = never).
    struct ScriptedEngine {
        frames_seen: usize,
        fire_after: usize,
        resets: usize,
    }

    impl ScriptedEngine {
        fn never() -> Self {
            Self {
                frames_seen: 0,
                fire_after: 0,
                resets: 0,
            }
        }

        fn after(n: usize) -> Self {
            Self {
                frames_seen: 0,
                fire_after: n,
                resets: 0,
            }
        }
    }

    impl WakeWordEngine for ScriptedEngine {
        fn process(&mut self, _frame: &[i16]) -> Result<Option<String>> {
            self.frames_seen += 1;
            if self.fire_after > 0 && self.frames_seen >= self.fire_after {
                return Ok(Some("vesper".to_string()));
            }
            Ok(None)
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn prewarm_frames(&mut self, _frames: usize, _frame_size: usize) -> Result<()> {
            Ok(())
        }
    }

    fn stage(threshold: i32, engine: ScriptedEngine) -> (WakeStage<ScriptedEngine>, EventBus) {
        let bus = EventBus::new();
        let config = WakeStageConfig {
            silence_amplitude_threshold: threshold,
            frame_size: 512,
        };
        (WakeStage::new(config, engine, bus.clone()), bus)
    }

    fn loud() -> Vec<i16> {
        vec![5000i16; 512]
    }

    fn quiet() -> Vec<i16> {
        vec![10i16; 512]
    }

    #[test]
    fn test_gate_disabled_feeds_engine_immediately() {
        let (mut stage, _bus) = stage(0, ScriptedEngine::after(1));
        // First frame reaches the engine even though it is dead quiet.
        let hit = stage.process_frame(&quiet()).unwrap();
        assert_eq!(hit, Some("vesper".to_string()));
    }

    #[test]
    fn test_silent_frames_never_reach_models_while_gated() {
        let (mut stage, _bus) = stage(1000, ScriptedEngine::after(1));
        for _ in 0..50 {
            assert_eq!(stage.process_frame(&quiet()).unwrap(), None);
        }
        assert_eq!(stage.engine.frames_seen, 0);
    }

    #[test]
    fn test_noise_gate_opens_after_streak_and_replays_pre_buffer() {
        let (mut stage, bus) = stage(1000, ScriptedEngine::never());
        let mut noise_rx = bus.watch(&[EventType::NoiseDetected]);

        // Three quiet frames fill the pre-buffer, then five loud ones open
        // the gate.
        for _ in 0..3 {
            stage.process_frame(&quiet()).unwrap();
        }
        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT {
            stage.process_frame(&loud()).unwrap();
        }

        assert!(noise_rx.try_recv().is_ok());
        // The engine saw the whole pre-buffer: 3 quiet + 5 loud frames.
        assert_eq!(stage.engine.frames_seen, 8);
        assert!(!stage.is_idle());
    }

    #[test]
    fn test_interrupted_noise_streak_does_not_open_gate() {
        let (mut stage, _bus) = stage(1000, ScriptedEngine::never());
        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT - 1 {
            stage.process_frame(&loud()).unwrap();
        }
        stage.process_frame(&quiet()).unwrap();
        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT - 1 {
            stage.process_frame(&loud()).unwrap();
        }
        assert!(stage.is_idle());
        assert_eq!(stage.engine.frames_seen, 0);
    }

    #[test]
    fn test_silence_returns_to_pristine_idle_state() {
        let (mut stage, bus) = stage(1000, ScriptedEngine::never());
        let mut silence_rx = bus.watch(&[EventType::SilenceDetected]);

        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT {
            stage.process_frame(&loud()).unwrap();
        }
        assert!(!stage.is_idle());

        for _ in 0..MIN_SILENCE_FRAMES {
            stage.process_frame(&quiet()).unwrap();
        }

        assert!(silence_rx.try_recv().is_ok());
        assert!(stage.is_idle());
        assert!(stage.buffers_empty());
        assert_eq!(stage.engine.resets, 1);
    }

    #[test]
    fn test_detection_while_active_returns_model_id() {
        // Fires on the second frame the engine sees after the gate opens:
        // pre-buffer replay (5 loud frames) already crosses it.
        let (mut stage, _bus) = stage(1000, ScriptedEngine::after(3));
        let mut result = None;
        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT {
            result = stage.process_frame(&loud()).unwrap();
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result, Some("vesper".to_string()));
    }

    #[test]
    fn test_loud_frames_keep_active_state_alive() {
        let (mut stage, _bus) = stage(1000, ScriptedEngine::never());
        for _ in 0..NOISE_ACTIVATION_FRAME_COUNT {
            stage.process_frame(&loud()).unwrap();
        }
        // Alternate quiet/loud below the silence horizon; stage stays active.
        for _ in 0..(MIN_SILENCE_FRAMES * 2) {
            stage.process_frame(&quiet()).unwrap();
            stage.process_frame(&loud()).unwrap();
        }
        assert!(!stage.is_idle());
    }

    #[tokio::test]
    async fn test_wait_for_wake_word_cancellation_returns_none() {
        use crate::audio::{AudioError, FrameSource};
        use async_trait::async_trait;

        struct SilentSource;

        #[async_trait]
        impl FrameSource for SilentSource {
            fn sample_rate(&self) -> u32 {
                16_000
            }

            async fn next_frame(&mut self) -> Result<Vec<i16>, AudioError> {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(vec![0i16; 512])
            }
        }

        let (mut stage, _bus) = stage(1000, ScriptedEngine::never());
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = stage
            .wait_for_wake_word(&mut SilentSource, &cancel)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
