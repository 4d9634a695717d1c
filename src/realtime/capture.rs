//! The audio-capture loop: local VAD, utterance segmentation, barge-in.
//!
//! One instance lives for one `run()` call; its buffers are never shared.
//! Microphone frames are resampled to the VAD rate and re-framed, then each
//! VAD frame advances the segmentation state machine:
//!
//! ```text
//!            speech x3                     1600 ms silence
//! [idle] ───────────────► [recording] ───────────────────► send + commit
//!    │                        ▲                              + response
//!    │ model speaking         │ speech x2 while model speaks
//!    └────────────────────────┴─────────── barge-in: cancel + truncate
//! ```
//!
//! While idle a short pre-roll ring is kept so the start of an utterance is
//! not clipped by the three-frame confirmation delay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::RealtimeSession;
use super::sync::PlaybackSync;
use super::{AgentNotice, RunResult};
use crate::audio::resample::{resample_nearest, samples_to_pcm};
use crate::audio::{FrameSource, REMOTE_SAMPLE_RATE, VAD_SAMPLE_RATE};
use crate::vad::SpeechDetector;

/// Frames of pre-roll kept while idle (~0.5 s of audio).
pub const PRE_BUFFER_FRAMES: usize = 15;

/// Consecutive speech frames that confirm an utterance started.
pub const MIN_SPEECH_FRAMES: usize = 3;

/// Consecutive speech frames that interrupt the speaking assistant.
pub const MIN_SPEECH_FRAMES_FOR_BARGE_IN: usize = 2;

/// Trailing silence that ends an utterance.
pub const SILENCE_MS_TO_STOP: u64 = 1600;

/// How long to wait for the model before giving up on a requested response.
pub const RESPONSE_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// VAD probability at or above which a frame counts as speech.
pub const SPEECH_PROBABILITY_THRESHOLD: f32 = 0.5;

/// Per-run configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Idle time after which `run` returns [`RunResult::InactivityTimeout`].
    pub inactivity_timeout: Duration,
}

/// Mutable per-run state. Owned by the loop, never shared.
struct CaptureState {
    /// Pre-roll of upsampled (remote-rate) PCM, one entry per VAD frame.
    pre_buffer: VecDeque<Vec<u8>>,
    /// The active utterance as upsampled PCM.
    utterance: Vec<u8>,
    is_recording: bool,
    speech_frames: usize,
    barge_in_speech_frames: usize,
    silence_ms: u64,
    was_model_speaking: bool,
    last_activity: Instant,
}

impl CaptureState {
    fn new() -> Self {
        Self {
            pre_buffer: VecDeque::with_capacity(PRE_BUFFER_FRAMES),
            utterance: Vec::new(),
            is_recording: false,
            speech_frames: 0,
            barge_in_speech_frames: 0,
            silence_ms: 0,
            was_model_speaking: false,
            last_activity: Instant::now(),
        }
    }
}

/// One conversation's capture side.
pub struct CaptureLoop {
    session: Arc<dyn RealtimeSession>,
    sync: Arc<PlaybackSync>,
    vad: Arc<dyn SpeechDetector>,
    notices: mpsc::UnboundedSender<AgentNotice>,
    config: CaptureConfig,
    state: CaptureState,
    /// Accumulates resampled audio until a whole VAD frame is available.
    vad_pending: Vec<i16>,
}

impl CaptureLoop {
    pub fn new(
        session: Arc<dyn RealtimeSession>,
        sync: Arc<PlaybackSync>,
        vad: Arc<dyn SpeechDetector>,
        notices: mpsc::UnboundedSender<AgentNotice>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            session,
            sync,
            vad,
            notices,
            config,
            state: CaptureState::new(),
            vad_pending: Vec::new(),
        }
    }

    /// Consume microphone frames until hangup/shutdown or inactivity.
    pub async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let source_rate = source.sample_rate();
        let frame_size = self.vad.frame_size();
        self.state = CaptureState::new();
        self.vad.reset().await;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("capture loop cancelled");
                    return Ok(RunResult::Cancelled);
                }
                frame = source.next_frame() => frame.context("capture device failed")?,
            };

            self.vad_pending
                .extend(resample_nearest(&frame, source_rate, VAD_SAMPLE_RATE));
            while self.vad_pending.len() >= frame_size {
                let vad_frame: Vec<i16> = self.vad_pending.drain(..frame_size).collect();
                if let Some(result) = self.step(&vad_frame).await? {
                    return Ok(result);
                }
            }

            // Yield so the receive loop is never starved by capture work.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Advance the state machine by one VAD frame.
    async fn step(&mut self, frame: &[i16]) -> Result<Option<RunResult>> {
        let frame_ms = (frame.len() as u64 * 1000) / VAD_SAMPLE_RATE as u64;
        let probability = self.vad.speech_probability(frame).await?;
        let is_speech = probability >= SPEECH_PROBABILITY_THRESHOLD;
        let model_speaking = self.sync.is_model_speaking();
        let now = Instant::now();

        // Any user speech, and the assistant finishing a turn, both count as
        // conversational activity.
        if is_speech || (self.state.was_model_speaking && !model_speaking) {
            self.state.last_activity = now;
        }

        // Barge-in: the user talking over the assistant.
        if model_speaking && is_speech {
            self.state.barge_in_speech_frames += 1;
            if self.state.barge_in_speech_frames >= MIN_SPEECH_FRAMES_FOR_BARGE_IN {
                self.state.barge_in_speech_frames = 0;
                self.barge_in().await;
            }
        } else if !is_speech {
            self.state.barge_in_speech_frames = 0;
        }

        let model_speaking = self.sync.is_model_speaking();
        let mut drained_pre_buffer = false;

        // Pre-roll while idle, so utterance onset survives the speech
        // confirmation delay.
        if !self.state.is_recording {
            if self.state.pre_buffer.len() == PRE_BUFFER_FRAMES {
                self.state.pre_buffer.pop_front();
            }
            self.state.pre_buffer.push_back(uplink_pcm(frame));
        }

        // Start of speech.
        if !self.state.is_recording && !model_speaking {
            if is_speech {
                self.state.speech_frames += 1;
            } else {
                self.state.speech_frames = 0;
            }
            if self.state.speech_frames >= MIN_SPEECH_FRAMES {
                debug!("utterance started");
                self.state.is_recording = true;
                self.state.speech_frames = 0;
                self.state.silence_ms = 0;
                for buffered in self.state.pre_buffer.drain(..) {
                    self.state.utterance.extend_from_slice(&buffered);
                }
                drained_pre_buffer = true;
            }
        }

        // End of speech.
        if self.state.is_recording {
            if !drained_pre_buffer {
                self.state.utterance.extend_from_slice(&uplink_pcm(frame));
            }
            if is_speech {
                self.state.silence_ms = 0;
            } else {
                self.state.silence_ms += frame_ms;
                if self.state.silence_ms >= SILENCE_MS_TO_STOP {
                    self.finish_utterance().await?;
                }
            }
        }

        // Response-wait watchdog.
        if let Some(elapsed) = self.sync.response_wait_elapsed() {
            if elapsed > RESPONSE_WAIT_TIMEOUT {
                warn!(?elapsed, "no response from the service; giving up on it");
                self.sync.clear_waiting_for_response();
            }
        }

        // Inactivity timeout.
        if !self.state.is_recording
            && !self.sync.is_model_speaking()
            && !self.sync.is_waiting_for_response()
            && now.duration_since(self.state.last_activity) >= self.config.inactivity_timeout
        {
            info!("conversation idle; returning to wake-word listening");
            return Ok(Some(RunResult::InactivityTimeout));
        }

        self.state.was_model_speaking = self.sync.is_model_speaking();
        Ok(None)
    }

    /// The user interrupted the assistant: stop playback, tell the server
    /// what was actually heard, and record the interrupting utterance.
    async fn barge_in(&mut self) {
        let Some(item_id) = self.sync.try_trigger_barge_in() else {
            return;
        };
        info!(%item_id, "barge-in");

        let played_ms = match self.sync.speaker() {
            Some(speaker) => {
                speaker.clear();
                speaker.played_ms()
            }
            None => 0,
        };
        if let Err(e) = self.session.cancel_response().await {
            warn!("cancel_response during barge-in failed: {}", e);
        }
        if let Err(e) = self.session.truncate_item(&item_id, 0, played_ms).await {
            warn!("truncate_item during barge-in failed: {}", e);
        }

        self.sync.set_model_speaking(false);
        let _ = self.notices.send(AgentNotice::SpeakingStopped);

        // The interrupting speech becomes the next user turn.
        self.state.is_recording = true;
        self.state.utterance.clear();
        self.state.pre_buffer.clear();
        self.state.speech_frames = 0;
        self.state.silence_ms = 0;
        self.vad.reset().await;
    }

    /// Ship the finished utterance and request a response.
    async fn finish_utterance(&mut self) -> Result<()> {
        let audio = std::mem::take(&mut self.state.utterance);
        info!(bytes = audio.len(), "utterance finished");

        self.session
            .send_input_audio(&audio)
            .await
            .context("failed to send utterance audio")?;
        self.session
            .commit_pending_audio()
            .await
            .context("failed to commit utterance")?;
        self.session
            .start_response()
            .await
            .context("failed to request response")?;
        self.sync.mark_waiting_for_response();

        self.state.is_recording = false;
        self.state.pre_buffer.clear();
        self.state.silence_ms = 0;
        self.state.speech_frames = 0;
        self.state.last_activity = Instant::now();
        self.vad.reset().await;
        Ok(())
    }
}

/// Upsample one VAD-rate frame to the remote rate and serialize as PCM16.
fn uplink_pcm(frame: &[i16]) -> Vec<u8> {
    samples_to_pcm(&resample_nearest(frame, VAD_SAMPLE_RATE, REMOTE_SAMPLE_RATE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uplink_pcm_upsamples_to_remote_rate() {
        let frame = vec![100i16; 512];
        let pcm = uplink_pcm(&frame);
        // 512 samples at 16 kHz become 768 at 24 kHz, two bytes each.
        assert_eq!(pcm.len(), 768 * 2);
    }
}
