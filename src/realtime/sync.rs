//! Playback synchronisation between the receive loop and the capture loop.
//!
//! All fields of [`PlaybackState`] move together under one lock
//! (`outputAudioLock` in the design): buffer appends, chunk eviction, and
//! boolean flips are short non-blocking critical sections. The speaker
//! handle lives under its own lock because the capture loop nulls it when a
//! run ends while the receive loop may still be dispatching deltas.
//!
//! Lock order where both are taken: playback state first, speaker second.
//! Writing to the speaker while holding the state lock is fine — the
//! speaker enqueues into a ring and never blocks.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::audio::AudioOutput;

/// Bytes of buffered output audio written to the speaker per chunk.
pub const SPEAKER_CHUNK_SIZE: usize = 4096;

/// The shared record. Exclusively owned by the agent, guarded as one unit.
#[derive(Default)]
struct PlaybackState {
    model_is_speaking: bool,
    waiting_for_response: bool,
    response_requested_at: Option<Instant>,
    barge_in_triggered: bool,
    current_streaming_item_id: Option<String>,
    output_buffer: Vec<u8>,
}

/// Shared playback-sync handle for one agent.
#[derive(Default)]
pub struct PlaybackSync {
    state: Mutex<PlaybackState>,
    speaker: Mutex<Option<Arc<dyn AudioOutput>>>,
}

impl PlaybackSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or remove the speaker for the current run.
    pub fn set_speaker(&self, speaker: Option<Arc<dyn AudioOutput>>) {
        *self.speaker.lock() = speaker;
    }

    /// Clone out the current speaker handle, if a run is active.
    pub fn speaker(&self) -> Option<Arc<dyn AudioOutput>> {
        self.speaker.lock().clone()
    }

    /// A new assistant item started streaming: speaking begins, any barge-in
    /// latch from the previous turn clears, the local buffer resets, and the
    /// speaker's played-time measurement restarts for this item.
    pub fn begin_streaming(&self, item_id: &str) {
        {
            let mut state = self.state.lock();
            state.model_is_speaking = true;
            state.barge_in_triggered = false;
            state.waiting_for_response = false;
            state.response_requested_at = None;
            state.current_streaming_item_id = Some(item_id.to_string());
            state.output_buffer.clear();
        }
        if let Some(speaker) = self.speaker() {
            speaker.reset_played();
        }
    }

    /// Append downlink audio and stream full chunks to the speaker. After a
    /// barge-in nothing more is written until the next `begin_streaming`.
    pub fn append_output_audio(&self, audio: &[u8]) {
        let mut state = self.state.lock();
        state.output_buffer.extend_from_slice(audio);
        while state.output_buffer.len() >= SPEAKER_CHUNK_SIZE && !state.barge_in_triggered {
            let chunk: Vec<u8> = state.output_buffer.drain(..SPEAKER_CHUNK_SIZE).collect();
            if let Some(speaker) = self.speaker.lock().as_ref() {
                speaker.write(&chunk);
            }
        }
    }

    /// Take whatever is left in the buffer for the end-of-response flush.
    /// Empty when barge-in already discarded the turn.
    pub fn take_residual_audio(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        if state.barge_in_triggered {
            state.output_buffer.clear();
            return Vec::new();
        }
        std::mem::take(&mut state.output_buffer)
    }

    /// Atomically latch barge-in. Returns the interrupted item id exactly
    /// once; `None` when the model is not speaking or barge-in already
    /// triggered.
    pub fn try_trigger_barge_in(&self) -> Option<String> {
        let mut state = self.state.lock();
        if !state.model_is_speaking || state.barge_in_triggered {
            return None;
        }
        state.barge_in_triggered = true;
        state.current_streaming_item_id.clone()
    }

    pub fn is_model_speaking(&self) -> bool {
        self.state.lock().model_is_speaking
    }

    pub fn set_model_speaking(&self, speaking: bool) {
        self.state.lock().model_is_speaking = speaking;
    }

    pub fn barge_in_triggered(&self) -> bool {
        self.state.lock().barge_in_triggered
    }

    /// A response was requested; the watchdog clock starts now.
    pub fn mark_waiting_for_response(&self) {
        let mut state = self.state.lock();
        state.waiting_for_response = true;
        state.response_requested_at = Some(Instant::now());
    }

    pub fn clear_waiting_for_response(&self) {
        let mut state = self.state.lock();
        state.waiting_for_response = false;
        state.response_requested_at = None;
    }

    pub fn is_waiting_for_response(&self) -> bool {
        self.state.lock().waiting_for_response
    }

    /// Seconds since the response was requested, when one is outstanding.
    pub fn response_wait_elapsed(&self) -> Option<std::time::Duration> {
        let state = self.state.lock();
        if !state.waiting_for_response {
            return None;
        }
        state.response_requested_at.map(|at| at.elapsed())
    }

    /// Bytes currently buffered (test observability).
    pub fn buffered_output_len(&self) -> usize {
        self.state.lock().output_buffer.len()
    }
}
