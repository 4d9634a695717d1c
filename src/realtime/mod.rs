//! Realtime speech-to-speech conversation engine.
//!
//! [`RealtimeClient`] is the thin wire adapter to the remote streaming
//! service. [`RealtimeAgent`] owns one long-lived session per agent
//! configuration and runs the two cooperating loops of a conversation: the
//! receive loop (server events: audio deltas, tool calls, response
//! boundaries) and the audio-capture loop (local VAD, utterance
//! segmentation, barge-in). The loops share exactly one mutex-guarded
//! record, [`PlaybackSync`].

mod agent;
mod capture;
mod client;
pub mod events;
mod receive;
mod sync;

pub use agent::{AgentSessionConfig, RealtimeAgent};
pub use capture::{CaptureConfig, CaptureLoop};
pub use client::{RealtimeClient, RealtimeSession, SessionSettings};
pub use receive::{ReceiveContext, handle_event, receive_loop};
pub use sync::{PlaybackSync, SPEAKER_CHUNK_SIZE};

use thiserror::Error;

/// How a conversation run ended. Neither outcome closes the session; only
/// `dispose()` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// The hangup or shutdown token fired.
    Cancelled,
    /// No user or assistant activity for the configured timeout.
    InactivityTimeout,
}

/// Notices the agent raises towards its supervisor during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentNotice {
    /// The conversation is set up and listening.
    Ready,
    SpeakingStarted,
    SpeakingStopped,
}

/// Errors on the realtime wire.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("session configuration rejected: {0}")]
    Configuration(String),
    #[error("session closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
}
