//! The realtime agent: one long-lived remote session per agent
//! configuration, and the per-conversation wiring of the capture and receive
//! loops.
//!
//! Resource scopes differ on purpose: the microphone, speaker and VAD model
//! are opened for one `run()` and released on every exit path, while the
//! remote session out-lives runs and is only torn down by `dispose()` (or
//! replaced when the wire is found dead on the next run).

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::capture::{CaptureConfig, CaptureLoop};
use super::client::{RealtimeClient, RealtimeSession, SessionSettings};
use super::receive::{ReceiveContext, receive_loop};
use super::sync::PlaybackSync;
use super::{AgentNotice, RunResult};
use crate::audio::{MeterCallback, Microphone, Speaker, REMOTE_SAMPLE_RATE, VAD_SAMPLE_RATE};
use crate::events::EventBus;
use crate::tools::ToolRegistry;
use crate::vad::{SileroVad, SpeechDetector, VadConfig};

/// Everything needed to open and run sessions for one agent.
#[derive(Debug, Clone)]
pub struct AgentSessionConfig {
    pub agent_name: String,
    pub api_key: String,
    /// Explicit service endpoint; `None` uses the default host.
    pub endpoint: Option<String>,
    pub model: String,
    pub voice: String,
    /// Global and agent instructions, already concatenated.
    pub instructions: String,
    pub temperature: Option<f32>,
    pub inactivity_timeout: Duration,
    pub vad: VadConfig,
}

/// A conversation engine bound to one agent configuration.
pub struct RealtimeAgent {
    config: AgentSessionConfig,
    tools: Arc<ToolRegistry>,
    bus: EventBus,
    sync: Arc<PlaybackSync>,
    context: tokio::sync::Mutex<Option<Arc<ReceiveContext>>>,
    receive_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Cancelled only by `dispose()`; run cancellation must not touch it so
    /// hangup preserves the session.
    session_cancel: CancellationToken,
    created_at: Instant,
}

impl RealtimeAgent {
    pub fn new(config: AgentSessionConfig, tools: Arc<ToolRegistry>, bus: EventBus) -> Self {
        Self {
            config,
            tools,
            bus,
            sync: Arc::new(PlaybackSync::new()),
            context: tokio::sync::Mutex::new(None),
            receive_task: Mutex::new(None),
            session_cancel: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.agent_name
    }

    /// Age of this agent instance (the supervisor recreates expired ones).
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            voice: self.config.voice.clone(),
            instructions: self.config.instructions.clone(),
            temperature: self.config.temperature,
            tools: self.tools.tool_descriptors(),
        }
    }

    /// Connect (or reuse) the session and its receive loop. A session whose
    /// receive loop stopped means the wire closed underneath us: it is
    /// replaced, not resurrected.
    async fn ensure_session(&self) -> Result<Arc<ReceiveContext>> {
        let mut guard = self.context.lock().await;

        if let Some(context) = guard.as_ref() {
            if context.session.is_open() {
                return Ok(Arc::clone(context));
            }
            warn!(agent = %self.config.agent_name, "realtime session lost; reconnecting");
            context.session.close().await;
            if let Some(task) = self.receive_task.lock().take() {
                task.abort();
            }
            *guard = None;
        }

        let client = RealtimeClient::connect(
            &self.config.api_key,
            &self.config.model,
            self.config.endpoint.as_deref(),
        )
        .await
        .context("failed to open realtime session")?;
        let session: Arc<dyn RealtimeSession> = Arc::new(client);
        session
            .configure(&self.session_settings())
            .await
            .context("failed to configure realtime session")?;

        let context = Arc::new(ReceiveContext::new(
            Arc::clone(&session),
            Arc::clone(&self.sync),
            Arc::clone(&self.tools),
            self.bus.clone(),
        ));
        let task = tokio::spawn(receive_loop(
            Arc::clone(&context),
            self.session_cancel.child_token(),
        ));
        *self.receive_task.lock() = Some(task);
        *guard = Some(Arc::clone(&context));

        info!(agent = %self.config.agent_name, "realtime session ready");
        Ok(context)
    }

    /// Run one conversation. Both outcomes leave the session connected.
    pub async fn run(
        &self,
        notices: mpsc::UnboundedSender<AgentNotice>,
        meter: Option<MeterCallback>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let context = self.ensure_session().await?;
        context.attach_notices(notices.clone());

        let result = self.run_with_devices(&context, notices, meter, cancel).await;

        context.detach_notices();
        result
    }

    async fn run_with_devices(
        &self,
        context: &Arc<ReceiveContext>,
        notices: mpsc::UnboundedSender<AgentNotice>,
        meter: Option<MeterCallback>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let mut microphone =
            Microphone::open(VAD_SAMPLE_RATE).context("failed to open microphone")?;
        let speaker = Arc::new(
            Speaker::open(REMOTE_SAMPLE_RATE, meter).context("failed to open speaker")?,
        );
        self.sync.set_speaker(Some(speaker.clone()));

        let result = async {
            let vad: Arc<dyn SpeechDetector> = Arc::new(
                SileroVad::new(self.config.vad.clone())
                    .await
                    .context("failed to load VAD model")?,
            );

            let _ = notices.send(AgentNotice::Ready);
            let mut capture = CaptureLoop::new(
                Arc::clone(&context.session),
                Arc::clone(&self.sync),
                vad,
                notices,
                CaptureConfig {
                    inactivity_timeout: self.config.inactivity_timeout,
                },
            );
            capture.run(&mut microphone, &cancel).await
        }
        .await;

        // Release run-scoped devices on every exit path.
        self.sync.set_speaker(None);
        speaker.stop();
        result
    }

    /// Tear the session down for good. The next `run()` reconnects.
    pub async fn dispose(&self) {
        info!(agent = %self.config.agent_name, "disposing realtime agent");
        self.session_cancel.cancel();
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
        if let Some(context) = self.context.lock().await.take() {
            context.session.close().await;
        }
    }
}
