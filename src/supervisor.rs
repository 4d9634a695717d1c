//! The top-level conversation loop.
//!
//! ```text
//! Idle ─► WaitingForWake ─► AgentSelected ─► Running ─► (Cancelled | TimedOut) ─► Idle
//!                                               └─► (Error) ─► Recover (5 s) ─► Idle
//! ```
//!
//! The supervisor idles on the wake stage, selects the agent whose wake
//! word fired, runs its realtime agent until hangup or inactivity, and
//! reflects every transition on the bus. Agents are cached across
//! conversations and disposed on session aging, config change, or error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::{FRAME_SAMPLES, MeterCallback, Microphone, VAD_SAMPLE_RATE};
use crate::config::{AgentConfig, AppConfig};
use crate::device::VolumeMixer;
use crate::events::{EventBus, EventHandler, EventKind, EventType};
use crate::realtime::{AgentNotice, AgentSessionConfig, RealtimeAgent, RunResult};
use crate::state::AppState;
use crate::tools::build_registry;
use crate::vad::{VadConfig, VadSampleRate};
use crate::wake::{WakeEngine, WakeModelSpec, WakeStage, WakeStageConfig};

/// Pause before retrying after an unexpected error.
const RECOVERY_DELAY: Duration = Duration::from_secs(5);

pub struct Supervisor {
    state: AppState,
    mixer: Arc<VolumeMixer>,
    shutdown: CancellationToken,
    agents: tokio::sync::Mutex<HashMap<String, Arc<RealtimeAgent>>>,
    /// Hangup token source; replaced once consumed.
    hangup: Mutex<CancellationToken>,
    config_dirty: AtomicBool,
}

impl Supervisor {
    pub fn new(state: AppState, mixer: Arc<VolumeMixer>, shutdown: CancellationToken) -> Self {
        Self {
            state,
            mixer,
            shutdown,
            agents: tokio::sync::Mutex::new(HashMap::new()),
            hangup: Mutex::new(CancellationToken::new()),
            config_dirty: AtomicBool::new(false),
        }
    }

    /// Subscribe to hangup and config-change traffic. Call once before
    /// `run`.
    pub fn start(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let handler: Arc<dyn EventHandler> = Arc::new(move |event: &crate::events::Event| {
            match event.kind {
                EventKind::HangupInput => {
                    info!("hangup requested");
                    supervisor.hangup.lock().cancel();
                }
                EventKind::ConfigChanged => {
                    supervisor.config_dirty.store(true, Ordering::Release);
                    // Also end any running conversation so the new settings
                    // take effect immediately.
                    supervisor.hangup.lock().cancel();
                }
                _ => {}
            }
        });
        self.state
            .bus
            .subscribe(&[EventType::HangupInput, EventType::ConfigChanged], handler);
    }

    /// Current hangup token, minting a fresh one when the previous was
    /// consumed.
    fn hangup_token(&self) -> CancellationToken {
        let mut guard = self.hangup.lock();
        if guard.is_cancelled() {
            *guard = CancellationToken::new();
        }
        guard.clone()
    }

    /// Token cancelled by process shutdown or by the current hangup source.
    /// The caller must cancel it when the phase ends, which also releases
    /// the forwarding task.
    fn linked_token(&self) -> CancellationToken {
        let linked = self.shutdown.child_token();
        let hangup = self.hangup_token();
        let forward = linked.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = hangup.cancelled() => forward.cancel(),
                _ = forward.cancelled() => {}
            }
        });
        linked
    }

    /// Main loop; returns when the shutdown token fires.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let bus = self.state.bus.clone();
        let mut config = self.state.config_snapshot();
        self.mixer.set_playback_volume(config.startup_volume);
        bus.publish_from("supervisor", EventKind::SystemOk);

        let mut stage = match build_wake_stage(&config, &bus) {
            Ok(stage) => Some(stage),
            Err(e) => {
                error!("wake stage unavailable: {:#}", e);
                None
            }
        };

        while !self.shutdown.is_cancelled() {
            if self.config_dirty.swap(false, Ordering::AcqRel) {
                info!("configuration changed; rebuilding");
                self.dispose_all_agents().await;
                config = self.state.config_snapshot();
                self.mixer.set_playback_volume(config.startup_volume);
                stage = None;
            }
            if stage.is_none() {
                match build_wake_stage(&config, &bus) {
                    Ok(built) => stage = Some(built),
                    Err(e) => {
                        error!("wake stage unavailable: {:#}", e);
                        bus.publish_from(
                            "supervisor",
                            EventKind::SystemError {
                                message: format!("{e:#}"),
                            },
                        );
                        tokio::time::sleep(RECOVERY_DELAY).await;
                        continue;
                    }
                }
            }
            let Some(current_stage) = stage.as_mut() else {
                continue;
            };

            bus.publish_from("supervisor", EventKind::SystemOk);

            let outcome = self.converse_once(&config, current_stage).await;
            if let Err(e) = outcome {
                error!("conversation failed: {:#}", e);
                bus.publish_from(
                    "supervisor",
                    EventKind::SystemError {
                        message: format!("{e:#}"),
                    },
                );
                self.dispose_all_agents().await;
                tokio::time::sleep(RECOVERY_DELAY).await;
            }
        }

        info!("supervisor shutting down");
        self.dispose_all_agents().await;
        Ok(())
    }

    /// One wake-wait → conversation cycle.
    async fn converse_once(
        &self,
        config: &AppConfig,
        stage: &mut WakeStage<WakeEngine>,
    ) -> Result<()> {
        let bus = self.state.bus.clone();

        // Wait for a wake word; hangup during the wait acts as manual wake.
        let wake_cancel = self.linked_token();
        let detected = {
            let mut microphone =
                Microphone::open(VAD_SAMPLE_RATE).context("failed to open microphone")?;
            let result = stage.wait_for_wake_word(&mut microphone, &wake_cancel).await;
            wake_cancel.cancel();
            result.context("wake-word wait failed")?
        };

        let agent_config: AgentConfig = match detected {
            Some(model_id) => {
                bus.publish_from(
                    "supervisor",
                    EventKind::WakeWordDetected {
                        model: model_id.clone(),
                    },
                );
                match config.agent_for_wake_word(&model_id) {
                    Some(agent) => agent.clone(),
                    None => {
                        error!(%model_id, "no agent configured for wake word");
                        return Ok(());
                    }
                }
            }
            None => {
                if self.shutdown.is_cancelled() {
                    return Ok(());
                }
                // Hangup while idle: treat as a manual wake of the first
                // enabled agent.
                match config.first_enabled_agent() {
                    Some(agent) => agent.clone(),
                    None => return Ok(()),
                }
            }
        };

        let agent = self.get_or_create_agent(config, &agent_config).await;

        // Translate agent notices and the speaker meter into bus traffic.
        let (notices_tx, mut notices_rx) = mpsc::unbounded_channel::<AgentNotice>();
        let notice_bus = bus.clone();
        let notice_pump = tokio::spawn(async move {
            while let Some(notice) = notices_rx.recv().await {
                match notice {
                    AgentNotice::Ready => {
                        notice_bus.publish_from("supervisor", EventKind::StartListening)
                    }
                    AgentNotice::SpeakingStopped => {
                        notice_bus.publish_from("supervisor", EventKind::TalkLevel(None))
                    }
                    AgentNotice::SpeakingStarted => {}
                }
            }
        });
        let meter_bus = bus.clone();
        let meter: MeterCallback = Arc::new(move |level: u8| {
            meter_bus.publish_from("speaker", EventKind::TalkLevel(Some(level)));
        });

        let run_cancel = self.linked_token();
        let result = agent.run(notices_tx, Some(meter), run_cancel.clone()).await;
        run_cancel.cancel();
        notice_pump.abort();

        bus.publish_from("supervisor", EventKind::StopListening);

        match result? {
            RunResult::Cancelled => info!(agent = agent.name(), "conversation hung up"),
            RunResult::InactivityTimeout => {
                info!(agent = agent.name(), "conversation timed out")
            }
        }
        Ok(())
    }

    /// Cached agent for this configuration, recreated when the session has
    /// outlived the configured timeout.
    pub async fn get_or_create_agent(
        &self,
        config: &AppConfig,
        agent_config: &AgentConfig,
    ) -> Arc<RealtimeAgent> {
        let session_timeout = Duration::from_secs(config.session_timeout_minutes * 60);
        let mut agents = self.agents.lock().await;

        if let Some(existing) = agents.get(&agent_config.name) {
            if existing.age() < session_timeout {
                return Arc::clone(existing);
            }
            info!(agent = %agent_config.name, "session expired; recreating agent");
            existing.dispose().await;
            agents.remove(&agent_config.name);
        }

        let tools = Arc::new(build_registry(
            &agent_config.tools,
            &self.state.bus,
            &self.state.memory,
        ));
        let session_config = AgentSessionConfig {
            agent_name: agent_config.name.clone(),
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: agent_config.voice.clone(),
            instructions: config.instructions_for(agent_config),
            temperature: agent_config.temperature,
            inactivity_timeout: Duration::from_secs(
                config.conversation_inactivity_timeout_seconds,
            ),
            vad: VadConfig {
                sample_rate: VadSampleRate::Rate16kHz,
                model_path: config.vad_model_path.clone(),
                num_threads: 1,
            },
        };
        let agent = Arc::new(RealtimeAgent::new(
            session_config,
            tools,
            self.state.bus.clone(),
        ));
        agents.insert(agent_config.name.clone(), Arc::clone(&agent));
        agent
    }

    pub async fn dispose_all_agents(&self) {
        let mut agents = self.agents.lock().await;
        for (_, agent) in agents.drain() {
            agent.dispose().await;
        }
    }

    /// Whether any agent is currently cached (test observability).
    pub async fn has_cached_agents(&self) -> bool {
        !self.agents.lock().await.is_empty()
    }
}

/// Build the wake stage for the enabled agents of `config`.
fn build_wake_stage(config: &AppConfig, bus: &EventBus) -> Result<WakeStage<WakeEngine>> {
    let specs: Vec<WakeModelSpec> = config
        .agents
        .iter()
        .filter(|agent| !agent.disabled)
        .map(|agent| WakeModelSpec {
            id: agent.wake_word_model.clone(),
            path: config.wake_model_path(agent),
            threshold: agent.wake_word_threshold,
            trigger_level: agent.wake_word_trigger_level as usize,
        })
        .collect();
    if specs.is_empty() {
        warn!("no enabled agents; wake stage has nothing to listen for");
    }

    let engine = WakeEngine::load(&specs, 1).context("failed to load wake models")?;
    Ok(WakeStage::new(
        WakeStageConfig {
            silence_amplitude_threshold: config.wake_word_silence_threshold,
            frame_size: FRAME_SAMPLES,
        },
        engine,
        bus.clone(),
    ))
}
