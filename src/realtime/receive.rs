//! Server-event dispatch for the receive loop.
//!
//! The receive loop lives as long as the session (not one conversation): it
//! keeps draining server events between runs so tool-call turns that finish
//! after the user walked away still complete. Protocol surprises are logged
//! and skipped; the loop only exits when the wire closes or the session is
//! disposed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::RealtimeSession;
use super::events::ServerEvent;
use super::sync::PlaybackSync;
use super::AgentNotice;
use crate::events::{EventBus, EventKind};
use crate::tools::ToolRegistry;

/// Everything the event handlers need, shared between the loop task and the
/// owning agent.
pub struct ReceiveContext {
    pub session: Arc<dyn RealtimeSession>,
    pub sync: Arc<PlaybackSync>,
    tools: Arc<ToolRegistry>,
    bus: EventBus,
    /// Per-run notice channel; absent between runs.
    notices: Mutex<Option<mpsc::UnboundedSender<AgentNotice>>>,
    /// Function-call argument fragments accumulated per item id.
    pending_arguments: Mutex<HashMap<String, String>>,
}

impl ReceiveContext {
    pub fn new(
        session: Arc<dyn RealtimeSession>,
        sync: Arc<PlaybackSync>,
        tools: Arc<ToolRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            session,
            sync,
            tools,
            bus,
            notices: Mutex::new(None),
            pending_arguments: Mutex::new(HashMap::new()),
        }
    }

    /// Route notices to the supervisor for the duration of a run.
    pub fn attach_notices(&self, tx: mpsc::UnboundedSender<AgentNotice>) {
        *self.notices.lock() = Some(tx);
    }

    pub fn detach_notices(&self) {
        *self.notices.lock() = None;
    }

    fn notify(&self, notice: AgentNotice) {
        if let Some(tx) = self.notices.lock().as_ref() {
            let _ = tx.send(notice);
        }
    }
}

/// Drain server events until the wire closes, the session is disposed, or
/// `cancel` fires. Handler errors never escape this loop.
pub async fn receive_loop(ctx: Arc<ReceiveContext>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = ctx.session.next_event() => match event {
                Some(event) => event,
                None => {
                    info!("realtime event stream ended");
                    break;
                }
            },
        };

        if let Err(e) = handle_event(&ctx, event).await {
            warn!("receive loop error (continuing): {:#}", e);
        }
    }
}

/// Dispatch one server event.
pub async fn handle_event(ctx: &ReceiveContext, event: ServerEvent) -> anyhow::Result<()> {
    match event {
        ServerEvent::SessionStarted { session_id } => {
            info!(%session_id, "realtime session started");
        }

        ServerEvent::OutputStreamingStarted {
            item_id,
            function_name,
        } => {
            debug!(%item_id, ?function_name, "assistant item streaming");
            ctx.sync.begin_streaming(&item_id);
            ctx.notify(AgentNotice::SpeakingStarted);
        }

        ServerEvent::OutputDelta {
            item_id,
            audio,
            audio_transcript,
            text,
            function_arguments,
            function_call_id: _,
        } => {
            if let Some(audio) = audio {
                ctx.sync.append_output_audio(&audio);
            }
            if let Some(fragment) = function_arguments {
                ctx.pending_arguments
                    .lock()
                    .entry(item_id)
                    .or_default()
                    .push_str(&fragment);
            }
            if let Some(transcript) = audio_transcript {
                debug!(%transcript, "assistant transcript delta");
            }
            if let Some(text) = text {
                debug!(%text, "assistant text delta");
            }
        }

        ServerEvent::OutputStreamingFinished {
            item_id,
            function_call_id,
            function_name,
        } => {
            let Some(call_id) = function_call_id else {
                return Ok(());
            };
            let Some(name) = function_name else {
                warn!(%item_id, %call_id, "function call finished without a name");
                return Ok(());
            };

            let arguments = ctx
                .pending_arguments
                .lock()
                .remove(&item_id)
                .unwrap_or_default();

            publish_function_event(ctx, &name, true);
            // The registry converts failures into "Error: ..." outputs; the
            // model explains them to the user.
            let output = ctx.tools.invoke_function(&name, &arguments).await;
            ctx.session.add_function_output(&call_id, &output).await?;
            publish_function_event(ctx, &name, false);
        }

        ServerEvent::InputAudioTranscriptionFinished { transcript } => {
            info!(%transcript, "user said");
        }

        ServerEvent::ResponseFinished { created_items } => {
            ctx.sync.clear_waiting_for_response();

            if !ctx.sync.barge_in_triggered() {
                let residual = ctx.sync.take_residual_audio();
                if let Some(speaker) = ctx.sync.speaker() {
                    if !residual.is_empty() {
                        speaker.write(&residual);
                    }
                    speaker.flush().await;
                }
            }

            ctx.sync.set_model_speaking(false);
            ctx.notify(AgentNotice::SpeakingStopped);

            // A turn that produced tool calls has had its outputs appended by
            // now; ask for the follow-up answer to close the cycle.
            if created_items.iter().any(|item| item.function_name.is_some()) {
                debug!("turn contained tool calls; requesting follow-up response");
                ctx.sync.mark_waiting_for_response();
                ctx.session.start_response().await?;
            }
        }

        ServerEvent::Error { message } => {
            warn!(%message, "realtime service error");
        }
    }
    Ok(())
}

fn publish_function_event(ctx: &ReceiveContext, name: &str, starting: bool) {
    let kind = if starting {
        EventKind::FunctionInvoking {
            name: name.to_string(),
        }
    } else {
        EventKind::FunctionInvoked {
            name: name.to_string(),
        }
    };
    ctx.bus.publish_from("realtime-agent", kind);
}
