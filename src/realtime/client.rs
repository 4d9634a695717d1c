//! Websocket client for the remote realtime speech service.
//!
//! The connection is split into a writer task (draining an unbounded message
//! channel) and a reader task (parsing text frames into [`ServerEvent`]s).
//! Callers interact through the [`RealtimeSession`] trait so the agent loops
//! can be exercised against scripted sessions in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use super::SessionError;
use super::events::{ServerEvent, client_event};

const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

/// Session configuration applied after connect.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub voice: String,
    /// Global instructions and agent instructions, concatenated.
    pub instructions: String,
    pub temperature: Option<f32>,
    /// Tool descriptors advertised to the model.
    pub tools: Vec<Value>,
}

/// Operations the conversation engine needs from a live session.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Apply voice/instructions/audio-format/tool configuration.
    async fn configure(&self, settings: &SessionSettings) -> Result<(), SessionError>;

    /// Stream one chunk of uplink PCM16 audio.
    async fn send_input_audio(&self, pcm: &[u8]) -> Result<(), SessionError>;

    /// Close the pending input buffer as one user turn.
    async fn commit_pending_audio(&self) -> Result<(), SessionError>;

    /// Ask the model to respond to the committed conversation state.
    async fn start_response(&self) -> Result<(), SessionError>;

    /// Interrupt the in-flight response.
    async fn cancel_response(&self) -> Result<(), SessionError>;

    /// Tell the server how much of `item_id` the user actually heard.
    async fn truncate_item(
        &self,
        item_id: &str,
        content_index: u32,
        audio_end_ms: u64,
    ) -> Result<(), SessionError>;

    /// Append a function-call output item to the conversation.
    async fn add_function_output(&self, call_id: &str, output: &str) -> Result<(), SessionError>;

    /// Next server event; `None` once the wire has closed.
    async fn next_event(&self) -> Option<ServerEvent>;

    /// Whether the wire is still believed open.
    fn is_open(&self) -> bool;

    /// Close the connection.
    async fn close(&self);
}

/// Production websocket session.
pub struct RealtimeClient {
    outbound: mpsc::UnboundedSender<Message>,
    events: Mutex<mpsc::UnboundedReceiver<ServerEvent>>,
    open: Arc<AtomicBool>,
}

impl RealtimeClient {
    /// Connect and authenticate.
    ///
    /// An API key alone connects to the default service endpoint; an
    /// explicit `endpoint` overrides the host (self-hosted gateways).
    pub async fn connect(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, SessionError> {
        if api_key.is_empty() {
            return Err(SessionError::Configuration("missing API key".into()));
        }

        let base = endpoint.unwrap_or(DEFAULT_ENDPOINT);
        let url = format!("{base}?model={model}");
        info!(%url, "connecting realtime session");

        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| SessionError::Configuration(format!("bad endpoint {url}: {e}")))?;
        {
            let headers = request.headers_mut();
            headers.insert(
                "Authorization",
                format!("Bearer {api_key}")
                    .parse()
                    .map_err(|_| SessionError::Configuration("API key is not header-safe".into()))?,
            );
            headers.insert("OpenAI-Beta", "realtime=v1".parse().expect("static header"));
        }

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        let (mut ws_sink, mut ws_stream) = ws.split();

        let open = Arc::new(AtomicBool::new(true));

        // Writer: serialize all outbound traffic through one task.
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    warn!("realtime send failed: {}", e);
                    writer_open.store(false, Ordering::Release);
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader: parse frames into the typed event stream.
        let (events_tx, events_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match ServerEvent::parse(&text) {
                        Some(event) => {
                            if events_tx.send(event).is_err() {
                                break;
                            }
                        }
                        None => debug!(frame = %text.as_str(), "ignoring realtime frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        info!("realtime session closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("realtime receive failed: {}", e);
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::Release);
        });

        Ok(Self {
            outbound,
            events: Mutex::new(events_rx),
            open,
        })
    }

    fn send_json(&self, value: Value) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }
        self.outbound
            .send(Message::Text(value.to_string().into()))
            .map_err(|_| SessionError::Closed)
    }
}

#[async_trait]
impl RealtimeSession for RealtimeClient {
    async fn configure(&self, settings: &SessionSettings) -> Result<(), SessionError> {
        self.send_json(client_event::session_update(
            &settings.voice,
            &settings.instructions,
            settings.temperature,
            &settings.tools,
        ))
    }

    async fn send_input_audio(&self, pcm: &[u8]) -> Result<(), SessionError> {
        self.send_json(client_event::input_audio_append(pcm))
    }

    async fn commit_pending_audio(&self) -> Result<(), SessionError> {
        self.send_json(client_event::input_audio_commit())
    }

    async fn start_response(&self) -> Result<(), SessionError> {
        self.send_json(client_event::response_create())
    }

    async fn cancel_response(&self) -> Result<(), SessionError> {
        self.send_json(client_event::response_cancel())
    }

    async fn truncate_item(
        &self,
        item_id: &str,
        content_index: u32,
        audio_end_ms: u64,
    ) -> Result<(), SessionError> {
        self.send_json(client_event::item_truncate(
            item_id,
            content_index,
            audio_end_ms,
        ))
    }

    async fn add_function_output(&self, call_id: &str, output: &str) -> Result<(), SessionError> {
        self.send_json(client_event::function_call_output(call_id, output))
    }

    async fn next_event(&self) -> Option<ServerEvent> {
        self.events.lock().await.recv().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
        let _ = self.outbound.send(Message::Close(None));
    }
}
