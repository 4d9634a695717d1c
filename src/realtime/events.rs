//! Wire message types for the realtime service.
//!
//! The remote protocol is JSON-over-websocket with a `type` discriminator.
//! Outbound messages are built by the `client_event` helpers; inbound text
//! frames are parsed into the closed [`ServerEvent`] set. Unknown inbound
//! types are not an error: the receive loop logs and skips them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

/// Server events the engine consumes. The set is closed; anything else on
/// the wire is ignored upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionStarted {
        session_id: String,
    },
    /// An assistant output item began streaming. `function_name` is present
    /// when the item is a tool call rather than audio/text.
    OutputStreamingStarted {
        item_id: String,
        function_name: Option<String>,
    },
    OutputDelta {
        item_id: String,
        audio: Option<Vec<u8>>,
        audio_transcript: Option<String>,
        text: Option<String>,
        function_arguments: Option<String>,
        function_call_id: Option<String>,
    },
    OutputStreamingFinished {
        item_id: String,
        function_call_id: Option<String>,
        function_name: Option<String>,
    },
    InputAudioTranscriptionFinished {
        transcript: String,
    },
    ResponseFinished {
        created_items: Vec<CreatedItem>,
    },
    Error {
        message: String,
    },
}

/// Summary of one item a finished response created.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreatedItem {
    pub function_name: Option<String>,
    pub function_call_id: Option<String>,
    pub message_role: Option<String>,
}

impl ServerEvent {
    /// Parse one inbound text frame. Returns `None` for well-formed frames
    /// of types outside the consumed set; malformed JSON is also `None`
    /// (the caller logs the raw frame).
    pub fn parse(raw: &str) -> Option<ServerEvent> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let event_type = value.get("type")?.as_str()?;

        match event_type {
            "session.created" => Some(ServerEvent::SessionStarted {
                session_id: str_at(&value, &["session", "id"]).unwrap_or_default(),
            }),
            "response.output_item.added" => Some(ServerEvent::OutputStreamingStarted {
                item_id: str_at(&value, &["item", "id"])?,
                function_name: str_at(&value, &["item", "name"]),
            }),
            "response.audio.delta" => Some(ServerEvent::OutputDelta {
                item_id: str_at(&value, &["item_id"])?,
                audio: str_at(&value, &["delta"]).and_then(|b64| BASE64.decode(b64).ok()),
                audio_transcript: None,
                text: None,
                function_arguments: None,
                function_call_id: None,
            }),
            "response.audio_transcript.delta" => Some(ServerEvent::OutputDelta {
                item_id: str_at(&value, &["item_id"])?,
                audio: None,
                audio_transcript: str_at(&value, &["delta"]),
                text: None,
                function_arguments: None,
                function_call_id: None,
            }),
            "response.text.delta" => Some(ServerEvent::OutputDelta {
                item_id: str_at(&value, &["item_id"])?,
                audio: None,
                audio_transcript: None,
                text: str_at(&value, &["delta"]),
                function_arguments: None,
                function_call_id: None,
            }),
            "response.function_call_arguments.delta" => Some(ServerEvent::OutputDelta {
                item_id: str_at(&value, &["item_id"])?,
                audio: None,
                audio_transcript: None,
                text: None,
                function_arguments: str_at(&value, &["delta"]),
                function_call_id: str_at(&value, &["call_id"]),
            }),
            "response.output_item.done" => Some(ServerEvent::OutputStreamingFinished {
                item_id: str_at(&value, &["item", "id"])?,
                function_call_id: str_at(&value, &["item", "call_id"]),
                function_name: str_at(&value, &["item", "name"]),
            }),
            "conversation.item.input_audio_transcription.completed" => {
                Some(ServerEvent::InputAudioTranscriptionFinished {
                    transcript: str_at(&value, &["transcript"]).unwrap_or_default(),
                })
            }
            "response.done" => {
                let created_items = value
                    .pointer("/response/output")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| CreatedItem {
                                function_name: str_at(item, &["name"]),
                                function_call_id: str_at(item, &["call_id"]),
                                message_role: str_at(item, &["role"]),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(ServerEvent::ResponseFinished { created_items })
            }
            "error" => Some(ServerEvent::Error {
                message: str_at(&value, &["error", "message"])
                    .or_else(|| str_at(&value, &["message"]))
                    .unwrap_or_else(|| raw.to_string()),
            }),
            _ => None,
        }
    }
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}

/// Outbound message builders.
pub mod client_event {
    use super::*;

    /// `session.update`: voice, instructions, PCM16 both ways, server VAD
    /// off (turn-taking is decided locally), advertised tools.
    pub fn session_update(
        voice: &str,
        instructions: &str,
        temperature: Option<f32>,
        tools: &[Value],
    ) -> Value {
        let mut session = json!({
            "modalities": ["audio", "text"],
            "voice": voice,
            "instructions": instructions,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "turn_detection": null,
            "tools": tools,
            "tool_choice": "auto",
        });
        if let Some(temperature) = temperature {
            session["temperature"] = json!(temperature);
        }
        json!({ "type": "session.update", "session": session })
    }

    pub fn input_audio_append(pcm: &[u8]) -> Value {
        json!({
            "type": "input_audio_buffer.append",
            "audio": BASE64.encode(pcm),
        })
    }

    pub fn input_audio_commit() -> Value {
        json!({ "type": "input_audio_buffer.commit" })
    }

    pub fn response_create() -> Value {
        json!({ "type": "response.create" })
    }

    pub fn response_cancel() -> Value {
        json!({ "type": "response.cancel" })
    }

    /// Report how much of `item_id`'s audio the user actually heard.
    pub fn item_truncate(item_id: &str, content_index: u32, audio_end_ms: u64) -> Value {
        json!({
            "type": "conversation.item.truncate",
            "item_id": item_id,
            "content_index": content_index,
            "audio_end_ms": audio_end_ms,
        })
    }

    /// Append a tool result back into the conversation.
    pub fn function_call_output(call_id: &str, output: &str) -> Value {
        json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_created() {
        let raw = r#"{"type":"session.created","session":{"id":"sess_1"}}"#;
        assert_eq!(
            ServerEvent::parse(raw),
            Some(ServerEvent::SessionStarted {
                session_id: "sess_1".into()
            })
        );
    }

    #[test]
    fn test_parse_audio_delta_decodes_base64() {
        let raw = r#"{"type":"response.audio.delta","item_id":"item_1","delta":"AAD/fw=="}"#;
        match ServerEvent::parse(raw) {
            Some(ServerEvent::OutputDelta {
                item_id,
                audio: Some(audio),
                ..
            }) => {
                assert_eq!(item_id, "item_1");
                assert_eq!(audio, vec![0x00, 0x00, 0xff, 0x7f]);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_function_call_item_added() {
        let raw = r#"{"type":"response.output_item.added","item":{"id":"i1","type":"function_call","name":"CalculatorPlugin-Add"}}"#;
        assert_eq!(
            ServerEvent::parse(raw),
            Some(ServerEvent::OutputStreamingStarted {
                item_id: "i1".into(),
                function_name: Some("CalculatorPlugin-Add".into()),
            })
        );
    }

    #[test]
    fn test_parse_function_arguments_delta() {
        let raw = r#"{"type":"response.function_call_arguments.delta","item_id":"i1","call_id":"c1","delta":"{\"a\":"}"#;
        match ServerEvent::parse(raw) {
            Some(ServerEvent::OutputDelta {
                function_arguments: Some(args),
                function_call_id: Some(call_id),
                ..
            }) => {
                assert_eq!(args, "{\"a\":");
                assert_eq!(call_id, "c1");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_done_collects_created_items() {
        let raw = r#"{"type":"response.done","response":{"output":[
            {"type":"function_call","name":"WeatherPlugin-CurrentWeather","call_id":"c9"},
            {"type":"message","role":"assistant"}
        ]}}"#;
        match ServerEvent::parse(raw) {
            Some(ServerEvent::ResponseFinished { created_items }) => {
                assert_eq!(created_items.len(), 2);
                assert_eq!(
                    created_items[0].function_name.as_deref(),
                    Some("WeatherPlugin-CurrentWeather")
                );
                assert_eq!(created_items[1].message_role.as_deref(), Some("assistant"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_prefers_nested_message() {
        let raw = r#"{"type":"error","error":{"message":"rate limited"}}"#;
        assert_eq!(
            ServerEvent::parse(raw),
            Some(ServerEvent::Error {
                message: "rate limited".into()
            })
        );
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        assert_eq!(
            ServerEvent::parse(r#"{"type":"rate_limits.updated"}"#),
            None
        );
        assert_eq!(ServerEvent::parse("not json"), None);
    }

    #[test]
    fn test_session_update_shape() {
        let update = client_event::session_update("sage", "Be brief.", Some(0.7), &[]);
        assert_eq!(update["type"], "session.update");
        assert_eq!(update["session"]["voice"], "sage");
        assert_eq!(update["session"]["input_audio_format"], "pcm16");
        assert_eq!(update["session"]["turn_detection"], serde_json::Value::Null);
        assert_eq!(update["session"]["tool_choice"], "auto");
        assert_eq!(update["session"]["temperature"], 0.7);
    }

    #[test]
    fn test_append_round_trips_audio() {
        let pcm = vec![1u8, 2, 3, 4];
        let event = client_event::input_audio_append(&pcm);
        let encoded = event["audio"].as_str().unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), pcm);
    }

    #[test]
    fn test_truncate_carries_position() {
        let event = client_event::item_truncate("i1", 0, 1234);
        assert_eq!(event["item_id"], "i1");
        assert_eq!(event["content_index"], 0);
        assert_eq!(event["audio_end_ms"], 1234);
    }
}
