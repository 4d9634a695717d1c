//! Device control: conversation hangup and volume, routed over the bus.

use serde_json::{Value, json};

use super::{FunctionSpec, ToolError};
use crate::events::{EventBus, EventKind};

pub struct SystemPlugin {
    bus: EventBus,
}

impl SystemPlugin {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec {
                name: "EndConversation",
                description: "End the current conversation when the user says goodbye or asks to stop",
                parameters: json!({ "type": "object", "properties": {} }),
            },
            FunctionSpec {
                name: "VolumeUp",
                description: "Raise the speaker volume one step",
                parameters: json!({ "type": "object", "properties": {} }),
            },
            FunctionSpec {
                name: "VolumeDown",
                description: "Lower the speaker volume one step",
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    pub async fn invoke(&self, function: &str, _args: &Value) -> Result<Value, ToolError> {
        match function {
            "EndConversation" => {
                self.bus.publish_from("system-tool", EventKind::HangupInput);
                Ok(json!("Goodbye."))
            }
            "VolumeUp" => {
                self.bus.publish_from("system-tool", EventKind::VolumeCtrlUp);
                Ok(json!("Volume raised."))
            }
            "VolumeDown" => {
                self.bus
                    .publish_from("system-tool", EventKind::VolumeCtrlDown);
                Ok(json!("Volume lowered."))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[tokio::test]
    async fn test_end_conversation_publishes_hangup() {
        let bus = EventBus::new();
        let mut rx = bus.watch(&[EventType::HangupInput]);
        let plugin = SystemPlugin::new(bus);

        plugin.invoke("EndConversation", &json!({})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::HangupInput);
    }

    #[tokio::test]
    async fn test_volume_functions_publish_ctrl_events() {
        let bus = EventBus::new();
        let mut rx = bus.watch(&[EventType::VolumeCtrlUp, EventType::VolumeCtrlDown]);
        let plugin = SystemPlugin::new(bus);

        plugin.invoke("VolumeUp", &json!({})).await.unwrap();
        plugin.invoke("VolumeDown", &json!({})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::VolumeCtrlUp);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::VolumeCtrlDown);
    }
}
