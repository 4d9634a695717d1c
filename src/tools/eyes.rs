//! Night mode ("eyes off") control for the device LEDs.

use serde_json::{Value, json};

use super::{FunctionSpec, ToolError};
use crate::events::{EventBus, EventKind};

pub struct EyesPlugin {
    bus: EventBus,
}

impl EyesPlugin {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec {
                name: "NightModeOn",
                description: "Turn the device lights off for the night",
                parameters: json!({ "type": "object", "properties": {} }),
            },
            FunctionSpec {
                name: "NightModeOff",
                description: "Turn the device lights back on",
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    pub async fn invoke(&self, function: &str, _args: &Value) -> Result<Value, ToolError> {
        match function {
            "NightModeOn" => {
                self.bus
                    .publish_from("eyes-tool", EventKind::NightModeActivated);
                Ok(json!("Lights off."))
            }
            "NightModeOff" => {
                self.bus
                    .publish_from("eyes-tool", EventKind::NightModeDeactivated);
                Ok(json!("Lights on."))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}
