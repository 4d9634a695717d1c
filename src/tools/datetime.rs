//! Local date and time for the model.

use chrono::Local;
use serde_json::{Value, json};

use super::{FunctionSpec, ToolError};

pub struct DateTimePlugin;

impl DateTimePlugin {
    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![FunctionSpec {
            name: "CurrentDateTime",
            description: "Get the current local date, time and weekday",
            parameters: json!({ "type": "object", "properties": {} }),
        }]
    }

    pub async fn invoke(&self, function: &str, _args: &Value) -> Result<Value, ToolError> {
        match function {
            "CurrentDateTime" => {
                let now = Local::now();
                Ok(json!({
                    "iso": now.to_rfc3339(),
                    "spoken": now.format("%A, %B %-d %Y, %H:%M").to_string(),
                }))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}
