//! Tool functions exposed to the remote model.
//!
//! Plugins are a closed tagged set — the schema handed to the remote session
//! is produced from each variant's function specs at compile time, no
//! runtime reflection. The remote model addresses functions by fully
//! qualified name `{PluginName}-{FunctionName}` and passes arguments as JSON
//! text; every argument field is string-typed because that is what the
//! model reliably produces.

mod calculator;
mod datetime;
mod eyes;
mod geoip;
mod memory_plugin;
mod system;
mod weather;

pub use calculator::CalculatorPlugin;
pub use datetime::DateTimePlugin;
pub use eyes::EyesPlugin;
pub use geoip::GeoIpPlugin;
pub use memory_plugin::MemoryPlugin;
pub use system::SystemPlugin;
pub use weather::WeatherPlugin;

use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ToolFlags;
use crate::events::EventBus;
use crate::memory::MemoryStore;

/// Errors a plugin invocation can produce. These never propagate past the
/// registry: the remote model receives them as an `"Error: …"` output and
/// decides the user-facing recovery.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// Static description of one callable function.
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON-schema for the arguments object; all leaf fields are strings.
    pub parameters: Value,
}

/// The closed plugin set.
pub enum Plugin {
    Calculator(CalculatorPlugin),
    DateTime(DateTimePlugin),
    GeoIp(GeoIpPlugin),
    Weather(WeatherPlugin),
    Memory(MemoryPlugin),
    System(SystemPlugin),
    Eyes(EyesPlugin),
}

impl Plugin {
    /// Plugin half of the fully qualified function name.
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Calculator(_) => "CalculatorPlugin",
            Plugin::DateTime(_) => "DateTimePlugin",
            Plugin::GeoIp(_) => "GeoIpPlugin",
            Plugin::Weather(_) => "WeatherPlugin",
            Plugin::Memory(_) => "MemoryPlugin",
            Plugin::System(_) => "SystemPlugin",
            Plugin::Eyes(_) => "EyesPlugin",
        }
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        match self {
            Plugin::Calculator(p) => p.functions(),
            Plugin::DateTime(p) => p.functions(),
            Plugin::GeoIp(p) => p.functions(),
            Plugin::Weather(p) => p.functions(),
            Plugin::Memory(p) => p.functions(),
            Plugin::System(p) => p.functions(),
            Plugin::Eyes(p) => p.functions(),
        }
    }

    async fn invoke(&self, function: &str, args: &Value) -> Result<Value, ToolError> {
        match self {
            Plugin::Calculator(p) => p.invoke(function, args).await,
            Plugin::DateTime(p) => p.invoke(function, args).await,
            Plugin::GeoIp(p) => p.invoke(function, args).await,
            Plugin::Weather(p) => p.invoke(function, args).await,
            Plugin::Memory(p) => p.invoke(function, args).await,
            Plugin::System(p) => p.invoke(function, args).await,
            Plugin::Eyes(p) => p.invoke(function, args).await,
        }
    }
}

/// The registered plugin set for one agent, with dispatch by fully
/// qualified name.
pub struct ToolRegistry {
    plugins: Vec<Plugin>,
}

impl ToolRegistry {
    pub fn new(plugins: Vec<Plugin>) -> Self {
        Self { plugins }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Tool descriptors in the shape the realtime session expects.
    pub fn tool_descriptors(&self) -> Vec<Value> {
        self.plugins
            .iter()
            .flat_map(|plugin| {
                let plugin_name = plugin.name();
                plugin.functions().into_iter().map(move |spec| {
                    json!({
                        "type": "function",
                        "name": format!("{plugin_name}-{}", spec.name),
                        "description": spec.description,
                        "parameters": spec.parameters,
                    })
                })
            })
            .collect()
    }

    /// Parse `raw_args` and dispatch `fq_name`. Failures come back as the
    /// `"Error: …"` string the model is expected to explain to the user.
    pub async fn invoke_function(&self, fq_name: &str, raw_args: &str) -> String {
        match self.try_invoke(fq_name, raw_args).await {
            Ok(result) => stringify_result(result),
            Err(e) => {
                warn!(function = fq_name, "tool invocation failed: {}", e);
                format!("Error: {e}")
            }
        }
    }

    async fn try_invoke(&self, fq_name: &str, raw_args: &str) -> Result<Value, ToolError> {
        let (plugin_name, function) = fq_name
            .split_once('-')
            .ok_or_else(|| ToolError::UnknownFunction(fq_name.to_string()))?;

        let plugin = self
            .plugins
            .iter()
            .find(|p| p.name() == plugin_name)
            .ok_or_else(|| ToolError::UnknownFunction(fq_name.to_string()))?;

        let args: Value = if raw_args.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };

        info!(function = fq_name, "invoking tool");
        plugin.invoke(function, &args).await
    }
}

/// Assemble the plugin set an agent's tool flags enable.
pub fn build_registry(
    flags: &ToolFlags,
    bus: &EventBus,
    memory: &Arc<MemoryStore>,
) -> ToolRegistry {
    let mut plugins = Vec::new();
    if flags.calculator {
        plugins.push(Plugin::Calculator(CalculatorPlugin));
    }
    if flags.date_time {
        plugins.push(Plugin::DateTime(DateTimePlugin));
    }
    if flags.geo_ip {
        plugins.push(Plugin::GeoIp(GeoIpPlugin::default()));
    }
    if flags.weather {
        plugins.push(Plugin::Weather(WeatherPlugin::default()));
    }
    if flags.memory {
        plugins.push(Plugin::Memory(MemoryPlugin::new(Arc::clone(memory))));
    }
    if flags.system {
        plugins.push(Plugin::System(SystemPlugin::new(bus.clone())));
    }
    if flags.eyes {
        plugins.push(Plugin::Eyes(EyesPlugin::new(bus.clone())));
    }
    ToolRegistry::new(plugins)
}

/// Primitive results go to the model as bare text; structured results as
/// JSON.
fn stringify_result(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        structured => structured.to_string(),
    }
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing argument '{name}'")))
}

/// Parse a required string argument as a number.
pub(crate) fn required_number(args: &Value, name: &str) -> Result<f64, ToolError> {
    let raw = required_str(args, name)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ToolError::InvalidArguments(format!("'{name}' is not a number: {raw}")))
}
