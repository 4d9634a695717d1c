//! Application configuration.
//!
//! Configuration lives in a YAML file next to the binary and can be
//! rewritten at runtime through the HTTP surface. Priority: file values >
//! environment > defaults. The API key is usually supplied via environment
//! (`VESPER_API_KEY`, falling back to `OPENAI_API_KEY`) so the file can be
//! committed without secrets.

mod schema;
mod validation;

pub use schema::config_schema;
pub use validation::validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Tool-enable flags for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolFlags {
    pub calculator: bool,
    pub date_time: bool,
    pub geo_ip: bool,
    pub weather: bool,
    pub memory: bool,
    pub system: bool,
    pub eyes: bool,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            calculator: true,
            date_time: true,
            geo_ip: true,
            weather: true,
            memory: true,
            system: true,
            eyes: true,
        }
    }
}

/// One wake-word-addressable assistant persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub name: String,
    /// Appended to the global instructions for this agent.
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    /// Wake model id; the model file is `{modelsDir}/{id}.onnx`.
    pub wake_word_model: String,
    /// Per-frame activation threshold, [0.1, 0.9].
    pub wake_word_threshold: f32,
    /// Above-threshold frames required to fire, [1, 10].
    pub wake_word_trigger_level: u32,
    pub voice: String,
    pub disabled: bool,
    pub tools: ToolFlags,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Vesper".to_string(),
            instructions: None,
            temperature: None,
            wake_word_model: "hey_vesper".to_string(),
            wake_word_threshold: 0.5,
            wake_word_trigger_level: 4,
            voice: "sage".to_string(),
            disabled: false,
            tools: ToolFlags::default(),
        }
    }
}

/// Embedding-service settings for semantic memory search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Remote service API key; empty here means "take it from the
    /// environment".
    pub api_key: String,
    /// Explicit realtime endpoint. With only an API key the default service
    /// host is used; with both, the endpoint wins.
    pub endpoint: Option<String>,
    pub model: String,
    /// Instructions shared by every agent.
    pub instructions: String,
    /// Remote sessions older than this are disposed and recreated.
    pub session_timeout_minutes: u64,
    /// Idle conversation time before returning to wake-word listening.
    pub conversation_inactivity_timeout_seconds: u64,
    pub memory_cap: usize,
    pub memory_path: PathBuf,
    /// Embedding service for semantic memory search; `None` disables it.
    pub embedding: Option<EmbeddingConfig>,
    /// Logical startup volume, 0–10.
    pub startup_volume: u8,
    /// Peak-amplitude gate for the wake stage; 0 disables gating.
    pub wake_word_silence_threshold: i32,
    /// Directory holding the wake-word ONNX models.
    pub models_dir: PathBuf,
    pub vad_model_path: PathBuf,
    pub logs_dir: PathBuf,
    pub http_host: String,
    pub http_port: u16,
    pub agents: Vec<AgentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: None,
            model: "gpt-realtime".to_string(),
            instructions: "You are a helpful voice assistant. Keep answers short; \
                           they are spoken aloud."
                .to_string(),
            session_timeout_minutes: 30,
            conversation_inactivity_timeout_seconds: 30,
            memory_cap: 200,
            memory_path: PathBuf::from("memories.json"),
            embedding: None,
            startup_volume: 6,
            wake_word_silence_threshold: 1500,
            models_dir: PathBuf::from("models"),
            vad_model_path: PathBuf::from("models/silero_vad.onnx"),
            logs_dir: PathBuf::from("logs"),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            agents: vec![AgentConfig::default()],
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is missing,
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .with_context(|| format!("malformed config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).context(format!("failed to read config {}", path.display()));
            }
        };

        if config.api_key.is_empty() {
            if let Ok(key) = std::env::var("VESPER_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
                config.api_key = key;
            }
        }

        validate(&config)?;
        Ok(config)
    }

    /// Persist to `path` (API key included only if it came from the file).
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// The agent owning `wake_word_model`, skipping disabled agents.
    pub fn agent_for_wake_word(&self, model_id: &str) -> Option<&AgentConfig> {
        self.agents
            .iter()
            .find(|agent| !agent.disabled && agent.wake_word_model == model_id)
    }

    /// First enabled agent (used for manual wake without a wake word).
    pub fn first_enabled_agent(&self) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| !agent.disabled)
    }

    /// Combined instructions for one agent.
    pub fn instructions_for(&self, agent: &AgentConfig) -> String {
        match &agent.instructions {
            Some(extra) if !extra.is_empty() => format!("{}\n\n{}", self.instructions, extra),
            _ => self.instructions.clone(),
        }
    }

    /// Path of an agent's wake model file.
    pub fn wake_model_path(&self, agent: &AgentConfig) -> PathBuf {
        self.models_dir
            .join(format!("{}.onnx", agent.wake_word_model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        validate(&config).unwrap();
        assert_eq!(config.agents.len(), 1);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = AppConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model, config.model);
        assert_eq!(back.agents.len(), config.agents.len());
        assert_eq!(back.startup_volume, config.startup_volume);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: AppConfig = serde_yaml::from_str("model: gpt-realtime-mini\n").unwrap();
        assert_eq!(config.model, "gpt-realtime-mini");
        assert_eq!(config.memory_cap, AppConfig::default().memory_cap);
    }

    #[test]
    fn test_agent_lookup_skips_disabled() {
        let mut config = AppConfig::default();
        config.agents[0].disabled = true;
        assert!(config.agent_for_wake_word("hey_vesper").is_none());
        assert!(config.first_enabled_agent().is_none());

        config.agents.push(AgentConfig {
            name: "Second".into(),
            wake_word_model: "hey_second".into(),
            ..AgentConfig::default()
        });
        assert_eq!(
            config.agent_for_wake_word("hey_second").unwrap().name,
            "Second"
        );
        assert_eq!(config.first_enabled_agent().unwrap().name, "Second");
    }

    #[test]
    fn test_instructions_concatenation() {
        let mut config = AppConfig::default();
        config.instructions = "Global.".into();
        config.agents[0].instructions = Some("Agent.".into());
        let combined = config.instructions_for(&config.agents[0]);
        assert!(combined.starts_with("Global."));
        assert!(combined.ends_with("Agent."));

        config.agents[0].instructions = None;
        assert_eq!(config.instructions_for(&config.agents[0]), "Global.");
    }

    #[test]
    fn test_wake_model_path() {
        let config = AppConfig::default();
        assert_eq!(
            config.wake_model_path(&config.agents[0]),
            PathBuf::from("models/hey_vesper.onnx")
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.api_key = "sk-test".into();
        config.startup_volume = 3;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.startup_volume, 3);
        assert_eq!(loaded.api_key, "sk-test");
    }
}
