//! JSON schema of [`AppConfig`] for the configuration UI.
//!
//! The schema is assembled by hand (the shape changes rarely) and enriched
//! with the valid choices for voice, remote model, and wake-word model —
//! the latter discovered from the models directory so newly dropped-in
//! model files show up without a rebuild.

use std::path::Path;

use serde_json::{Value, json};

/// Voices the remote service currently offers.
const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

/// Realtime-capable models.
const MODELS: &[&str] = &["gpt-realtime", "gpt-realtime-mini"];

/// Wake model ids available on disk (file stem of each `.onnx` under
/// `models_dir`, VAD excluded).
pub fn available_wake_models(models_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(models_dir) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "onnx"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .filter(|stem| !stem.contains("vad"))
        .collect();
    ids.sort();
    ids
}

/// The enriched schema served by `GET /api/Configuration/GetSchema`.
pub fn config_schema(models_dir: &Path) -> Value {
    let wake_models = available_wake_models(models_dir);

    json!({
        "$schema": "https://json-schema.org/draft-07/schema#",
        "title": "AppConfig",
        "type": "object",
        "properties": {
            "apiKey": { "type": "string", "description": "Remote service API key" },
            "endpoint": { "type": ["string", "null"], "description": "Optional realtime endpoint override" },
            "model": { "type": "string", "enum": MODELS },
            "instructions": { "type": "string" },
            "sessionTimeoutMinutes": { "type": "integer", "minimum": 1 },
            "conversationInactivityTimeoutSeconds": { "type": "integer", "minimum": 1 },
            "memoryCap": { "type": "integer", "minimum": 1 },
            "memoryPath": { "type": "string" },
            "startupVolume": { "type": "integer", "minimum": 0, "maximum": 10 },
            "wakeWordSilenceThreshold": { "type": "integer", "minimum": 0 },
            "modelsDir": { "type": "string" },
            "vadModelPath": { "type": "string" },
            "logsDir": { "type": "string" },
            "httpHost": { "type": "string" },
            "httpPort": { "type": "integer", "minimum": 1, "maximum": 65535 },
            "agents": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "instructions": { "type": ["string", "null"] },
                        "temperature": { "type": ["number", "null"], "minimum": 0.0, "maximum": 2.0 },
                        "wakeWordModel": { "type": "string", "enum": wake_models },
                        "wakeWordThreshold": { "type": "number", "minimum": 0.1, "maximum": 0.9 },
                        "wakeWordTriggerLevel": { "type": "integer", "minimum": 1, "maximum": 10 },
                        "voice": { "type": "string", "enum": VOICES },
                        "disabled": { "type": "boolean" },
                        "tools": {
                            "type": "object",
                            "properties": {
                                "calculator": { "type": "boolean" },
                                "dateTime": { "type": "boolean" },
                                "geoIp": { "type": "boolean" },
                                "weather": { "type": "boolean" },
                                "memory": { "type": "boolean" },
                                "system": { "type": "boolean" },
                                "eyes": { "type": "boolean" }
                            }
                        }
                    },
                    "required": ["name", "wakeWordModel", "voice"]
                }
            }
        },
        "required": ["model", "agents"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_enriches_voice_and_model_enums() {
        let schema = config_schema(Path::new("/nonexistent"));
        let voices = &schema["properties"]["agents"]["items"]["properties"]["voice"]["enum"];
        assert!(voices.as_array().unwrap().iter().any(|v| v == "sage"));
        let models = &schema["properties"]["model"]["enum"];
        assert!(models.as_array().unwrap().iter().any(|m| m == "gpt-realtime"));
    }

    #[test]
    fn test_wake_models_discovered_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hey_vesper.onnx"), b"x").unwrap();
        std::fs::write(dir.path().join("computer.onnx"), b"x").unwrap();
        std::fs::write(dir.path().join("silero_vad.onnx"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let ids = available_wake_models(dir.path());
        assert_eq!(ids, vec!["computer".to_string(), "hey_vesper".to_string()]);
    }

    #[test]
    fn test_missing_models_dir_yields_empty_enum() {
        assert!(available_wake_models(Path::new("/no/such/dir")).is_empty());
    }
}
