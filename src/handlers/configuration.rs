//! Configuration endpoints.
//!
//! `UpdateSettings` validates, persists, swaps the in-memory configuration
//! and publishes `ConfigChanged`, which makes the supervisor dispose cached
//! realtime agents before the next conversation.

use axum::Json;
use axum::extract::State;
use serde_json::Value;
use tracing::info;

use crate::config::{AppConfig, config_schema, validate};
use crate::errors::{AppError, AppResult};
use crate::events::EventKind;
use crate::state::AppState;

/// `GET /api/Configuration/GetSchema`
pub async fn get_schema(State(state): State<AppState>) -> Json<Value> {
    let models_dir = state.config.read().models_dir.clone();
    Json(config_schema(&models_dir))
}

/// `GET /api/Configuration/GetSettings`
pub async fn get_settings(State(state): State<AppState>) -> Json<AppConfig> {
    let mut config = state.config_snapshot();
    // The key never leaves the process.
    if !config.api_key.is_empty() {
        config.api_key = "********".to_string();
    }
    Json(config)
}

/// `POST /api/Configuration/UpdateSettings`
pub async fn update_settings(
    State(state): State<AppState>,
    Json(mut incoming): Json<AppConfig>,
) -> AppResult<Json<Value>> {
    // A redacted or omitted key means "keep the current one".
    if incoming.api_key.is_empty() || incoming.api_key.chars().all(|c| c == '*') {
        incoming.api_key = state.config.read().api_key.clone();
    }

    validate(&incoming).map_err(|e| AppError::BadRequest(format!("{e:#}")))?;
    incoming
        .save(&state.config_path)
        .map_err(|e| AppError::InternalServerError(format!("{e:#}")))?;

    *state.config.write() = incoming;
    state
        .bus
        .publish_from("config-api", EventKind::ConfigChanged);
    info!("settings updated");

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// `DELETE /api/Configuration/DeleteSettings` — reset to defaults.
pub async fn delete_settings(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let defaults = AppConfig::default();
    defaults
        .save(&state.config_path)
        .map_err(|e| AppError::InternalServerError(format!("{e:#}")))?;

    *state.config.write() = defaults;
    state
        .bus
        .publish_from("config-api", EventKind::ConfigChanged);
    info!("settings reset to defaults");

    Ok(Json(serde_json::json!({ "reset": true })))
}
