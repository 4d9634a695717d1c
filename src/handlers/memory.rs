//! REST access to the memory store.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::memory::{MemoryItem, MemoryStats};
use crate::state::AppState;

fn internal(e: impl std::fmt::Display) -> AppError {
    AppError::InternalServerError(e.to_string())
}

/// `GET /api/Memory`
pub async fn list(State(state): State<AppState>) -> Json<Vec<MemoryItem>> {
    Json(state.memory.list().await)
}

/// `GET /api/Memory/{key}`
pub async fn get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<MemoryItem>> {
    match state.memory.recall(&key).await.map_err(internal)? {
        Some(item) => Ok(Json(item)),
        None => Err(AppError::NotFound(format!("memory '{key}'"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

/// `GET /api/Memory/search?query&maxResults`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<Value>>> {
    let results = state
        .memory
        .search(&params.query, params.max_results)
        .await
        .map_err(internal)?;
    Ok(Json(
        results
            .into_iter()
            .map(|(item, score)| json!({ "item": item, "score": score }))
            .collect(),
    ))
}

/// `GET /api/Memory/stats`
pub async fn stats(State(state): State<AppState>) -> Json<MemoryStats> {
    Json(state.memory.stats().await)
}

#[derive(Debug, Deserialize)]
pub struct PutMemoryBody {
    pub content: String,
}

/// `PUT /api/Memory/{key}`
pub async fn put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<PutMemoryBody>,
) -> AppResult<Json<MemoryItem>> {
    let item = state
        .memory
        .save(&key, &body.content)
        .await
        .map_err(internal)?;
    Ok(Json(item))
}

/// `DELETE /api/Memory/{key}`
pub async fn delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<Value>> {
    let existed = state.memory.forget(&key).await.map_err(internal)?;
    if !existed {
        return Err(AppError::NotFound(format!("memory '{key}'")));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// `DELETE /api/Memory/clear`
pub async fn clear(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.memory.clear().await.map_err(internal)?;
    Ok(Json(json!({ "cleared": true })))
}
