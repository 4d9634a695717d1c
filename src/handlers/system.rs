//! Incremental log tailing for the web UI.
//!
//! The client polls with the byte position and file name it saw last; the
//! server returns any lines appended since. When the rolling logger has
//! moved to a new file the response flags `fileChanged` and the client
//! restarts from position zero.

use std::path::{Path, PathBuf};

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogsParams {
    #[serde(default)]
    pub last_position: u64,
    #[serde(default)]
    pub last_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTail {
    pub file_name: String,
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub has_new_lines: bool,
    pub file_changed: bool,
    pub new_position: u64,
}

/// Newest log file in the directory. The daily-rolling appender names files
/// `vesper.log.YYYY-MM-DD`, so lexicographic order is chronological.
fn newest_log_file(logs_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(logs_dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .max_by_key(|path| path.file_name().map(|n| n.to_os_string()))
}

/// `GET /api/System/GetLogs?lastPosition&lastFile`
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<GetLogsParams>,
) -> AppResult<Json<LogTail>> {
    let Some(path) = newest_log_file(&state.logs_dir) else {
        return Ok(Json(LogTail {
            file_name: String::new(),
            lines: Vec::new(),
            total_lines: 0,
            has_new_lines: false,
            file_changed: false,
            new_position: 0,
        }));
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_changed = params
        .last_file
        .as_deref()
        .is_some_and(|last| last != file_name);
    // After rotation the caller's position refers to the old file.
    let start = if file_changed { 0 } else { params.last_position };

    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::InternalServerError(format!("{}: {e}", path.display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .len();

    let start = start.min(len);
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let mut fresh = String::new();
    file.read_to_string(&mut fresh)
        .await
        .map_err(|e| AppError::InternalServerError(format!("log file is not UTF-8: {e}")))?;

    let lines: Vec<String> = fresh.lines().map(str::to_string).collect();

    // Total line count needs the whole file; logs roll daily so this stays
    // bounded.
    let total_lines = if start == 0 {
        lines.len()
    } else {
        tokio::fs::read_to_string(&path)
            .await
            .map(|content| content.lines().count())
            .unwrap_or(lines.len())
    };

    Ok(Json(LogTail {
        file_name,
        has_new_lines: !lines.is_empty(),
        lines,
        total_lines,
        file_changed,
        new_position: len,
    }))
}
