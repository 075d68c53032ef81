//! Listing of finished recordings in the record directory.

use std::net::SocketAddr;
use std::path::Path;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::error::{AppError, AppResult};
use super::{check_rate, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub name: String,
    pub size: u64,
    pub mod_time: String,
    pub url: String,
}

/// `GET /api/records`
pub async fn list_records(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> AppResult<Json<Vec<RecordEntry>>> {
    check_rate(&state, addr.ip())?;
    let entries = collect_records(&state.record_dir)
        .await
        .map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(entries))
}

/// Enumerate `.ogg` / `.ivf` files directly inside `dir`.
async fn collect_records(dir: &Path) -> std::io::Result<Vec<RecordEntry>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let lower = name.to_ascii_lowercase();
        if !lower.ends_with(".ogg") && !lower.ends_with(".ivf") {
            continue;
        }
        let mod_time = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        out.push(RecordEntry {
            url: format!("/records/{name}"),
            size: metadata.len(),
            mod_time,
            name,
        });
    }
    Ok(out)
}
