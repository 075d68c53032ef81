//! Room listing and the admin close endpoint.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use livertc_sfu::RoomInfo;

use super::error::{AppError, AppResult};
use super::{check_rate, validate_room_name, AppState};

/// `GET /api/rooms`
pub async fn list_rooms(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> AppResult<Json<Vec<RoomInfo>>> {
    check_rate(&state, addr.ip())?;
    Ok(Json(state.manager.list_rooms()))
}

/// `POST /api/admin/rooms/:room/close`
pub async fn admin_close_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    validate_room_name(&room)?;
    if !state.auth.allow_admin(&headers) {
        return Err(AppError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    if state.manager.close_room(&room).await {
        info!(room = %room, "room closed by admin");
        Ok(StatusCode::OK)
    } else {
        Err(AppError::new(StatusCode::NOT_FOUND, "room not found"))
    }
}
