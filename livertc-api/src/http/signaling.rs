//! WHIP/WHEP signaling: the client POSTs an SDP offer and receives a
//! complete SDP answer, no trickle ICE.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::error::{AppError, AppResult};
use super::{check_rate, validate_room_name, AppState};

/// `POST /api/whip/publish/:room`
#[axum::debug_handler]
pub async fn whip_publish(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    offer_sdp: String,
) -> AppResult<Response> {
    validate_room_name(&room)?;
    check_rate(&state, addr.ip())?;
    if !state.auth.allow_room(&headers, &room) {
        return Err(AppError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let answer = state.manager.publish(&room, offer_sdp).await.map_err(|e| {
        debug!(room = %room, error = %e, "publish rejected");
        AppError::from(e)
    })?;

    Ok(sdp_answer(answer))
}

/// `POST /api/whep/play/:room`
pub async fn whep_play(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    offer_sdp: String,
) -> AppResult<Response> {
    validate_room_name(&room)?;
    check_rate(&state, addr.ip())?;
    if !state.auth.allow_room(&headers, &room) {
        return Err(AppError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let answer = state.manager.subscribe(&room, offer_sdp).await.map_err(|e| {
        debug!(room = %room, error = %e, "subscribe rejected");
        AppError::from(e)
    })?;

    Ok(sdp_answer(answer))
}

fn sdp_answer(sdp: String) -> Response {
    (
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "application/sdp")],
        sdp,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdp_answer_shape() {
        let response = sdp_answer("v=0\r\n".to_string());
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/sdp"
        );
    }
}
