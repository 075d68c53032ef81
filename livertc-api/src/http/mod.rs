// Module: http
// WHIP/WHEP signaling plus the listing, admin and observability routes.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod records;
pub mod rooms;
pub mod signaling;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use livertc_core::SfuMetrics;
use livertc_sfu::Manager;

pub use auth::AuthPolicy;
pub use error::{AppError, AppResult};
pub use rate_limit::RateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub metrics: Arc<SfuMetrics>,
    pub auth: Arc<AuthPolicy>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub record_dir: PathBuf,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, allowed_origin: &str) -> Router {
    let record_dir = state.record_dir.clone();

    Router::new()
        // Health check and metrics
        .route("/healthz", get(healthz))
        .route("/metrics", get(serve_metrics))
        // WHIP ingest / WHEP playback signaling
        .route("/api/whip/publish/:room", post(signaling::whip_publish))
        .route("/api/whep/play/:room", post(signaling::whep_play))
        // Listings
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/records", get(records::list_records))
        // Admin
        .route("/api/admin/rooms/:room/close", post(rooms::admin_close_room))
        // Finished recordings, served straight from disk
        .nest_service("/records", ServeDir::new(record_dir))
        .with_state(state)
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origin == "*" {
        return cors.allow_origin(Any);
    }
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => cors.allow_origin(Any),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn serve_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Reject room names that are empty or could escape a path segment.
pub(crate) fn validate_room_name(room: &str) -> Result<(), AppError> {
    if room.is_empty() || room.contains("..") || room.contains('/') || room.contains('\\') {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "invalid room"));
    }
    Ok(())
}

pub(crate) fn check_rate(state: &AppState, ip: IpAddr) -> Result<(), AppError> {
    if let Some(limiter) = &state.limiter {
        if !limiter.allow(ip) {
            return Err(AppError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests",
            ));
        }
    }
    Ok(())
}
