//! Errors surfaced by the HTTP layer as JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use livertc_sfu::SfuError;

pub type AppResult<T> = Result<T, AppError>;

/// A status code plus a short description safe to show to clients.
///
/// Handlers build these at the point of refusal; SFU errors convert via
/// `From`, which picks the status from the error kind.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.detail,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<SfuError> for AppError {
    fn from(err: SfuError) -> Self {
        let status = match &err {
            SfuError::PublisherExists => StatusCode::CONFLICT,
            SfuError::SubscriberLimit => StatusCode::TOO_MANY_REQUESTS,
            SfuError::Negotiation(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sfu_error_mapping() {
        let err = AppError::from(SfuError::PublisherExists);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::from(SfuError::SubscriberLimit);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let err = AppError::from(SfuError::Negotiation(livertc_sfu::WebRtcError::new(
            "bad sdp".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.detail().contains("negotiation failed"));
    }

    #[test]
    fn test_response_shape() {
        let response = AppError::new(StatusCode::NOT_FOUND, "room not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .unwrap(),
            "application/json"
        );
    }
}
