//! HTTP mapping of engine errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lampstand_core::Error;
use serde_json::json;

/// Errors surfaced by the proxy's own endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] Error),

    /// Pass-through fetch failed and nothing could stand in for it.
    #[error("upstream unavailable: {0}")]
    Upstream(Error),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Upstream(Error::FetchTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Engine(err) => match err {
                Error::InvalidInput(_) | Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                Error::InvalidState(_) => StatusCode::CONFLICT,
                Error::CacheMiss(_) => StatusCode::NOT_FOUND,
                Error::Network(_) | Error::FetchTooLarge(_) | Error::HttpError(_) => StatusCode::BAD_GATEWAY,
                Error::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::Engine(err) | ServerError::Upstream(err) => err.code(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("{self}");
        }
        (status, Json(json!({ "error": self.code(), "message": self.to_string() }))).into_response()
    }
}
