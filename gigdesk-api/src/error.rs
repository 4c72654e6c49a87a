//! Error mapping from the core taxonomy to HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gigdesk_core::error::MarketError;
use serde_json::json;
use tracing::error;

/// Wrapper turning a [`MarketError`] into a JSON error response
#[derive(Debug)]
pub struct ApiError(pub MarketError);

/// Result alias for handler functions
pub type ApiResult<T> = Result<T, ApiError>;

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Serialization(_) | MarketError::Storage(_) => {
                error!("Internal failure: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
