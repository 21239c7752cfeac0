//! Error handling module
//!
//! Centralized error types and HTTP response conversion.
//! Every error renders as the `{ "success": false, "error": ... }` envelope
//! that dashboard clients branch on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    #[error("Invalid interactionType: {0} (must be center_view, variation_view, or add_to_cart)")]
    InvalidInteractionType(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Store not found for shop: {0}")]
    ShopNotFound(String),

    // Server errors (5xx)
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(_)
            | AppError::InvalidInteraction(_)
            | AppError::InvalidInteractionType(_) => (StatusCode::BAD_REQUEST, None),

            // 404 Not Found
            AppError::ProductNotFound(_) | AppError::ShopNotFound(_) => {
                (StatusCode::NOT_FOUND, None)
            }

            // 503 Service Unavailable - the store could not be reached in
            // time; the client is expected to retry the whole request
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, Some(e.to_string()))
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, None)
            }

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
