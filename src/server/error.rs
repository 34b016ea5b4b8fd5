use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::model::FieldError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Błąd walidacji")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    WrongPassword(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        existing: Box<serde_json::Value>,
    },

    #[error("{0}")]
    TooManyRequests(String),

    /// 429 that tells the client when it may retry.
    #[error("{message}")]
    RateLimited { message: String, reset_at: String },

    /// 500 with a message the admin panel can show.
    #[error("{0}")]
    Server(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::WrongPassword(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) | AppError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Server(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match self {
            AppError::Validation(errors) => serde_json::json!({
                "error": "Błąd walidacji",
                "details": errors,
            }),
            AppError::Conflict { message, existing } => serde_json::json!({
                "error": message,
                "existing": existing,
            }),
            AppError::RateLimited { message, reset_at } => serde_json::json!({
                "error": message,
                "reset_at": reset_at,
            }),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                serde_json::json!({ "error": "Internal server error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
