use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::models::envelope::ApiResponse;
use crate::services::store::StoreError;
use crate::services::validation::Violation;

/// Every way a request can fail. Each variant renders as an error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<Violation>),

    #[error("Invalid input detected")]
    Rejected,

    #[error("Invalid JSON payload")]
    BadPayload(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{context}")]
    Internal {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn internal(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| {
            error!(context, error = %source, "store operation failed");
            ApiError::Internal { context, source }
        }
    }

    pub fn envelope(&self) -> ApiResponse<Value> {
        match self {
            ApiError::Validation(violations) => ApiResponse::validation_error(violations),
            ApiError::Rejected => {
                ApiResponse::error(self.to_string(), StatusCode::BAD_REQUEST, None)
            }
            ApiError::BadPayload(detail) => ApiResponse::error(
                self.to_string(),
                StatusCode::BAD_REQUEST,
                Some(Value::String(detail.clone())),
            ),
            ApiError::NotFound(message) => ApiResponse::not_found(Some(message.as_str())),
            ApiError::Unauthorized(message) => ApiResponse::unauthorized(Some(message.as_str())),
            ApiError::TooManyRequests(message) => {
                ApiResponse::error(message.clone(), StatusCode::TOO_MANY_REQUESTS, None)
            }
            ApiError::Internal { context, source } => {
                ApiResponse::internal(*context, Some(Value::String(source.to_string())))
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected | ApiError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.envelope().into_http()
    }
}
