use actix_web::{http::StatusCode, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::services::validation::Violation;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody<T> {
    Data { data: Option<T> },
    Errors { errors: Option<Value> },
}

/// The single response shape every endpoint returns.
///
/// The transport status is read from the envelope when it is turned into an
/// `HttpResponse`, so `statusCode` in the body always matches the wire status.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T = Value> {
    success: bool,
    message: String,
    #[serde(flatten)]
    body: ResponseBody<T>,
    #[serde(rename = "statusCode", serialize_with = "serialize_status")]
    status: StatusCode,
    timestamp: DateTime<Utc>,
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> Self {
        Self::success_with_status(message, data, StatusCode::OK)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::success_with_status(message, Some(data), StatusCode::CREATED)
    }

    pub fn success_with_status(message: impl Into<String>, data: Option<T>, status: StatusCode) -> Self {
        Self {
            success: true,
            message: message.into(),
            body: ResponseBody::Data { data },
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data(&self) -> Option<&T> {
        match &self.body {
            ResponseBody::Data { data } => data.as_ref(),
            ResponseBody::Errors { .. } => None,
        }
    }

    pub fn errors(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Errors { errors } => errors.as_ref(),
            ResponseBody::Data { .. } => None,
        }
    }

    pub fn into_http(self) -> HttpResponse {
        HttpResponse::build(self.status).json(&self)
    }
}

impl ApiResponse<Value> {
    pub fn error(message: impl Into<String>, status: StatusCode, errors: Option<Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            body: ResponseBody::Errors { errors },
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn internal(message: impl Into<String>, errors: Option<Value>) -> Self {
        Self::error(message, StatusCode::INTERNAL_SERVER_ERROR, errors)
    }

    pub fn validation_error(violations: &[Violation]) -> Self {
        let errors = serde_json::to_value(violations).unwrap_or(Value::Null);
        Self::error("Validation failed", StatusCode::UNPROCESSABLE_ENTITY, Some(errors))
    }

    pub fn not_found(message: Option<&str>) -> Self {
        Self::error(
            message.unwrap_or("Resource not found"),
            StatusCode::NOT_FOUND,
            None,
        )
    }

    pub fn unauthorized(message: Option<&str>) -> Self {
        Self::error(
            message.unwrap_or("Unauthorized access"),
            StatusCode::UNAUTHORIZED,
            None,
        )
    }
}

impl<T: Serialize> Responder for ApiResponse<T> {
    type Body = actix_web::body::BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        self.into_http()
    }
}
