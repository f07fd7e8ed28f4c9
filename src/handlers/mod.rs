use actix_web::{error::JsonPayloadError, get, web, HttpRequest, HttpResponse};
use serde_json::{json, Value};

use crate::errors::ApiError;
use crate::models::envelope::ApiResponse;

pub mod product;

#[get("/")]
async fn welcome() -> ApiResponse<Value> {
    ApiResponse::success(
        "Welcome to the Product Catalog API",
        Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "products": "/api/products",
        })),
    )
}

/// Fallback for every unmatched route.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    let message = format!("Not Found - {}", req.path());
    ApiResponse::not_found(Some(message.as_str())).into_http()
}

/// JSON extractor settings: size limit and an envelope for malformed bodies.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err: JsonPayloadError, _req| ApiError::BadPayload(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(welcome);
}
